//! Result assembly.
//!
//! Applies the noisy-cell matrix to the original, un-generalized frame:
//! either flagged cells are replaced with nulls, or the frame is left
//! untouched and a record-level indicator column is prepended.

use crate::config::PipelineConfig;
use crate::error::{DetectionError, Result, ResultExt};
use crate::pipeline::DetectionStage;
use crate::types::NoisyCellMatrix;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Indicator value for a noisy record.
pub const NOISY_LABEL: &str = "True";
/// Indicator value for a clean record.
pub const CLEAN_LABEL: &str = "False";

/// How detected noise is surfaced in the output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Null out every flagged cell.
    MissingValues,
    /// Keep all values, prepend a record indicator column, an enum over
    /// `"False"`/`"True"`.
    Indicator,
}

impl OutputMode {
    pub fn from_config(config: &PipelineConfig) -> Self {
        if config.make_noisy_missing {
            Self::MissingValues
        } else {
            Self::Indicator
        }
    }
}

/// Builds the output frame from the original frame and Q.
pub struct ResultAssembler;

impl ResultAssembler {
    /// Produce the output frame for `mode`.
    ///
    /// Q must have one row per record and one column per attribute of
    /// `original`.
    pub fn assemble(
        original: &DataFrame,
        q: &NoisyCellMatrix,
        mode: OutputMode,
        indicator_column: &str,
    ) -> Result<DataFrame> {
        if q.shape() != original.shape() {
            return Err(DetectionError::DimensionMismatch {
                stage: DetectionStage::Assembly,
                detail: format!(
                    "noisy-cell matrix is {:?} but the dataset is {:?}",
                    q.shape(),
                    original.shape()
                ),
            });
        }

        match mode {
            OutputMode::MissingValues => Self::null_noisy_cells(original, q),
            OutputMode::Indicator => {
                Self::prepend_indicator(original, &q.record_flags(), indicator_column)
            }
        }
    }

    fn null_noisy_cells(original: &DataFrame, q: &NoisyCellMatrix) -> Result<DataFrame> {
        let mut df = original.clone();
        let counts = q.attribute_counts();

        for (attribute, column) in original.get_columns().iter().enumerate() {
            if counts[attribute] == 0 {
                continue;
            }

            let name = column.name().clone();
            let keep: Vec<bool> = (0..q.n_records())
                .map(|record| !q.is_noisy(record, attribute))
                .collect();
            let mask = BooleanChunked::from_slice(name.clone(), &keep);
            let nulls = Series::full_null(name.clone(), column.len(), column.dtype());

            let replaced = column
                .as_materialized_series()
                .zip_with(&mask, &nulls)
                .context(format!("Failed to null noisy cells in '{}'", name))?;
            df.replace(name.as_str(), replaced)
                .context(format!("Failed to replace column '{}'", name))?;

            debug!("Nulled {} noisy cells in '{}'", counts[attribute], name);
        }

        Ok(df)
    }

    fn prepend_indicator(
        original: &DataFrame,
        record_flags: &[bool],
        indicator_column: &str,
    ) -> Result<DataFrame> {
        if original.get_column_index(indicator_column).is_some() {
            return Err(DetectionError::AssemblyFailed(format!(
                "indicator column '{}' already exists in the dataset",
                indicator_column
            )));
        }

        let values: Vec<&str> = record_flags
            .iter()
            .map(|&noisy| if noisy { NOISY_LABEL } else { CLEAN_LABEL })
            .collect();
        let categories = FrozenCategories::new([CLEAN_LABEL, NOISY_LABEL])
            .context("Failed to build indicator categories")?;
        let indicator = Series::new(indicator_column.into(), values)
            .cast(&DataType::from_frozen_categories(categories))
            .context("Failed to encode indicator column")?;

        let mut df = original.clone();
        df.insert_column(0, indicator)
            .context("Failed to insert indicator column")?;
        Ok(df)
    }
}
