//! Domain generalization.
//!
//! Every column of the input is reduced to a small discrete domain so that
//! co-appearance counting is meaningful:
//!
//! - **Numeric** columns are binned into `round(sqrt(max - min))` equal-width bins
//! - **Temporal** columns are binned into `round(sqrt(distinct))` equal-width bins
//! - **Free-text** columns get one code per distinct value, in encounter order
//! - **Categorical** columns keep their category list (lexical or declared order)
//!
//! Missing values stay missing and never receive a code.

pub mod binning;
pub mod categorical;

use crate::config::{PipelineConfig, ZeroBinPolicy};
use crate::error::{DetectionError, Result, ResultExt};
use crate::pipeline::DetectionStage;
use crate::types::{AttributeDomain, AttributeKind};
use crate::utils::{
    DtypeCategory, distinct_count, get_dtype_category, min_max, series_to_f64, series_to_strings,
};
use binning::{EqualWidthBins, numeric_bin_count, temporal_bin_count};
use categorical::{CategoryOrder, encode_declared, encode_observed};
use polars::prelude::*;
use tracing::{debug, info, warn};

// ============================================================================
// Generalized Dataset
// ============================================================================

/// The dataset after generalization: one optional code per cell.
///
/// Stored row-major so that a record's codes form a contiguous slice.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralizedDataset {
    domains: Vec<AttributeDomain>,
    n_records: usize,
    codes: Vec<Option<u32>>,
}

impl GeneralizedDataset {
    /// Build a dataset from one code vector per attribute.
    pub fn from_columns(
        domains: Vec<AttributeDomain>,
        columns: Vec<Vec<Option<u32>>>,
    ) -> Result<Self> {
        if domains.len() != columns.len() {
            return Err(dimension_error(format!(
                "{} domains for {} columns",
                domains.len(),
                columns.len()
            )));
        }

        let n_records = columns.first().map(Vec::len).unwrap_or(0);
        if let Some((idx, col)) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != n_records)
        {
            return Err(dimension_error(format!(
                "column '{}' has {} values, expected {}",
                domains[idx].name,
                col.len(),
                n_records
            )));
        }

        let n_attributes = columns.len();
        let mut codes = vec![None; n_records * n_attributes];
        for (attribute, column) in columns.into_iter().enumerate() {
            for (record, code) in column.into_iter().enumerate() {
                codes[record * n_attributes + attribute] = code;
            }
        }

        Ok(Self {
            domains,
            n_records,
            codes,
        })
    }

    /// Build a dataset from one code vector per record.
    pub fn from_rows(domains: Vec<AttributeDomain>, rows: Vec<Vec<Option<u32>>>) -> Result<Self> {
        let n_attributes = domains.len();
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != n_attributes)
        {
            return Err(dimension_error(format!(
                "record {} has {} values, expected {}",
                idx,
                row.len(),
                n_attributes
            )));
        }

        Ok(Self {
            domains,
            n_records: rows.len(),
            codes: rows.into_iter().flatten().collect(),
        })
    }

    pub fn n_records(&self) -> usize {
        self.n_records
    }

    pub fn n_attributes(&self) -> usize {
        self.domains.len()
    }

    pub fn domains(&self) -> &[AttributeDomain] {
        &self.domains
    }

    /// Domain size per attribute.
    pub fn domain_sizes(&self) -> Vec<usize> {
        self.domains.iter().map(|d| d.size).collect()
    }

    /// Codes of one record, in attribute order.
    pub fn record(&self, record: usize) -> &[Option<u32>] {
        let width = self.n_attributes();
        let start = record * width;
        &self.codes[start..start + width]
    }

    /// Iterate over all records.
    pub fn records(&self) -> impl Iterator<Item = &[Option<u32>]> + '_ {
        (0..self.n_records).map(move |r| self.record(r))
    }
}

fn dimension_error(detail: String) -> DetectionError {
    DetectionError::DimensionMismatch {
        stage: DetectionStage::Generalization,
        detail,
    }
}

// ============================================================================
// Domain Generalizer
// ============================================================================

/// Output of the generalization stage.
#[derive(Debug, Clone)]
pub struct Generalization {
    pub dataset: GeneralizedDataset,
    /// Non-fatal issues (collapsed ranges, empty domains).
    pub warnings: Vec<String>,
}

/// Maps every column of a DataFrame to a discrete domain.
pub struct DomainGeneralizer<'a> {
    config: &'a PipelineConfig,
}

impl<'a> DomainGeneralizer<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Generalize every column of `df`, in column order.
    pub fn generalize(&self, df: &DataFrame) -> Result<Generalization> {
        self.check_configured_columns(df)?;

        let mut domains = Vec::with_capacity(df.width());
        let mut columns = Vec::with_capacity(df.width());
        let mut warnings = Vec::new();

        for column in df.get_columns() {
            let name = column.name().to_string();
            let kind = self.resolve_kind(column)?;
            let series = column.as_materialized_series();

            let (codes, labels) = match kind {
                AttributeKind::Numeric | AttributeKind::Temporal => {
                    self.bin_column(&name, kind, series, &mut warnings)?
                }
                AttributeKind::FreeText => {
                    let values = series_to_strings(series)
                        .context(format!("Failed to read column '{}'", name))?;
                    encode_observed(&values, CategoryOrder::Encounter)
                }
                AttributeKind::Categorical => self.encode_categorical(&name, series)?,
            };

            if labels.is_empty() {
                let message = format!(
                    "Column '{}' has no observed values and will not be scored",
                    name
                );
                warn!("{}", message);
                warnings.push(message);
            }

            debug!(
                "Generalized '{}' as {} with domain size {}",
                name,
                kind.as_str(),
                labels.len()
            );

            domains.push(AttributeDomain::new(name, kind, labels));
            columns.push(codes);
        }

        let dataset = GeneralizedDataset::from_columns(domains, columns)?;
        info!(
            "Generalized {} attributes over {} records",
            dataset.n_attributes(),
            dataset.n_records()
        );

        Ok(Generalization { dataset, warnings })
    }

    /// Decide how a column is generalized.
    ///
    /// Configured nominal columns always become categorical; otherwise the
    /// storage type decides.
    pub fn resolve_kind(&self, column: &Column) -> Result<AttributeKind> {
        if self.config.is_nominal(column.name().as_str()) {
            return Ok(AttributeKind::Categorical);
        }

        match get_dtype_category(column.dtype()) {
            DtypeCategory::Numeric => Ok(AttributeKind::Numeric),
            DtypeCategory::Temporal => Ok(AttributeKind::Temporal),
            DtypeCategory::String => Ok(AttributeKind::FreeText),
            DtypeCategory::Boolean | DtypeCategory::Categorical => Ok(AttributeKind::Categorical),
            // all-null columns read from CSV carry the Null dtype
            DtypeCategory::Other if matches!(column.dtype(), DataType::Null) => {
                Ok(AttributeKind::FreeText)
            }
            DtypeCategory::Other => Err(DetectionError::GeneralizationFailed {
                column: column.name().to_string(),
                reason: format!("unsupported data type {}", column.dtype()),
            }),
        }
    }

    fn check_configured_columns(&self, df: &DataFrame) -> Result<()> {
        let configured = self
            .config
            .nominal_columns
            .iter()
            .chain(self.config.declared_domains.keys());

        for name in configured {
            if df.get_column_index(name).is_none() {
                return Err(DetectionError::ColumnNotFound(name.clone()));
            }
        }
        Ok(())
    }

    fn bin_column(
        &self,
        name: &str,
        kind: AttributeKind,
        series: &Series,
        warnings: &mut Vec<String>,
    ) -> Result<(Vec<Option<u32>>, Vec<String>)> {
        let values =
            series_to_f64(series).context(format!("Failed to read column '{}'", name))?;

        let Some((min, max)) = min_max(&values) else {
            return Ok((vec![None; values.len()], Vec::new()));
        };

        let mut bins = match kind {
            AttributeKind::Temporal => temporal_bin_count(distinct_count(&values)),
            _ => numeric_bin_count(min, max),
        };
        if let Some(cap) = self.config.max_bins {
            bins = bins.min(cap);
        }

        // more bins than values only adds empty codes
        let observed = values.iter().flatten().filter(|v| !v.is_nan()).count();
        if bins > observed {
            let message = format!(
                "Column '{}' range [{}, {}] yields more bins than its {} values; capped at {}",
                name, min, max, observed, observed
            );
            warn!("{}", message);
            warnings.push(message);
            bins = observed;
        }

        if bins == 0 {
            match self.config.zero_bin_policy {
                ZeroBinPolicy::Reject => {
                    return Err(DetectionError::GeneralizationFailed {
                        column: name.to_string(),
                        reason: format!("range [{}, {}] yields zero bins", min, max),
                    });
                }
                ZeroBinPolicy::SingleBin => {
                    let message = format!(
                        "Column '{}' range [{}, {}] yields zero bins; using a single bin",
                        name, min, max
                    );
                    warn!("{}", message);
                    warnings.push(message);
                    bins = 1;
                }
            }
        }

        let binning = EqualWidthBins::fit(min, max, bins);
        Ok((binning.transform(&values), binning.labels()))
    }

    fn encode_categorical(
        &self,
        name: &str,
        series: &Series,
    ) -> Result<(Vec<Option<u32>>, Vec<String>)> {
        let values =
            series_to_strings(series).context(format!("Failed to read column '{}'", name))?;

        let declared = match self.config.declared_domains.get(name) {
            Some(declared) => Some(declared.clone()),
            None => dtype_categories(series.dtype()),
        };

        match declared {
            Some(declared) => encode_declared(&values, &declared).map_err(|value| {
                DetectionError::GeneralizationFailed {
                    column: name.to_string(),
                    reason: format!("value '{}' is not in the declared domain", value),
                }
            }),
            None => Ok(encode_observed(&values, CategoryOrder::Lexical)),
        }
    }
}

/// Category list fixed by the storage type itself, observed or not.
///
/// Enums carry their categories in declaration order; booleans always have
/// `false` and `true`. Open categoricals only know what they have seen.
fn dtype_categories(dtype: &DataType) -> Option<Vec<String>> {
    match dtype {
        DataType::Enum(categories, _) => Some(
            categories
                .categories()
                .values_iter()
                .map(str::to_string)
                .collect(),
        ),
        DataType::Boolean => Some(vec!["false".to_string(), "true".to_string()]),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn generalize(df: &DataFrame, config: &PipelineConfig) -> Result<Generalization> {
        DomainGeneralizer::new(config).generalize(df)
    }

    #[test]
    fn test_numeric_column_is_binned_by_range() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let df = df!("score" => &values).unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        let domain = &result.dataset.domains()[0];
        assert_eq!(domain.kind, AttributeKind::Numeric);
        assert_eq!(domain.size, 10);
        assert_eq!(result.dataset.record(0), &[Some(0)]);
        assert_eq!(result.dataset.record(10), &[Some(0)]);
        assert_eq!(result.dataset.record(11), &[Some(1)]);
        assert_eq!(result.dataset.record(100), &[Some(9)]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_free_text_uses_encounter_order() {
        let df = df!("city" => &[Some("Oslo"), Some("Bergen"), None, Some("Oslo")]).unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        let domain = &result.dataset.domains()[0];
        assert_eq!(domain.kind, AttributeKind::FreeText);
        assert_eq!(domain.labels, vec!["Oslo", "Bergen"]);
        let codes: Vec<_> = result.dataset.records().map(|r| r[0]).collect();
        assert_eq!(codes, vec![Some(0), Some(1), None, Some(0)]);
    }

    #[test]
    fn test_boolean_is_categorical() {
        let df = df!("flag" => &[true, false, true]).unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        let domain = &result.dataset.domains()[0];
        assert_eq!(domain.kind, AttributeKind::Categorical);
        assert_eq!(domain.size, 2);
        assert_eq!(result.dataset.record(0), &[Some(1)]);
    }

    #[test]
    fn test_date_column_is_binned_by_distinct_count() {
        let days = Series::new("day".into(), &[19000i32, 19001, 19002, 19003, 19004, 19005, 19006, 19007, 19008])
            .cast(&DataType::Date)
            .unwrap();
        let df = DataFrame::new(vec![days.into_column()]).unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        let domain = &result.dataset.domains()[0];
        assert_eq!(domain.kind, AttributeKind::Temporal);
        assert_eq!(domain.size, 3);
        assert_eq!(result.dataset.record(0), &[Some(0)]);
        assert_eq!(result.dataset.record(8), &[Some(2)]);
    }

    #[test]
    fn test_boolean_domain_is_complete_when_one_value_observed() {
        let df = df!(
            "flag" => &[true, true, true],
            "label" => &["a", "b", "a"]
        )
        .unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        assert_eq!(result.dataset.domain_sizes(), vec![2, 2]);
        assert_eq!(result.dataset.domains()[0].labels, vec!["false", "true"]);
        assert_eq!(result.dataset.record(0), &[Some(1), Some(0)]);
    }

    #[test]
    fn test_enum_keeps_unobserved_categories() {
        let levels = FrozenCategories::new(["lo", "mid", "hi"]).unwrap();
        let level = Series::new("level".into(), &["lo", "lo", "mid"])
            .cast(&DataType::from_frozen_categories(levels))
            .unwrap();
        let df = DataFrame::new(vec![level.into_column()]).unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        let domain = &result.dataset.domains()[0];
        assert_eq!(domain.kind, AttributeKind::Categorical);
        assert_eq!(domain.size, 3);
        assert_eq!(domain.labels, vec!["lo", "mid", "hi"]);
        let codes: Vec<_> = result.dataset.records().map(|r| r[0]).collect();
        assert_eq!(codes, vec![Some(0), Some(0), Some(1)]);
    }

    #[test]
    fn test_huge_range_is_capped_at_observed_values() {
        let df = df!(
            "amount" => &[0.0f64, 1.0e300, 5.0],
            "city" => &["a", "b", "a"]
        )
        .unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        assert_eq!(result.dataset.domain_sizes(), vec![3, 2]);
        assert_eq!(result.dataset.record(1), &[Some(2), Some(1)]);
        assert_eq!(result.dataset.record(2), &[Some(0), Some(0)]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_zero_range_single_bin_policy() {
        let df = df!("constant" => &[5.0, 5.0, 5.0]).unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        assert_eq!(result.dataset.domain_sizes(), vec![1]);
        assert_eq!(result.dataset.record(2), &[Some(0)]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_zero_range_reject_policy() {
        let df = df!("small" => &[1.0, 1.1, 1.2]).unwrap();
        let config = PipelineConfig::builder()
            .zero_bin_policy(ZeroBinPolicy::Reject)
            .build()
            .unwrap();

        let err = generalize(&df, &config).unwrap_err();
        assert_eq!(err.error_code(), "GENERALIZATION_FAILED");
        assert_eq!(err.stage(), Some(DetectionStage::Generalization));
    }

    #[test]
    fn test_max_bins_caps_bin_count() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let df = df!("score" => &values).unwrap();
        let config = PipelineConfig::builder().max_bins(4).build().unwrap();

        let result = generalize(&df, &config).unwrap();
        assert_eq!(result.dataset.domain_sizes(), vec![4]);
    }

    #[test]
    fn test_nominal_override() {
        let df = df!("zip" => &[10i64, 2, 10]).unwrap();
        let config = PipelineConfig::builder().nominal_column("zip").build().unwrap();

        let result = generalize(&df, &config).unwrap();
        let domain = &result.dataset.domains()[0];
        assert_eq!(domain.kind, AttributeKind::Categorical);
        assert_eq!(domain.labels, vec!["10", "2"]);
    }

    #[test]
    fn test_declared_domain() {
        let df = df!("answer" => &["no", "no"]).unwrap();
        let config = PipelineConfig::builder()
            .declared_domain("answer", ["no", "yes"])
            .build()
            .unwrap();

        let result = generalize(&df, &config).unwrap();
        assert_eq!(result.dataset.domain_sizes(), vec![2]);

        let df = df!("answer" => &["no", "maybe"]).unwrap();
        let err = generalize(&df, &config).unwrap_err();
        assert_eq!(err.error_code(), "GENERALIZATION_FAILED");
    }

    #[test]
    fn test_configured_column_must_exist() {
        let df = df!("a" => &[1, 2]).unwrap();
        let config = PipelineConfig::builder().nominal_column("b").build().unwrap();

        let err = generalize(&df, &config).unwrap_err();
        assert!(matches!(err, DetectionError::ColumnNotFound(ref c) if c == "b"));
    }

    #[test]
    fn test_all_null_numeric_column_has_empty_domain() {
        let df = df!("empty" => &[None::<f64>, None]).unwrap();

        let result = generalize(&df, &PipelineConfig::default()).unwrap();
        assert_eq!(result.dataset.domain_sizes(), vec![0]);
        assert_eq!(result.dataset.record(1), &[None]);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_dataset_constructors_check_shape() {
        let domains = vec![
            AttributeDomain::new("x", AttributeKind::Categorical, vec!["a".into()]),
            AttributeDomain::new("y", AttributeKind::Categorical, vec!["b".into()]),
        ];

        let by_rows =
            GeneralizedDataset::from_rows(domains.clone(), vec![vec![Some(0), None]]).unwrap();
        let by_cols =
            GeneralizedDataset::from_columns(domains.clone(), vec![vec![Some(0)], vec![None]])
                .unwrap();
        assert_eq!(by_rows, by_cols);

        assert!(GeneralizedDataset::from_rows(domains.clone(), vec![vec![Some(0)]]).is_err());
        assert!(
            GeneralizedDataset::from_columns(domains, vec![vec![Some(0)], vec![None, None]])
                .is_err()
        );
    }
}
