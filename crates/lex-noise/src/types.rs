use crate::cam::CamStorageKind;
use crate::error::{DetectionError, Result};
use crate::pipeline::DetectionStage;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// Attribute Types
// ============================================================================

/// How a column is reduced to a discrete domain.
///
/// Resolved once per column before any data is generalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Integer or floating point values, binned by range.
    Numeric,
    /// Dates and datetimes, binned by distinct value count.
    Temporal,
    /// Free-form strings, one code per distinct observed value.
    FreeText,
    /// Nominal values with an existing (or declared) category list.
    Categorical,
}

impl AttributeKind {
    /// Returns a lowercase name suitable for reports and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Temporal => "temporal",
            Self::FreeText => "free_text",
            Self::Categorical => "categorical",
        }
    }

    /// Whether the kind is generalized by the binning transform.
    pub fn is_binned(&self) -> bool {
        matches!(self, Self::Numeric | Self::Temporal)
    }
}

/// The discrete domain an attribute was generalized into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDomain {
    pub name: String,
    pub kind: AttributeKind,
    /// Number of codes the attribute can take (`0..size`).
    pub size: usize,
    /// Human-readable label per code: an interval for binned kinds,
    /// the category value otherwise.
    pub labels: Vec<String>,
}

impl AttributeDomain {
    pub fn new(name: impl Into<String>, kind: AttributeKind, labels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            size: labels.len(),
            labels,
        }
    }
}

// ============================================================================
// Noisy-Cell Matrix
// ============================================================================

/// Record × attribute table of noisy flags (Q).
///
/// Produced once per run by the noisy value identifier and immutable
/// afterwards. A record is noisy when any cell of its row is flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoisyCellMatrix {
    n_records: usize,
    n_attributes: usize,
    cells: Vec<bool>,
}

impl NoisyCellMatrix {
    /// Create a matrix with every cell clean.
    pub fn new(n_records: usize, n_attributes: usize) -> Self {
        Self {
            n_records,
            n_attributes,
            cells: vec![false; n_records * n_attributes],
        }
    }

    /// Build a matrix from one row of flags per record.
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self> {
        let n_records = rows.len();
        let n_attributes = rows.first().map(Vec::len).unwrap_or(0);
        let mut cells = Vec::with_capacity(n_records * n_attributes);

        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != n_attributes {
                return Err(DetectionError::DimensionMismatch {
                    stage: DetectionStage::Scoring,
                    detail: format!(
                        "row {} has {} flags, expected {}",
                        idx,
                        row.len(),
                        n_attributes
                    ),
                });
            }
            cells.extend(row);
        }

        Ok(Self {
            n_records,
            n_attributes,
            cells,
        })
    }

    /// Dimensions as `(records, attributes)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_records, self.n_attributes)
    }

    pub fn n_records(&self) -> usize {
        self.n_records
    }

    pub fn n_attributes(&self) -> usize {
        self.n_attributes
    }

    /// Whether the cell at `(record, attribute)` is flagged noisy.
    ///
    /// # Panics
    ///
    /// Panics if the position is out of bounds.
    pub fn is_noisy(&self, record: usize, attribute: usize) -> bool {
        assert!(
            record < self.n_records && attribute < self.n_attributes,
            "cell ({}, {}) outside {}x{} matrix",
            record,
            attribute,
            self.n_records,
            self.n_attributes
        );
        self.cells[record * self.n_attributes + attribute]
    }

    /// Binary view of a cell (0 or 1).
    pub fn get(&self, record: usize, attribute: usize) -> u8 {
        u8::from(self.is_noisy(record, attribute))
    }

    pub(crate) fn flag(&mut self, record: usize, attribute: usize) {
        self.cells[record * self.n_attributes + attribute] = true;
    }

    /// Flags of one record.
    pub fn row(&self, record: usize) -> &[bool] {
        let start = record * self.n_attributes;
        &self.cells[start..start + self.n_attributes]
    }

    /// Whether any attribute of the record is flagged.
    pub fn is_record_noisy(&self, record: usize) -> bool {
        self.row(record).iter().any(|&flag| flag)
    }

    /// Record noisy flags, one per record.
    pub fn record_flags(&self) -> Vec<bool> {
        (0..self.n_records)
            .map(|r| self.is_record_noisy(r))
            .collect()
    }

    pub fn noisy_record_count(&self) -> usize {
        (0..self.n_records)
            .filter(|&r| self.is_record_noisy(r))
            .count()
    }

    pub fn noisy_cell_count(&self) -> usize {
        self.cells.iter().filter(|&&flag| flag).count()
    }

    /// Number of flagged cells per attribute.
    pub fn attribute_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_attributes];
        for record in 0..self.n_records {
            for (attribute, &flag) in self.row(record).iter().enumerate() {
                if flag {
                    counts[attribute] += 1;
                }
            }
        }
        counts
    }

    /// Export the matrix as a DataFrame of UInt8 flags, one column per attribute.
    pub fn to_frame(&self, names: &[String]) -> Result<DataFrame> {
        if names.len() != self.n_attributes {
            return Err(DetectionError::DimensionMismatch {
                stage: DetectionStage::Assembly,
                detail: format!(
                    "{} column names for a matrix with {} attributes",
                    names.len(),
                    self.n_attributes
                ),
            });
        }

        let columns: Vec<Column> = names
            .iter()
            .enumerate()
            .map(|(attribute, name)| {
                let flags: Vec<u8> = (0..self.n_records)
                    .map(|record| self.get(record, attribute))
                    .collect();
                Series::new(name.as_str().into(), flags).into_column()
            })
            .collect();

        Ok(DataFrame::new(columns)?)
    }
}

// ============================================================================
// Detection Result Types
// ============================================================================

/// Per-attribute outcome of a detection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSummary {
    pub name: String,
    pub kind: AttributeKind,
    pub domain_size: usize,
    pub noisy_cells: usize,
}

/// Summary of a detection run, suitable for reports and UI display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub records: usize,
    pub attributes: usize,
    pub noisy_records: usize,
    pub noisy_cells: usize,
    pub coappearance_threshold: f64,
    pub coappearance_score_threshold: f64,
    pub make_noisy_missing: bool,
    pub cam_storage: CamStorageKind,
    /// Number of co-appearance cells addressable by the matrix.
    pub cam_cells: usize,
    pub attribute_summaries: Vec<AttributeSummary>,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
}

impl DetectionSummary {
    /// Percentage of records flagged noisy.
    pub fn noisy_record_percentage(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            (self.noisy_records as f64 / self.records as f64) * 100.0
        }
    }

    /// Percentage of cells flagged noisy.
    pub fn noisy_cell_percentage(&self) -> f64 {
        let total = self.records * self.attributes;
        if total == 0 {
            0.0
        } else {
            (self.noisy_cells as f64 / total as f64) * 100.0
        }
    }
}

/// Everything a detection run produces.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// The assembled output: nulled noisy cells or a prepended indicator column.
    pub output: DataFrame,
    /// The noisy-cell matrix (Q).
    pub noisy_cells: NoisyCellMatrix,
    /// Record noisy flags, equal to the OR over each row of Q.
    pub noisy_records: Vec<bool>,
    /// Domains of the generalized attributes, in column order.
    pub domains: Vec<AttributeDomain>,
    pub summary: DetectionSummary,
}

impl DetectionResult {
    /// Domain size table, one entry per attribute.
    pub fn domain_sizes(&self) -> Vec<usize> {
        self.domains.iter().map(|d| d.size).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_matrix_is_clean() {
        let q = NoisyCellMatrix::new(3, 2);
        assert_eq!(q.shape(), (3, 2));
        assert_eq!(q.noisy_cell_count(), 0);
        assert_eq!(q.record_flags(), vec![false, false, false]);
    }

    #[test]
    fn test_record_flag_is_row_or() {
        let q = NoisyCellMatrix::from_rows(vec![
            vec![false, false, false],
            vec![false, true, false],
            vec![true, true, true],
        ])
        .unwrap();

        assert_eq!(q.record_flags(), vec![false, true, true]);
        assert_eq!(q.noisy_record_count(), 2);
        assert_eq!(q.noisy_cell_count(), 4);
        assert_eq!(q.attribute_counts(), vec![1, 2, 1]);
        assert_eq!(q.get(1, 1), 1);
        assert_eq!(q.get(1, 0), 0);
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let err = NoisyCellMatrix::from_rows(vec![vec![true, false], vec![true]]).unwrap_err();
        assert_eq!(err.error_code(), "DIMENSION_MISMATCH");
    }

    #[test]
    #[should_panic]
    fn test_is_noisy_out_of_bounds_panics() {
        let q = NoisyCellMatrix::new(2, 2);
        q.is_noisy(0, 2);
    }

    #[test]
    fn test_to_frame() {
        let mut q = NoisyCellMatrix::new(2, 2);
        q.flag(1, 0);
        let frame = q.to_frame(&["a".to_string(), "b".to_string()]).unwrap();
        assert_eq!(frame.shape(), (2, 2));
        let a = frame.column("a").unwrap().as_materialized_series().u8().unwrap();
        assert_eq!(a.get(0), Some(0));
        assert_eq!(a.get(1), Some(1));

        assert!(q.to_frame(&["a".to_string()]).is_err());
    }

    #[test]
    fn test_attribute_kind_serialization() {
        let json = serde_json::to_string(&AttributeKind::FreeText).unwrap();
        assert_eq!(json, "\"free_text\"");
        assert!(AttributeKind::Temporal.is_binned());
        assert!(!AttributeKind::Categorical.is_binned());
    }

    #[test]
    fn test_summary_percentages() {
        let summary = DetectionSummary {
            records: 10,
            attributes: 2,
            noisy_records: 2,
            noisy_cells: 3,
            coappearance_threshold: 0.8,
            coappearance_score_threshold: 0.3,
            make_noisy_missing: true,
            cam_storage: CamStorageKind::Dense,
            cam_cells: 8,
            attribute_summaries: vec![],
            warnings: vec![],
            duration_ms: 1,
        };
        assert_eq!(summary.noisy_record_percentage(), 20.0);
        assert_eq!(summary.noisy_cell_percentage(), 15.0);
    }
}
