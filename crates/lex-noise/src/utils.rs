//! Shared utilities for the noise detection pipeline.
//!
//! Dtype classification and column extraction helpers used by the
//! generalizer and the CLI dry run.

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Category of a data type for generalization purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeCategory {
    /// Integer or floating point numbers
    Numeric,
    /// Date, datetime, time or duration types
    Temporal,
    /// Boolean type
    Boolean,
    /// Free-form string type
    String,
    /// Categorical or enum type
    Categorical,
    /// Other/unknown types
    Other,
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a temporal type.
#[inline]
pub fn is_temporal_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time | DataType::Duration(_)
    )
}

/// Get the category of a DataType.
pub fn get_dtype_category(dtype: &DataType) -> DtypeCategory {
    if is_numeric_dtype(dtype) {
        DtypeCategory::Numeric
    } else if is_temporal_dtype(dtype) {
        DtypeCategory::Temporal
    } else if matches!(dtype, DataType::Boolean) {
        DtypeCategory::Boolean
    } else if matches!(dtype, DataType::String) {
        DtypeCategory::String
    } else if matches!(dtype, DataType::Categorical(_, _) | DataType::Enum(_, _)) {
        DtypeCategory::Categorical
    } else {
        DtypeCategory::Other
    }
}

// =============================================================================
// Column Extraction Utilities
// =============================================================================

/// Extract the values of a numeric or temporal series as `f64`.
///
/// Temporal columns are read through their physical representation
/// (days for dates, ticks for datetimes), which preserves ordering and
/// distinctness.
pub fn series_to_f64(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let physical = series.to_physical_repr();
    let floats = physical.cast(&DataType::Float64)?;
    Ok(floats.f64()?.into_iter().collect())
}

/// Extract the values of a series as owned strings, keeping nulls.
pub fn series_to_strings(series: &Series) -> PolarsResult<Vec<Option<String>>> {
    let strings = series.cast(&DataType::String)?;
    Ok(strings
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Minimum and maximum of the non-null, non-NaN values, if any.
pub fn min_max(values: &[Option<f64>]) -> Option<(f64, f64)> {
    values
        .iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

/// Number of distinct non-null, non-NaN values.
pub fn distinct_count(values: &[Option<f64>]) -> usize {
    let mut seen: Vec<u64> = values
        .iter()
        .flatten()
        .filter(|v| !v.is_nan())
        // normalise -0.0 so it counts as 0.0
        .map(|v| (v + 0.0).to_bits())
        .collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

// =============================================================================
// Tests
// =============================================================================
