//! Configuration types for the noise detection pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default coappearance threshold (tau).
pub const DEFAULT_COAPPEARANCE_THRESHOLD: f64 = 0.8;

/// Default coappearance score threshold (lambda).
pub const DEFAULT_COAPPEARANCE_SCORE_THRESHOLD: f64 = 0.3;

/// Default name of the prepended indicator column.
pub const DEFAULT_INDICATOR_COLUMN: &str = "Noisy";

/// Default number of CAM cells up to which dense storage is used.
pub const DEFAULT_DENSE_CELL_LIMIT: usize = 1 << 24;

/// What to do when the bin formula yields zero bins for a numeric or date column.
///
/// This happens for zero-range numeric columns (`max == min`) and for ranges
/// below 0.25 (`round(sqrt(range)) == 0`). All-null columns are not binned
/// at all; they get an empty domain and are skipped during scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ZeroBinPolicy {
    /// Treat the column as constant: one bin, every non-missing value gets code 0.
    #[default]
    SingleBin,
    /// Abort the run with a generalization failure.
    Reject,
}

/// Configuration for the noise detection pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use lex_noise::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .coappearance_threshold(0.8)
///     .coappearance_score_threshold(0.3)
///     .make_noisy_missing(false)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Coappearance threshold (tau), scales expected co-occurrence counts.
    /// Must lie in (0.0, 1.0].
    /// Default: 0.8
    pub coappearance_threshold: f64,

    /// Coappearance score threshold (lambda), the normalized score above
    /// which an attribute value is flagged noisy. Must lie in (0.0, 1.0].
    /// Default: 0.3
    pub coappearance_score_threshold: f64,

    /// Replace noisy values with missing values. When false, the original
    /// values are kept and a record-level indicator column is prepended.
    /// Default: true
    pub make_noisy_missing: bool,

    /// Name of the indicator column prepended in indicator mode.
    /// Default: "Noisy"
    pub indicator_column: String,

    /// Behaviour for numeric/date columns whose bin formula yields zero bins.
    /// Default: SingleBin
    pub zero_bin_policy: ZeroBinPolicy,

    /// Optional cap on the bin count computed for numeric/date columns.
    /// Default: None (uncapped)
    pub max_bins: Option<usize>,

    /// Columns treated as nominal regardless of their storage type
    /// (e.g. integer-coded categories).
    /// Default: empty
    pub nominal_columns: Vec<String>,

    /// Columns with a declared category list. The declared labels fix the
    /// domain size and the code order; observed values outside the list
    /// fail generalization.
    /// Default: empty
    pub declared_domains: BTreeMap<String, Vec<String>>,

    /// Number of co-appearance cells up to which the matrix is stored densely.
    /// Larger matrices fall back to sparse storage.
    /// Default: 16_777_216
    pub dense_cell_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            coappearance_threshold: DEFAULT_COAPPEARANCE_THRESHOLD,
            coappearance_score_threshold: DEFAULT_COAPPEARANCE_SCORE_THRESHOLD,
            make_noisy_missing: true,
            indicator_column: DEFAULT_INDICATOR_COLUMN.to_string(),
            zero_bin_policy: ZeroBinPolicy::default(),
            max_bins: None,
            nominal_columns: Vec::new(),
            declared_domains: BTreeMap::new(),
            dense_cell_limit: DEFAULT_DENSE_CELL_LIMIT,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        check_unit_interval("coappearance_threshold", self.coappearance_threshold)?;
        check_unit_interval(
            "coappearance_score_threshold",
            self.coappearance_score_threshold,
        )?;

        if self.indicator_column.trim().is_empty() {
            return Err(ConfigValidationError::EmptyIndicatorColumn);
        }

        if self.max_bins == Some(0) {
            return Err(ConfigValidationError::InvalidMaxBins(0));
        }

        for (column, labels) in &self.declared_domains {
            if labels.is_empty() {
                return Err(ConfigValidationError::EmptyDeclaredDomain(column.clone()));
            }
        }

        Ok(())
    }

    /// Whether a column is forced to the categorical kind.
    pub fn is_nominal(&self, column: &str) -> bool {
        self.nominal_columns.iter().any(|c| c == column)
            || self.declared_domains.contains_key(column)
    }
}

/// Both thresholds live in the half-open interval (0, 1].
pub(crate) fn check_unit_interval(field: &str, value: f64) -> Result<(), ConfigValidationError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigValidationError::InvalidThreshold {
            field: field.to_string(),
            value,
        })
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be > 0.0 and <= 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid max bins: {0} (must be at least 1)")]
    InvalidMaxBins(usize),

    #[error("Indicator column name must not be empty")]
    EmptyIndicatorColumn,

    #[error("Declared domain for column '{0}' has no labels")]
    EmptyDeclaredDomain(String),
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    coappearance_threshold: Option<f64>,
    coappearance_score_threshold: Option<f64>,
    make_noisy_missing: Option<bool>,
    indicator_column: Option<String>,
    zero_bin_policy: Option<ZeroBinPolicy>,
    max_bins: Option<usize>,
    nominal_columns: Vec<String>,
    declared_domains: BTreeMap<String, Vec<String>>,
    dense_cell_limit: Option<usize>,
}

impl PipelineConfigBuilder {
    /// Set the coappearance threshold (tau).
    ///
    /// # Arguments
    /// * `tau` - Value in (0.0, 1.0]
    pub fn coappearance_threshold(mut self, tau: f64) -> Self {
        self.coappearance_threshold = Some(tau);
        self
    }

    /// Set the coappearance score threshold (lambda).
    ///
    /// # Arguments
    /// * `lambda` - Value in (0.0, 1.0]
    pub fn coappearance_score_threshold(mut self, lambda: f64) -> Self {
        self.coappearance_score_threshold = Some(lambda);
        self
    }

    /// Choose between missing-value mode (true) and indicator mode (false).
    pub fn make_noisy_missing(mut self, missing: bool) -> Self {
        self.make_noisy_missing = Some(missing);
        self
    }

    /// Set the name of the indicator column used in indicator mode.
    pub fn indicator_column(mut self, name: impl Into<String>) -> Self {
        self.indicator_column = Some(name.into());
        self
    }

    /// Set the policy for columns whose bin formula yields zero bins.
    pub fn zero_bin_policy(mut self, policy: ZeroBinPolicy) -> Self {
        self.zero_bin_policy = Some(policy);
        self
    }

    /// Cap the bin count computed for numeric and date columns.
    pub fn max_bins(mut self, bins: usize) -> Self {
        self.max_bins = Some(bins);
        self
    }

    /// Treat a column as nominal regardless of its storage type.
    pub fn nominal_column(mut self, column: impl Into<String>) -> Self {
        self.nominal_columns.push(column.into());
        self
    }

    /// Declare the full category list of a nominal column.
    pub fn declared_domain<I, S>(mut self, column: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_domains.insert(
            column.into(),
            labels.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Set the number of cells up to which the co-appearance matrix is dense.
    pub fn dense_cell_limit(mut self, cells: usize) -> Self {
        self.dense_cell_limit = Some(cells);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let config = PipelineConfig {
            coappearance_threshold: self
                .coappearance_threshold
                .unwrap_or(DEFAULT_COAPPEARANCE_THRESHOLD),
            coappearance_score_threshold: self
                .coappearance_score_threshold
                .unwrap_or(DEFAULT_COAPPEARANCE_SCORE_THRESHOLD),
            make_noisy_missing: self.make_noisy_missing.unwrap_or(true),
            indicator_column: self
                .indicator_column
                .unwrap_or_else(|| DEFAULT_INDICATOR_COLUMN.to_string()),
            zero_bin_policy: self.zero_bin_policy.unwrap_or_default(),
            max_bins: self.max_bins,
            nominal_columns: self.nominal_columns,
            declared_domains: self.declared_domains,
            dense_cell_limit: self.dense_cell_limit.unwrap_or(DEFAULT_DENSE_CELL_LIMIT),
        };

        config.validate()?;
        Ok(config)
    }
}
