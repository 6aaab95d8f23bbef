//! Custom error types for the noise detection pipeline.
//!
//! This module provides the error hierarchy using `thiserror`. Every fatal
//! error can report which pipeline stage it belongs to, so callers get a
//! single terminating error that says where the run failed and why.
//!
//! Errors are serializable, allowing them to be emitted as JSON by the CLI
//! (`--json`) or forwarded to a frontend.

use crate::config::ConfigValidationError;
use crate::pipeline::DetectionStage;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for the noise detection pipeline.
#[derive(Error, Debug)]
pub enum DetectionError {
    /// Pipeline was cancelled by the caller.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A column referenced by the configuration does not exist.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// A column could not be reduced to a discrete domain.
    #[error("Failed to generalize column '{column}': {reason}")]
    GeneralizationFailed { column: String, reason: String },

    /// Internal dimensions disagree with the dataset being processed.
    #[error("Dimension mismatch during {}: {detail}", .stage.display_name())]
    DimensionMismatch { stage: DetectionStage, detail: String },

    /// Building the output dataset failed.
    #[error("Failed to assemble output: {0}")]
    AssemblyFailed(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DetectionError>,
    },
}

impl From<ConfigValidationError> for DetectionError {
    fn from(err: ConfigValidationError) -> Self {
        DetectionError::InvalidConfig(err.to_string())
    }
}

impl DetectionError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DetectionError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for machine-readable handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::GeneralizationFailed { .. } => "GENERALIZATION_FAILED",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::AssemblyFailed(_) => "ASSEMBLY_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// The pipeline stage this error is attributed to, when it has one.
    ///
    /// Configuration errors and cancellation are not tied to a stage.
    pub fn stage(&self) -> Option<DetectionStage> {
        match self {
            Self::GeneralizationFailed { .. } | Self::ColumnNotFound(_) => {
                Some(DetectionStage::Generalization)
            }
            Self::DimensionMismatch { stage, .. } => Some(*stage),
            Self::AssemblyFailed(_) => Some(DetectionStage::Assembly),
            Self::WithContext { source, .. } => source.stage(),
            _ => None,
        }
    }

    /// Check if this error represents a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::WithContext { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Check if this error is recoverable by changing the inputs of the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::InvalidConfig(_) | Self::ColumnNotFound(_)
        )
    }
}

/// Errors are serialized as a struct with `code`, `stage` and `message` fields.
impl Serialize for DetectionError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("DetectionError", 3)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("stage", &self.stage())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for detection operations.
pub type Result<T> = std::result::Result<T, DetectionError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| DetectionError::Polars(e).with_context(context))
    }
}
