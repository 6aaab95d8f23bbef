//! Co-appearance Based Noisy Value Detection
//!
//! Finds values in a tabular dataset that rarely appear together with the
//! other values of their record, built with Rust and Polars.
//!
//! # Overview
//!
//! A detection run has four stages, each consuming the previous one's output:
//!
//! - **Domain generalization**: every column becomes a small discrete domain
//!   (equal-width bins for numbers and dates, one code per category or string)
//! - **Co-appearance matrix**: how often each pair of values from two
//!   different attributes appears in the same record
//! - **Noisy value identification**: each record's value pairs are compared
//!   against their expected co-appearance; attributes with too many rare
//!   pairings are flagged in the noisy-cell matrix
//! - **Result assembly**: flagged cells are nulled, or a `Noisy` indicator
//!   column is prepended
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lex_noise::{Pipeline, PipelineConfig};
//! use polars::prelude::*;
//!
//! let df = CsvReadOptions::default()
//!     .with_has_header(true)
//!     .try_into_reader_with_file_path(Some("data.csv".into()))?
//!     .finish()?;
//!
//! let config = PipelineConfig::builder()
//!     .coappearance_threshold(0.8)
//!     .coappearance_score_threshold(0.3)
//!     .make_noisy_missing(false)
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| println!("[{:.0}%] {}", update.progress * 100.0, update.message))
//!     .build()?
//!     .process(df)?;
//!
//! println!("{} noisy records", result.summary.noisy_records);
//! for (record, noisy) in result.noisy_records.iter().enumerate() {
//!     if *noisy {
//!         println!("record {}: {:?}", record, result.noisy_cells.row(record));
//!     }
//! }
//! ```
//!
//! # Using the stages directly
//!
//! ```rust,ignore
//! use lex_noise::{CoappearanceMatrix, DomainGeneralizer, NoisyValueIdentifier};
//!
//! let generalized = DomainGeneralizer::new(&config).generalize(&df)?;
//! let dataset = generalized.dataset;
//! let cam = CoappearanceMatrix::build(&dataset, config.dense_cell_limit)?;
//! let sizes = dataset.domain_sizes();
//! let nvi = NoisyValueIdentifier::new(&cam, &sizes, 0.8, 0.3)?;
//! let score = nvi.score_record(dataset.record(0))?;
//! ```

pub mod assembler;
pub mod cam;
pub mod config;
pub mod error;
pub mod generalizer;
pub mod nvi;
pub mod pipeline;
pub mod reporting;
pub mod types;
pub mod utils;

// Re-exports for convenient access
pub use assembler::{OutputMode, ResultAssembler};
pub use cam::{CamStorageKind, CoappearanceMatrix};
pub use config::{ConfigValidationError, PipelineConfig, PipelineConfigBuilder, ZeroBinPolicy};
pub use error::{DetectionError, ResultExt};
pub use generalizer::{DomainGeneralizer, Generalization, GeneralizedDataset};
pub use nvi::{NoisyValueIdentifier, PairVerdict, RecordScore};
pub use pipeline::{
    CancellationToken, ClosureProgressReporter, DetectionStage, Pipeline, PipelineBuilder,
    ProgressReporter, ProgressUpdate,
};
pub use reporting::{DetectionReport, ReportGenerator};
pub use types::{
    AttributeDomain, AttributeKind, AttributeSummary, DetectionResult, DetectionSummary,
    NoisyCellMatrix,
};
pub use utils::{DtypeCategory, get_dtype_category, is_numeric_dtype, is_temporal_dtype};
