//! Progress reporting and cancellation for detection runs.
//!
//! A run can be observed through a [`ProgressReporter`] and stopped from
//! another thread with a [`CancellationToken`]. Cancellation aborts the
//! whole run; there is never a partial result.
//!
//! ```rust,ignore
//! use lex_noise::{CancellationToken, Pipeline};
//!
//! let token = CancellationToken::new();
//! let pipeline = Pipeline::builder()
//!     .cancellation_token(token.clone())
//!     .on_progress(|update| println!("[{:?}] {}", update.stage, update.message))
//!     .build()?;
//!
//! std::thread::spawn(move || token.cancel());
//! let result = pipeline.process(df);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stages of a detection run, in execution order, plus terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStage {
    /// Validating configuration and input shape
    Initializing,
    /// Reducing every column to a discrete domain
    Generalization,
    /// Counting value appearances and co-appearances
    MatrixConstruction,
    /// Scoring records against the co-appearance matrix
    Scoring,
    /// Building the output frame
    Assembly,
    Complete,
    Cancelled,
    Failed,
}

impl DetectionStage {
    /// Human-readable name of the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Generalization => "Generalizing Domains",
            Self::MatrixConstruction => "Building Co-appearance Matrix",
            Self::Scoring => "Scoring Records",
            Self::Assembly => "Assembling Output",
            Self::Complete => "Complete",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run taken by this stage. The working stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::Generalization => 0.18,
            Self::MatrixConstruction => 0.30,
            Self::Scoring => 0.40,
            Self::Assembly => 0.10,
            Self::Complete | Self::Cancelled | Self::Failed => 0.0,
        }
    }

    /// Overall progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Generalization => 0.02,
            Self::MatrixConstruction => 0.20,
            Self::Scoring => 0.50,
            Self::Assembly => 0.90,
            Self::Complete => 1.0,
            Self::Cancelled | Self::Failed => 0.0,
        }
    }
}

/// A single progress notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: DetectionStage,

    /// Finer-grained location, e.g. "Records 4096/10000"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within the current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    fn at(stage: DetectionStage, stage_progress: f32, message: String) -> Self {
        let stage_progress = stage_progress.clamp(0.0, 1.0);
        Self {
            stage,
            sub_stage: None,
            progress: (stage.base_progress() + stage.weight() * stage_progress).clamp(0.0, 1.0),
            stage_progress,
            message,
            items_processed: None,
            items_total: None,
        }
    }

    pub fn new(stage: DetectionStage, stage_progress: f32, message: impl Into<String>) -> Self {
        Self::at(stage, stage_progress, message.into())
    }

    pub fn with_sub_stage(
        stage: DetectionStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::at(stage, stage_progress, message.into())
        }
    }

    /// Progress through `total` items of a stage, `current` of them done.
    pub fn with_items(
        stage: DetectionStage,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let fraction = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            sub_stage: Some(format!("{}/{}", current, total)),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::at(stage, fraction, message.into())
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::at(DetectionStage::Complete, 1.0, message.into())
    }

    pub fn cancelled() -> Self {
        Self::at(
            DetectionStage::Cancelled,
            0.0,
            "Detection cancelled by user".to_string(),
        )
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::at(DetectionStage::Failed, 0.0, message.into())
    }
}

/// Receives progress updates from a running pipeline.
///
/// Implementations must be `Send + Sync`: the pipeline may run on a worker
/// thread while updates are consumed elsewhere. Called once or a few times
/// per stage and every few thousand records while counting and scoring, so
/// `report` should not block.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Shared flag for stopping a run from another thread.
///
/// Clones share state. The pipeline checks the token between stages and
/// periodically inside the counting and scoring loops, then fails with
/// [`DetectionError::Cancelled`](crate::error::DetectionError::Cancelled).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

static_assertions::assert_impl_all!(CancellationToken: Send, Sync);
static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear the flag so the token can be reused for another run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}
