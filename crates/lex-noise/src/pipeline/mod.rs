//! Pipeline module.
//!
//! Orchestration of the detection stages plus progress and cancellation.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{
    CancellationToken, ClosureProgressReporter, DetectionStage, ProgressReporter, ProgressUpdate,
};
