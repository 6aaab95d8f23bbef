//! Detection pipeline and its builder.
//!
//! The pipeline runs the stages strictly in sequence. Each stage takes the
//! previous stage's output by reference and returns a new immutable value:
//!
//! ```text
//! DataFrame -> GeneralizedDataset -> CoappearanceMatrix -> NoisyCellMatrix -> DataFrame
//! ```

use crate::assembler::{OutputMode, ResultAssembler};
use crate::cam::CoappearanceMatrix;
use crate::config::{ConfigValidationError, PipelineConfig};
use crate::error::{DetectionError, Result};
use crate::generalizer::{DomainGeneralizer, Generalization};
use crate::nvi::NoisyValueIdentifier;
use crate::pipeline::progress::{
    CancellationToken, ClosureProgressReporter, DetectionStage, ProgressReporter, ProgressUpdate,
};
use crate::types::{AttributeSummary, DetectionResult, DetectionSummary};
use polars::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// The noise detection pipeline.
///
/// ```rust,ignore
/// use lex_noise::{Pipeline, PipelineConfig};
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().make_noisy_missing(false).build()?)
///     .on_progress(|update| println!("[{:.0}%] {}", update.progress * 100.0, update.message))
///     .build()?
///     .process(df)?;
///
/// println!("{} noisy records", result.summary.noisy_records);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: CancellationToken,
}

static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run detection over `df`.
    ///
    /// Either returns a complete result or a single error naming the stage
    /// that failed. Returns [`DetectionError::Cancelled`] when the token was
    /// cancelled before or during the run.
    pub fn process(&self, df: DataFrame) -> Result<DetectionResult> {
        match self.process_internal(df) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Flagged {} of {} records",
                    result.summary.noisy_records, result.summary.records
                )));
                Ok(result)
            }
            Err(e) => {
                if e.is_cancelled() {
                    self.report_progress(ProgressUpdate::cancelled());
                } else {
                    self.report_progress(ProgressUpdate::failed(e.to_string()));
                }
                error!("Detection failed: {}", e);
                Err(e)
            }
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }
        Ok(())
    }

    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    /// Progress callback for the record loops: checks the token and reports.
    fn record_tick(
        &self,
        stage: DetectionStage,
        total: usize,
        message: &'static str,
    ) -> impl FnMut(usize) -> Result<()> + '_ {
        move |done| {
            self.check_cancelled()?;
            self.report_progress(ProgressUpdate::with_items(stage, done, total, message));
            Ok(())
        }
    }

    fn process_internal(&self, df: DataFrame) -> Result<DetectionResult> {
        let start_time = Instant::now();
        let (records, attributes) = df.shape();
        let mode = OutputMode::from_config(&self.config);

        info!(
            "Starting noise detection on {} records x {} attributes (tau={}, lambda={})",
            records,
            attributes,
            self.config.coappearance_threshold,
            self.config.coappearance_score_threshold
        );
        self.report_progress(ProgressUpdate::new(
            DetectionStage::Initializing,
            0.0,
            "Starting noise detection...",
        ));

        if mode == OutputMode::Indicator
            && df.get_column_index(&self.config.indicator_column).is_some()
        {
            return Err(DetectionError::AssemblyFailed(format!(
                "indicator column '{}' already exists in the dataset",
                self.config.indicator_column
            )));
        }

        self.check_cancelled()?;

        // Step 1: generalize every column to a discrete domain
        info!("Step 1: Generalizing attribute domains...");
        self.report_progress(ProgressUpdate::new(
            DetectionStage::Generalization,
            0.0,
            "Generalizing attribute domains...",
        ));

        let Generalization { dataset, warnings } =
            DomainGeneralizer::new(&self.config).generalize(&df)?;

        for domain in dataset.domains() {
            debug!(
                "  {}: {} ({} codes)",
                domain.name,
                domain.kind.as_str(),
                domain.size
            );
        }
        self.report_progress(ProgressUpdate::new(
            DetectionStage::Generalization,
            1.0,
            format!("Generalized {} attributes", dataset.n_attributes()),
        ));

        self.check_cancelled()?;

        // Step 2: count appearances and co-appearances
        info!("Step 2: Building co-appearance matrix...");
        self.report_progress(ProgressUpdate::new(
            DetectionStage::MatrixConstruction,
            0.0,
            "Building co-appearance matrix...",
        ));

        let cam = CoappearanceMatrix::build_with_progress(
            &dataset,
            self.config.dense_cell_limit,
            self.record_tick(
                DetectionStage::MatrixConstruction,
                records,
                "Counting co-appearances",
            ),
        )?;

        self.report_progress(ProgressUpdate::new(
            DetectionStage::MatrixConstruction,
            1.0,
            format!("Co-appearance matrix ready ({} cells)", cam.cell_count()),
        ));

        self.check_cancelled()?;

        // Step 3: score every record
        info!("Step 3: Scoring records...");
        self.report_progress(ProgressUpdate::new(
            DetectionStage::Scoring,
            0.0,
            "Scoring records...",
        ));

        let domain_sizes = dataset.domain_sizes();
        let q = NoisyValueIdentifier::new(
            &cam,
            &domain_sizes,
            self.config.coappearance_threshold,
            self.config.coappearance_score_threshold,
        )?
        .identify_with_progress(
            &dataset,
            self.record_tick(DetectionStage::Scoring, records, "Scoring records"),
        )?;

        let noisy_records = q.record_flags();
        let noisy_record_count = noisy_records.iter().filter(|&&n| n).count();
        info!(
            "Flagged {} noisy cells in {} records",
            q.noisy_cell_count(),
            noisy_record_count
        );
        self.report_progress(ProgressUpdate::new(
            DetectionStage::Scoring,
            1.0,
            format!("Flagged {} noisy records", noisy_record_count),
        ));

        self.check_cancelled()?;

        // Step 4: apply Q to the original frame
        info!("Step 4: Assembling output ({:?})...", mode);
        self.report_progress(ProgressUpdate::new(
            DetectionStage::Assembly,
            0.0,
            "Assembling output...",
        ));

        let output = ResultAssembler::assemble(&df, &q, mode, &self.config.indicator_column)?;

        self.report_progress(ProgressUpdate::new(
            DetectionStage::Assembly,
            1.0,
            "Output assembled",
        ));

        let attribute_summaries = dataset
            .domains()
            .iter()
            .zip(q.attribute_counts())
            .map(|(domain, noisy_cells)| AttributeSummary {
                name: domain.name.clone(),
                kind: domain.kind,
                domain_size: domain.size,
                noisy_cells,
            })
            .collect();

        let summary = DetectionSummary {
            records,
            attributes,
            noisy_records: noisy_record_count,
            noisy_cells: q.noisy_cell_count(),
            coappearance_threshold: self.config.coappearance_threshold,
            coappearance_score_threshold: self.config.coappearance_score_threshold,
            make_noisy_missing: self.config.make_noisy_missing,
            cam_storage: cam.storage_kind(),
            cam_cells: cam.cell_count(),
            attribute_summaries,
            warnings,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Noise detection completed in {} ms: {} of {} records noisy ({:.1}%)",
            summary.duration_ms,
            summary.noisy_records,
            summary.records,
            summary.noisy_record_percentage()
        );

        Ok(DetectionResult {
            output,
            noisy_cells: q,
            noisy_records,
            domains: dataset.domains().to_vec(),
            summary,
        })
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    cancellation_token: Option<CancellationToken>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use a custom [`ProgressReporter`].
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Receive progress updates through a closure.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Share a token for cancelling the run from another thread.
    pub fn cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = Some(token);
        self
    }

    /// Build the pipeline, validating the configuration.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
            cancellation_token: self.cancellation_token.unwrap_or_default(),
        })
    }
}
