//! Noisy value identification.
//!
//! Every record is scored pair by pair against the co-appearance matrix.
//! For attributes `j < k` with codes `x` and `y`:
//!
//! ```text
//! Exy = xf / |A_k| * tau      (xf: records where j = x)
//! Eyx = yf / |A_j| * tau      (yf: records where k = y)
//! Cxy = records where j = x and k = y
//! ```
//!
//! A pairing rarer than both expectations costs both attributes 2 points,
//! one more common than both costs nothing, anything in between (ties
//! included) costs 1. An attribute is noisy in a record when its points,
//! divided by the maximum `(m - 1) * 2`, exceed lambda.

use crate::cam::{CoappearanceMatrix, PROGRESS_INTERVAL};
use crate::config::check_unit_interval;
use crate::error::{DetectionError, Result};
use crate::generalizer::GeneralizedDataset;
use crate::pipeline::DetectionStage;
use crate::types::NoisyCellMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Outcome of comparing one pairing against its expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairVerdict {
    /// Rarer than both expectations.
    Rare,
    /// Between the expectations, or equal to one of them.
    Ambiguous,
    /// More common than both expectations.
    Expected,
}

impl PairVerdict {
    pub fn classify(cxy: f64, exy: f64, eyx: f64) -> Self {
        if cxy < exy && cxy < eyx {
            Self::Rare
        } else if cxy > exy && cxy > eyx {
            Self::Expected
        } else {
            Self::Ambiguous
        }
    }

    /// Points each attribute of the pair accrues.
    pub fn points(self) -> u32 {
        match self {
            Self::Rare => 2,
            Self::Ambiguous => 1,
            Self::Expected => 0,
        }
    }
}

/// Scores of a single record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordScore {
    /// Accumulated points per attribute.
    pub total_scores: Vec<u32>,
    /// Points divided by the maximum attainable, per attribute.
    pub normalized: Vec<f64>,
    /// Whether the normalized score exceeds lambda, per attribute.
    pub noisy: Vec<bool>,
}

impl RecordScore {
    pub fn is_noisy(&self) -> bool {
        self.noisy.iter().any(|&n| n)
    }
}

/// Scores records against a finished co-appearance matrix.
pub struct NoisyValueIdentifier<'a> {
    cam: &'a CoappearanceMatrix,
    domain_sizes: &'a [usize],
    tau: f64,
    lambda: f64,
}

impl<'a> NoisyValueIdentifier<'a> {
    pub fn new(
        cam: &'a CoappearanceMatrix,
        domain_sizes: &'a [usize],
        tau: f64,
        lambda: f64,
    ) -> Result<Self> {
        if domain_sizes.len() != cam.n_attributes() {
            return Err(DetectionError::DimensionMismatch {
                stage: DetectionStage::Scoring,
                detail: format!(
                    "{} domain sizes for a matrix over {} attributes",
                    domain_sizes.len(),
                    cam.n_attributes()
                ),
            });
        }
        check_unit_interval("coappearance_threshold", tau)?;
        check_unit_interval("coappearance_score_threshold", lambda)?;

        Ok(Self {
            cam,
            domain_sizes,
            tau,
            lambda,
        })
    }

    /// Score one record.
    ///
    /// Pairs involving a missing value or an empty domain are skipped and
    /// add no points. With fewer than two attributes nothing is flagged.
    /// The record must hold one code per attribute.
    pub fn score_record(&self, record: &[Option<u32>]) -> Result<RecordScore> {
        let m = self.domain_sizes.len();
        if record.len() != m {
            return Err(DetectionError::DimensionMismatch {
                stage: DetectionStage::Scoring,
                detail: format!("record has {} codes for {} attributes", record.len(), m),
            });
        }
        let mut total_scores = vec![0u32; m];

        for j in 0..m {
            let Some(x) = record[j] else { continue };
            let aj = self.domain_sizes[j];
            if aj == 0 {
                continue;
            }
            let xf = f64::from(self.cam.appearances(j, x));

            for k in (j + 1)..m {
                let Some(y) = record[k] else { continue };
                let ak = self.domain_sizes[k];
                if ak == 0 {
                    continue;
                }
                let yf = f64::from(self.cam.appearances(k, y));

                let exy = xf / ak as f64 * self.tau;
                let eyx = yf / aj as f64 * self.tau;
                let cxy = f64::from(self.cam.get(j, x, k, y));

                let points = PairVerdict::classify(cxy, exy, eyx).points();
                total_scores[j] += points;
                total_scores[k] += points;
            }
        }

        let max_score = m.saturating_sub(1) * 2;
        let normalized: Vec<f64> = total_scores
            .iter()
            .map(|&s| {
                if max_score == 0 {
                    0.0
                } else {
                    f64::from(s) / max_score as f64
                }
            })
            .collect();
        let noisy = normalized.iter().map(|&n| n > self.lambda).collect();

        Ok(RecordScore {
            total_scores,
            normalized,
            noisy,
        })
    }

    /// Score every record and collect the noisy-cell matrix.
    pub fn identify(&self, dataset: &GeneralizedDataset) -> Result<NoisyCellMatrix> {
        self.identify_with_progress(dataset, |_| Ok(()))
    }

    /// Like [`identify`](Self::identify), calling `on_progress` with the
    /// number of records scored so far every [`PROGRESS_INTERVAL`] records.
    pub fn identify_with_progress<F>(
        &self,
        dataset: &GeneralizedDataset,
        mut on_progress: F,
    ) -> Result<NoisyCellMatrix>
    where
        F: FnMut(usize) -> Result<()>,
    {
        let dataset_sizes = dataset.domain_sizes();
        if dataset_sizes.as_slice() != self.domain_sizes {
            return Err(DetectionError::DimensionMismatch {
                stage: DetectionStage::Scoring,
                detail: format!(
                    "dataset domain sizes {:?} differ from scoring domain sizes {:?}",
                    dataset_sizes, self.domain_sizes
                ),
            });
        }

        let mut q = NoisyCellMatrix::new(dataset.n_records(), dataset.n_attributes());
        if dataset.n_attributes() < 2 {
            info!("Fewer than two attributes; no values can be scored");
            return Ok(q);
        }

        for (r, record) in dataset.records().enumerate() {
            let score = self.score_record(record)?;
            for (attribute, &noisy) in score.noisy.iter().enumerate() {
                if noisy {
                    q.flag(r, attribute);
                }
            }

            if (r + 1) % PROGRESS_INTERVAL == 0 {
                on_progress(r + 1)?;
            }
        }

        debug!(
            "Scored {} records: {} noisy cells in {} records",
            q.n_records(),
            q.noisy_cell_count(),
            q.noisy_record_count()
        );

        Ok(q)
    }
}
