//! Co-appearance matrix (CAM).
//!
//! For every pair of distinct attributes `(i, j)` and every pair of codes
//! `(a, b)` the matrix holds the number of records in which attribute `i`
//! takes code `a` while attribute `j` takes code `b`. It also keeps the
//! number of records in which each `(attribute, code)` appears at all.
//!
//! Only the `i < j` orientation is stored; lookups are symmetric. Records
//! with a missing value contribute nothing for that attribute.
//!
//! Storage is dense (one flat block per attribute pair) while the total
//! number of cells stays under the configured limit, and a sparse map of
//! observed pairs otherwise.

use crate::error::{DetectionError, Result};
use crate::generalizer::GeneralizedDataset;
use crate::pipeline::DetectionStage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Number of records between two progress callbacks.
pub const PROGRESS_INTERVAL: usize = 4096;

/// Storage layout chosen for the pair counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CamStorageKind {
    Dense,
    Sparse,
}

/// Number of pair cells a dense matrix needs: the sum of `d_i * d_j` over `i < j`.
pub fn estimated_cells(domain_sizes: &[usize]) -> usize {
    let mut cells: usize = 0;
    for (i, &di) in domain_sizes.iter().enumerate() {
        for &dj in &domain_sizes[i + 1..] {
            cells = cells.saturating_add(di.saturating_mul(dj));
        }
    }
    cells
}

/// Approximate memory footprint of a dense matrix in bytes.
pub fn estimated_dense_bytes(domain_sizes: &[usize]) -> usize {
    estimated_cells(domain_sizes).saturating_mul(std::mem::size_of::<u32>())
}

#[derive(Debug, Clone)]
enum PairCounts {
    Dense {
        /// Start of the `(i, j)` block at `i * m + j`, for `i < j`.
        offsets: Vec<usize>,
        counts: Vec<u32>,
    },
    Sparse(HashMap<(usize, u32, usize, u32), u32>),
}

/// Pairwise co-appearance counts of a generalized dataset.
#[derive(Debug, Clone)]
pub struct CoappearanceMatrix {
    domain_sizes: Vec<usize>,
    appearances: Vec<Vec<u32>>,
    pairs: PairCounts,
    cells: usize,
}

impl CoappearanceMatrix {
    /// Count co-appearances over all records of `dataset`.
    pub fn build(dataset: &GeneralizedDataset, dense_cell_limit: usize) -> Result<Self> {
        Self::build_with_progress(dataset, dense_cell_limit, |_| Ok(()))
    }

    /// Like [`build`](Self::build), calling `on_progress` with the number of
    /// records counted so far every [`PROGRESS_INTERVAL`] records. An error
    /// returned by the callback aborts the build.
    pub fn build_with_progress<F>(
        dataset: &GeneralizedDataset,
        dense_cell_limit: usize,
        mut on_progress: F,
    ) -> Result<Self>
    where
        F: FnMut(usize) -> Result<()>,
    {
        let domain_sizes = dataset.domain_sizes();
        let m = domain_sizes.len();
        let cells = estimated_cells(&domain_sizes);

        let mut pairs = if cells <= dense_cell_limit {
            let mut offsets = vec![0usize; m * m];
            let mut next = 0;
            for i in 0..m {
                for j in (i + 1)..m {
                    offsets[i * m + j] = next;
                    next += domain_sizes[i] * domain_sizes[j];
                }
            }
            PairCounts::Dense {
                offsets,
                counts: vec![0; cells],
            }
        } else {
            PairCounts::Sparse(HashMap::new())
        };

        info!(
            "Building co-appearance matrix: {} attributes, {} cells ({} storage, ~{} KB dense)",
            m,
            cells,
            match pairs {
                PairCounts::Dense { .. } => "dense",
                PairCounts::Sparse(_) => "sparse",
            },
            estimated_dense_bytes(&domain_sizes) / 1024
        );

        let mut appearances: Vec<Vec<u32>> = domain_sizes.iter().map(|&d| vec![0; d]).collect();

        for (r, record) in dataset.records().enumerate() {
            for (i, code) in record.iter().enumerate() {
                if let Some(a) = *code {
                    if a as usize >= domain_sizes[i] {
                        return Err(DetectionError::DimensionMismatch {
                            stage: DetectionStage::MatrixConstruction,
                            detail: format!(
                                "record {} has code {} for '{}', outside its domain of size {}",
                                r,
                                a,
                                dataset.domains()[i].name,
                                domain_sizes[i]
                            ),
                        });
                    }
                    appearances[i][a as usize] += 1;
                }
            }

            for i in 0..m {
                let Some(a) = record[i] else { continue };
                for j in (i + 1)..m {
                    let Some(b) = record[j] else { continue };
                    match &mut pairs {
                        PairCounts::Dense { offsets, counts } => {
                            let idx = offsets[i * m + j] + a as usize * domain_sizes[j] + b as usize;
                            counts[idx] += 1;
                        }
                        PairCounts::Sparse(map) => {
                            *map.entry((i, a, j, b)).or_insert(0) += 1;
                        }
                    }
                }
            }

            if (r + 1) % PROGRESS_INTERVAL == 0 {
                on_progress(r + 1)?;
            }
        }

        if let PairCounts::Sparse(map) = &pairs {
            debug!("Sparse co-appearance matrix holds {} observed pairs", map.len());
        }

        Ok(Self {
            domain_sizes,
            appearances,
            pairs,
            cells,
        })
    }

    pub fn n_attributes(&self) -> usize {
        self.domain_sizes.len()
    }

    pub fn domain_sizes(&self) -> &[usize] {
        &self.domain_sizes
    }

    /// Number of records in which `attribute` takes `code`.
    pub fn appearances(&self, attribute: usize, code: u32) -> u32 {
        self.appearances
            .get(attribute)
            .and_then(|counts| counts.get(code as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Number of records in which attribute `i` has code `a` and attribute
    /// `j` has code `b`. Symmetric in its two `(attribute, code)` arguments.
    pub fn get(&self, i: usize, a: u32, j: usize, b: u32) -> u32 {
        if i == j {
            return if a == b { self.appearances(i, a) } else { 0 };
        }
        let (i, a, j, b) = if i < j { (i, a, j, b) } else { (j, b, i, a) };
        let m = self.n_attributes();
        if j >= m || a as usize >= self.domain_sizes[i] || b as usize >= self.domain_sizes[j] {
            return 0;
        }

        match &self.pairs {
            PairCounts::Dense { offsets, counts } => {
                counts[offsets[i * m + j] + a as usize * self.domain_sizes[j] + b as usize]
            }
            PairCounts::Sparse(map) => map.get(&(i, a, j, b)).copied().unwrap_or(0),
        }
    }

    /// Number of addressable pair cells (the dense size, whatever the layout).
    pub fn cell_count(&self) -> usize {
        self.cells
    }

    pub fn storage_kind(&self) -> CamStorageKind {
        match self.pairs {
            PairCounts::Dense { .. } => CamStorageKind::Dense,
            PairCounts::Sparse(_) => CamStorageKind::Sparse,
        }
    }
}
