//! Batched inference over a [`MuraDataset`].
//!
//! [`run`] returns a lazy iterator of per-image [`InferenceResult`]s. Samples
//! of one batch may be loaded in parallel on a rayon pool; the classifier
//! itself is invoked strictly one batch at a time, in dataset order.

pub mod classifier;
pub mod registry;

use std::collections::VecDeque;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::dataset::MuraDataset;
use crate::data::model::{InferenceResult, Sample};
use crate::error::{MuraError, Result};
use classifier::Classifier;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub batch_size: usize,
    /// Sample-loading threads. `0` loads on the calling thread.
    pub num_workers: usize,
    /// Seeds per-sample augmentation. Irrelevant for the eval transform.
    pub seed: Option<u64>,
    /// Softmax column reported as the image's probability.
    pub positive_class_index: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            num_workers: 4,
            seed: None,
            positive_class_index: 0,
        }
    }
}

/// Numerically stable softmax, computed in `f64`.
pub fn softmax(scores: &[f32]) -> Vec<f64> {
    let max = scores
        .iter()
        .map(|&s| s as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Start an inference pass. Nothing is loaded until the iterator is polled.
pub fn run<'a, C: Classifier + ?Sized>(
    dataset: &'a MuraDataset,
    classifier: &'a mut C,
    cfg: &InferenceConfig,
) -> Result<InferenceRunner<'a, C>> {
    if cfg.batch_size == 0 {
        return Err(MuraError::Config("batch_size must be at least 1".into()));
    }
    let pool = if cfg.num_workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.num_workers)
            .build()
            .map_err(|e| MuraError::Config(format!("building loader pool: {e}")))?;
        Some(pool)
    } else {
        None
    };
    Ok(InferenceRunner {
        dataset,
        classifier,
        batch_size: cfg.batch_size,
        positive_class_index: cfg.positive_class_index,
        pool,
        next_index: 0,
        batch: 0,
        pending: VecDeque::new(),
        finished: false,
    })
}

/// Lazy, single-pass sequence of inference results in dataset order.
///
/// The first error (sample load or classifier failure) is yielded once and
/// ends the sequence; no partial batch results are emitted for it.
pub struct InferenceRunner<'a, C: Classifier + ?Sized> {
    dataset: &'a MuraDataset,
    classifier: &'a mut C,
    batch_size: usize,
    positive_class_index: usize,
    pool: Option<rayon::ThreadPool>,
    next_index: usize,
    batch: usize,
    pending: VecDeque<InferenceResult>,
    finished: bool,
}

impl<'a, C: Classifier + ?Sized> InferenceRunner<'a, C> {
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Drain the whole pass, stopping at the first error.
    pub fn collect_results(self) -> Result<Vec<InferenceResult>> {
        self.collect()
    }

    fn load_batch(&self, start: usize, end: usize) -> Result<Vec<Sample>> {
        let dataset = self.dataset;
        match &self.pool {
            Some(pool) => pool.install(|| {
                (start..end)
                    .into_par_iter()
                    .map(|i| dataset.get(i))
                    .collect::<Result<Vec<_>>>()
            }),
            None => (start..end).map(|i| dataset.get(i)).collect(),
        }
    }

    /// Score the next batch into `pending`. `Ok(false)` once exhausted.
    fn advance(&mut self) -> Result<bool> {
        let start = self.next_index;
        if start >= self.dataset.len() {
            return Ok(false);
        }
        let end = (start + self.batch_size).min(self.dataset.len());
        let batch = self.batch;

        let samples = self.load_batch(start, end)?;
        let (paths, tensors): (Vec<String>, Vec<_>) =
            samples.into_iter().map(|s| (s.path, s.image)).unzip();

        let rows = self
            .classifier
            .probabilities(&tensors)
            .map_err(|source| MuraError::InferenceFailure { batch, source })?;
        if rows.len() != tensors.len() {
            return Err(MuraError::InvalidClassifierOutput {
                batch,
                reason: format!("{} score rows for {} images", rows.len(), tensors.len()),
            });
        }

        for (image_path, row) in paths.into_iter().zip(rows) {
            let probability = *row.get(self.positive_class_index).ok_or_else(|| {
                MuraError::InvalidClassifierOutput {
                    batch,
                    reason: format!(
                        "{} classes, positive class index is {}",
                        row.len(),
                        self.positive_class_index
                    ),
                }
            })?;
            if !probability.is_finite() {
                return Err(MuraError::InvalidClassifierOutput {
                    batch,
                    reason: format!("non-finite probability for {image_path}"),
                });
            }
            self.pending.push_back(InferenceResult {
                image_path,
                probability,
            });
        }

        debug!(
            "batch {}/{} ({} images) scored by {}",
            batch + 1,
            self.num_batches(),
            end - start,
            self.classifier.name()
        );
        self.next_index = end;
        self.batch += 1;
        Ok(true)
    }
}

impl<'a, C: Classifier + ?Sized> Iterator for InferenceRunner<'a, C> {
    type Item = Result<InferenceResult>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(result) = self.pending.pop_front() {
                return Some(Ok(result));
            }
            if self.finished {
                return None;
            }
            match self.advance() {
                Ok(true) => continue,
                Ok(false) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    self.pending.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
