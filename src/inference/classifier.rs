use anyhow::{bail, ensure};

use crate::data::model::ImageTensor;

use super::softmax;

/// Opaque image classifier.
///
/// `classify` maps a batch of `3×H×W` tensors to one row of raw class scores
/// (logits) per tensor, in input order. Implementations must score every
/// tensor independently of the rest of its batch (no batch-relative
/// normalisation), so that batching never changes a sample's result.
///
/// Calls take `&mut self`: a classifier is driven by one caller at a time.
pub trait Classifier {
    fn name(&self) -> &str;

    fn classify(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Class probabilities in `f64`, one row per tensor. Defaults to the
    /// softmax of [`Classifier::classify`].
    fn probabilities(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f64>>> {
        Ok(self.classify(batch)?.iter().map(|row| softmax(row)).collect())
    }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn classify(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f32>>> {
        (**self).classify(batch)
    }

    fn probabilities(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f64>>> {
        (**self).probabilities(batch)
    }
}

// ---------------------------------------------------------------------------
// Built-in stand-ins
// ---------------------------------------------------------------------------

/// Logistic score on mean tensor intensity: logits `[0, weight * mean + bias]`.
#[derive(Debug, Clone)]
pub struct IntensityLogistic {
    pub weight: f32,
    pub bias: f32,
}

impl Classifier for IntensityLogistic {
    fn name(&self) -> &str {
        "intensity-logistic"
    }

    fn classify(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f32>>> {
        batch
            .iter()
            .map(|t| {
                let z = self.weight * t.mean() + self.bias;
                ensure!(z.is_finite(), "non-finite logit for tensor of shape {:?}", t.shape());
                Ok(vec![0.0, z])
            })
            .collect()
    }
}

/// Emits the same logits for every input.
#[derive(Debug, Clone)]
pub struct ConstantClassifier {
    pub scores: Vec<f32>,
}

impl Classifier for ConstantClassifier {
    fn name(&self) -> &str {
        "constant"
    }

    fn classify(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(vec![self.scores.clone(); batch.len()])
    }
}

// ---------------------------------------------------------------------------
// Ensemble
// ---------------------------------------------------------------------------

/// Averages the softmax probabilities of its members.
///
/// [`Classifier::probabilities`] returns the `f64` means directly; `classify`
/// returns `ln(mean_p)` rounded to `f32` for callers that want raw scores.
pub struct EnsembleClassifier {
    members: Vec<Box<dyn Classifier>>,
}

impl EnsembleClassifier {
    pub fn new(members: Vec<Box<dyn Classifier>>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.name().to_string()).collect()
    }
}

impl Classifier for EnsembleClassifier {
    fn name(&self) -> &str {
        "ensemble"
    }

    fn classify(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(self
            .probabilities(batch)?
            .into_iter()
            .map(|row| row.into_iter().map(|p| p.ln() as f32).collect())
            .collect())
    }

    /// Mean of the members' probabilities, kept in `f64`.
    fn probabilities(&mut self, batch: &[ImageTensor]) -> anyhow::Result<Vec<Vec<f64>>> {
        if self.members.is_empty() {
            bail!("ensemble has no members");
        }
        let mut sums: Vec<Vec<f64>> = Vec::new();
        for member in &mut self.members {
            let rows = member.probabilities(batch)?;
            ensure!(
                rows.len() == batch.len(),
                "member '{}' returned {} rows for {} inputs",
                member.name(),
                rows.len(),
                batch.len()
            );
            if sums.is_empty() {
                sums = rows.iter().map(|r| vec![0.0; r.len()]).collect();
            }
            for (acc, row) in sums.iter_mut().zip(&rows) {
                ensure!(
                    acc.len() == row.len(),
                    "member '{}' returned {} classes, expected {}",
                    member.name(),
                    row.len(),
                    acc.len()
                );
                for (a, p) in acc.iter_mut().zip(row) {
                    *a += p;
                }
            }
        }
        let n = self.members.len() as f64;
        Ok(sums
            .into_iter()
            .map(|acc| acc.into_iter().map(|s| s / n).collect())
            .collect())
    }
}
