//! Study-level evaluation of musculoskeletal radiograph classifiers.
//!
//! Images listed in a manifest are scored by a [`inference::classifier::Classifier`],
//! written to a per-image CSV, averaged per study, thresholded into a binary
//! call and compared against the label encoded in the study directory name.
//! Agreement is reported per anatomical region as Cohen's kappa and accuracy.

pub mod config;
pub mod data;
pub mod error;
pub mod eval;
pub mod inference;
pub mod pipeline;
pub mod report;
pub mod sink;

pub use error::{MuraError, Result};
