use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MuraError>;

/// Fatal pipeline errors.
///
/// Problems that only affect metric computation for a single study are not
/// errors; see [`crate::eval::aggregate::Exclusion`].
#[derive(Debug, Error)]
pub enum MuraError {
    /// A manifest line whose label segment is neither `positive` nor `negative`.
    #[error("malformed manifest entry {path}: label segment '{label}' is not 'positive' or 'negative'")]
    MalformedManifestEntry { path: String, label: String },

    #[error("sample index {index} out of range (dataset has {len} samples)")]
    IndexOutOfRange { index: usize, len: usize },

    /// The classifier failed on a batch. The run is aborted.
    #[error("classifier failed on batch {batch}")]
    InferenceFailure {
        batch: usize,
        #[source]
        source: anyhow::Error,
    },

    /// The classifier returned something other than one score row per image.
    #[error("classifier returned invalid output on batch {batch}: {reason}")]
    InvalidClassifierOutput { batch: usize, reason: String },

    #[error("unknown model name '{name}' (available: {available})")]
    UnknownModelName { name: String, available: String },

    #[error("failed to load image {path}")]
    ImageLoad {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A persisted probability that is not a finite value in `[0, 1]`.
    #[error("invalid probability {value} for image {image} in {path}")]
    InvalidProbability {
        path: PathBuf,
        image: String,
        value: f64,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl MuraError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MuraError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        MuraError::Csv {
            path: path.into(),
            source,
        }
    }
}
