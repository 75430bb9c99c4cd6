use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Label – binary abnormality label encoded in MURA paths
// ---------------------------------------------------------------------------

/// Study label as encoded by the `_positive` / `_negative` suffix of a study folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Negative,
    Positive,
}

impl Label {
    /// Parse the exact path token. Anything else is `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "positive" => Some(Label::Positive),
            "negative" => Some(Label::Negative),
            _ => None,
        }
    }

    /// Numeric class: positive → 1, negative → 0.
    pub fn as_class(self) -> u8 {
        match self {
            Label::Negative => 0,
            Label::Positive => 1,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Negative => write!(f, "negative"),
            Label::Positive => write!(f, "positive"),
        }
    }
}

// ---------------------------------------------------------------------------
// Region – anatomical body part of a study
// ---------------------------------------------------------------------------

/// The seven MURA body-part categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Region {
    #[serde(rename = "XR_ELBOW")]
    Elbow,
    #[serde(rename = "XR_FINGER")]
    Finger,
    #[serde(rename = "XR_FOREARM")]
    Forearm,
    #[serde(rename = "XR_HAND")]
    Hand,
    #[serde(rename = "XR_HUMERUS")]
    Humerus,
    #[serde(rename = "XR_SHOULDER")]
    Shoulder,
    #[serde(rename = "XR_WRIST")]
    Wrist,
}

impl Region {
    pub const ALL: [Region; 7] = [
        Region::Elbow,
        Region::Finger,
        Region::Forearm,
        Region::Hand,
        Region::Humerus,
        Region::Shoulder,
        Region::Wrist,
    ];

    /// The folder token used in dataset paths, e.g. `XR_WRIST`.
    pub fn token(self) -> &'static str {
        match self {
            Region::Elbow => "XR_ELBOW",
            Region::Finger => "XR_FINGER",
            Region::Forearm => "XR_FOREARM",
            Region::Hand => "XR_HAND",
            Region::Humerus => "XR_HUMERUS",
            Region::Shoulder => "XR_SHOULDER",
            Region::Wrist => "XR_WRIST",
        }
    }

    /// Match an exact path segment.
    pub fn from_token(token: &str) -> Option<Self> {
        Region::ALL.into_iter().find(|r| r.token() == token)
    }

    /// First path segment that names a region.
    pub fn find_in_path(path: &str) -> Option<Self> {
        path.split('/').find_map(Region::from_token)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Region {
    type Err = String;

    /// Accepts `XR_WRIST` as well as the bare, case-insensitive `wrist`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let token = if upper.starts_with("XR_") {
            upper
        } else {
            format!("XR_{upper}")
        };
        Region::from_token(&token).ok_or_else(|| format!("unknown region '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Samples and tensors
// ---------------------------------------------------------------------------

/// Where a sample lives and what its label is; produced by the manifest indexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleAddress {
    /// `root + relative_path`, exactly as concatenated.
    pub path: String,
    pub label: Label,
}

/// Dense channel-major `C×H×W` float tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl ImageTensor {
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        ImageTensor {
            channels,
            height,
            width,
            data: vec![0.0; channels * height * width],
        }
    }

    /// Shape as `[C, H, W]`.
    pub fn shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }

    /// One channel plane, row-major.
    pub fn channel(&self, c: usize) -> &[f32] {
        let plane = self.height * self.width;
        &self.data[c * plane..(c + 1) * plane]
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }
}

/// One materialised sample: transformed tensor, label, source path.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: ImageTensor,
    pub label: Label,
    pub path: String,
}

// ---------------------------------------------------------------------------
// Inference and aggregation records
// ---------------------------------------------------------------------------

/// Per-image classifier output. Serialises to the `image,probability` CSV row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    #[serde(rename = "image")]
    pub image_path: String,
    pub probability: f64,
}

/// Per-study decision after averaging and thresholding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudyDecision {
    pub study_path: String,
    pub mean_probability: f64,
    /// `1` when `mean_probability < threshold`, else `0`.
    pub binary_call: u8,
    pub image_count: usize,
}
