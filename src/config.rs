//! Run configuration.
//!
//! Loaded from an optional TOML file, then overridden by CLI flags, and
//! passed by reference to every component. Every key has a default.
//!
//! ```toml
//! [data]
//! root = "/datasets/"
//! test_manifest = "/datasets/MURA-v1.1/valid_image_paths.csv"
//! parts = ["XR_WRIST", "XR_HAND"]
//!
//! [inference]
//! batch_size = 16
//! num_workers = 8
//!
//! [model]
//! name = "intensity-logistic"
//! params = { weight = 4.0, bias = -0.5 }
//!
//! [evaluation]
//! threshold = 0.5
//!
//! [output]
//! result_file = "result.csv"
//! study_csv = "predictions.csv"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::filter::RegionFilter;
use crate::data::model::Region;
use crate::error::{MuraError, Result};

pub use crate::data::transform::{Normalization, TransformConfig};
pub use crate::eval::aggregate::EvaluationConfig;
pub use crate::inference::registry::ModelConfig;
pub use crate::inference::InferenceConfig;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    pub data: DataConfig,
    pub transform: TransformConfig,
    pub inference: InferenceConfig,
    pub model: ModelConfig,
    /// Members of the ensemble run.
    pub ensemble: Vec<ModelConfig>,
    pub evaluation: EvaluationConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Prefix concatenated (as a string) with every manifest line.
    pub root: String,
    pub test_manifest: PathBuf,
    /// Summarised by `index --train`; never scored.
    pub train_manifest: Option<PathBuf>,
    /// Regions to keep; empty keeps all.
    pub parts: Vec<Region>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: String::new(),
            test_manifest: PathBuf::from("valid_image_paths.csv"),
            train_manifest: None,
            parts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Per-image `image,probability` CSV.
    pub result_file: PathBuf,
    /// Per-study decisions CSV.
    pub study_csv: PathBuf,
    pub report_json: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            result_file: PathBuf::from("result.csv"),
            study_csv: PathBuf::from("predictions.csv"),
            report_json: None,
        }
    }
}

impl EvalConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MuraError::io(path, e))?;
        Self::parse(&content)
            .map_err(|e| MuraError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MuraError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.evaluation.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(MuraError::Config(format!(
                "evaluation.threshold must be within [0, 1], got {threshold}"
            )));
        }
        if self.inference.batch_size == 0 {
            return Err(MuraError::Config("inference.batch_size must be at least 1".into()));
        }
        if self.transform.image_size == 0 {
            return Err(MuraError::Config("transform.image_size must be at least 1".into()));
        }
        if !self.transform.max_rotation_deg.is_finite() {
            return Err(MuraError::Config("transform.max_rotation_deg must be finite".into()));
        }
        Ok(())
    }

    /// Extra checks for the ensemble run.
    pub fn validate_ensemble(&self) -> Result<()> {
        self.validate()?;
        if self.ensemble.is_empty() {
            return Err(MuraError::Config(
                "ensemble run needs at least one [[ensemble]] model".into(),
            ));
        }
        Ok(())
    }

    /// The training manifest; a config error when none is set.
    pub fn train_manifest(&self) -> Result<&Path> {
        self.data.train_manifest.as_deref().ok_or_else(|| {
            MuraError::Config("data.train_manifest is not set".into())
        })
    }

    pub fn region_filter(&self) -> RegionFilter {
        self.data.parts.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EvalConfig::default();
        assert_eq!(cfg.evaluation.threshold, 0.5);
        assert!(cfg.evaluation.reload_results);
        assert_eq!(cfg.transform.image_size, 320);
        assert_eq!(cfg.transform.normalization, Normalization::Imagenet);
        assert_eq!(cfg.inference.positive_class_index, 0);
        assert_eq!(cfg.output.result_file, PathBuf::from("result.csv"));
        assert_eq!(cfg.model.name, "intensity-logistic");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_parse_full_file() {
        let cfg = EvalConfig::parse(
            r#"
            [data]
            root = "/datasets/"
            test_manifest = "/datasets/MURA-v1.1/valid_image_paths.csv"
            parts = ["XR_WRIST", "XR_HAND"]

            [transform]
            image_size = 224
            normalization = "mura"

            [inference]
            batch_size = 16
            num_workers = 0
            seed = 7

            [model]
            name = "constant"
            params = { negative = 1.0, positive = -1.0 }

            [[ensemble]]
            name = "constant"

            [[ensemble]]
            name = "intensity-logistic"
            params = { weight = 2.0 }

            [evaluation]
            threshold = 0.4
            region_segment = 3
            reload_results = false

            [output]
            report_json = "report.json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.data.root, "/datasets/");
        assert_eq!(cfg.region_filter().len(), 2);
        assert!(cfg.region_filter().contains(&Region::Wrist));
        assert_eq!(cfg.transform.image_size, 224);
        assert_eq!(cfg.transform.max_rotation_deg, 30.0);
        assert_eq!(cfg.transform.normalization, Normalization::Mura);
        assert_eq!(cfg.inference.seed, Some(7));
        assert_eq!(cfg.model.param("positive", 0.0), -1.0);
        assert_eq!(cfg.ensemble.len(), 2);
        assert_eq!(cfg.ensemble[1].param("weight", 0.0), 2.0);
        assert_eq!(cfg.evaluation.region_segment, Some(3));
        assert!(!cfg.evaluation.reload_results);
        assert_eq!(cfg.output.report_json, Some(PathBuf::from("report.json")));
        assert_eq!(cfg.output.study_csv, PathBuf::from("predictions.csv"));
        assert!(cfg.validate_ensemble().is_ok());
    }

    #[test]
    fn test_train_manifest_lookup() {
        let cfg = EvalConfig::default();
        assert!(matches!(cfg.train_manifest(), Err(MuraError::Config(_))));

        let cfg = EvalConfig::parse(
            "[data]\ntrain_manifest = \"/datasets/MURA-v1.1/train_image_paths.csv\"\n",
        )
        .unwrap();
        assert_eq!(
            cfg.train_manifest().unwrap(),
            Path::new("/datasets/MURA-v1.1/train_image_paths.csv")
        );
    }

    #[test]
    fn test_unknown_section_is_rejected() {
        assert!(matches!(
            EvalConfig::parse("[visdom]\nenv = \"main\"\n"),
            Err(MuraError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_region_is_rejected() {
        assert!(EvalConfig::parse("[data]\nparts = [\"XR_KNEE\"]\n").is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = EvalConfig::default();
        cfg.evaluation.threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EvalConfig::default();
        cfg.inference.batch_size = 0;
        assert!(cfg.validate().is_err());

        let cfg = EvalConfig::default();
        assert!(cfg.validate_ensemble().is_err());
    }
}
