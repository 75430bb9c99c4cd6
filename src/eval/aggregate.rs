use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use super::metrics::{AgreementMetrics, ConfusionMatrix};
use crate::data::model::{InferenceResult, Label, Region, StudyDecision};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Decision threshold on the mean study probability.
    pub threshold: f64,
    /// Index of the `XR_*` segment in the `/`-split study path.
    /// `None` scans all segments for the first region token.
    pub region_segment: Option<usize>,
    /// Persist per-image results, then aggregate from the reloaded file.
    /// `false` aggregates the in-memory results directly.
    pub reload_results: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            region_segment: None,
            reload_results: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Path conventions
// ---------------------------------------------------------------------------

/// Study key of an image: its directory, without the trailing `/`.
///
/// `/data/valid/XR_HAND/patient1/study1_positive/image1.png`
/// → `/data/valid/XR_HAND/patient1/study1_positive`.
/// A path without any `/` belongs to the study `""`.
pub fn study_key(image_path: &str) -> &str {
    image_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Binary study call.
///
/// NOTE the polarity: the call is `1` when the mean probability is **below**
/// the threshold and `0` otherwise (a mean exactly at the threshold is `0`).
/// The reported probability is softmax column 0 by default, so "low" means
/// "unlikely to be column 0". Do not flip this comparison without treating
/// it as a behaviour change of every downstream report.
pub fn binary_call(mean_probability: f64, threshold: f64) -> u8 {
    if mean_probability < threshold {
        1
    } else {
        0
    }
}

/// Token after the last `_` of the study folder name, e.g. `positive`.
fn truth_token(study_path: &str) -> &str {
    let folder = study_path.rsplit('/').next().unwrap_or(study_path);
    folder.rsplit_once('_').map(|(_, t)| t).unwrap_or("")
}

pub fn ground_truth(study_path: &str) -> Option<Label> {
    Label::from_token(truth_token(study_path))
}

/// Region of a study path.
///
/// `Some(i)` reads the fixed `/`-separated segment `i`, which is how the MURA
/// layout is addressed for one known data root depth (segment 6 for a root
/// like `/data/mura/v1/`). `None` takes the first `XR_*` segment anywhere in the
/// path instead, so a different root depth does not misplace every study.
pub fn region_of(study_path: &str, segment: Option<usize>) -> Option<Region> {
    match segment {
        Some(i) => study_path.split('/').nth(i).and_then(Region::from_token),
        None => Region::find_in_path(study_path),
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Why a study was left out of some metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// No `XR_*` token where expected: left out of per-region metrics only.
    UnrecognizedRegion,
    /// Folder suffix is not `positive`/`negative`: left out of all metrics.
    UnrecognizedGroundTruth { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub study_path: String,
    pub reason: ExclusionReason,
}

/// Study decisions plus agreement with path-derived ground truth.
#[derive(Debug, Clone, Serialize)]
pub struct Aggregation {
    pub threshold: f64,
    pub decisions: BTreeMap<String, StudyDecision>,
    /// Only regions with at least one scored study appear.
    pub regions: BTreeMap<Region, AgreementMetrics>,
    /// All studies with a recognised ground truth, any region.
    pub overall: Option<AgreementMetrics>,
    pub exclusions: Vec<Exclusion>,
}

/// Group probabilities by study key in one pass.
pub fn group_by_study(results: &[InferenceResult]) -> BTreeMap<String, Vec<f64>> {
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for r in results {
        groups
            .entry(study_key(&r.image_path).to_string())
            .or_default()
            .push(r.probability);
    }
    groups
}

/// Average per study, threshold, and score against ground truth per region.
///
/// Steps:
/// 1. group image probabilities by study key
/// 2. unweighted mean per study
/// 3. [`binary_call`] against `cfg.threshold`
/// 4. region from the study path; unknown → excluded from per-region metrics
/// 5. truth from the study folder suffix; unknown → excluded from all metrics
/// 6–7. Cohen's kappa and accuracy per region (and overall)
///
/// Exclusions are logged and returned; they never fail the aggregation.
pub fn aggregate(results: &[InferenceResult], cfg: &EvaluationConfig) -> Aggregation {
    let mut decisions = BTreeMap::new();
    let mut per_region: BTreeMap<Region, ConfusionMatrix> = BTreeMap::new();
    let mut overall = ConfusionMatrix::new();
    let mut exclusions = Vec::new();

    for (study_path, probabilities) in group_by_study(results) {
        // groups are built from results, never empty
        let mean_probability = probabilities.iter().sum::<f64>() / probabilities.len() as f64;
        let call = binary_call(mean_probability, cfg.threshold);

        let region = region_of(&study_path, cfg.region_segment);
        if region.is_none() {
            warn!("{study_path}: no recognised region, excluded from per-region metrics");
            exclusions.push(Exclusion {
                study_path: study_path.clone(),
                reason: ExclusionReason::UnrecognizedRegion,
            });
        }

        match ground_truth(&study_path) {
            Some(truth) => {
                let truth = truth.as_class();
                overall.record(truth, call);
                if let Some(region) = region {
                    per_region.entry(region).or_default().record(truth, call);
                }
            }
            None => {
                let token = truth_token(&study_path).to_string();
                warn!("{study_path}: ground truth '{token}' is not positive/negative, excluded from metrics");
                exclusions.push(Exclusion {
                    study_path: study_path.clone(),
                    reason: ExclusionReason::UnrecognizedGroundTruth { token },
                });
            }
        }

        decisions.insert(
            study_path.clone(),
            StudyDecision {
                study_path,
                mean_probability,
                binary_call: call,
                image_count: probabilities.len(),
            },
        );
    }

    let regions = per_region
        .into_iter()
        .filter_map(|(region, cm)| AgreementMetrics::from_confusion(cm).map(|m| (region, m)))
        .collect();

    Aggregation {
        threshold: cfg.threshold,
        decisions,
        regions,
        overall: AgreementMetrics::from_confusion(overall),
        exclusions,
    }
}
