//! End-to-end runs over a small on-disk MURA-shaped tree.
//!
//! Positive studies are white images and negative studies black ones, so the
//! default `intensity-logistic` model (weight 1, bias 0, column 0 reported)
//! gives ~0.08 for positives and ~0.88 for negatives. With the 0.5 threshold
//! and `call = 1 when mean < threshold`, every study is called correctly.

use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use tempfile::TempDir;

use mura_eval::config::{EvalConfig, ModelConfig};
use mura_eval::data::model::Region;
use mura_eval::eval::aggregate::ExclusionReason;
use mura_eval::inference::registry::ModelRegistry;
use mura_eval::pipeline;
use mura_eval::MuraError;

const STUDIES: &[(&str, &str, usize)] = &[
    ("XR_HAND", "patient00001/study1_positive", 2),
    ("XR_HAND", "patient00002/study1_negative", 1),
    ("XR_WRIST", "patient00003/study1_positive", 1),
    ("XR_WRIST", "patient00004/study2_negative", 2),
];

struct Fixture {
    dir: TempDir,
    cfg: EvalConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut lines = Vec::new();
        for (region, study, images) in STUDIES {
            let relative = format!("MURA-v1.1/valid/{region}/{study}");
            let study_dir = dir.path().join(&relative);
            fs::create_dir_all(&study_dir).unwrap();
            let value = if study.ends_with("positive") { 255 } else { 0 };
            for i in 1..=*images {
                GrayImage::from_pixel(12, 8, Luma([value]))
                    .save(study_dir.join(format!("image{i}.png")))
                    .unwrap();
                lines.push(format!("{relative}/image{i}.png"));
            }
        }
        let manifest = dir.path().join("valid_image_paths.csv");
        fs::write(&manifest, lines.join("\n") + "\n").unwrap();

        let mut cfg = EvalConfig::default();
        cfg.data.root = format!("{}/", dir.path().display());
        cfg.data.test_manifest = manifest;
        cfg.transform.image_size = 8;
        cfg.inference.batch_size = 2;
        cfg.inference.num_workers = 2;
        cfg.output.result_file = dir.path().join("result.csv");
        cfg.output.study_csv = dir.path().join("predictions.csv");
        cfg.output.report_json = Some(dir.path().join("report.json"));
        Fixture { dir, cfg }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

#[test]
fn test_single_model_run_with_reload() {
    let fx = Fixture::new();
    let report = pipeline::run_test(&fx.cfg, &ModelRegistry::with_builtins()).unwrap();

    assert_eq!(report.source, "intensity-logistic");
    assert_eq!(report.images, 6);
    assert_eq!(report.studies(), 4);
    assert!(report.aggregation.exclusions.is_empty());

    for region in [Region::Hand, Region::Wrist] {
        let m = &report.aggregation.regions[&region];
        assert_eq!(m.studies, 2);
        assert_eq!(m.kappa, Some(1.0));
        assert_eq!(m.accuracy, 1.0);
    }
    let overall = report.aggregation.overall.unwrap();
    assert_eq!(overall.confusion.tp, 2);
    assert_eq!(overall.confusion.tn, 2);

    let results = read(&fx.cfg.output.result_file);
    let mut rows = results.lines();
    assert_eq!(rows.next(), Some("image,probability"));
    let first: Vec<&str> = rows.next().unwrap().split(',').collect();
    assert!(first[0].ends_with("XR_HAND/patient00001/study1_positive/image1.png"));
    let p: f64 = first[1].parse().unwrap();
    assert!(p < 0.2, "white image scored {p}");
    assert_eq!(results.lines().count(), 7);

    assert_eq!(
        read(&fx.cfg.output.study_csv),
        "MURA-v1.1/valid/XR_HAND/patient00001/study1_positive/,1\n\
         MURA-v1.1/valid/XR_HAND/patient00002/study1_negative/,0\n\
         MURA-v1.1/valid/XR_WRIST/patient00003/study1_positive/,1\n\
         MURA-v1.1/valid/XR_WRIST/patient00004/study2_negative/,0\n"
    );

    let json: serde_json::Value = serde_json::from_str(&read(&fx.path("report.json"))).unwrap();
    assert_eq!(json["images"], 6);
    assert_eq!(json["regions"]["XR_WRIST"]["kappa"], 1.0);
}

#[test]
fn test_in_memory_path_matches_reload_path() {
    let fx = Fixture::new();
    let registry = ModelRegistry::with_builtins();
    let reloaded = pipeline::run_test(&fx.cfg, &registry).unwrap();

    let mut cfg = fx.cfg.clone();
    cfg.evaluation.reload_results = false;
    cfg.inference.num_workers = 0;
    cfg.inference.batch_size = 5;
    let in_memory = pipeline::run_test(&cfg, &registry).unwrap();

    assert_eq!(reloaded.aggregation.regions, in_memory.aggregation.regions);
    for (key, a) in &reloaded.aggregation.decisions {
        let b = &in_memory.aggregation.decisions[key];
        assert_eq!(a.binary_call, b.binary_call);
        assert_eq!(a.image_count, b.image_count);
        assert!((a.mean_probability - b.mean_probability).abs() < 1e-12);
    }
}

#[test]
fn test_threshold_flips_every_call() {
    let mut fx = Fixture::new();
    fx.cfg.evaluation.threshold = 1.0;
    let report = pipeline::run_test(&fx.cfg, &ModelRegistry::with_builtins()).unwrap();
    assert!(report
        .aggregation
        .decisions
        .values()
        .all(|d| d.binary_call == 1));
    // every call is 1 and truth is mixed: p_e < 1, kappa = 0
    assert_eq!(report.aggregation.regions[&Region::Hand].kappa, Some(0.0));
    assert_eq!(report.aggregation.regions[&Region::Hand].accuracy, 0.5);
}

#[test]
fn test_ensemble_of_identical_members_matches_single_model() {
    let mut fx = Fixture::new();
    let registry = ModelRegistry::with_builtins();
    let single = pipeline::run_test(&fx.cfg, &registry).unwrap();

    fx.cfg.ensemble = vec![ModelConfig::default(), ModelConfig::default()];
    let ensemble = pipeline::run_ensemble(&fx.cfg, &registry).unwrap();

    assert_eq!(ensemble.source, "ensemble");
    for (key, a) in &single.aggregation.decisions {
        let b = &ensemble.aggregation.decisions[key];
        assert!((a.mean_probability - b.mean_probability).abs() < 1e-12);
        assert_eq!(a.binary_call, b.binary_call);
    }
}

#[test]
fn test_ensemble_without_members_is_a_config_error() {
    let fx = Fixture::new();
    let err = pipeline::run_ensemble(&fx.cfg, &ModelRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, MuraError::Config(_)));
}

#[test]
fn test_region_filter_restricts_scored_images() {
    let mut fx = Fixture::new();
    fx.cfg.data.parts = vec![Region::Wrist];
    let report = pipeline::run_test(&fx.cfg, &ModelRegistry::with_builtins()).unwrap();
    assert_eq!(report.images, 3);
    assert_eq!(report.aggregation.regions.len(), 1);
    assert!(report.aggregation.regions.contains_key(&Region::Wrist));
}

#[test]
fn test_unknown_model_fails_before_scoring() {
    let mut fx = Fixture::new();
    fx.cfg.model = ModelConfig::named("DenseNet169");
    let err = pipeline::run_test(&fx.cfg, &ModelRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, MuraError::UnknownModelName { .. }));
    assert!(!fx.cfg.output.result_file.exists());
}

#[test]
fn test_missing_image_aborts_the_run() {
    let fx = Fixture::new();
    fs::remove_file(
        fx.path("MURA-v1.1/valid/XR_WRIST/patient00003/study1_positive/image1.png"),
    )
    .unwrap();
    let err = pipeline::run_test(&fx.cfg, &ModelRegistry::with_builtins()).unwrap_err();
    assert!(matches!(err, MuraError::ImageLoad { .. }));
    assert!(err.to_string().contains("patient00003"));
}

#[test]
fn test_aggregate_only_reports_exclusions() {
    let fx = Fixture::new();
    let results = fx.path("external.csv");
    fs::write(
        &results,
        "image,probability\n\
         /d/XR_ELBOW/p1/study1_positive/a.png,0.9\n\
         /d/XR_ELBOW/p1/study1_positive/b.png,0.7\n\
         /d/XR_ELBOW/p2/study1_negative/a.png,0.2\n\
         /d/p3/study1_negative/a.png,0.9\n\
         /d/XR_HAND/p4/study1_unknown/a.png,0.1\n",
    )
    .unwrap();

    let report = pipeline::run_aggregate(&fx.cfg, &results).unwrap();
    assert_eq!(report.images, 5);
    assert_eq!(report.studies(), 4);

    let elbow = report.aggregation.regions[&Region::Elbow];
    // positive study mean 0.8 → call 0; negative study 0.2 → call 1
    assert_eq!(elbow.confusion.fn_, 1);
    assert_eq!(elbow.confusion.fp, 1);
    assert_eq!(elbow.accuracy, 0.0);

    let reasons: Vec<&ExclusionReason> = report
        .aggregation
        .exclusions
        .iter()
        .map(|e| &e.reason)
        .collect();
    assert_eq!(reasons.len(), 2);
    assert!(reasons.contains(&&ExclusionReason::UnrecognizedRegion));
    assert!(reasons.contains(&&ExclusionReason::UnrecognizedGroundTruth {
        token: "unknown".into()
    }));
    // regionless study still counts overall
    assert_eq!(report.aggregation.overall.unwrap().studies, 3);
    assert_eq!(read(&fx.cfg.output.study_csv).lines().count(), 4);
}

#[test]
fn test_index_summary() {
    let fx = Fixture::new();
    let summary = pipeline::summarize_manifest(&fx.cfg, &fx.cfg.data.test_manifest).unwrap();
    assert_eq!(summary.total.images, 6);
    assert_eq!(summary.total.studies, 4);
    assert_eq!(summary.total.positive_studies, 2);
    assert_eq!(summary.regions["XR_HAND"].images, 3);
}

#[test]
fn test_aggregate_rejects_invalid_probabilities() {
    let fx = Fixture::new();
    let results = fx.path("external.csv");
    fs::write(
        &results,
        "image,probability\n\
         /d/XR_HAND/p1/study1_positive/a.png,0.3\n\
         /d/XR_HAND/p1/study1_positive/b.png,NaN\n",
    )
    .unwrap();
    let err = pipeline::run_aggregate(&fx.cfg, &results).unwrap_err();
    assert!(matches!(err, MuraError::InvalidProbability { .. }));
    assert!(err.to_string().contains("/d/XR_HAND/p1/study1_positive/b.png"));
    assert!(!fx.cfg.output.study_csv.exists());
}

#[test]
fn test_train_manifest_summary() {
    let mut fx = Fixture::new();
    fx.cfg.data.train_manifest = Some(fx.cfg.data.test_manifest.clone());
    let manifest = fx.cfg.train_manifest().unwrap();
    let summary = pipeline::summarize_manifest(&fx.cfg, manifest).unwrap();
    assert_eq!(summary.total.images, 6);
}
