//! End-to-end runs wired from an [`EvalConfig`].
//!
//! ```text
//!  index manifest → MuraDataset (eval transform) → inference::run
//!        → sink::write_results ──(reload_results)──► sink::read_results
//!        → aggregate → sink::write_study_decisions → EvaluationReport
//! ```

use std::path::Path;

use log::info;

use crate::config::EvalConfig;
use crate::data::dataset::MuraDataset;
use crate::data::loader;
use crate::data::model::InferenceResult;
use crate::data::transform::Transform;
use crate::error::Result;
use crate::eval::aggregate::aggregate;
use crate::inference;
use crate::inference::classifier::Classifier;
use crate::inference::registry::ModelRegistry;
use crate::report::{DatasetSummary, EvaluationReport};
use crate::sink;

/// Index a manifest and count images and studies, without loading images.
pub fn summarize_manifest(cfg: &EvalConfig, manifest: &Path) -> Result<DatasetSummary> {
    let addresses = loader::index(&cfg.data.root, manifest)?;
    Ok(DatasetSummary::from_addresses(&addresses))
}

/// Evaluate the single model named in `cfg.model`.
pub fn run_test(cfg: &EvalConfig, registry: &ModelRegistry) -> Result<EvaluationReport> {
    cfg.validate()?;
    let mut classifier = registry.build(&cfg.model)?;
    evaluate(cfg, classifier.as_mut())
}

/// Evaluate the probability-averaged ensemble of `cfg.ensemble`.
pub fn run_ensemble(cfg: &EvalConfig, registry: &ModelRegistry) -> Result<EvaluationReport> {
    cfg.validate_ensemble()?;
    let mut ensemble = registry.build_ensemble(&cfg.ensemble)?;
    info!("Ensemble members: {}", ensemble.member_names().join(", "));
    evaluate(cfg, &mut ensemble)
}

/// Aggregate an existing per-image results file without running inference.
pub fn run_aggregate(cfg: &EvalConfig, results_file: &Path) -> Result<EvaluationReport> {
    cfg.validate()?;
    let results = sink::read_results(results_file)?;
    info!(
        "Loaded {} image results from {}",
        results.len(),
        results_file.display()
    );
    finish(cfg, &results_file.display().to_string(), &results)
}

/// Score the test split with `classifier` and evaluate the results.
///
/// Results are always written to `output.result_file`. With
/// `evaluation.reload_results` the aggregation reads them back from that file;
/// otherwise it uses the in-memory results.
pub fn evaluate<C: Classifier + ?Sized>(
    cfg: &EvalConfig,
    classifier: &mut C,
) -> Result<EvaluationReport> {
    let dataset = MuraDataset::from_manifest(
        &cfg.data.root,
        &cfg.data.test_manifest,
        &cfg.region_filter(),
        Transform::eval(&cfg.transform),
        cfg.inference.seed,
    )?;
    info!(
        "Scoring {} images with '{}' (batch size {}, {} loader threads)",
        dataset.len(),
        classifier.name(),
        cfg.inference.batch_size,
        cfg.inference.num_workers
    );

    let results = inference::run(&dataset, classifier, &cfg.inference)?.collect_results()?;
    sink::write_results(&results, &cfg.output.result_file)?;

    let scored = if cfg.evaluation.reload_results {
        sink::read_results(&cfg.output.result_file)?
    } else {
        results
    };
    finish(cfg, classifier.name(), &scored)
}

fn finish(cfg: &EvalConfig, source: &str, results: &[InferenceResult]) -> Result<EvaluationReport> {
    let aggregation = aggregate(results, &cfg.evaluation);
    sink::write_study_decisions(
        aggregation.decisions.values(),
        &cfg.data.root,
        &cfg.output.study_csv,
    )?;
    let report = EvaluationReport::new(source, results.len(), aggregation);
    if let Some(path) = &cfg.output.report_json {
        report.write_json(path)?;
    }
    Ok(report)
}
