use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use serde::Serialize;

use crate::data::model::{Label, Region, SampleAddress};
use crate::error::{MuraError, Result};
use crate::eval::aggregate::{study_key, Aggregation, ExclusionReason};
use crate::eval::metrics::AgreementMetrics;

// ---------------------------------------------------------------------------
// Evaluation report
// ---------------------------------------------------------------------------

/// Outcome of one evaluation run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    /// Classifier name, or the results file for aggregate-only runs.
    pub source: String,
    pub images: usize,
    #[serde(flatten)]
    pub aggregation: Aggregation,
}

impl EvaluationReport {
    pub fn new(source: &str, images: usize, aggregation: Aggregation) -> Self {
        Self {
            source: source.to_string(),
            images,
            aggregation,
        }
    }

    pub fn studies(&self) -> usize {
        self.aggregation.decisions.len()
    }

    /// Per-region table followed by the overall row.
    pub fn table(&self) -> String {
        let mut lines = vec![
            AgreementMetrics::table_header(),
            AgreementMetrics::table_separator(),
        ];
        for (region, metrics) in &self.aggregation.regions {
            lines.push(metrics.to_table_row(region.token()));
        }
        if let Some(overall) = &self.aggregation.overall {
            lines.push(AgreementMetrics::table_separator());
            lines.push(overall.to_table_row("overall"));
        }
        lines.join("\n")
    }

    pub fn print_summary(&self) {
        println!("\n=== {} ===", self.source);
        println!(
            "Images: {}  Studies: {}  Threshold: {} (call = 1 when mean < threshold)",
            self.images,
            self.studies(),
            self.aggregation.threshold
        );
        println!("{}", self.table());

        let (regionless, unlabelled) = self.aggregation.exclusions.iter().fold(
            (0usize, 0usize),
            |(r, u), e| match e.reason {
                ExclusionReason::UnrecognizedRegion => (r + 1, u),
                ExclusionReason::UnrecognizedGroundTruth { .. } => (r, u + 1),
            },
        );
        if regionless + unlabelled > 0 {
            println!(
                "Excluded: {regionless} studies without region, {unlabelled} without ground truth"
            );
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| MuraError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| MuraError::io(path, e.into()))?;
        writer.flush().map_err(|e| MuraError::io(path, e))?;
        info!("Wrote report to {}", path.display());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dataset summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SplitCounts {
    pub images: usize,
    pub studies: usize,
    pub positive_studies: usize,
    pub negative_studies: usize,
}

/// Image and study counts of an indexed manifest, per region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetSummary {
    pub total: SplitCounts,
    /// Keyed by region token; `"unknown"` for paths without one.
    pub regions: BTreeMap<String, SplitCounts>,
}

impl DatasetSummary {
    pub fn from_addresses(addresses: &[SampleAddress]) -> Self {
        let mut summary = DatasetSummary::default();
        let mut seen: BTreeSet<&str> = BTreeSet::new();

        for a in addresses {
            let key = Region::find_in_path(&a.path)
                .map(|r| r.token().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let new_study = seen.insert(study_key(&a.path));
            let region = summary.regions.entry(key).or_default();
            for counts in [&mut summary.total, region] {
                counts.images += 1;
                if new_study {
                    counts.studies += 1;
                    match a.label {
                        Label::Positive => counts.positive_studies += 1,
                        Label::Negative => counts.negative_studies += 1,
                    }
                }
            }
        }
        summary
    }

    pub fn print_summary(&self, name: &str) {
        println!("\n=== {name} ===");
        println!(
            "| {:<12} | {:>7} | {:>7} | {:>8} | {:>8} |",
            "Region", "Images", "Studies", "Positive", "Negative"
        );
        println!("|{:-<14}|{:->9}|{:->9}|{:->10}|{:->10}|", "", "", "", "", "");
        let rows = self
            .regions
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .chain(std::iter::once(("total", &self.total)));
        for (name, c) in rows {
            println!(
                "| {:<12} | {:>7} | {:>7} | {:>8} | {:>8} |",
                name, c.images, c.studies, c.positive_studies, c.negative_studies
            );
        }
    }
}
