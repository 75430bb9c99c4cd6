//! CSV persistence for per-image results and per-study decisions.
//!
//! * results:   `image,probability` header, one row per image
//! * decisions: no header, `<study path relative to data root>/,<0|1>`
//!
//! Both writers truncate an existing file. Writers assume a single caller
//! per output file.

use std::path::Path;

use log::info;

use crate::data::model::{InferenceResult, StudyDecision};
use crate::error::{MuraError, Result};

pub fn write_results(results: &[InferenceResult], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| MuraError::csv(path, e))?;
    // header is written explicitly so an empty result set still has one
    writer
        .write_record(["image", "probability"])
        .map_err(|e| MuraError::csv(path, e))?;
    for r in results {
        let probability = r.probability.to_string();
        writer
            .write_record([r.image_path.as_str(), probability.as_str()])
            .map_err(|e| MuraError::csv(path, e))?;
    }
    writer.flush().map_err(|e| MuraError::io(path, e))?;
    info!("Wrote {} image results to {}", results.len(), path.display());
    Ok(())
}

/// Reload a file written by [`write_results`], in file order.
///
/// Every probability must be finite and within `[0, 1]`.
pub fn read_results(path: &Path) -> Result<Vec<InferenceResult>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| MuraError::csv(path, e))?;
    reader
        .deserialize()
        .map(|row| {
            let result: InferenceResult = row.map_err(|e| MuraError::csv(path, e))?;
            if !(0.0..=1.0).contains(&result.probability) {
                return Err(MuraError::InvalidProbability {
                    path: path.to_path_buf(),
                    image: result.image_path,
                    value: result.probability,
                });
            }
            Ok(result)
        })
        .collect()
}

/// `study_path` with `data_root` stripped, plus a trailing `/`.
/// Paths outside `data_root` are kept whole.
pub fn relative_study_path(study_path: &str, data_root: &str) -> String {
    let relative = study_path.strip_prefix(data_root).unwrap_or(study_path);
    format!("{relative}/")
}

pub fn write_study_decisions<'a>(
    decisions: impl IntoIterator<Item = &'a StudyDecision>,
    data_root: &str,
    path: &Path,
) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| MuraError::csv(path, e))?;
    let mut count = 0usize;
    for d in decisions {
        writer
            .write_record([
                relative_study_path(&d.study_path, data_root),
                d.binary_call.to_string(),
            ])
            .map_err(|e| MuraError::csv(path, e))?;
        count += 1;
    }
    writer.flush().map_err(|e| MuraError::io(path, e))?;
    info!("Wrote {count} study decisions to {}", path.display());
    Ok(())
}
