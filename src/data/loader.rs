use std::path::Path;

use log::info;

use super::model::{Label, SampleAddress};
use crate::error::{MuraError, Result};

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Index a MURA manifest into labelled sample addresses.
///
/// The manifest is plain UTF-8 text with one relative image path per line,
/// e.g. `MURA-v1.1/valid/XR_WRIST/patient11185/study1_positive/image1.png`.
/// Each line has exactly one trailing line terminator stripped and is then
/// concatenated onto `root` as-is (no separator is inserted), so `root`
/// normally ends with `/`.
///
/// Output order matches line order. A line whose label segment is not exactly
/// `positive` or `negative` aborts indexing with
/// [`MuraError::MalformedManifestEntry`].
pub fn index(root: &str, manifest_path: &Path) -> Result<Vec<SampleAddress>> {
    let text =
        std::fs::read_to_string(manifest_path).map_err(|e| MuraError::io(manifest_path, e))?;
    let addresses = index_str(root, &text)?;
    info!(
        "Indexed {} images from {}",
        addresses.len(),
        manifest_path.display()
    );
    Ok(addresses)
}

/// Same as [`index`] on manifest text already in memory.
pub fn index_str(root: &str, manifest: &str) -> Result<Vec<SampleAddress>> {
    manifest
        .split_inclusive('\n')
        .map(|line| {
            let path = format!("{root}{}", strip_line_terminator(line));
            let label = label_from_path(&path)?;
            Ok(SampleAddress { path, label })
        })
        .collect()
}

/// Derive the label of an image path.
///
/// The label token is the text between the last `_` and the following `/`,
/// i.e. the suffix of the study folder: `.../study1_positive/image1.png`.
pub fn label_from_path(path: &str) -> Result<Label> {
    let token = label_token(path);
    Label::from_token(token).ok_or_else(|| MuraError::MalformedManifestEntry {
        path: path.to_string(),
        label: token.to_string(),
    })
}

fn label_token(path: &str) -> &str {
    let after_underscore = path.rsplit('_').next().unwrap_or(path);
    after_underscore.split('/').next().unwrap_or(after_underscore)
}

/// Remove one `\n` (and a preceding `\r`, if any).
fn strip_line_terminator(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => line,
    }
}
