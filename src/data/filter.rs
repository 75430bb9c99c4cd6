use std::collections::BTreeSet;

use super::model::{Region, SampleAddress};

// ---------------------------------------------------------------------------
// Region filter: restrict a split to selected body parts
// ---------------------------------------------------------------------------

/// Set of regions to keep. Empty means "no filter" (keep everything).
pub type RegionFilter = BTreeSet<Region>;

/// Return the addresses whose path names one of the selected regions.
///
/// An address passes when:
/// * `selected` is empty → passes (no constraint)
/// * its path contains a `XR_*` segment in `selected` → passes
/// * otherwise (other region, or no region segment at all) → fails
pub fn filter_by_region(addresses: Vec<SampleAddress>, selected: &RegionFilter) -> Vec<SampleAddress> {
    if selected.is_empty() {
        return addresses;
    }
    addresses
        .into_iter()
        .filter(|a| {
            Region::find_in_path(&a.path)
                .map(|r| selected.contains(&r))
                .unwrap_or(false)
        })
        .collect()
}
