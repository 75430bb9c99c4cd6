use std::path::Path;

use image::DynamicImage;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::filter::{filter_by_region, RegionFilter};
use super::loader;
use super::model::{Label, Sample, SampleAddress};
use super::transform::Transform;
use crate::error::{MuraError, Result};

/// Random-access view of an indexed split.
///
/// The address list is fixed at construction. Each [`MuraDataset::get`] loads
/// and transforms one image from disk; nothing is cached. `get` takes `&self`
/// and touches no shared mutable state, so disjoint indices may be loaded
/// from several threads at once.
///
/// With a training transform and no `seed`, repeated `get(i)` calls return
/// different tensors. With a seed, the augmentation of sample `i` is a pure
/// function of `(seed, i)`.
#[derive(Debug, Clone)]
pub struct MuraDataset {
    addresses: Vec<SampleAddress>,
    transform: Transform,
    seed: Option<u64>,
}

impl MuraDataset {
    pub fn new(addresses: Vec<SampleAddress>, transform: Transform, seed: Option<u64>) -> Self {
        Self {
            addresses,
            transform,
            seed,
        }
    }

    /// Index `manifest`, keep only `parts` (empty = all), and wrap the result.
    pub fn from_manifest(
        root: &str,
        manifest: &Path,
        parts: &RegionFilter,
        transform: Transform,
        seed: Option<u64>,
    ) -> Result<Self> {
        let indexed = loader::index(root, manifest)?;
        let total = indexed.len();
        let addresses = filter_by_region(indexed, parts);
        if !parts.is_empty() {
            info!(
                "Region filter {:?} kept {} of {} images",
                parts,
                addresses.len(),
                total
            );
        }
        Ok(Self::new(addresses, transform, seed))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn addresses(&self) -> &[SampleAddress] {
        &self.addresses
    }

    pub fn address(&self, index: usize) -> Result<&SampleAddress> {
        self.addresses.get(index).ok_or(MuraError::IndexOutOfRange {
            index,
            len: self.addresses.len(),
        })
    }

    /// Load, transform and label sample `index`.
    pub fn get(&self, index: usize) -> Result<Sample> {
        let address = self.address(index)?;
        let img = load_image(&address.path)?;
        let image = match self.seed {
            Some(seed) => {
                let mut rng = StdRng::seed_from_u64(sample_seed(seed, index));
                self.transform.apply(&img, &mut rng)
            }
            None => self.transform.apply(&img, &mut rand::thread_rng()),
        };
        Ok(Sample {
            image,
            label: address.label,
            path: address.path.clone(),
        })
    }

    /// Image count per label, for summaries.
    pub fn label_counts(&self) -> (usize, usize) {
        let positive = self
            .addresses
            .iter()
            .filter(|a| a.label == Label::Positive)
            .count();
        (positive, self.addresses.len() - positive)
    }
}

/// Per-sample RNG seed. The index is spread with the 64-bit golden-ratio
/// constant so neighbouring `(seed, index)` pairs never collide.
fn sample_seed(seed: u64, index: usize) -> u64 {
    seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

pub fn load_image(path: &str) -> Result<DynamicImage> {
    image::open(path).map_err(|source| MuraError::ImageLoad {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::transform::TransformConfig;
    use image::{GrayImage, Luma};

    fn write_png(dir: &Path, rel: &str, value: u8) -> String {
        let path = dir.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        GrayImage::from_pixel(6, 4, Luma([value])).save(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn cfg() -> TransformConfig {
        TransformConfig {
            image_size: 4,
            ..TransformConfig::default()
        }
    }

    #[test]
    fn test_get_returns_label_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "XR_HAND/p1/study1_positive/image1.png", 128);
        let ds = MuraDataset::new(
            vec![SampleAddress {
                path: path.clone(),
                label: Label::Positive,
            }],
            Transform::eval(&cfg()),
            None,
        );
        let sample = ds.get(0).unwrap();
        assert_eq!(sample.label, Label::Positive);
        assert_eq!(sample.path, path);
        assert_eq!(sample.image.shape(), [3, 4, 4]);
    }

    #[test]
    fn test_get_out_of_range() {
        let ds = MuraDataset::new(Vec::new(), Transform::eval(&cfg()), None);
        assert!(matches!(
            ds.get(0),
            Err(MuraError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_missing_image_is_image_load_error() {
        let ds = MuraDataset::new(
            vec![SampleAddress {
                path: "/nope/study1_negative/x.png".into(),
                label: Label::Negative,
            }],
            Transform::eval(&cfg()),
            None,
        );
        match ds.get(0) {
            Err(MuraError::ImageLoad { path, .. }) => assert_eq!(path, "/nope/study1_negative/x.png"),
            other => panic!("expected ImageLoad, got {other:?}"),
        }
    }

    #[test]
    fn test_seeded_training_get_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "p/study1_negative/image1.png", 90);
        let address = SampleAddress {
            path,
            label: Label::Negative,
        };
        let ds = MuraDataset::new(vec![address], Transform::train(&cfg()), Some(3));
        assert_eq!(ds.get(0).unwrap().image, ds.get(0).unwrap().image);
    }

    #[test]
    fn test_sample_seeds_do_not_shift_with_the_base_seed() {
        for seed in [0u64, 1, 41, u64::MAX - 1] {
            for index in 1..64usize {
                assert_ne!(sample_seed(seed, index), sample_seed(seed + 1, index - 1));
            }
        }
        assert_eq!(sample_seed(7, 0), 7);
        assert_ne!(sample_seed(7, 1), sample_seed(7, 2));
    }

    #[test]
    fn test_from_manifest_applies_region_filter() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("paths.csv");
        std::fs::write(
            &manifest,
            "v/XR_HAND/p1/study1_positive/image1.png\nv/XR_WRIST/p2/study1_negative/image1.png\n",
        )
        .unwrap();
        let parts: RegionFilter = [crate::data::model::Region::Wrist].into_iter().collect();
        let ds = MuraDataset::from_manifest("/root/", &manifest, &parts, Transform::eval(&cfg()), None)
            .unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.label_counts(), (0, 1));
        assert_eq!(ds.address(0).unwrap().path, "/root/v/XR_WRIST/p2/study1_negative/image1.png");
    }
}
