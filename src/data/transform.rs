use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::model::ImageTensor;

/// ImageNet per-channel statistics (the backbones are ImageNet-pretrained).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Luminance statistics of the MURA training split.
pub const MURA_MEAN: f32 = 0.225_886_61;
pub const MURA_STD: f32 = 0.179_562_69;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which mean/std pair the final normalisation stage uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    #[default]
    Imagenet,
    /// Single-channel MURA statistics replicated over R/G/B.
    Mura,
}

impl Normalization {
    pub fn mean_std(self) -> ([f32; 3], [f32; 3]) {
        match self {
            Normalization::Imagenet => (IMAGENET_MEAN, IMAGENET_STD),
            Normalization::Mura => ([MURA_MEAN; 3], [MURA_STD; 3]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Target side length: shortest side is resized to this, then a square crop.
    pub image_size: u32,
    /// Random rotation is drawn uniformly from `[-max, max]` degrees.
    pub max_rotation_deg: f32,
    pub horizontal_flip: bool,
    pub vertical_flip: bool,
    pub normalization: Normalization,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            image_size: 320,
            max_rotation_deg: 30.0,
            horizontal_flip: true,
            vertical_flip: true,
            normalization: Normalization::Imagenet,
        }
    }
}

// ---------------------------------------------------------------------------
// Transform pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Crop {
    Random,
    Center,
}

/// Image → tensor pipeline, applied in this fixed order:
///
/// 1. convert to 8-bit luminance
/// 2. resize so the shortest side equals `size` (aspect ratio kept)
/// 3. square crop of `size × size` (random offset in training, centred in eval)
/// 4. random horizontal flip, p = 0.5 (training only)
/// 5. random vertical flip, p = 0.5 (training only)
/// 6. random rotation in `[-max, max]` degrees, nearest neighbour, zero fill (training only)
/// 7. scale to `[0, 1]`, replicate luminance into 3 channels
/// 8. per-channel `(v - mean) / std`
///
/// A training transform is **not** deterministic: calling [`Transform::apply`]
/// twice on the same image gives different tensors unless the RNG is
/// reseeded. Evaluation must use [`Transform::eval`], which ignores the RNG.
#[derive(Debug, Clone)]
pub struct Transform {
    size: u32,
    crop: Crop,
    horizontal_flip: bool,
    vertical_flip: bool,
    max_rotation_deg: f32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Transform {
    /// Augmenting pipeline for training.
    pub fn train(cfg: &TransformConfig) -> Self {
        let (mean, std) = cfg.normalization.mean_std();
        Self {
            size: cfg.image_size,
            crop: Crop::Random,
            horizontal_flip: cfg.horizontal_flip,
            vertical_flip: cfg.vertical_flip,
            max_rotation_deg: cfg.max_rotation_deg.abs(),
            mean,
            std,
        }
    }

    /// Deterministic pipeline for evaluation and inference: resize + center crop.
    pub fn eval(cfg: &TransformConfig) -> Self {
        let (mean, std) = cfg.normalization.mean_std();
        Self {
            size: cfg.image_size,
            crop: Crop::Center,
            horizontal_flip: false,
            vertical_flip: false,
            max_rotation_deg: 0.0,
            mean,
            std,
        }
    }

    /// True when [`Transform::apply`] never consults the RNG.
    pub fn is_deterministic(&self) -> bool {
        self.crop == Crop::Center
            && !self.horizontal_flip
            && !self.vertical_flip
            && self.max_rotation_deg == 0.0
    }

    pub fn apply<R: Rng + ?Sized>(&self, img: &DynamicImage, rng: &mut R) -> ImageTensor {
        let gray = img.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return ImageTensor::zeros(3, self.size as usize, self.size as usize);
        }

        let resized = resize_shortest_side(&gray, self.size);
        let mut img = self.crop_square(&resized, rng);

        if self.horizontal_flip && rng.gen_bool(0.5) {
            img = imageops::flip_horizontal(&img);
        }
        if self.vertical_flip && rng.gen_bool(0.5) {
            img = imageops::flip_vertical(&img);
        }
        if self.max_rotation_deg > 0.0 {
            let angle = rng.gen_range(-self.max_rotation_deg..=self.max_rotation_deg);
            img = rotate_nearest(&img, angle);
        }

        self.to_tensor(&img)
    }

    fn crop_square<R: Rng + ?Sized>(&self, img: &GrayImage, rng: &mut R) -> GrayImage {
        let (w, h) = img.dimensions();
        let side = self.size.min(w).min(h);
        let (x, y) = match self.crop {
            Crop::Center => ((w - side) / 2, (h - side) / 2),
            Crop::Random => (rng.gen_range(0..=w - side), rng.gen_range(0..=h - side)),
        };
        let cropped = imageops::crop_imm(img, x, y, side, side).to_image();
        if side == self.size {
            cropped
        } else {
            imageops::resize(&cropped, self.size, self.size, FilterType::Triangle)
        }
    }

    fn to_tensor(&self, img: &GrayImage) -> ImageTensor {
        let (w, h) = img.dimensions();
        let plane = (w * h) as usize;
        let mut tensor = ImageTensor::zeros(3, h as usize, w as usize);
        for (i, Luma([v])) in img.pixels().enumerate() {
            let v = *v as f32 / 255.0;
            for c in 0..3 {
                tensor.data[c * plane + i] = (v - self.mean[c]) / self.std[c];
            }
        }
        tensor
    }
}

/// Resize so that `min(w, h) == size`, the longer side scaled proportionally.
fn resize_shortest_side(img: &GrayImage, size: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    let (nw, nh) = if w <= h {
        (size, ((h as u64 * size as u64) / w as u64).max(1) as u32)
    } else {
        (((w as u64 * size as u64) / h as u64).max(1) as u32, size)
    };
    if (nw, nh) == (w, h) {
        return img.clone();
    }
    imageops::resize(img, nw, nh, FilterType::Triangle)
}

/// Rotate about the image centre by `degrees` (counter-clockwise), keeping
/// the canvas size. Uncovered pixels become 0.
fn rotate_nearest(img: &GrayImage, degrees: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let theta = (degrees as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = w as f64 * 0.5;
    let cy = h as f64 * 0.5;

    GrayImage::from_fn(w, h, |x, y| {
        let dx = x as f64 + 0.5 - cx;
        let dy = y as f64 + 0.5 - cy;
        // inverse mapping: output pixel ← source pixel
        let sx = (cos * dx - sin * dy + cx).floor();
        let sy = (sin * dx + cos * dy + cy).floor();
        if sx >= 0.0 && sy >= 0.0 && (sx as u32) < w && (sy as u32) < h {
            *img.get_pixel(sx as u32, sy as u32)
        } else {
            Luma([0])
        }
    })
}
