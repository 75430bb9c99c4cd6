use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use image::{GrayImage, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mura_eval::data::model::Region;

/// Write a small MURA-shaped dataset: PNG stand-ins for radiographs plus the
/// `valid_image_paths.csv` manifest that indexes them.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output directory; pass it as `--data-root` to mura-eval
    #[arg(short, long, default_value = "sample_data")]
    output: PathBuf,

    #[arg(long, default_value_t = 4)]
    patients_per_region: usize,

    #[arg(long, default_value_t = 64)]
    size: u32,

    #[arg(long, default_value_t = 42)]
    seed: u64,
}

/// Bright elliptical "bone" over a dark field, with noise. Abnormal studies
/// get a darker bone so the intensity classifiers have something to find.
fn radiograph(size: u32, abnormal: bool, rng: &mut StdRng) -> GrayImage {
    let c = size as f64 / 2.0;
    let (rx, ry) = (c * rng.gen_range(0.25f64..0.45), c * rng.gen_range(0.6f64..0.9));
    let bone: f64 = if abnormal { 120.0 } else { 200.0 };

    GrayImage::from_fn(size, size, |x, y| {
        let dx = (x as f64 - c) / rx;
        let dy = (y as f64 - c) / ry;
        let base = if dx * dx + dy * dy <= 1.0 { bone } else { 30.0 };
        let v = base + rng.gen_range(-20.0f64..20.0);
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

fn write_study(
    root: &Path,
    relative: &str,
    images: usize,
    size: u32,
    abnormal: bool,
    rng: &mut StdRng,
    manifest: &mut Vec<String>,
) -> anyhow::Result<()> {
    let dir = root.join(relative);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    for i in 1..=images {
        let name = format!("image{i}.png");
        let path = dir.join(&name);
        radiograph(size, abnormal, rng)
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        manifest.push(format!("{relative}/{name}"));
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut manifest = Vec::new();
    let mut studies = 0usize;
    let mut patient_id = 11185usize;

    for region in Region::ALL {
        for _ in 0..args.patients_per_region {
            patient_id += 1;
            let abnormal = rng.gen_bool(0.4);
            let label = if abnormal { "positive" } else { "negative" };
            let relative = format!(
                "MURA-v1.1/valid/{}/patient{patient_id:05}/study1_{label}",
                region.token()
            );
            let images = rng.gen_range(1..=3);
            write_study(
                &args.output,
                &relative,
                images,
                args.size,
                abnormal,
                &mut rng,
                &mut manifest,
            )?;
            studies += 1;
        }
    }

    let manifest_path = args.output.join("MURA-v1.1").join("valid_image_paths.csv");
    let mut content = manifest.join("\n");
    content.push('\n');
    fs::write(&manifest_path, content)
        .with_context(|| format!("writing {}", manifest_path.display()))?;

    println!(
        "Wrote {} images in {studies} studies; manifest at {}",
        manifest.len(),
        manifest_path.display()
    );
    println!(
        "Run: mura-eval --data-root {}/ test --manifest {}",
        args.output.display(),
        manifest_path.display()
    );
    Ok(())
}
