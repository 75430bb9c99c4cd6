use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::info;

use mura_eval::config::EvalConfig;
use mura_eval::inference::registry::ModelRegistry;
use mura_eval::pipeline;

#[derive(Parser)]
#[command(name = "mura-eval")]
#[command(about = "Study-level evaluation of MURA radiograph classifiers", long_about = None)]
struct Cli {
    /// Config TOML file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Prefix prepended to every manifest line
    #[arg(long, global = true, value_name = "DIR")]
    data_root: Option<String>,

    /// Study decision threshold (call = 1 when mean < threshold)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Sample-loading threads (0 = calling thread)
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest and print image / study counts per region
    Index {
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Summarise [data].train_manifest instead of the test manifest
        #[arg(long, conflicts_with = "manifest")]
        train: bool,
    },
    /// Score the test split with one model and report agreement
    Test {
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Registered model name (overrides [model].name)
        #[arg(long)]
        model: Option<String>,
        /// Aggregate the in-memory results instead of reloading the CSV
        #[arg(long)]
        in_memory: bool,
    },
    /// Score the test split with the [[ensemble]] models
    Ensemble {
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Recompute study decisions and metrics from an existing results CSV
    Aggregate {
        /// Defaults to [output].result_file
        #[arg(long)]
        results: Option<PathBuf>,
    },
    /// List registered model names
    Models,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EvalConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EvalConfig::default(),
    };
    if let Some(root) = cli.data_root {
        config.data.root = root;
    }
    if let Some(threshold) = cli.threshold {
        config.evaluation.threshold = threshold;
    }
    if let Some(batch_size) = cli.batch_size {
        config.inference.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        config.inference.num_workers = workers;
    }

    let registry = ModelRegistry::with_builtins();
    info!("Data root: {:?}", config.data.root);

    match cli.command {
        Commands::Index { manifest, train } => {
            let manifest = match manifest {
                Some(manifest) => manifest,
                None if train => config.train_manifest()?.to_path_buf(),
                None => config.data.test_manifest.clone(),
            };
            let summary = pipeline::summarize_manifest(&config, &manifest)
                .with_context(|| format!("indexing {}", manifest.display()))?;
            summary.print_summary(&manifest.display().to_string());
        }
        Commands::Test {
            manifest,
            model,
            in_memory,
        } => {
            if let Some(manifest) = manifest {
                config.data.test_manifest = manifest;
            }
            if let Some(name) = model {
                config.model.name = name;
            }
            if in_memory {
                config.evaluation.reload_results = false;
            }
            let report = pipeline::run_test(&config, &registry).context("test run failed")?;
            report.print_summary();
        }
        Commands::Ensemble { manifest } => {
            if let Some(manifest) = manifest {
                config.data.test_manifest = manifest;
            }
            let report =
                pipeline::run_ensemble(&config, &registry).context("ensemble run failed")?;
            report.print_summary();
        }
        Commands::Aggregate { results } => {
            let results = results.unwrap_or_else(|| config.output.result_file.clone());
            let report = pipeline::run_aggregate(&config, &results)
                .with_context(|| format!("aggregating {}", results.display()))?;
            report.print_summary();
        }
        Commands::Models => {
            for name in registry.names() {
                println!("{name}");
            }
        }
    }
    Ok(())
}
