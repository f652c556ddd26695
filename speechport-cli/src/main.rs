//! speechport - export a speech model to ONNX and check it end to end

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use speechport_cli::{pipeline, CliConfig};
use speechport_model::{HubRepository, ModelRepository};
use speechport_validate::Verdict;
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(name = "speechport")]
#[command(version, about = "Export a CTC speech model to ONNX and validate it", long_about = None)]
struct Args {
    /// Directory receiving onnx/model.onnx
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Model identifier: local directory or Hugging Face repo id
    #[arg(long)]
    model: Option<String>,

    /// Audio clip to validate the exported graph with
    #[arg(long)]
    test_wav: Option<PathBuf>,

    /// Configuration file (default: platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target ONNX opset
    #[arg(long)]
    opset: Option<i64>,

    /// Disable constant folding
    #[arg(long, default_value_t = false)]
    no_constant_folding: bool,

    /// Length of the tracing probe in seconds
    #[arg(long)]
    probe_seconds: Option<f32>,

    /// ONNX Runtime threads for validation
    #[arg(long)]
    threads: Option<usize>,

    /// Directory for staging areas
    #[arg(long)]
    staging_dir: Option<PathBuf>,

    /// Keep the staging area if publishing fails
    #[arg(long, default_value_t = false)]
    keep_staging: bool,

    /// Hugging Face cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print warnings and errors
    #[arg(short, long, default_value_t = false)]
    quiet: bool,
}

impl Args {
    fn log_level(&self) -> Level {
        match (self.quiet, self.verbose) {
            (true, _) => Level::WARN,
            (false, 0) => Level::INFO,
            (false, 1) => Level::DEBUG,
            (false, _) => Level::TRACE,
        }
    }

    /// Command-line flags win over file values
    fn apply(self, mut config: CliConfig) -> CliConfig {
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(model) = self.model {
            config.model_id = model;
        }
        if let Some(wav) = self.test_wav {
            config.validation.test_audio = Some(wav);
        }
        if let Some(opset) = self.opset {
            config.export.opset_version = opset;
        }
        if self.no_constant_folding {
            config.export.constant_folding = false;
        }
        if let Some(seconds) = self.probe_seconds {
            config.export.probe_seconds = seconds;
        }
        if let Some(threads) = self.threads {
            config.validation.num_threads = threads;
        }
        if let Some(dir) = self.staging_dir {
            config.publish.staging_dir = Some(dir);
        }
        if self.keep_staging {
            config.publish.keep_failed_staging = true;
        }
        if let Some(dir) = self.cache_dir {
            config.cache_dir = Some(dir);
        }
        config
    }
}

fn repository(config: &CliConfig) -> Result<Box<dyn ModelRepository>> {
    let repo = match &config.cache_dir {
        Some(dir) => HubRepository::with_cache_dir(dir),
        None => HubRepository::new(),
    }
    .context("Failed to initialize model repository")?;
    Ok(Box::new(repo))
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(args.log_level())
        .init();

    let config = CliConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = &config.config_path {
        info!("Configuration loaded from {}", path.display());
    }
    let config = args.apply(config);

    info!("speechport v{}", env!("CARGO_PKG_VERSION"));
    info!("  - Model: {}", config.model_id);
    info!("  - Output: {}", config.output_dir.display());
    info!("  - Opset: {}", config.export.opset_version);

    let repo = repository(&config)?;
    let outcome = pipeline::run(repo.as_ref(), &config)?;

    println!("ONNX model saved to {}", outcome.artifact.path.display());

    match &outcome.validation {
        None => Ok(ExitCode::SUCCESS),
        Some(Ok(report)) => {
            println!("Transcript: {}", report.transcript());
            if let Verdict::Suspicious(reason) = &report.verdict {
                warn!("Validation result is suspicious: {}", reason);
            }
            Ok(ExitCode::SUCCESS)
        }
        Some(Err(e)) => {
            eprintln!("Validation failed: {}", e);
            eprintln!("The exported model was kept at {}", outcome.artifact.path.display());
            Ok(ExitCode::from(2))
        }
    }
}
