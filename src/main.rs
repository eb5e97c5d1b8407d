use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use viewpoint_validator::{
    config::Config,
    image::Normalization,
    models::ModelOutput,
    web::serve,
};

#[derive(Parser)]
#[command(name = "viewpoint-validator")]
#[command(about = "Validates that photos show the requested viewpoint of a vehicle")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// Comma separated viewpoint labels to enable (default: all)
    #[arg(long)]
    labels: Option<String>,

    /// Per-label model path override, LABEL=PATH (repeatable)
    #[arg(long = "model", value_name = "LABEL=PATH")]
    models: Vec<String>,

    /// Input normalization used at training time: unit or imagenet
    #[arg(long, default_value = "unit")]
    normalization: String,

    /// Models output raw logits instead of probabilities
    #[arg(long)]
    logit_output: bool,

    /// Load every enabled model at startup
    #[arg(long)]
    preload: bool,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting viewpoint validator service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);

    let config = build_config(&args)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers.max(1))
        .enable_all()
        .build()?;

    runtime.block_on(serve(config))?;

    Ok(())
}

fn build_config(args: &Args) -> Result<Config> {
    let normalization: Normalization = args.normalization.parse().map_err(|e| anyhow!("{}", e))?;
    let output = if args.logit_output {
        ModelOutput::Logit
    } else {
        ModelOutput::Probability
    };

    let mut config = Config::new(
        args.bind.clone(),
        args.models_dir.clone(),
        args.workers,
        args.dev,
    )?
    .with_normalization(normalization)
    .with_output(output)
    .with_preload(args.preload);

    if let Some(labels) = &args.labels {
        config = config.with_labels(Config::parse_labels(labels)?)?;
    }

    for value in &args.models {
        let (label, path) = Config::parse_model_override(value)?;
        tracing::info!("Model override: {} -> {}", label, path.display());
        config = config.with_model_path(label, path);
    }

    tracing::info!(
        "Enabled labels: {:?}, normalization: {}, model output: {}",
        config.model_config.labels,
        config.model_config.normalization,
        config.model_config.output
    );

    Ok(config)
}
