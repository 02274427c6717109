//! Erosivity pipeline command line.
//!
//! Loads the run configuration, resolves the stage plan and produces the
//! monthly rasters of the requested targets.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use erosivity::{load_pipeline_config, Pipeline, Stage};

#[derive(Parser, Debug)]
#[command(name = "erosivity")]
#[command(about = "Monthly rainfall-erosivity and snowmelt raster pipeline")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "EROSIVITY_CONFIG", default_value = "config/erosivity.yaml")]
    config: PathBuf,

    /// Target stages (default: the targets in the configuration)
    #[arg(short, long, value_delimiter = ',')]
    target: Vec<String>,

    /// Validate inputs and print the plan without running any stage
    #[arg(long)]
    dry_run: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level, args.json)?;

    info!("Starting erosivity pipeline");

    let config = load_pipeline_config(&args.config)
        .with_context(|| format!("Failed to load configuration {:?}", args.config))?;

    let targets: Vec<Stage> = if args.target.is_empty() {
        config.targets.clone()
    } else {
        args.target
            .iter()
            .map(|t| t.parse::<Stage>())
            .collect::<Result<_, _>>()
            .context("Invalid --target")?
    };

    let pipeline = Pipeline::prepare(config, &targets).context("Failed to prepare pipeline")?;
    println!("{}", pipeline.plan());

    if args.dry_run {
        pipeline.check().context("Input validation failed")?;
        info!("Dry run complete");
        return Ok(());
    }

    let summary = pipeline.run().context("Pipeline run failed")?;
    info!(
        stages = summary.stages.len(),
        outputs = summary.output_count(),
        "Pipeline complete"
    );

    Ok(())
}
