use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use insert_compositor::{
    composition::Compositor,
    config::Config,
    video::{FfmpegBackend, InsertRequest},
    OverlapPolicy,
};

#[derive(Parser)]
#[command(
    name = "insert-compositor",
    version,
    about = "Cut short clips into a video at given timestamps, keeping the original audio",
    long_about = "Insert-Compositor replaces the picture of a main video with insert clips at the requested timestamps. The output has the main video's duration and its original, untouched audio track."
)]
struct Cli {
    /// Main video (path or file:// URL)
    #[arg(short, long)]
    main: String,

    /// Clip to insert as PATH@SECONDS (repeatable)
    #[arg(short, long = "insert", value_name = "PATH@SECONDS")]
    inserts: Vec<String>,

    /// Output video file path
    #[arg(short, long)]
    output: String,

    /// Seconds each insert is shown (defaults to the configured 3.0)
    #[arg(short, long)]
    duration: Option<f64>,

    /// What to do when an insert starts before the previous one ended
    #[arg(long, value_enum)]
    overlap: Option<OverlapArg>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the segment plan as JSON instead of rendering
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OverlapArg {
    Truncate,
    Reject,
}

impl From<OverlapArg> for OverlapPolicy {
    fn from(arg: OverlapArg) -> Self {
        match arg {
            OverlapArg::Truncate => OverlapPolicy::Truncate,
            OverlapArg::Reject => OverlapPolicy::Reject,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting Insert-Compositor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    if let Some(overlap) = cli.overlap {
        config.insert.overlap = overlap.into();
    }
    config.validate()?;

    let duration = cli.duration.unwrap_or(config.insert.default_duration);
    let requests = cli
        .inserts
        .iter()
        .map(|spec| {
            InsertRequest::parse(spec, duration)
                .ok_or_else(|| anyhow!("Invalid insert '{}', expected PATH@SECONDS", spec))
        })
        .collect::<Result<Vec<_>>>()?;

    info!("Main: {}", cli.main);
    info!("Inserts: {}", requests.len());
    info!("Overlap policy: {:?}", config.insert.overlap);

    let backend = FfmpegBackend::new(config.encoding.clone());
    if !backend.check_ffmpeg_available() {
        warn!("'{}' did not respond to -version; rendering will likely fail", config.encoding.ffmpeg);
    }
    let compositor = Compositor::new(backend).with_overlap_policy(config.insert.overlap);

    // The compositor blocks on ffmpeg; keep it off the async workers
    let main_path = cli.main.clone();
    let output_path = cli.output.clone();
    let dry_run = cli.dry_run;
    let outcome = tokio::task::spawn_blocking(move || {
        if dry_run {
            compositor
                .plan(&main_path, &requests)
                .map(|plan| Outcome::Planned(Box::new(plan)))
        } else {
            compositor
                .insert_requests(&main_path, &requests, &output_path)
                .map(Outcome::Written)
        }
    })
    .await?
    .map_err(|e| anyhow!(e.user_message()))?;

    match outcome {
        Outcome::Planned(plan) => println!("{}", serde_json::to_string_pretty(&plan)?),
        Outcome::Written(path) => info!("Insertion complete! Output saved to: {:?}", path),
    }

    Ok(())
}

enum Outcome {
    Planned(Box<insert_compositor::InsertionPlan>),
    Written(PathBuf),
}
