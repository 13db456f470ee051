//! Operator CLI for the frame engine.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rawframe_engine::{metrics, EngineConfig, FrameService};
use rawframe_models::{parse_timestamp, ClipId, OutputFormat, Quality};

#[derive(Parser)]
#[command(
    name = "rawframe",
    version,
    about = "Extract and cache frames from camera RAW clips",
    after_help = "Configuration is read from RAWFRAME_* environment variables (and .env)."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print clip metadata as JSON
    Info {
        clip: String,
    },

    /// Extract one frame
    Extract {
        clip: String,
        /// Seconds, MM:SS(.mmm) or HH:MM:SS(.mmm)
        #[arg(value_parser = parse_timestamp)]
        timestamp: f64,
        #[arg(short, long, default_value = "medium")]
        quality: Quality,
        #[arg(short, long, default_value = "jpeg")]
        format: OutputFormat,
        /// Output file (defaults to {clip}_{timestamp}.{ext})
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract several frames of one clip
    Batch {
        clip: String,
        #[arg(value_parser = parse_timestamp, required = true)]
        timestamps: Vec<f64>,
        #[arg(short, long, default_value = "medium")]
        quality: Quality,
        #[arg(short, long, default_value = "jpeg")]
        format: OutputFormat,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Print cache statistics as JSON
    Stats,

    /// Delete a clip's source file and cached frames
    Cleanup {
        clip: String,
    },

    /// Empty the frame cache
    ClearCache {
        /// Also zero hit/miss/eviction counters
        #[arg(long)]
        reset_stats: bool,
    },
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    if let Ok(directive) = "rawframe=info".parse::<Directive>() {
        env_filter = env_filter.add_directive(directive);
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

fn output_name(clip: &ClipId, timestamp: f64, format: OutputFormat) -> String {
    let ext = match format {
        OutputFormat::Jpeg => "jpg",
        OutputFormat::Rgba => "rgba",
    };
    format!("{}_{:.3}.{}", clip, timestamp, ext)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    if let Some(addr) = config.metrics_addr {
        match metrics::init_metrics(addr) {
            Ok(()) => info!(%addr, "Prometheus exporter listening"),
            Err(e) => warn!(error = %e, "Failed to install Prometheus exporter"),
        }
    }

    let service = FrameService::initialize(config, None)
        .await
        .context("Failed to initialize frame service")?;

    let result = run(&service, cli.command).await;
    service.shutdown().await.context("Failed to flush frame cache")?;
    result
}

async fn run(service: &FrameService, command: Commands) -> Result<()> {
    match command {
        Commands::Info { clip } => {
            let info = service.get_info(&ClipId::from(clip)).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        Commands::Extract {
            clip,
            timestamp,
            quality,
            format,
            output,
        } => {
            let clip = ClipId::from(clip);
            let frame = service
                .extract_frame(&clip, timestamp, quality, format)
                .await?;
            let path = output.unwrap_or_else(|| PathBuf::from(output_name(&clip, timestamp, format)));
            tokio::fs::write(&path, &frame.bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("{}", serde_json::to_string_pretty(&frame)?);
        }
        Commands::Batch {
            clip,
            timestamps,
            quality,
            format,
            out_dir,
        } => {
            let clip = ClipId::from(clip);
            tokio::fs::create_dir_all(&out_dir).await?;
            let frames = service
                .extract_frames(&clip, &timestamps, quality, format)
                .await?;
            for (ts, frame) in &frames {
                let path = out_dir.join(output_name(&clip, ts.seconds(), format));
                tokio::fs::write(&path, &frame.bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            info!(
                requested = timestamps.len(),
                extracted = frames.len(),
                "Batch complete"
            );
            println!("{}", serde_json::to_string_pretty(&frames.values().collect::<Vec<_>>())?);
        }
        Commands::Stats => {
            let stats = service.get_cache_stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("hit rate: {:.1}%", stats.hit_rate() * 100.0);
        }
        Commands::Cleanup { clip } => {
            let report = service.cleanup(&ClipId::from(clip)).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::ClearCache { reset_stats } => {
            service.clear_cache(reset_stats).await?;
        }
    }
    Ok(())
}
