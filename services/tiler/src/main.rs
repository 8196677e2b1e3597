//! Mesh tiler.
//!
//! Turns a variable on an unstructured mesh into a pyramid of raw tiles and
//! PNG image tiles.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use tiler::{run_all, run_images, run_index, run_raw, Overrides, TilerConfig};

#[derive(Parser, Debug)]
#[command(name = "tiler")]
#[command(about = "Build map tile pyramids from unstructured mesh data")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "TILER_CONFIG")]
    config: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Worker threads (default: one per core)
    #[arg(long, env = "TILER_THREADS")]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build and store the tile index
    Index(Overrides),
    /// Gather a variable and store the raw tile pyramid
    Raw(Overrides),
    /// Render image tiles from the raw pyramid
    Images(Overrides),
    /// Run all stages
    All(Overrides),
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_tracing(&args.log_level, args.json_logs)?;

    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()?;
    }

    let overrides = match &args.command {
        Command::Index(o) | Command::Raw(o) | Command::Images(o) | Command::All(o) => o,
    };
    let config = TilerConfig::resolve(args.config.as_deref(), overrides)?;
    info!(
        level = config.level,
        tilesize = config.tilesize,
        max_level = config.render_max_level(),
        variable = ?config.variable,
        "Loaded configuration"
    );

    let summary = match args.command {
        Command::Index(_) => {
            run_index(&config)?;
            None
        }
        Command::Raw(_) => {
            run_raw(&config)?;
            None
        }
        Command::Images(_) => Some(run_images(&config)?),
        Command::All(_) => Some(run_all(&config)?),
    };

    if let Some(summary) = summary {
        if !summary.is_success() {
            for failure in &summary.failed {
                error!(error = %failure, "Tile not written");
            }
            error!(
                failed = summary.failed.len(),
                written = summary.written,
                "Some image tiles failed"
            );
            std::process::exit(1);
        }
    }

    info!("Done");
    Ok(())
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
