//! Lumen CLI - Command-line interface for the Lumen engine

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{bake, plan};

#[derive(Parser)]
#[command(name = "lumen")]
#[command(about = "Bake environment probes for Lumen scenes", long_about = None)]
#[command(version)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bake every environment probe in a scene
    Bake {
        /// Path to scene file
        scene: String,

        /// Record the GPU work instead of running it
        #[arg(long)]
        dry_run: bool,

        /// Give up if probes are still baking after this many frames
        #[arg(long, default_value = "10000")]
        max_frames: u64,

        /// Bake passes allowed per frame across time-sliced probes
        #[arg(long, default_value = "16")]
        steps_per_tick: u32,
    },

    /// Print the pass sequence of a single probe bake
    Plan {
        /// Probe resolution in pixels (16, 32, 64, 128, 256, 1024 or 2048)
        #[arg(long, default_value = "128")]
        resolution: u32,

        /// Use floating-point probe textures
        #[arg(long)]
        hdr: bool,
    },
}

fn init_logging(verbose: bool) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var("RUST_LOG").is_err() {
        builder.filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        });
        builder
            .filter_module("wgpu_core", log::LevelFilter::Warn)
            .filter_module("wgpu_hal", log::LevelFilter::Warn)
            .filter_module("naga", log::LevelFilter::Warn);
    }
    builder.init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Bake {
            scene,
            dry_run,
            max_frames,
            steps_per_tick,
        } => bake::run(bake::BakeArgs {
            scene,
            dry_run,
            max_frames,
            steps_per_tick,
        }),
        Commands::Plan { resolution, hdr } => plan::run(resolution, hdr),
    }
}
