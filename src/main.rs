// SPDX-License-Identifier: GPL-3.0-only

use camera_bridge::Config;
use camera_bridge::constants::ResolutionPreset;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-bridge")]
#[command(about = "Camera frame to texture bridge")]
#[command(version = camera_bridge::constants::app_info::version())]
struct Cli {
    /// JSON config file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push synthetic frames through the full pipeline and save the texture
    Convert {
        /// Resolution preset (VGA, 720p, 1080p, 4K)
        #[arg(short, long)]
        preset: Option<String>,

        /// Number of frames to convert
        #[arg(short, long, default_value = "3")]
        frames: u32,

        /// Use the CPU conversion kernel
        #[arg(long)]
        cpu: bool,

        /// Output PNG path (default: ./frame_TIMESTAMP.png)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the GPU adapter and kernel information
    Info,

    /// Print the default configuration as JSON
    DefaultConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_bridge=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    match cli.command {
        Commands::Convert {
            preset,
            frames,
            cpu,
            output,
        } => {
            let mut config = config;
            if let Some(name) = preset {
                let preset = ResolutionPreset::from_name(&name)
                    .ok_or_else(|| format!("Unknown resolution preset '{}'", name))?;
                config.resolution = preset.resolution();
            }
            if cpu {
                config.conversion = camera_bridge::config::ConversionBackendKind::Cpu;
            }
            cli::convert(config, frames, output)
        }
        Commands::Info => cli::info(&config),
        Commands::DefaultConfig => {
            println!("{}", Config::default().to_json_pretty()?);
            Ok(())
        }
    }
}
