// Author: Lukas Bower
// Purpose: CLI entry point wiring the serial link, telemetry, and upload crates together.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the scarab-monitor host companion.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use scarab_monitor::config::{AppConfig, UploadRequest};
use scarab_upload::Slot;

/// Host companion for a four-display embedded hardware monitor.
#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Scarab monitor host companion", long_about = None)]
struct Cli {
    /// Fixed serial port name (e.g. `COM4`, `/dev/ttyUSB0`); absent triggers
    /// enumerator-driven discovery.
    #[arg(long)]
    port: Option<String>,

    /// Baud rate to open the link at.
    #[arg(long, default_value_t = scarab_link::BAUD_RATE)]
    baud: u32,

    /// Log verbosity (`error`, `warn`, `info`, `debug`, `trace`).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Transcode an image and upload it to one of the device's four slots,
    /// then exit.
    Upload {
        /// Target display slot.
        #[arg(long, value_enum)]
        slot: SlotArg,
        /// Path to the source raster image (PNG/JPEG/GIF/BMP/WebP).
        #[arg(long)]
        image: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SlotArg {
    Cpu,
    Gpu,
    Ram,
    Net,
}

impl From<SlotArg> for Slot {
    fn from(value: SlotArg) -> Self {
        match value {
            SlotArg::Cpu => Slot::Cpu,
            SlotArg::Gpu => Slot::Gpu,
            SlotArg::Ram => Slot::Ram,
            SlotArg::Net => Slot::Net,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level)).init();

    let upload = match cli.command {
        Some(Command::Upload { slot, image }) => Some(UploadRequest {
            slot: slot.into(),
            image_path: image,
        }),
        None => None,
    };

    let config = AppConfig {
        fixed_port: cli.port,
        baud_rate: cli.baud,
        log_level: cli.log_level,
        upload,
    };

    match &config.upload {
        Some(request) => scarab_monitor::run_upload(&config, request),
        None => scarab_monitor::run_daemon(&config),
    }
}
