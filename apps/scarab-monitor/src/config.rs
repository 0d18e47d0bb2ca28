// Author: Lukas Bower
// Purpose: Resolved runtime configuration for the scarab-monitor process.

use std::path::PathBuf;

use scarab_upload::Slot;

/// Resolved CLI configuration for one process run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Fixed port name, when the caller pinned one; `None` triggers
    /// enumerator-driven discovery.
    pub fixed_port: Option<String>,
    /// Baud rate to open the link at. Defaults to 115200; overridable for
    /// bench/test doubles that don't speak the real wire rate.
    pub baud_rate: u32,
    /// Log level passed to the logger at startup.
    pub log_level: String,
    /// Present when the process was invoked as a one-shot upload rather
    /// than the long-running telemetry daemon.
    pub upload: Option<UploadRequest>,
}

/// One-shot transcode+upload invocation (`scarab-monitor upload ...`).
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Target display slot on the device.
    pub slot: Slot,
    /// Path to the source raster image.
    pub image_path: PathBuf,
}
