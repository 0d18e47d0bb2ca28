// Author: Lukas Bower
// Purpose: Wire the serial link, telemetry, and upload crates into one process.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Host companion process for a four-display embedded hardware monitor.
//!
//! Three long-lived tasks cooperate over one serial link: a telemetry
//! sampler+framer, a link worker that owns discovery/handshake/reconnect,
//! and (only while an upload is in flight) a response reader borrowed by
//! the upload engine. The [`Coordinator`](scarab_coordinator::Coordinator)
//! arbitrates which of those may write at any moment.

pub mod config;

use std::io::Write;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use config::{AppConfig, UploadRequest};
use scarab_cancel::CancelToken;
use scarab_coordinator::Coordinator;
use scarab_identity::{HardwareIdentity, NetKind};
use scarab_link::{ConnectOutcome, LinkManager};
use scarab_telemetry::{CpuLoadSource, Framer, GpuSource, RamSource, Sampler};
use scarab_upload::{ProgressBroadcaster, UploadContext, UploadEvent, UploadOutcome};

/// Build the local hardware identity from whatever the OS will tell us.
/// No vendor/native sensor collaborator is wired in this binary, so
/// CPU/GPU names fall back to OS-reported or placeholder strings; the
/// identity hash is still exact for whatever names are resolved here.
#[must_use]
pub fn build_identity() -> HardwareIdentity {
    let mut system = sysinfo::System::new();
    system.refresh_cpu_usage();
    let cpu_name = system
        .cpus()
        .first()
        .map(|cpu| cpu.brand().trim().to_owned())
        .filter(|brand| !brand.is_empty())
        .unwrap_or_else(|| "Unknown CPU".to_owned());
    let gpu_name = "Unknown GPU".to_owned();
    let net_kind = probe_net_kind();
    HardwareIdentity::new(cpu_name, gpu_name, net_kind)
}

fn probe_net_kind() -> NetKind {
    let mut os = scarab_telemetry::OsCounters::new();
    std::thread::sleep(Duration::from_millis(50));
    os.net_reading().map(|reading| reading.kind).unwrap_or(NetKind::Lan)
}

/// Run the long-lived telemetry daemon: connect, sync identity, and stream
/// telemetry at 1 Hz until the process is killed. Reconnects on link loss
/// with a fixed backoff.
pub fn run_daemon(config: &AppConfig) -> Result<()> {
    let identity = build_identity();
    info!(
        "local identity: cpu={} gpu={} hash={}",
        identity.cpu_name, identity.gpu_name, identity.identity_hash
    );
    let manager = LinkManager::with_baud_rate(identity, config.fixed_port.clone(), config.baud_rate);
    let cancel = CancelToken::new();

    loop {
        info!("searching for device...");
        let session = match manager.search_and_connect(&cancel) {
            ConnectOutcome::Connected(session) => session,
            ConnectOutcome::NotFound => {
                warn!("no candidate port handshook; retrying in {:?}", scarab_link::RECONNECT_BACKOFF);
                if cancel.sleep(scarab_link::RECONNECT_BACKOFF) {
                    return Ok(());
                }
                continue;
            }
            ConnectOutcome::Cancelled => return Ok(()),
        };
        info!("connected to {}", session.port_name());

        let coordinator = Coordinator::new(&session);
        let framer = Framer::new(coordinator.paused_flag());
        let mut sampler = Sampler::new(CpuLoadSource::OsCounter, GpuSource::None, RamSource::Os);
        let mut sink = coordinator.shared_port();

        let result = framer.run(&mut SharedPortWriter(&mut sink), &cancel, || sampler.sample());
        coordinator.on_link_lost();
        match result {
            Ok(()) => return Ok(()),
            Err(err) => warn!("telemetry session ended: {err}"),
        }

        if cancel.sleep(scarab_link::RECONNECT_BACKOFF) {
            return Ok(());
        }
    }
}

/// One-shot transcode+upload invocation: connect, grant the upload engine
/// exclusive link access, transcode the source image, and drive the
/// chunked upload to completion (or failure).
pub fn run_upload(config: &AppConfig, request: &UploadRequest) -> Result<()> {
    let identity = build_identity();
    let manager = LinkManager::with_baud_rate(identity, config.fixed_port.clone(), config.baud_rate);
    let cancel = CancelToken::new();

    let session = match manager.search_and_connect(&cancel) {
        ConnectOutcome::Connected(session) => session,
        ConnectOutcome::NotFound => bail!("no device found to upload to"),
        ConnectOutcome::Cancelled => bail!("cancelled before a device was found"),
    };
    info!("connected to {} for upload", session.port_name());

    let artifact = scarab_image::transcode_path(&request.image_path)
        .with_context(|| format!("transcode {}", request.image_path.display()))?;

    let coordinator = Coordinator::new(&session);
    let _guard = coordinator.begin_upload();
    let mut port = coordinator.shared_port();
    let mut ctx = UploadContext::new(request.slot, artifact.bytes().len());
    let broadcaster = ProgressBroadcaster::new();
    let progress = broadcaster.subscribe();

    let reporter = std::thread::spawn(move || {
        while let Ok(event) = progress.recv() {
            match event {
                UploadEvent::Progress(update) => info!(
                    "upload progress: {}/{} bytes ({}%)",
                    update.bytes_sent, update.total_bytes, update.percent
                ),
                UploadEvent::Terminal(terminal) => {
                    info!("upload terminal state: {terminal:?}");
                    break;
                }
            }
        }
    });

    let outcome = {
        let mut guard = port.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        scarab_upload::upload(
            &mut *guard,
            &mut ctx,
            artifact.bytes(),
            &artifact.crc32_hex(),
            &cancel,
            &broadcaster,
        )
    };
    drop(port);
    let _ = reporter.join();

    match outcome {
        UploadOutcome::Complete => {
            info!("upload complete");
            Ok(())
        }
        UploadOutcome::Failed(err) => bail!("upload failed: {err}"),
        UploadOutcome::Cancelled => bail!("upload cancelled"),
    }
}

/// Adapter so [`Framer::run`] can write through the coordinator's shared,
/// lock-guarded port without the framer needing to know about the lock.
struct SharedPortWriter<'a>(&'a mut scarab_link::SharedPort);

impl Write for SharedPortWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .flush()
    }
}
