// Author: Lukas Bower
// Purpose: Format telemetry snapshots into the canonical wire line and pace transmission at 1 Hz.
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use scarab_cancel::CancelToken;
use thiserror::Error;

use crate::snapshot::Snapshot;

/// Cadence between telemetry lines.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(1_000);

/// Render a snapshot to the canonical wire line (no trailing allocation
/// beyond the `String` itself; includes the terminating `\n`).
///
/// Every numeric field is either a locale-independent signed integer or
/// fixed to exactly one fractional digit.
#[must_use]
pub fn format_telemetry_line(snapshot: &Snapshot) -> String {
    format!(
        "CPU:{},CPUT:{:.1},GPU:{},GPUT:{:.1},VRAM:{:.1}/{:.1},RAM:{:.1}/{:.1},NET:{},SPEED:{} Mbps,DOWN:{:.1},UP:{:.1}\n",
        snapshot.cpu_load,
        snapshot.cpu_temp,
        snapshot.gpu_load,
        snapshot.gpu_temp,
        snapshot.gpu_vram_used_gb,
        snapshot.gpu_vram_total_gb,
        snapshot.ram_used_gb,
        snapshot.ram_total_gb,
        snapshot.net_kind,
        snapshot.net_link_mbps,
        snapshot.net_down_mbps,
        snapshot.net_up_mbps,
    )
}

/// Error surfaced when the framer's write to the link fails.
#[derive(Debug, Error)]
pub enum FramerError {
    /// The underlying link write (or flush) failed; the caller should
    /// abandon the session rather than queue the line for later.
    #[error("telemetry write failed: {0}")]
    WriteFailed(String),
}

/// Paces and transmits telemetry lines over a shared writer.
pub struct Framer {
    paused: Arc<AtomicBool>,
}

impl Framer {
    /// Build a framer gated by the coordinator's shared `paused` flag.
    #[must_use]
    pub fn new(paused: Arc<AtomicBool>) -> Self {
        Self { paused }
    }

    /// Run the 1 Hz sample/format/send loop until cancelled or a write
    /// fails. `sink` is typically the link's shared port; `sample_fn` is
    /// usually [`crate::Sampler::sample`].
    pub fn run<W: Write>(
        &self,
        sink: &mut W,
        cancel: &CancelToken,
        mut sample_fn: impl FnMut() -> Snapshot,
    ) -> Result<(), FramerError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            while self.paused.load(Ordering::SeqCst) {
                if cancel.sleep(scarab_cancel::POLL_INTERVAL) {
                    return Ok(());
                }
            }

            let line = format_telemetry_line(&sample_fn());
            if let Err(err) = sink.write_all(line.as_bytes()).and_then(|_| sink.flush()) {
                warn!("telemetry write failed, abandoning session: {err}");
                return Err(FramerError::WriteFailed(err.to_string()));
            }

            if cancel.sleep(SAMPLE_INTERVAL) {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scarab_identity::NetKind;

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            cpu_load: 37,
            cpu_temp: 54.0,
            gpu_load: 12,
            gpu_temp: 41.5,
            gpu_vram_used_gb: 2.1,
            gpu_vram_total_gb: 8.0,
            ram_used_gb: 6.4,
            ram_total_gb: 16.0,
            net_down_mbps: 0.8,
            net_up_mbps: 0.1,
            net_kind: NetKind::Lan,
            net_link_mbps: 1000,
        }
    }

    #[test]
    fn formats_all_fields_exactly() {
        let line = format_telemetry_line(&sample_snapshot());
        assert_eq!(
            line,
            "CPU:37,CPUT:54.0,GPU:12,GPUT:41.5,VRAM:2.1/8.0,RAM:6.4/16.0,NET:LAN,SPEED:1000 Mbps,DOWN:0.8,UP:0.1\n"
        );
    }

    #[test]
    fn negative_sentinels_round_trip_in_the_line() {
        let mut snap = sample_snapshot();
        snap.cpu_temp = -1.0;
        snap.gpu_load = -1;
        let line = format_telemetry_line(&snap);
        assert!(line.contains("CPUT:-1.0"));
        assert!(line.contains("GPU:-1,"));
    }

    #[test]
    fn run_stops_immediately_when_already_cancelled() {
        let framer = Framer::new(Arc::new(AtomicBool::new(false)));
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = Vec::new();
        let result = framer.run(&mut sink, &cancel, sample_snapshot);
        assert!(result.is_ok());
        assert!(sink.is_empty());
    }

    #[test]
    fn run_sends_one_line_then_honors_cancel_during_pacing_sleep() {
        let framer = Framer::new(Arc::new(AtomicBool::new(false)));
        let cancel = CancelToken::new();
        let cancel_clone = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            cancel_clone.cancel();
        });
        let mut sink = Vec::new();
        let result = framer.run(&mut sink, &cancel, sample_snapshot);
        assert!(result.is_ok());
        assert_eq!(sink, format_telemetry_line(&sample_snapshot()).into_bytes());
    }
}
