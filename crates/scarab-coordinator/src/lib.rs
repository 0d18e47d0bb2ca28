// Author: Lukas Bower
// Purpose: Arbitrate exclusive link access between the telemetry framer and the upload engine.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Arbitrates the one shared serial link between the telemetry framer
//! and the upload engine, and exposes the command-passthrough path used
//! by color/identity changes.
//!
//! `paused` and `upload_mode` are the only pieces of authoritative shared
//! state; both are plain `Arc<AtomicBool>` so every owner (framer, upload
//! engine, coordinator itself) observes the same flag without a lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};
use scarab_link::{LinkError, SessionHandle};

/// RAII guard granting the upload engine exclusive link access; dropping it
/// (normally or via an early return/panic unwind) restores telemetry.
#[must_use = "dropping this guard immediately un-pauses telemetry"]
pub struct UploadGuard<'a> {
    coordinator: &'a Coordinator,
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.upload_mode.store(false, Ordering::SeqCst);
        self.coordinator.paused.store(false, Ordering::SeqCst);
        info!("upload mode released, telemetry resumed");
    }
}

/// Owns the authoritative `paused`/`upload_mode` flags and the session's
/// shared write endpoint.
pub struct Coordinator {
    port: scarab_link::SharedPort,
    paused: Arc<AtomicBool>,
    upload_mode: Arc<AtomicBool>,
}

impl Coordinator {
    /// Build a coordinator around a freshly connected session.
    #[must_use]
    pub fn new(session: &SessionHandle) -> Self {
        Self {
            port: session.shared_port(),
            paused: Arc::new(AtomicBool::new(false)),
            upload_mode: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The shared `paused` flag, handed to the telemetry framer so it can
    /// cooperatively suspend transmission during an upload.
    #[must_use]
    pub fn paused_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.paused)
    }

    /// The shared serial write endpoint, handed to the upload engine.
    #[must_use]
    pub fn shared_port(&self) -> scarab_link::SharedPort {
        Arc::clone(&self.port)
    }

    /// True while an upload holds exclusive link access.
    #[must_use]
    pub fn is_upload_mode(&self) -> bool {
        self.upload_mode.load(Ordering::SeqCst)
    }

    /// Grant the upload engine exclusive access: pauses telemetry and marks
    /// `upload_mode`. The returned guard restores both flags on drop,
    /// including on an early return or a panic unwind from the upload.
    pub fn begin_upload(&self) -> UploadGuard<'_> {
        self.upload_mode.store(true, Ordering::SeqCst);
        self.paused.store(true, Ordering::SeqCst);
        info!("upload mode granted, telemetry paused");
        UploadGuard { coordinator: self }
    }

    /// Proxy an opaque command line (color changes, identity renames, and
    /// similar passthrough commands) through the link. Rejected while
    /// telemetry is paused, since that window belongs to the upload engine.
    pub fn send_command(&self, text: &str) -> Result<(), CoordinatorError> {
        if self.paused.load(Ordering::SeqCst) {
            return Err(CoordinatorError::LinkPaused);
        }
        let mut owned = text.to_owned();
        if !owned.ends_with('\n') {
            owned.push('\n');
        }
        use std::io::Write;
        let mut port = self
            .port
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        port.write_all(owned.as_bytes())
            .and_then(|_| port.flush())
            .map_err(|err| CoordinatorError::Link(LinkError::WriteFailed(err.to_string())))
    }

    /// Clear both flags after the link is lost; the caller re-admits
    /// telemetry once a fresh session is established.
    pub fn on_link_lost(&self) {
        warn!("link lost; clearing paused/upload_mode flags");
        self.upload_mode.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }
}

/// Errors raised by the coordinator's command-passthrough path.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// `send_command` was called while telemetry (and thus the link) was paused.
    #[error("link is paused (upload in progress)")]
    LinkPaused,
    /// The underlying link write failed.
    #[error(transparent)]
    Link(#[from] LinkError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Read, Write};
    use std::time::Duration;

    /// Minimal in-memory stand-in for a real device, implementing the full
    /// `serialport::SerialPort` surface so it can be boxed as a [`SharedPort`]
    /// in tests without an attached device.
    #[derive(Default)]
    struct FakePort {
        written: Vec<u8>,
        timeout: Duration,
    }

    impl Read for FakePort {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "fake port has no data"))
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl serialport::SerialPort for FakePort {
        fn name(&self) -> Option<String> {
            Some("FAKE0".to_owned())
        }
        fn baud_rate(&self) -> serialport::Result<u32> {
            Ok(scarab_link::BAUD_RATE)
        }
        fn data_bits(&self) -> serialport::Result<serialport::DataBits> {
            Ok(serialport::DataBits::Eight)
        }
        fn flow_control(&self) -> serialport::Result<serialport::FlowControl> {
            Ok(serialport::FlowControl::None)
        }
        fn parity(&self) -> serialport::Result<serialport::Parity> {
            Ok(serialport::Parity::None)
        }
        fn stop_bits(&self) -> serialport::Result<serialport::StopBits> {
            Ok(serialport::StopBits::One)
        }
        fn timeout(&self) -> Duration {
            self.timeout
        }
        fn set_baud_rate(&mut self, _baud_rate: u32) -> serialport::Result<()> {
            Ok(())
        }
        fn set_data_bits(&mut self, _data_bits: serialport::DataBits) -> serialport::Result<()> {
            Ok(())
        }
        fn set_flow_control(&mut self, _flow_control: serialport::FlowControl) -> serialport::Result<()> {
            Ok(())
        }
        fn set_parity(&mut self, _parity: serialport::Parity) -> serialport::Result<()> {
            Ok(())
        }
        fn set_stop_bits(&mut self, _stop_bits: serialport::StopBits) -> serialport::Result<()> {
            Ok(())
        }
        fn set_timeout(&mut self, timeout: Duration) -> serialport::Result<()> {
            self.timeout = timeout;
            Ok(())
        }
        fn write_request_to_send(&mut self, _level: bool) -> serialport::Result<()> {
            Ok(())
        }
        fn write_data_terminal_ready(&mut self, _level: bool) -> serialport::Result<()> {
            Ok(())
        }
        fn read_clear_to_send(&mut self) -> serialport::Result<bool> {
            Ok(true)
        }
        fn read_data_set_ready(&mut self) -> serialport::Result<bool> {
            Ok(true)
        }
        fn read_ring_indicator(&mut self) -> serialport::Result<bool> {
            Ok(false)
        }
        fn read_carrier_detect(&mut self) -> serialport::Result<bool> {
            Ok(true)
        }
        fn bytes_to_read(&self) -> serialport::Result<u32> {
            Ok(0)
        }
        fn bytes_to_write(&self) -> serialport::Result<u32> {
            Ok(0)
        }
        fn clear(&self, _buffer_to_clear: serialport::ClearBuffer) -> serialport::Result<()> {
            Ok(())
        }
        fn try_clone(&self) -> serialport::Result<Box<dyn serialport::SerialPort>> {
            Err(serialport::Error::new(
                serialport::ErrorKind::NoDevice,
                "FakePort cannot be cloned",
            ))
        }
        fn set_break(&self) -> serialport::Result<()> {
            Ok(())
        }
        fn clear_break(&self) -> serialport::Result<()> {
            Ok(())
        }
    }

    fn fresh_coordinator() -> Coordinator {
        Coordinator {
            port: Arc::new(std::sync::Mutex::new(
                Box::new(FakePort::default()) as Box<dyn serialport::SerialPort>
            )),
            paused: Arc::new(AtomicBool::new(false)),
            upload_mode: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn begin_upload_sets_flags_and_drop_clears_them() {
        let coordinator = fresh_coordinator();
        {
            let _guard = coordinator.begin_upload();
            assert!(coordinator.is_upload_mode());
            assert!(coordinator.paused.load(Ordering::SeqCst));
        }
        assert!(!coordinator.is_upload_mode());
        assert!(!coordinator.paused.load(Ordering::SeqCst));
    }

    #[test]
    fn send_command_rejected_while_paused() {
        let coordinator = fresh_coordinator();
        let _guard = coordinator.begin_upload();
        let err = coordinator.send_command("SET_COLOR:FF0000").unwrap_err();
        assert!(matches!(err, CoordinatorError::LinkPaused));
    }

    #[test]
    fn send_command_succeeds_when_not_paused() {
        let coordinator = fresh_coordinator();
        coordinator.send_command("SET_COLOR:FF0000").unwrap();
    }

    #[test]
    fn on_link_lost_clears_flags() {
        let coordinator = fresh_coordinator();
        coordinator.upload_mode.store(true, Ordering::SeqCst);
        coordinator.paused.store(true, Ordering::SeqCst);
        coordinator.on_link_lost();
        assert!(!coordinator.is_upload_mode());
        assert!(!coordinator.paused.load(Ordering::SeqCst));
    }
}
