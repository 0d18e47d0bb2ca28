// Author: Lukas Bower
// Purpose: Own the serial link session end to end: discovery, handshake, identity sync, and reconnection.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Serial link manager: owns a single device session end to end — port
//! discovery, open, handshake, identity sync, and reconnection — and hands
//! out a [`SessionHandle`] that the telemetry framer and upload engine share
//! to write to the wire.
//!
//! `search_and_connect` makes one pass over the candidate ports (or retries a
//! single fixed port, when the caller pinned one) and never panics or lets an
//! I/O error escape: every failure degrades to [`ConnectOutcome::NotFound`] so
//! the caller's own retry loop — not this crate — owns the backoff between
//! scans.

pub mod error;
pub mod handshake;
pub mod state;
#[cfg(test)]
mod testutil;

pub use error::LinkError;
pub use state::{ConnectionState, DeviceSession};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, info, warn};
use scarab_cancel::CancelToken;
use scarab_identity::HardwareIdentity;
use scarab_ports::PortCandidate;
use serialport::SerialPort;

/// Baud rate fixed by the wire contract.
pub const BAUD_RATE: u32 = 115_200;
/// Read deadline applied while a candidate port is being dialed.
pub const READ_TIMEOUT: Duration = Duration::from_millis(200);
/// Settle delay observed after opening a port, before the handshake query.
pub const POST_OPEN_SETTLE: Duration = Duration::from_secs(1);
/// Backoff the caller's reconnect loop should wait between failed scans.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// A serial port boxed behind the trait object the `serialport` crate hands
/// back from `open()`, shared between the framer and the upload engine under
/// one write lock.
pub type SharedPort = Arc<Mutex<Box<dyn SerialPort>>>;

/// A live, handshaken session: the shared port plus its lifecycle state.
pub struct SessionHandle {
    port: SharedPort,
    session: DeviceSession,
}

impl SessionHandle {
    /// OS-level name of the port this session is bound to.
    #[must_use]
    pub fn port_name(&self) -> &str {
        &self.session.port_name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.session.state
    }

    /// 8-hex-char identity hash last reported by the remote peer.
    #[must_use]
    pub fn remote_identity_hash(&self) -> &str {
        &self.session.remote_identity_hash
    }

    /// The shared write endpoint, cloned for the telemetry framer or the
    /// upload engine to take turns writing through.
    #[must_use]
    pub fn shared_port(&self) -> SharedPort {
        Arc::clone(&self.port)
    }

    /// Mark the session `Streaming`, allowing telemetry/commands to flow.
    pub fn mark_streaming(&mut self) {
        self.session.transition(ConnectionState::Streaming);
    }

    /// Mark the session `Paused` (an upload holds exclusive link access).
    pub fn mark_paused(&mut self) {
        self.session.transition(ConnectionState::Paused);
    }

    /// Mark the session `Failed`; the caller should stop using this handle
    /// and invoke `search_and_connect` again.
    pub fn mark_failed(&mut self) {
        self.session.transition(ConnectionState::Failed);
    }

    /// Send a single command line, appending `\n` if the caller omitted it.
    ///
    /// Valid only in `Streaming` or `Paused` state.
    pub fn send_command(&mut self, line: &str) -> Result<(), LinkError> {
        if !self.session.state.is_streaming_or_paused() {
            return Err(LinkError::NotStreaming(self.session.state));
        }
        let mut owned = line.to_owned();
        if !owned.ends_with('\n') {
            owned.push('\n');
        }
        let mut port = self
            .port
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        port.write_all(owned.as_bytes())
            .map_err(|err| LinkError::WriteFailed(err.to_string()))?;
        port.flush()
            .map_err(|err| LinkError::WriteFailed(err.to_string()))?;
        self.session.touch();
        Ok(())
    }

    /// Idempotent teardown. Dropping the last clone of the shared port
    /// closes the underlying file descriptor, which unblocks any pending
    /// read in the response-reader thread.
    pub fn close(&mut self) {
        self.session.transition(ConnectionState::Closed);
    }
}

/// Outcome of one `search_and_connect` pass.
pub enum ConnectOutcome {
    /// A candidate opened, handshook, and (if needed) synced identity.
    Connected(SessionHandle),
    /// Every candidate was exhausted without a working handshake.
    NotFound,
    /// The caller's cancel token fired before a connection was established.
    Cancelled,
}

/// Owns the discovery/connect policy for one device: either a fixed port
/// pinned by the caller, or the full enumerator scan.
pub struct LinkManager {
    identity: HardwareIdentity,
    fixed_port: Option<String>,
    baud_rate: u32,
}

impl LinkManager {
    /// Build a manager for the given local hardware identity. `fixed_port`,
    /// when set, pins the scan to that single port name instead of running
    /// the enumerator. Opens every candidate at [`BAUD_RATE`].
    #[must_use]
    pub fn new(identity: HardwareIdentity, fixed_port: Option<String>) -> Self {
        Self::with_baud_rate(identity, fixed_port, BAUD_RATE)
    }

    /// As [`Self::new`], but opens every candidate at `baud_rate` instead of
    /// the wire-contract default. Exists for bench/test doubles that don't
    /// speak the real 115 200 bps link.
    #[must_use]
    pub fn with_baud_rate(identity: HardwareIdentity, fixed_port: Option<String>, baud_rate: u32) -> Self {
        Self {
            identity,
            fixed_port,
            baud_rate,
        }
    }

    /// Local hardware identity this manager syncs to the device.
    #[must_use]
    pub fn identity(&self) -> &HardwareIdentity {
        &self.identity
    }

    fn candidates(&self) -> Vec<PortCandidate> {
        match &self.fixed_port {
            Some(name) => vec![PortCandidate {
                name: name.clone(),
                description: None,
                skip: false,
                prefer: true,
            }],
            None => scarab_ports::enumerate(),
        }
    }

    /// Make one pass over the candidate ports, opening, settling, and
    /// handshaking each in turn. Returns on the first success; `NotFound`
    /// once every non-skipped candidate has been tried. No I/O error ever
    /// escapes as an exception — a failed candidate is simply skipped.
    pub fn search_and_connect(&self, cancel: &CancelToken) -> ConnectOutcome {
        for candidate in self.candidates() {
            if cancel.is_cancelled() {
                return ConnectOutcome::Cancelled;
            }
            if candidate.skip {
                debug!("skipping candidate {} (debug probe)", candidate.name);
                continue;
            }
            if let Some(handle) = self.try_candidate(&candidate.name, cancel) {
                return ConnectOutcome::Connected(handle);
            }
            if cancel.is_cancelled() {
                return ConnectOutcome::Cancelled;
            }
        }
        ConnectOutcome::NotFound
    }

    fn try_candidate(&self, name: &str, cancel: &CancelToken) -> Option<SessionHandle> {
        let mut port = serialport::new(name, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|err| debug!("open {name} failed: {err}"))
            .ok()?;
        if let Err(err) = port.write_data_terminal_ready(true) {
            debug!("dtr assert failed on {name}: {err}");
            return None;
        }

        if cancel.sleep(POST_OPEN_SETTLE) {
            return None;
        }

        let remote_hash = handshake::handshake(&mut port)?;
        let mut session = DeviceSession::new(name, self.baud_rate);
        session.transition(ConnectionState::Handshaking);
        session.remote_identity_hash = remote_hash.clone();

        if remote_hash != self.identity.identity_hash {
            session.transition(ConnectionState::Syncing);
            if let Err(err) = handshake::sync_identity_if_needed(&mut port, &self.identity, &remote_hash) {
                warn!("identity sync failed on {name}: {err}");
            }
        }

        session.transition(ConnectionState::Streaming);
        session.touch();
        info!(
            "connected to {name} (remote hash {}, local hash {})",
            session.remote_identity_hash, self.identity.identity_hash
        );
        Some(SessionHandle {
            port: Arc::new(Mutex::new(port)),
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_port_candidate_skips_enumeration() {
        let manager = LinkManager::new(
            HardwareIdentity::new("CPU", "GPU", scarab_identity::NetKind::Lan),
            Some("COM9".to_owned()),
        );
        let candidates = manager.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].name, "COM9");
        assert!(!candidates[0].skip);
    }
}
