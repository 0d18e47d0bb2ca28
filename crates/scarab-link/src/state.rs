// Author: Lukas Bower
// Purpose: Define the device session lifecycle state machine owned by the link manager.
use std::time::Instant;

/// Lifecycle state of one device session, owned by the link manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Scanning candidate ports for a responding device.
    Searching,
    /// A candidate port is open; handshake not yet attempted.
    Opening,
    /// `WHO_ARE_YOU?` sent, awaiting `SCARAB_CLIENT_OK`.
    Handshaking,
    /// Remote identity hash diverged; `NAME_*` lines are being pushed.
    Syncing,
    /// Telemetry/commands may flow.
    Streaming,
    /// Telemetry is cooperatively suspended (e.g. an upload is in progress).
    Paused,
    /// The session hit an unrecoverable I/O error; reconnection is pending.
    Failed,
    /// The session was closed explicitly and will not be reused.
    Closed,
}

impl ConnectionState {
    /// True once commands may be sent over the link.
    #[must_use]
    pub fn is_streaming_or_paused(self) -> bool {
        matches!(self, ConnectionState::Streaming | ConnectionState::Paused)
    }

    /// True when the state is a dead end that requires a fresh `search_and_connect`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

/// Mutable record of one open (or recently open) device session.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    /// OS-level serial port name this session is bound to.
    pub port_name: String,
    /// Baud rate this session was opened at (115200 by default).
    pub baud: u32,
    /// DTR is asserted at open so the device resets into a known state.
    pub data_terminal_ready: bool,
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// 8-hex-char identity hash last reported by the remote peer.
    pub remote_identity_hash: String,
    /// Timestamp of the last successful read or write on this session.
    pub last_good: Instant,
}

impl DeviceSession {
    /// Construct a freshly opened session, state `Opening`.
    #[must_use]
    pub fn new(port_name: impl Into<String>, baud: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud,
            data_terminal_ready: true,
            state: ConnectionState::Opening,
            remote_identity_hash: scarab_identity::LEGACY_REMOTE_HASH.to_owned(),
            last_good: Instant::now(),
        }
    }

    pub(crate) fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            log::debug!("session[{}]: {:?} -> {:?}", self.port_name, self.state, next);
            self.state = next;
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_good = Instant::now();
    }
}
