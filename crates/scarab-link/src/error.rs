// Author: Lukas Bower
// Purpose: Define the tagged error variants surfaced by the serial link manager.
use thiserror::Error;

/// Errors surfaced by the serial link manager.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The OS denied serial port enumeration.
    #[error("serial port enumeration failed")]
    PortEnumerationFailed,
    /// Another process already owns the candidate port.
    #[error("port busy: {0}")]
    PortBusy(String),
    /// No `SCARAB_CLIENT_OK` response arrived within the handshake deadline.
    #[error("handshake timed out on {0}")]
    HandshakeTimeout(String),
    /// A serial write failed; the session must be torn down.
    #[error("serial write failed: {0}")]
    WriteFailed(String),
    /// A serial read failed.
    #[error("serial read failed: {0}")]
    ReadFailed(String),
    /// No candidate port produced a working handshake during the scan.
    #[error("no scarab device found")]
    NotFound,
    /// The caller's cancel token fired before a connection was established.
    #[error("connection attempt cancelled")]
    Cancelled,
    /// `send_command` was called outside Streaming/Paused state.
    #[error("command rejected: link is not streaming (state: {0:?})")]
    NotStreaming(crate::state::ConnectionState),
}
