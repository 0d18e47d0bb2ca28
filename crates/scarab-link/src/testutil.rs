// Author: Lukas Bower
// Purpose: Provide an in-memory Read+Write loopback double for handshake and manager unit tests.

//! In-memory `Read + Write` double standing in for a real serial port.
//!
//! Used by the handshake and manager unit tests so reconnect and identity
//! sync can be exercised without an actual device attached.

#![cfg(test)]

use std::io::{self, Read, Write};

/// A scripted duplex port: reads drain a canned response, writes accumulate.
pub struct LoopbackPort {
    response: Vec<u8>,
    read_pos: usize,
    written: Vec<u8>,
}

impl LoopbackPort {
    /// Build a port that will yield `response` byte-for-byte on read.
    pub fn with_response(response: &[u8]) -> Self {
        Self {
            response: response.to_vec(),
            read_pos: 0,
            written: Vec::new(),
        }
    }

    /// Everything written to the port so far, as UTF-8.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// The first line written to the port, with no trailing newline.
    pub fn written_line(&self) -> String {
        self.written().lines().next().unwrap_or_default().to_owned()
    }
}

impl Read for LoopbackPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_pos >= self.response.len() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "loopback exhausted"));
        }
        let remaining = &self.response[self.read_pos..];
        let n = remaining.len().min(buf.len()).max(1).min(remaining.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl Write for LoopbackPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
