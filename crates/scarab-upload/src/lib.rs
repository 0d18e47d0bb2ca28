// Author: Lukas Bower
// Purpose: Drive the chunked IMG_BEGIN/IMG_DATA/IMG_END/IMG_ABORT upload protocol over a borrowed link.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Client half of the chunked `IMG_BEGIN`/`IMG_DATA`/`IMG_END`/`IMG_ABORT`
//! upload protocol. Drives one image artifact across a borrowed link with
//! per-chunk retry, offset discipline, and cooperative cancellation; never
//! leaves the device hanging mid-transfer as long as the link is writable.

pub mod progress;

pub use progress::{ProgressBroadcaster, UploadEvent, UploadProgress, UploadTerminal};

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use log::{debug, warn};
use scarab_cancel::CancelToken;
use thiserror::Error;

/// Raw bytes per `IMG_DATA` chunk (1024 hex characters on the wire).
pub const CHUNK_SIZE: usize = 512;
/// Deadline for any single command's acknowledgement.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Maximum retry attempts per chunk before the upload is aborted.
pub const MAX_RETRIES: usize = 3;
/// Pacing delay observed between acknowledged chunks.
pub const INTER_CHUNK_DELAY: Duration = Duration::from_millis(5);
/// Delay observed after a failed attempt, before retrying the same chunk.
pub const POST_RETRY_DELAY: Duration = Duration::from_millis(100);

const PREFIX_ERR: &str = "IMG_ERR";
const PREFIX_OK_BEGIN: &str = "IMG_OK:BEGIN";
const PREFIX_OK_DATA: &str = "IMG_OK:DATA";
const PREFIX_OK_END: &str = "IMG_OK:END";
const PREFIX_OK_COMPLETE: &str = "IMG_OK:COMPLETE";

/// One of the four fixed image targets on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// CPU display slot.
    Cpu = 0,
    /// GPU display slot.
    Gpu = 1,
    /// RAM display slot.
    Ram = 2,
    /// Network display slot.
    Net = 3,
}

/// Errors raised while driving one upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A serial read failed during the upload; the session typically survives.
    #[error("serial read failed: {0}")]
    ReadFailed(String),
    /// A serial write failed; the upload cannot continue.
    #[error("serial write failed: {0}")]
    WriteFailed(String),
    /// `IMG_BEGIN` was rejected by the device.
    #[error("IMG_BEGIN rejected by device")]
    BeginRejected,
    /// No `IMG_OK:BEGIN` arrived within the response deadline.
    #[error("IMG_BEGIN acknowledgement timed out")]
    BeginTimeout,
    /// A chunk was rejected (`IMG_ERR`) on its final retry attempt.
    #[error("chunk rejected by device")]
    ChunkRejected,
    /// A chunk's acknowledgement timed out on its final retry attempt.
    #[error("chunk acknowledgement timed out")]
    ChunkTimeout,
    /// All `MAX_RETRIES` attempts for one chunk were exhausted.
    #[error("chunk retries exhausted after {0} attempts")]
    ChunkRetriesExhausted(usize),
    /// `IMG_END` was rejected; the upload must restart from scratch.
    #[error("IMG_END rejected (crc mismatch)")]
    CrcMismatch,
    /// No terminal response to `IMG_END` arrived within the deadline.
    #[error("IMG_END acknowledgement timed out")]
    EndTimeout,
    /// The cooperative cancel token fired mid-upload.
    #[error("upload cancelled")]
    Cancelled,
}

/// Terminal outcome of one `upload()` call.
#[derive(Debug)]
pub enum UploadOutcome {
    /// The device acknowledged `IMG_END`.
    Complete,
    /// The upload failed; no further frames were sent for it.
    Failed(UploadError),
    /// The upload was cancelled cooperatively.
    Cancelled,
}

/// Mutable state for the one upload in flight on this link.
#[derive(Debug, Clone)]
pub struct UploadContext {
    /// Target slot on the device.
    pub slot: Slot,
    /// Total artifact length in bytes.
    pub total_bytes: usize,
    /// Bytes acknowledged so far; advances only after each chunk's ack.
    pub cursor: usize,
    /// Chunks acknowledged so far.
    pub chunk_index: usize,
    /// Last percentage reported to subscribers, to avoid redundant events.
    pub last_reported_percent: u8,
}

impl UploadContext {
    /// Start a fresh context for `slot` and `total_bytes`.
    #[must_use]
    pub fn new(slot: Slot, total_bytes: usize) -> Self {
        Self {
            slot,
            total_bytes,
            cursor: 0,
            chunk_index: 0,
            last_reported_percent: 0,
        }
    }

    fn total_chunks(&self) -> usize {
        self.total_bytes.div_ceil(CHUNK_SIZE)
    }
}

/// Drives the chunked upload of `artifact` (already CRC'd by
/// [`scarab_image`](https://docs.rs/scarab-image)) over `port`, reporting
/// progress to `broadcaster` and honoring `cancel`.
pub fn upload<T: Read + Write>(
    port: &mut T,
    ctx: &mut UploadContext,
    artifact: &[u8],
    crc32_hex: &str,
    cancel: &CancelToken,
    broadcaster: &ProgressBroadcaster,
) -> UploadOutcome {
    let mut reader = LineReader::default();

    if cancel.is_cancelled() {
        return finish(UploadOutcome::Cancelled, broadcaster);
    }

    if let Err(err) = send_line(port, &format!("IMG_BEGIN:{}:{}", ctx.slot as u8, ctx.total_bytes)) {
        return finish(UploadOutcome::Failed(err), broadcaster);
    }
    match await_one_of(port, &mut reader, &[PREFIX_OK_BEGIN]) {
        Ack::Ok => {}
        Ack::Err => return finish(abort(port, UploadOutcome::Failed(UploadError::BeginRejected)), broadcaster),
        Ack::Timeout => return finish(abort(port, UploadOutcome::Failed(UploadError::BeginTimeout)), broadcaster),
        Ack::ReadFailed(err) => return finish(abort(port, UploadOutcome::Failed(err)), broadcaster),
    }

    while ctx.cursor < ctx.total_bytes {
        if cancel.is_cancelled() {
            return finish(abort(port, UploadOutcome::Cancelled), broadcaster);
        }

        let end = (ctx.cursor + CHUNK_SIZE).min(ctx.total_bytes);
        let chunk = &artifact[ctx.cursor..end];
        let line = format!("IMG_DATA:{}:{}", ctx.cursor, hex::encode_upper(chunk));

        let mut last_err = UploadError::ChunkTimeout;
        let mut acked = false;
        for attempt in 1..=MAX_RETRIES {
            if cancel.is_cancelled() {
                return finish(abort(port, UploadOutcome::Cancelled), broadcaster);
            }
            if let Err(err) = send_line(port, &line) {
                return finish(abort(port, UploadOutcome::Failed(err)), broadcaster);
            }
            match await_one_of(port, &mut reader, &[PREFIX_OK_DATA]) {
                Ack::Ok => {
                    acked = true;
                    break;
                }
                Ack::Err => {
                    last_err = UploadError::ChunkRejected;
                    debug!("chunk at offset {} rejected (attempt {attempt}/{MAX_RETRIES})", ctx.cursor);
                }
                Ack::Timeout => {
                    last_err = UploadError::ChunkTimeout;
                    debug!("chunk at offset {} timed out (attempt {attempt}/{MAX_RETRIES})", ctx.cursor);
                }
                Ack::ReadFailed(err) => return finish(abort(port, UploadOutcome::Failed(err)), broadcaster),
            }
            if attempt < MAX_RETRIES && cancel.sleep(POST_RETRY_DELAY) {
                return finish(abort(port, UploadOutcome::Cancelled), broadcaster);
            }
        }

        if !acked {
            warn!("chunk at offset {} failed after {MAX_RETRIES} attempts: {last_err}", ctx.cursor);
            let _ = last_err;
            return finish(
                abort(port, UploadOutcome::Failed(UploadError::ChunkRetriesExhausted(MAX_RETRIES))),
                broadcaster,
            );
        }

        ctx.cursor = end;
        ctx.chunk_index += 1;
        report_progress(ctx, broadcaster);

        if cancel.sleep(INTER_CHUNK_DELAY) {
            return finish(abort(port, UploadOutcome::Cancelled), broadcaster);
        }
    }

    if let Err(err) = send_line(port, &format!("IMG_END:{crc32_hex}")) {
        return finish(UploadOutcome::Failed(err), broadcaster);
    }
    let outcome = match await_one_of(port, &mut reader, &[PREFIX_OK_END, PREFIX_OK_COMPLETE]) {
        Ack::Ok => UploadOutcome::Complete,
        Ack::Err => UploadOutcome::Failed(UploadError::CrcMismatch),
        Ack::Timeout => UploadOutcome::Failed(UploadError::EndTimeout),
        Ack::ReadFailed(err) => UploadOutcome::Failed(err),
    };
    finish(outcome, broadcaster)
}

fn report_progress(ctx: &mut UploadContext, broadcaster: &ProgressBroadcaster) {
    let total_chunks = ctx.total_chunks();
    let percent = ((ctx.cursor as u64 * 100) / ctx.total_bytes.max(1) as u64) as u8;
    ctx.last_reported_percent = percent;
    broadcaster.publish(UploadEvent::Progress(UploadProgress {
        bytes_sent: ctx.cursor,
        total_bytes: ctx.total_bytes,
        chunks_sent: ctx.chunk_index,
        total_chunks,
        percent,
    }));
}

/// Publish the terminal event matching `outcome` to every subscriber, then
/// return `outcome` unchanged. Called at every exit point of [`upload`] so
/// the broadcast channel always carries the final state, per the upload
/// engine's progress-reporting contract (`"Complete!"`/`"Failed"`/
/// `"Cancelled"` observed by the subscriber, not just returned to the caller).
fn finish(outcome: UploadOutcome, broadcaster: &ProgressBroadcaster) -> UploadOutcome {
    let terminal = match &outcome {
        UploadOutcome::Complete => UploadTerminal::Complete,
        UploadOutcome::Failed(_) => UploadTerminal::Failed,
        UploadOutcome::Cancelled => UploadTerminal::Cancelled,
    };
    broadcaster.publish(UploadEvent::Terminal(terminal));
    outcome
}

/// Fire `IMG_ABORT` best-effort (write errors are swallowed; the upload is
/// already failing) and return `outcome` unchanged.
fn abort<T: Write>(port: &mut T, outcome: UploadOutcome) -> UploadOutcome {
    let _ = port.write_all(b"IMG_ABORT\n").and_then(|_| port.flush());
    outcome
}

fn send_line<T: Write>(port: &mut T, line: &str) -> Result<(), UploadError> {
    port.write_all(line.as_bytes())
        .and_then(|_| port.write_all(b"\n"))
        .and_then(|_| port.flush())
        .map_err(|err| UploadError::WriteFailed(err.to_string()))
}

enum Ack {
    Ok,
    Err,
    Timeout,
    ReadFailed(UploadError),
}

/// Accumulates bytes across calls to `read()` so a line response that
/// straddles two reads (or a read that returns more than one line) is
/// handled correctly. Does not itself hold a borrow of the port, since the
/// same `&mut T` is also needed for writes between response waits.
#[derive(Default)]
struct LineReader {
    leftover: Vec<u8>,
}

impl LineReader {
    fn next_line<T: Read>(&mut self, port: &mut T, deadline: Instant) -> Result<Option<String>, UploadError> {
        loop {
            if let Some(pos) = self.leftover.iter().position(|&b| b == b'\n' || b == b'\r') {
                let line: Vec<u8> = self.leftover.drain(..=pos).collect();
                while matches!(self.leftover.first(), Some(b'\n') | Some(b'\r')) {
                    self.leftover.remove(0);
                }
                let text = String::from_utf8_lossy(&line[..line.len() - 1]).trim().to_owned();
                if !text.is_empty() {
                    return Ok(Some(text));
                }
                continue;
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            let mut buf = [0u8; 256];
            match port.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => self.leftover.extend_from_slice(&buf[..n]),
                Err(err) if matches!(err.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) => {}
                Err(err) => return Err(UploadError::ReadFailed(err.to_string())),
            }
        }
    }
}

fn await_one_of<T: Read>(port: &mut T, reader: &mut LineReader, ok_prefixes: &[&str]) -> Ack {
    let deadline = Instant::now() + RESPONSE_TIMEOUT;
    loop {
        match reader.next_line(port, deadline) {
            Ok(Some(line)) => {
                if line.starts_with(PREFIX_ERR) {
                    return Ack::Err;
                }
                if ok_prefixes.iter().any(|prefix| line.starts_with(prefix)) {
                    return Ack::Ok;
                }
                debug!("ignoring unexpected line during upload: {line}");
            }
            Ok(None) => return Ack::Timeout,
            Err(err) => return Ack::ReadFailed(err),
        }
    }
}
