//! # Length-Prefixed Framing
//!
//! Every message on every link — seed-to-seed, peer-to-seed, peer-to-peer —
//! is a 4-byte big-endian length prefix followed by that many bytes of UTF-8
//! JSON. There is no magic number, no version byte: the wire format is
//! deliberately this small.

use std::collections::VecDeque;
use std::time::Instant;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::message::Message;
use crate::config::{MAX_FRAME_LEN, MAX_PROTOCOL_VIOLATIONS, PROTOCOL_VIOLATION_WINDOW};

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("connection closed while reading frame")]
    Closed,

    #[error("frame length {0} exceeds the {1} byte limit")]
    TooLarge(u32, u32),

    #[error("frame payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("frame payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("frame is missing a \"type\" field")]
    MissingType,

    #[error("frame of type {0} has an invalid payload: {1}")]
    InvalidPayload(String, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// `true` for a malformed-but-readable frame (bad length, bad JSON, a
    /// missing or unparseable field) as opposed to the link itself going
    /// away (`Closed`, `Io`). Only the former is worth tolerating a few of
    /// before giving up on the link.
    fn is_recoverable(&self) -> bool {
        !matches!(self, FrameError::Closed | FrameError::Io(_))
    }
}

/// Counts malformed frames on one link within a trailing time window and
/// says when the link has earned a drop. A single bad frame is logged and
/// skipped; only a burst of them indicates a peer worth giving up on.
#[derive(Default)]
pub struct ViolationTracker {
    occurrences: VecDeque<Instant>,
}

impl ViolationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `err`. Returns `true` once the link should be dropped:
    /// either the error is unrecoverable on its own, or this is the
    /// `MAX_PROTOCOL_VIOLATIONS`-th recoverable violation inside
    /// `PROTOCOL_VIOLATION_WINDOW`.
    pub fn observe(&mut self, err: &FrameError) -> bool {
        if !err.is_recoverable() {
            return true;
        }

        let now = Instant::now();
        while let Some(&front) = self.occurrences.front() {
            if now.duration_since(front) > PROTOCOL_VIOLATION_WINDOW {
                self.occurrences.pop_front();
            } else {
                break;
            }
        }
        self.occurrences.push_back(now);
        self.occurrences.len() as u32 > MAX_PROTOCOL_VIOLATIONS
    }
}

/// Reads one length-prefixed frame and decodes it as a [`Message`].
///
/// Returns `Ok(None)` on a clean EOF that occurs before any bytes of a new
/// frame have been read — the normal way a link closes between messages.
/// An EOF in the middle of a frame is a [`FrameError::Closed`].
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Message>, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(len, MAX_FRAME_LEN));
    }

    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => FrameError::Closed,
            _ => FrameError::Io(e),
        })?;

    let text = std::str::from_utf8(&payload)?;
    let value: serde_json::Value = serde_json::from_str(text)?;
    Message::from_json(value).map(Some)
}

/// Encodes `message` and writes it as one length-prefixed frame.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), FrameError> {
    let bytes = serde_json::to_vec(&message.to_json())?;
    if bytes.len() > MAX_FRAME_LEN as usize {
        return Err(FrameError::TooLarge(bytes.len() as u32, MAX_FRAME_LEN));
    }
    let len = (bytes.len() as u32).to_be_bytes();
    writer.write_all(&len).await?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
