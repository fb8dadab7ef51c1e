//! Length-prefixed frame reassembly.
//!
//! Every frame on the wire starts with a 4-byte header:
//!
//! ```text
//! ┌─────────┬──────────┬──────────────────────┐
//! │ version │ checksum │ total length (u16 LE)│
//! │  1 byte │  1 byte  │       2 bytes        │
//! └─────────┴──────────┴──────────────────────┘
//! ```
//!
//! The length counts the header itself, so a frame is never shorter than
//! [`FRAME_HEADER_LEN`]. TCP hands us arbitrary chunks; [`FrameAssembler`]
//! buffers them and cuts out complete frames.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use crate::{FrameError, TransportError};

/// Size of the frame header in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest frame the 16-bit length field can describe.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Default assembler capacity: one maximal frame plus one read chunk.
pub const DEFAULT_BUFFER_CAPACITY: usize = MAX_FRAME_LEN + READ_CHUNK_LEN;

const READ_CHUNK_LEN: usize = 16 * 1024;

/// Reads the declared total length from a frame header.
///
/// Returns `None` when fewer than [`FRAME_HEADER_LEN`] bytes are given.
pub fn declared_len(header: &[u8]) -> Option<usize> {
    if header.len() < FRAME_HEADER_LEN {
        return None;
    }
    Some(u16::from_le_bytes([header[2], header[3]]) as usize)
}

/// Reassembles a byte stream into discrete frames.
#[derive(Debug)]
pub struct FrameAssembler {
    buf: Vec<u8>,
    capacity: usize,
}

impl FrameAssembler {
    /// Creates an assembler with [`DEFAULT_BUFFER_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Creates an assembler that refuses to buffer more than `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(DEFAULT_BUFFER_CAPACITY)),
            capacity,
        }
    }

    /// Appends newly received bytes.
    ///
    /// # Errors
    /// [`FrameError::Overflow`] if the buffer would grow past its capacity.
    /// Nothing is appended in that case.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), FrameError> {
        let buffered = self.buf.len() + chunk.len();
        if buffered > self.capacity {
            return Err(FrameError::Overflow {
                buffered,
                capacity: self.capacity,
            });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    /// Cuts the next complete frame off the front of the buffer.
    ///
    /// Returns `Ok(None)` while the buffered bytes do not yet hold a full
    /// frame. Remaining bytes are compacted to the front.
    ///
    /// # Errors
    /// [`FrameError::InvalidLength`] if the header declares fewer bytes than
    /// the header occupies.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(len) = declared_len(&self.buf) else {
            return Ok(None);
        };
        if len < FRAME_HEADER_LEN {
            return Err(FrameError::InvalidLength(len));
        }
        if self.buf.len() < len {
            return Ok(None);
        }
        let rest = self.buf.split_off(len);
        let frame = std::mem::replace(&mut self.buf, rest);
        Ok(Some(frame))
    }

    /// Appends a chunk and drains every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        self.push(chunk)?;
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards any partially received frame.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Why [`pump_frames`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// The peer closed the stream.
    Eof,
    /// Nobody is consuming frames anymore.
    ReceiverClosed,
}

/// Reads `reader` until EOF, forwarding complete frames to `frames`.
///
/// The send is awaited, so a slow consumer applies backpressure to the
/// socket instead of growing the buffer.
///
/// # Errors
/// [`TransportError::ReceiveFailed`] on a read error and
/// [`TransportError::Frame`] when the stream desyncs.
pub async fn pump_frames<R>(
    mut reader: R,
    frames: mpsc::Sender<Vec<u8>>,
) -> Result<PumpExit, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut assembler = FrameAssembler::new();
    let mut chunk = vec![0u8; READ_CHUNK_LEN];

    loop {
        let n = reader
            .read(&mut chunk)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            if assembler.buffered() > 0 {
                tracing::debug!(
                    buffered = assembler.buffered(),
                    "stream closed with a partial frame"
                );
            }
            return Ok(PumpExit::Eof);
        }

        for frame in assembler.feed(&chunk[..n])? {
            tracing::trace!(len = frame.len(), "frame assembled");
            if frames.send(frame).await.is_err() {
                return Ok(PumpExit::ReceiverClosed);
            }
        }
    }
}
