use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: body length (2, big-endian).
pub const HEADER_SIZE: usize = 2;

/// Largest body the 16-bit length prefix can describe.
pub const MAX_BODY_LEN: usize = u16::MAX as usize;

/// A single decoded message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The raw message body.
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    /// An empty frame (length prefix `0`, no body).
    pub fn empty() -> Self {
        Self { body: Bytes::new() }
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Returns true if the frame carries no body bytes.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Encode a body into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬─────────────────────┐
/// │ Length (2B)  │ Body                │
/// │ big-endian   │ (Length bytes)      │
/// └──────────────┴─────────────────────┘
/// ```
///
/// A missing body is encoded as an empty frame. Header and body are appended
/// to `dst` together so the caller can hand them to the transport as one write.
pub fn encode_frame(body: Option<&[u8]>, dst: &mut BytesMut) -> Result<()> {
    let body = body.unwrap_or_default();
    let len = u16::try_from(body.len()).map_err(|_| FrameError::BodyTooLarge {
        size: body.len(),
        max: MAX_BODY_LEN,
    })?;
    dst.reserve(HEADER_SIZE + body.len());
    dst.put_u16(len);
    dst.put_slice(body);
    Ok(())
}

/// Read the declared body length without consuming anything.
///
/// Returns `None` while fewer than [`HEADER_SIZE`] bytes are buffered.
pub fn peek_body_len(src: &[u8]) -> Option<usize> {
    match src {
        [hi, lo, ..] => Some(usize::from(u16::from_be_bytes([*hi, *lo]))),
        _ => None,
    }
}

/// Decode one frame from a buffer.
///
/// Returns `None` if the buffer doesn't contain a complete frame yet; the
/// buffer is left untouched in that case. On success, header and body are
/// consumed together.
pub fn decode_frame(src: &mut BytesMut) -> Option<Frame> {
    let body_len = peek_body_len(src)?;
    if src.len() < HEADER_SIZE + body_len {
        return None; // Need more data
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();
    Some(Frame { body })
}

/// Decode every complete frame currently buffered, in order.
pub fn decode_frames(src: &mut BytesMut) -> Vec<Frame> {
    let mut frames = Vec::new();
    while let Some(frame) = decode_frame(src) {
        frames.push(frame);
    }
    frames
}
