//! `tokio_util::codec` adapter over the pure frame functions.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, peek_body_len, Frame, HEADER_SIZE, MAX_BODY_LEN};
use crate::error::FrameError;

/// Length-prefixed codec for use with `Framed`, `FramedRead` and `FramedWrite`.
#[derive(Debug, Clone)]
pub struct VdcCodec {
    max_body_size: usize,
}

impl VdcCodec {
    /// Codec accepting any body the prefix can describe.
    pub fn new() -> Self {
        Self::with_max_body_size(MAX_BODY_LEN)
    }

    /// Codec rejecting declared bodies above `max_body_size`.
    pub fn with_max_body_size(max_body_size: usize) -> Self {
        Self {
            max_body_size: max_body_size.min(MAX_BODY_LEN),
        }
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

impl Default for VdcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for VdcCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let Some(body_len) = peek_body_len(src) else {
            return Ok(None);
        };
        if body_len > self.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: body_len,
                max: self.max_body_size,
            });
        }

        match decode_frame(src) {
            Some(frame) => {
                tracing::trace!(body_len, "decoded frame");
                Ok(Some(frame))
            }
            None => {
                src.reserve(HEADER_SIZE + body_len - src.len());
                Ok(None)
            }
        }
    }
}

impl<T: AsRef<[u8]>> Encoder<T> for VdcCodec {
    type Error = FrameError;

    fn encode(&mut self, body: T, dst: &mut BytesMut) -> Result<(), FrameError> {
        let body = body.as_ref();
        if body.len() > self.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: body.len(),
                max: self.max_body_size,
            });
        }
        encode_frame(Some(body), dst)
    }
}
