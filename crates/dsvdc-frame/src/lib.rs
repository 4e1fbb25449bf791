//! Length-prefixed message framing for the digitalSTROM vDC API.
//!
//! Every message exchanged between a vDC host and its controller is framed with:
//! - A 2-byte big-endian body length (0-65535)
//! - The body itself, an opaque serialized message
//!
//! Decoding never consumes an incomplete frame, so it can be re-run safely
//! as bytes trickle in.

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod error;

#[cfg(feature = "async")]
pub use async_codec::VdcCodec;
pub use codec::{
    decode_frame, decode_frames, encode_frame, peek_body_len, Frame, HEADER_SIZE, MAX_BODY_LEN,
};
pub use error::{FrameError, Result};
