use crate::error::CodecError;
use crate::message::Message;

/// Serialization of message bodies carried inside frames.
///
/// The dispatcher only relies on the type tag and the few typed fields of
/// [`Message`]; the concrete body encoding is supplied through this trait.
pub trait PayloadCodec: Send + Sync {
    /// Decode one frame body into a message.
    fn decode(&self, body: &[u8]) -> Result<Message, CodecError>;

    /// Encode a message into a frame body.
    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError>;
}

/// JSON body encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn decode(&self, body: &[u8]) -> Result<Message, CodecError> {
        if body.is_empty() {
            return Err(CodecError::Empty);
        }
        Ok(serde_json::from_slice(body)?)
    }

    fn encode(&self, message: &Message) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(message)?)
    }
}
