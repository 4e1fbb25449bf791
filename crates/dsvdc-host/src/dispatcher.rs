use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::host::VdcHost;
use crate::link::Link;
use crate::message::{Message, MessageType};

/// Routes inbound frames to the host by message type.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    host: Arc<VdcHost>,
}

impl Dispatcher {
    pub fn new(host: Arc<VdcHost>) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &Arc<VdcHost> {
        &self.host
    }

    /// Handle one decoded message received over `link`, returning the reply
    /// to send back, if any.
    pub fn dispatch(&self, message: &Message, link: &Link) -> Option<Message> {
        tracing::debug!(
            msg_type = %message.msg_type,
            message_id = ?message.message_id,
            link = link.id(),
            "dispatching message"
        );
        match &message.msg_type {
            MessageType::VdsmRequestHello => Some(self.host.process_hello(message, Some(link))),
            MessageType::VdsmSendPing => self.host.process_ping(message),
            MessageType::VdsmSendBye => self.host.process_bye(message, Some(link)),
            MessageType::VdsmSendRemove => self.host.process_remove(message),
            MessageType::GenericResponse => {
                self.host.process_generic_response(message);
                None
            }
            MessageType::VdsmRequestGetProperty => {
                tracing::debug!(message_id = ?message.message_id, "get property request, ignoring");
                None
            }
            MessageType::VdsmRequestSetProperty => {
                tracing::debug!(message_id = ?message.message_id, "set property request, ignoring");
                None
            }
            other => {
                tracing::warn!(msg_type = %other, "unsupported message type, dropping");
                None
            }
        }
    }

    /// Turn one inbound frame body into the reply body to write back.
    ///
    /// An empty frame is ignored. A body that is too large or cannot be
    /// decoded is answered with an empty frame, as is a reply that fails to
    /// encode.
    pub fn handle_frame(&self, body: &[u8], link: &Link) -> Option<Bytes> {
        if body.is_empty() {
            tracing::debug!(link = link.id(), "empty frame, ignoring");
            return None;
        }
        let max = self.host.config().max_message_size;
        if body.len() > max {
            tracing::error!(size = body.len(), max, "inbound message too large");
            return Some(Bytes::new());
        }

        let message = match self.host.codec().decode(body) {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, size = body.len(), "failed to decode message");
                return Some(Bytes::new());
            }
        };

        let reply = self.dispatch(&message, link)?;
        match self.host.codec().encode(&reply) {
            Ok(encoded) => Some(Bytes::from(encoded)),
            Err(err) => {
                tracing::error!(error = %err, msg_type = %reply.msg_type, "failed to encode reply");
                Some(Bytes::new())
            }
        }
    }

    /// Handle a frame and queue the reply on `link`.
    ///
    /// Announcements scheduled by a new session go out after the reply.
    pub fn process_frame(&self, body: &[u8], link: &Link) -> Result<()> {
        if let Some(reply) = self.handle_frame(body, link) {
            link.send(reply)?;
        }
        self.host.flush_announcements();
        Ok(())
    }
}
