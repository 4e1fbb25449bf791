use std::fmt;

use dsvdc_dsuid::Dsuid;
use serde::{Deserialize, Serialize};

/// Message id that never names a request.
pub const RESERVED_MESSAGE_ID: u32 = 0;

/// Message type tag.
///
/// Tags outside the fixed table decode to [`MessageType::Unknown`] instead of
/// failing, so the dispatcher can log and drop them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    VdsmRequestHello,
    VdcResponseHello,
    VdsmSendPing,
    VdcSendPong,
    VdsmSendBye,
    VdsmSendRemove,
    GenericResponse,
    VdcSendAnnounceVdc,
    VdcSendVanish,
    VdsmRequestGetProperty,
    VdsmRequestSetProperty,
    VdsmRequestGenericRequest,
    Unknown(String),
}

const TYPE_TAGS: [(MessageType, &str); 12] = [
    (MessageType::VdsmRequestHello, "vdsm_request_hello"),
    (MessageType::VdcResponseHello, "vdc_response_hello"),
    (MessageType::VdsmSendPing, "vdsm_send_ping"),
    (MessageType::VdcSendPong, "vdc_send_pong"),
    (MessageType::VdsmSendBye, "vdsm_send_bye"),
    (MessageType::VdsmSendRemove, "vdsm_send_remove"),
    (MessageType::GenericResponse, "generic_response"),
    (MessageType::VdcSendAnnounceVdc, "vdc_send_announce_vdc"),
    (MessageType::VdcSendVanish, "vdc_send_vanish"),
    (MessageType::VdsmRequestGetProperty, "vdsm_request_get_property"),
    (MessageType::VdsmRequestSetProperty, "vdsm_request_set_property"),
    (MessageType::VdsmRequestGenericRequest, "vdsm_request_generic_request"),
];

impl MessageType {
    /// Wire tag of this type.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Unknown(tag) => tag,
            known => TYPE_TAGS
                .iter()
                .find(|(ty, _)| ty == known)
                .map_or("", |(_, tag)| *tag),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, MessageType::Unknown(_))
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        TYPE_TAGS
            .iter()
            .find(|(_, known)| *known == tag)
            .map(|(ty, _)| ty.clone())
            .unwrap_or(MessageType::Unknown(tag))
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        MessageType::from(tag.to_string())
    }
}

impl From<MessageType> for String {
    fn from(ty: MessageType) -> Self {
        match ty {
            MessageType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result code carried by a generic response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    ErrOk,
    ErrMessageUnknown,
    ErrIncompatibleApi,
    ErrServiceNotAvailable,
    ErrInsufficientStorage,
    ErrForbidden,
    ErrNotImplemented,
    ErrNoContentForArray,
    ErrInvalidValueType,
    ErrMissingSubmessage,
    ErrMissingData,
    ErrNotFound,
    ErrNotAuthorized,
}

impl ResultCode {
    /// Fixed human-readable description sent alongside the code.
    pub fn description(self) -> &'static str {
        match self {
            ResultCode::ErrOk => "OK",
            ResultCode::ErrMessageUnknown => "Unknown message type",
            ResultCode::ErrIncompatibleApi => "Incompatible or not given API version",
            ResultCode::ErrServiceNotAvailable => "Service not available",
            ResultCode::ErrInsufficientStorage => "Insufficient storage",
            ResultCode::ErrForbidden => "Forbidden",
            ResultCode::ErrNotImplemented => "Not implemented",
            ResultCode::ErrNoContentForArray => "No content for array",
            ResultCode::ErrInvalidValueType => "Invalid or unexpected value type",
            ResultCode::ErrMissingSubmessage => "Missing protocol submessage",
            ResultCode::ErrMissingData => "Missing data / empty message",
            ResultCode::ErrNotFound => "Requested entity was not found",
            ResultCode::ErrNotAuthorized => "Not authorized",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Hello request payload sent by the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {
    #[serde(rename = "dSUID", default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<u32>,
}

/// Hello response payload naming the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloResponse {
    #[serde(rename = "dSUID", default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
}

/// Payload that only names an entity (ping, pong, bye, remove, announce, vanish).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "dSUID", default, skip_serializing_if = "Option::is_none")]
    pub dsuid: Option<String>,
}

impl EntityRef {
    pub fn new(dsuid: Dsuid) -> Self {
        Self {
            dsuid: Some(dsuid.to_string()),
        }
    }

    /// The named entity, if present and well formed.
    pub fn target(&self) -> Option<Dsuid> {
        self.dsuid.as_deref().and_then(|text| Dsuid::parse(text).ok())
    }
}

/// Generic response payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ResultCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl GenericResponse {
    pub fn new(code: ResultCode) -> Self {
        Self {
            code: Some(code),
            description: Some(code.description().to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == Some(ResultCode::ErrOk)
    }
}

/// A single protocol message.
///
/// Exactly one sub-payload is expected to be set, matching `msg_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub msg_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdsm_request_hello: Option<HelloRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdc_response_hello: Option<HelloResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdsm_send_ping: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdc_send_pong: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdsm_send_bye: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdsm_send_remove: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generic_response: Option<GenericResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdc_send_announce_vdc: Option<EntityRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vdc_send_vanish: Option<EntityRef>,
}

impl Message {
    /// Bare message of the given type with no id and no payload.
    pub fn new(msg_type: impl Into<MessageType>) -> Self {
        Self {
            msg_type: msg_type.into(),
            message_id: None,
            vdsm_request_hello: None,
            vdc_response_hello: None,
            vdsm_send_ping: None,
            vdc_send_pong: None,
            vdsm_send_bye: None,
            vdsm_send_remove: None,
            generic_response: None,
            vdc_send_announce_vdc: None,
            vdc_send_vanish: None,
        }
    }

    pub fn with_message_id(mut self, message_id: Option<u32>) -> Self {
        self.message_id = message_id;
        self
    }

    /// Generic response with `code` and its fixed description.
    pub fn generic_response(code: ResultCode, message_id: Option<u32>) -> Self {
        let mut message = Self::new(MessageType::GenericResponse).with_message_id(message_id);
        message.generic_response = Some(GenericResponse::new(code));
        message
    }

    pub fn hello_response(host: Dsuid, message_id: Option<u32>) -> Self {
        let mut message = Self::new(MessageType::VdcResponseHello).with_message_id(message_id);
        message.vdc_response_hello = Some(HelloResponse {
            dsuid: Some(host.to_string()),
        });
        message
    }

    pub fn pong(entity: Dsuid) -> Self {
        let mut message = Self::new(MessageType::VdcSendPong);
        message.vdc_send_pong = Some(EntityRef::new(entity));
        message
    }

    pub fn announce_vdc(vdc: Dsuid, message_id: u32) -> Self {
        let mut message = Self::new(MessageType::VdcSendAnnounceVdc).with_message_id(Some(message_id));
        message.vdc_send_announce_vdc = Some(EntityRef::new(vdc));
        message
    }

    pub fn vanish(entity: Dsuid) -> Self {
        let mut message = Self::new(MessageType::VdcSendVanish);
        message.vdc_send_vanish = Some(EntityRef::new(entity));
        message
    }

    pub fn hello_request(peer: Dsuid, api_version: u32, message_id: u32) -> Self {
        let mut message = Self::new(MessageType::VdsmRequestHello).with_message_id(Some(message_id));
        message.vdsm_request_hello = Some(HelloRequest {
            dsuid: Some(peer.to_string()),
            api_version: Some(api_version),
        });
        message
    }

    pub fn ping(target: Dsuid) -> Self {
        let mut message = Self::new(MessageType::VdsmSendPing);
        message.vdsm_send_ping = Some(EntityRef::new(target));
        message
    }

    pub fn bye(peer: Dsuid, message_id: Option<u32>) -> Self {
        let mut message = Self::new(MessageType::VdsmSendBye).with_message_id(message_id);
        message.vdsm_send_bye = Some(EntityRef::new(peer));
        message
    }

    pub fn remove(target: Dsuid, message_id: Option<u32>) -> Self {
        let mut message = Self::new(MessageType::VdsmSendRemove).with_message_id(message_id);
        message.vdsm_send_remove = Some(EntityRef::new(target));
        message
    }

    /// A message id other than [`RESERVED_MESSAGE_ID`], if present.
    pub fn request_id(&self) -> Option<u32> {
        self.message_id.filter(|id| *id != RESERVED_MESSAGE_ID)
    }

    /// Whether the sub-payload required by the message type is present and
    /// carries its mandatory fields.
    ///
    /// Requests the peer answers with a generic response (hello, announce)
    /// also need a non-reserved message id. Types without a payload model are
    /// never complete.
    pub fn is_complete(&self) -> bool {
        let named = |payload: &Option<EntityRef>| {
            payload.as_ref().is_some_and(|p| p.dsuid.is_some())
        };
        match self.msg_type {
            MessageType::VdsmRequestHello => {
                self.request_id().is_some()
                    && self
                        .vdsm_request_hello
                        .as_ref()
                        .is_some_and(|p| p.dsuid.is_some() && p.api_version.is_some())
            }
            MessageType::VdcResponseHello => self
                .vdc_response_hello
                .as_ref()
                .is_some_and(|p| p.dsuid.is_some()),
            MessageType::VdsmSendPing => named(&self.vdsm_send_ping),
            MessageType::VdcSendPong => named(&self.vdc_send_pong),
            MessageType::VdsmSendBye => named(&self.vdsm_send_bye),
            MessageType::VdsmSendRemove => named(&self.vdsm_send_remove),
            MessageType::GenericResponse => self
                .generic_response
                .as_ref()
                .is_some_and(|p| p.code.is_some()),
            MessageType::VdcSendAnnounceVdc => {
                self.request_id().is_some() && named(&self.vdc_send_announce_vdc)
            }
            MessageType::VdcSendVanish => named(&self.vdc_send_vanish),
            MessageType::VdsmRequestGetProperty
            | MessageType::VdsmRequestSetProperty
            | MessageType::VdsmRequestGenericRequest
            | MessageType::Unknown(_) => false,
        }
    }
}
