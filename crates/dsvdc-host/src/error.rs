use dsvdc_dsuid::Dsuid;

/// Errors raised by the payload codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The frame carried no body bytes.
    #[error("empty message body")]
    Empty,

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur in host operations.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// A message id was requested while no controller session exists.
    #[error("no active session")]
    NoActiveSession,

    /// Sending requires a connected session and an attached transport.
    #[error("host not connected to a controller")]
    NotConnected,

    /// The outbound message lacks its id or the payload its type requires.
    #[error("incomplete {0} message")]
    IncompleteMessage(String),

    /// The encoded message exceeds the application size limit.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The vDC has not been added to a host yet.
    #[error("vDC {0} is not attached to a host")]
    Detached(Dsuid),

    /// A wait was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] dsvdc_frame::FrameError),

    /// Payload codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Socket-level error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HostError>;
