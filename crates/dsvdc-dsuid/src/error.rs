/// Errors produced while parsing a dSUID.
#[derive(Debug, thiserror::Error)]
pub enum DsuidError {
    /// The text is neither 32 (bare UUID) nor 34 (UUID + tag) characters long.
    #[error("invalid dSUID length {len} (expected 32 or 34 hex characters)")]
    InvalidLength { len: usize },

    /// The text contains characters outside `[0-9a-fA-F]`.
    #[error("invalid dSUID '{0}': not a hexadecimal string")]
    InvalidHex(String),

    /// The inner 128-bit value could not be parsed as a UUID.
    #[error("invalid dSUID inner value: {0}")]
    Uuid(#[from] uuid::Error),
}

pub type Result<T> = std::result::Result<T, DsuidError>;
