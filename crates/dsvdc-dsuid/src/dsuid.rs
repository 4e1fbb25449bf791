use std::fmt;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha1::{Digest, Sha1};
use uuid::Uuid;

use crate::error::{DsuidError, Result};
use crate::namespace::Namespace;

/// Number of bytes in a dSUID (16 UUID bytes + 1 tag byte).
pub const DSUID_LEN: usize = 17;

/// Length of the canonical textual form.
pub const DSUID_HEX_LEN: usize = DSUID_LEN * 2;

/// Length of the bare UUID part of the textual form.
pub const UUID_HEX_LEN: usize = 32;

/// How the inner value of a dSUID was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum DsuidKind {
    Undefined,
    /// Derived from an SGTIN-96 product code.
    Sgtin,
    /// Derived from a UUID.
    #[default]
    Uuid,
}

/// A digitalSTROM unique id: a 128-bit UUID followed by a one-byte tag.
///
/// ```text
///  Byte:  0 1 2 3  4 5  6 7  8 9  10..15        16
///         xxxxxxxx-xxxx-Vxxx-Txxx-xxxxxxxxxxxx  ii
/// ```
///
/// The textual form is 34 uppercase hex digits without separators. The tag
/// byte is always emitted as `00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dsuid {
    uuid: Uuid,
    kind: DsuidKind,
}

/// Identifier used by a host whose configuration names none.
pub const DEFAULT_HOST_DSUID: Dsuid =
    Dsuid::from_uuid(Uuid::from_u128(0x6123A881_0160_1000_0000_F2CA0DEB3707));

impl Dsuid {
    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self {
            uuid,
            kind: DsuidKind::Uuid,
        }
    }

    /// Random dSUID (UUID version 4).
    pub fn generate_v4() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    /// Name-based dSUID using MD5 (UUID version 3).
    ///
    /// Reproducible: the same namespace and name always give the same id.
    pub fn generate_v3(ns: Namespace, name: &str) -> Self {
        let mut hasher = Md5::new();
        hasher.update(ns.as_bytes());
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        bytes[6] = (bytes[6] & 0x0f) | 0x30;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;
        Self::from_uuid(Uuid::from_bytes(bytes))
    }

    /// Name-based dSUID using SHA-1 (UUID version 5).
    ///
    /// The variant byte is masked with `0x3f` and then or-ed with `0x90`, so
    /// bit 4 of byte 8 is always set. Ids minted by existing vDC hosts depend
    /// on this layout, which differs from RFC 4122 v5 in that single bit.
    pub fn generate_v5(ns: Namespace, name: &str) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(ns.as_bytes());
        hasher.update(name.as_bytes());
        let digest = hasher.finalize();

        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        bytes[6] = (bytes[6] & 0x0f) | 0x50;
        bytes[8] = (bytes[8] & 0x3f) | 0x90;
        Self::from_uuid(Uuid::from_bytes(bytes))
    }

    /// Parse the textual form.
    ///
    /// Accepts 34 hex digits (UUID + tag) or a bare 32-digit UUID, in any
    /// case. The tag digits are validated and then ignored.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != UUID_HEX_LEN && s.len() != DSUID_HEX_LEN {
            return Err(DsuidError::InvalidLength { len: s.len() });
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DsuidError::InvalidHex(s.to_string()));
        }

        let inner = s
            .get(..UUID_HEX_LEN)
            .ok_or_else(|| DsuidError::InvalidHex(s.to_string()))?;
        let uuid = Uuid::try_parse(inner)?;
        Ok(Self::from_uuid(uuid))
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> DsuidKind {
        self.kind
    }

    /// UUID version nibble of the inner value.
    pub fn version(&self) -> usize {
        self.uuid.get_version_num()
    }

    /// The 17 bytes of the binary form.
    pub fn to_bytes(&self) -> [u8; DSUID_LEN] {
        let mut out = [0u8; DSUID_LEN];
        out[..16].copy_from_slice(self.uuid.as_bytes());
        out
    }
}

impl fmt::Display for Dsuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}00", self.uuid.simple())
    }
}

impl FromStr for Dsuid {
    type Err = DsuidError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<Uuid> for Dsuid {
    fn from(uuid: Uuid) -> Self {
        Self::from_uuid(uuid)
    }
}

impl Serialize for Dsuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dsuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Dsuid::parse(&text).map_err(serde::de::Error::custom)
    }
}
