//! digitalSTROM unique identifiers (dSUIDs).
//!
//! A dSUID is 17 bytes: a 16-byte UUID followed by a one-byte tag. Ids are
//! minted with one of four UUID algorithms:
//!
//! - v1, time based, through a [`DsuidGenerator`] holding the host id and clock state
//! - v3, MD5 over a [`Namespace`] and a name
//! - v4, random
//! - v5, SHA-1 over a [`Namespace`] and a name

pub mod dsuid;
pub mod error;
pub mod generator;
pub mod namespace;

pub use dsuid::{Dsuid, DsuidKind, DEFAULT_HOST_DSUID, DSUID_HEX_LEN, DSUID_LEN};
pub use error::{DsuidError, Result};
pub use generator::DsuidGenerator;
pub use namespace::Namespace;
