//! digitalSTROM vDC host endpoint.
//!
//! A vDC host exposes virtual devices to a digitalSTROM controller (vdSM)
//! over a TCP connection carrying length-prefixed protocol messages.
//!
//! # Crate Structure
//!
//! - [`frame`]: 2-byte length-prefixed message framing
//! - [`dsuid`]: 136-bit dSUID identifiers and their generation
//! - [`host`]: Session handshake, request correlation, entity registry and
//!   TCP server (behind `host` feature)

/// Re-export frame types.
pub mod frame {
    pub use dsvdc_frame::*;
}

/// Re-export dSUID types.
pub mod dsuid {
    pub use dsvdc_dsuid::*;
}

/// Re-export host types (requires `host` feature).
#[cfg(feature = "host")]
pub mod host {
    pub use dsvdc_host::*;
}
