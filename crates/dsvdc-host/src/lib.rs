//! vDC host endpoint for the digitalSTROM vDC API.
//!
//! A [`VdcHost`] owns the single controller session, a flat registry of
//! addressable entities (the host itself, its vDCs and their devices) and the
//! table of requests awaiting a generic response. [`VdcServer`] accepts TCP
//! connections and hands each inbound frame to the [`Dispatcher`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dsvdc_host::{HostConfig, Vdc, VdcHost, VdcServer};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> dsvdc_host::Result<()> {
//! let host = VdcHost::new(HostConfig::default());
//! host.add_vdc(Arc::new(Vdc::new("my-vdc")));
//!
//! let server = VdcServer::bind(Arc::clone(&host)).await?;
//! server.serve(CancellationToken::new()).await
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod correlator;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod host;
pub mod link;
pub mod message;
pub mod registry;
pub mod server;
pub mod session;

pub use codec::{JsonCodec, PayloadCodec};
pub use config::{HostConfig, DEFAULT_HOST_NAME, DEFAULT_MAX_MESSAGE_SIZE};
pub use correlator::{PendingRequest, RequestCorrelator, ResponseCallback, Transmit};
pub use dispatcher::Dispatcher;
pub use entity::{default_bye, default_pong, Addressable, Device, EntityKind, HostEntity, Vdc};
pub use error::{CodecError, HostError, Result};
pub use host::VdcHost;
pub use link::Link;
pub use message::{
    EntityRef, GenericResponse, HelloRequest, HelloResponse, Message, MessageType, ResultCode,
    RESERVED_MESSAGE_ID,
};
pub use registry::EntityRegistry;
pub use server::{VdcServer, SWEEP_INTERVAL};
pub use session::{HelloOutcome, SessionManager, SessionState, SUPPORTED_API_VERSION};
