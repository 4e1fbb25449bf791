use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{HostError, Result};

/// Outbound half of one transport connection.
///
/// Frame bodies pushed here are written by the connection's writer task in
/// the order they were sent.
#[derive(Debug, Clone)]
pub struct Link {
    id: u64,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl Link {
    /// A link and the receiver its writer task drains.
    pub fn channel(id: u64) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Queue a frame body for writing.
    pub fn send(&self, body: Bytes) -> Result<()> {
        self.tx.send(body).map_err(|_| HostError::NotConnected)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
