use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dsvdc_frame::VdcCodec;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::host::VdcHost;
use crate::link::Link;

/// How often expired pending requests are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Accepts controller connections and feeds their frames to a [`Dispatcher`].
pub struct VdcServer {
    listener: TcpListener,
    dispatcher: Dispatcher,
    next_link_id: AtomicU64,
}

impl VdcServer {
    /// Bind to the host's configured listen address.
    pub async fn bind(host: Arc<VdcHost>) -> Result<Self> {
        let listener = TcpListener::bind(host.config().listen).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            dsuid = %host.dsuid(),
            "vDC host listening"
        );
        Ok(Self {
            listener,
            dispatcher: Dispatcher::new(host),
            next_link_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn host(&self) -> &Arc<VdcHost> {
        self.dispatcher.host()
    }

    /// Run the accept loop until `shutdown` is cancelled.
    ///
    /// Each connection is served on its own task. On shutdown the listener
    /// stops accepting and every connection is closed; pending requests are
    /// abandoned.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let mut connections = JoinSet::new();
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sweep.tick() => {
                    let evicted = self.host().evict_expired();
                    if evicted > 0 {
                        tracing::debug!(evicted, "evicted expired pending requests");
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        let id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(link = id, %addr, "controller connection accepted");
                        connections.spawn(serve_connection(
                            stream,
                            id,
                            self.dispatcher.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(err) => tracing::warn!(error = %err, "accept failed"),
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "connection task failed");
                    }
                }
            }
        }

        tracing::info!(open = connections.len(), "vDC host shutting down");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    id: u64,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
) {
    let config = dispatcher.host().config().clone();
    if config.tcp_nodelay {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(link = id, error = %err, "failed to set TCP_NODELAY");
        }
    }

    let (read_half, write_half) = stream.into_split();
    let mut frames = FramedRead::new(read_half, VdcCodec::new());
    let (link, outbound) = Link::channel(id);
    let writer = tokio::spawn(write_frames(id, FramedWrite::new(write_half, VdcCodec::new()), outbound));

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = tokio::time::timeout(config.idle_timeout, frames.next()) => next,
        };
        match next {
            Err(_) => {
                tracing::warn!(link = id, idle = ?config.idle_timeout, "connection idle, closing");
                break;
            }
            Ok(None) => {
                tracing::info!(link = id, "connection closed by peer");
                break;
            }
            Ok(Some(Err(err))) => {
                tracing::warn!(link = id, error = %err, "unrecoverable frame error, closing");
                break;
            }
            Ok(Some(Ok(frame))) => {
                if let Err(err) = dispatcher.process_frame(&frame.body, &link) {
                    tracing::warn!(link = id, error = %err, "failed to queue reply, closing");
                    break;
                }
            }
        }
    }

    dispatcher.host().detach(id);
    drop(link);
    if let Err(err) = writer.await {
        tracing::error!(link = id, error = %err, "writer task failed");
    }
}

async fn write_frames(
    id: u64,
    mut sink: FramedWrite<OwnedWriteHalf, VdcCodec>,
    mut outbound: UnboundedReceiver<Bytes>,
) {
    while let Some(body) = outbound.recv().await {
        if let Err(err) = sink.send(body).await {
            tracing::warn!(link = id, error = %err, "write failed");
            return;
        }
    }
    if let Err(err) = SinkExt::<Bytes>::close(&mut sink).await {
        tracing::debug!(link = id, error = %err, "shutdown of write half failed");
    }
}
