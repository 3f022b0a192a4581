//! Driver tasks that run one connection each

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{ConnectionObserver, Delivery, SnapshotBuilder};
use crate::codec::ByteBuffer;
use crate::objects::RequestSet;
use crate::source::BlockSource;
use crate::sources::{MulticastSource, StreamSource};
use crate::transport::write_block;
use crate::{Result, StreamError};

/// Socket settings for TCP connections.
#[derive(Debug, Clone, Copy)]
pub struct TcpSettings {
    pub connect_timeout: Duration,
    pub max_block_length: u32,
}

/// Open a TCP connection with a deadline.
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let endpoint = format!("{host}:{port}");
    let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
        .await
        .map_err(|_| StreamError::connection_failed(endpoint.clone(), "connect timed out"))?
        .map_err(|e| {
            StreamError::connection_failed_with_source(endpoint, "connect failed", Box::new(e))
        })?;
    stream.set_nodelay(true).map_err(|e| StreamError::io("set TCP_NODELAY", e))?;
    Ok(stream)
}

/// What every connection task needs besides its socket.
pub struct ConnectionContext {
    /// Index reported with every event; never reused by the client
    pub index: usize,
    pub requested: watch::Receiver<RequestSet>,
    pub observer: Arc<dyn ConnectionObserver>,
    pub cancel: CancellationToken,
}

/// Spawns and runs connection tasks
pub struct ConnectionDriver;

impl ConnectionDriver {
    /// Start a TCP connection on `runtime`.
    ///
    /// Returns at once. Messages pushed onto the returned sender are written
    /// in order once the socket is up; anything queued before then waits.
    pub fn spawn_tcp(
        runtime: &Handle,
        host: String,
        port: u16,
        settings: TcpSettings,
        context: ConnectionContext,
    ) -> mpsc::UnboundedSender<ByteBuffer> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        runtime.spawn(async move {
            let index = context.index;
            let endpoint = format!("{host}:{port}");
            info!(index, %endpoint, "Connecting");

            let connected = tokio::select! {
                _ = context.cancel.cancelled() => {
                    debug!(index, "Connect cancelled");
                    context.observer.on_disconnected(index);
                    return;
                }
                result = connect_tcp(&host, port, settings.connect_timeout) => result,
            };
            let stream = match connected {
                Ok(stream) => stream,
                Err(e) => {
                    warn!(index, error = %e, "Connection attempt failed");
                    context.observer.on_disconnected(index);
                    return;
                }
            };

            let (reader, writer) = stream.into_split();
            tokio::spawn(Self::writer_task(index, writer, outgoing_rx, context.cancel.clone()));

            context.observer.on_connected(index);
            let source = StreamSource::new(reader, endpoint, settings.max_block_length);
            Self::run(source, context).await;
        });

        outgoing_tx
    }

    /// Start receiving multicast datagrams on `runtime`.
    pub fn spawn_multicast(
        runtime: &Handle,
        multicast: Ipv4Addr,
        local: Ipv4Addr,
        port: u16,
        context: ConnectionContext,
    ) {
        runtime.spawn(async move {
            let index = context.index;
            let joined = tokio::select! {
                _ = context.cancel.cancelled() => {
                    context.observer.on_disconnected(index);
                    return;
                }
                result = MulticastSource::join(multicast, local, port) => result,
            };
            match joined {
                Ok(source) => {
                    context.observer.on_connected(index);
                    Self::run(source, context).await;
                }
                Err(e) => {
                    warn!(index, error = %e, "Multicast receiver failed to start");
                    context.observer.on_disconnected(index);
                }
            }
        });
    }

    /// Read blocks from `source` until it ends, fails, or is cancelled.
    ///
    /// Always finishes with `on_disconnected`.
    pub async fn run<S>(mut source: S, context: ConnectionContext)
    where
        S: BlockSource,
    {
        let ConnectionContext { index, mut requested, observer, cancel } = context;
        let endpoint = source.endpoint();
        info!(index, %endpoint, "Connection reader started");

        let mut builder = SnapshotBuilder::new(requested.borrow_and_update().clone());
        let mut deliveries = Vec::new();
        let mut block_count = 0u64;
        let mut frame_count = 0u64;

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(index, "Connection cancelled");
                    break;
                }
                result = source.next_block() => result,
            };

            match result {
                Ok(Some(block)) => {
                    block_count += 1;
                    if requested.has_changed().unwrap_or(false) {
                        let current = requested.borrow_and_update().clone();
                        debug!(index, kinds = current.len(), "Request set changed");
                        builder.set_requested(current);
                    }

                    builder.process(block, &mut deliveries);
                    for delivery in deliveries.drain(..) {
                        match delivery {
                            Delivery::Static(statics) => observer.on_static_objects(index, statics),
                            Delivery::Dynamic(dynamics) => {
                                frame_count += 1;
                                trace!(index, frame = dynamics.frame_number(), "Frame delivered");
                                observer.on_dynamic_objects(index, dynamics);
                            }
                            Delivery::Capabilities(kinds) => observer.on_capabilities(index, kinds),
                        }
                    }
                }
                Ok(None) => {
                    info!(index, %endpoint, "Server closed the connection");
                    break;
                }
                Err(e) => {
                    error!(index, %endpoint, error = %e, "Connection failed");
                    break;
                }
            }
        }

        cancel.cancel();
        info!(index, blocks = block_count, frames = frame_count, "Connection reader ended");
        observer.on_disconnected(index);
    }

    async fn writer_task(
        index: usize,
        mut writer: OwnedWriteHalf,
        mut outgoing: mpsc::UnboundedReceiver<ByteBuffer>,
        cancel: CancellationToken,
    ) {
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = outgoing.recv() => message,
            };
            let Some(message) = message else { break };

            if let Err(e) = write_block(&mut writer, &message).await {
                warn!(index, error = %e, "Failed to send control message");
                cancel.cancel();
                break;
            }
            trace!(index, bytes = message.len(), "Control message sent");
        }
        debug!(index, "Connection writer ended");
    }
}
