//! Accept loop and per-connection request handling.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use yurpc_common::transport::{FrameCodec, JsonCodec};

use crate::dispatcher::Dispatcher;

/// Everything a connection task needs, shared by all connections.
#[derive(Debug)]
pub(crate) struct ConnectionContext {
    pub dispatcher: Dispatcher,
    pub idle_timeout: Duration,
    pub max_frame_length: usize,
    pub tcp_nodelay: bool,
}

/// Accepts connections until `shutdown` flips, handing each one to the
/// worker runtime.
///
/// Accepted sockets are re-registered with the worker runtime's reactor so
/// their I/O is driven by the worker pool, not the acceptor pool.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    workers: Handle,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.changed() => break,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
                continue;
            }
        };

        let std_stream = match stream.into_std() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(peer = %peer, error = %e, "Failed to detach accepted socket");
                continue;
            }
        };

        tracing::debug!(peer = %peer, "Connection established");
        let ctx = Arc::clone(&ctx);
        let shutdown = shutdown.clone();
        workers.spawn(async move {
            let stream = match TcpStream::from_std(std_stream) {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(peer = %peer, error = %e, "Failed to register connection");
                    return;
                }
            };
            serve_connection(stream, peer, ctx, shutdown).await;
        });
    }

    tracing::info!("Accept loop stopped");
}

/// Reads requests off one connection until the peer closes it, it goes idle
/// or the server shuts down.
///
/// Every request is dispatched concurrently; responses are written as they
/// complete, not in request order. Empty frames are client heartbeats: they
/// restart the idle timer and get no response.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ConnectionContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(ctx.tcp_nodelay) {
        tracing::debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    let codec = FrameCodec::new().with_max_length(ctx.max_frame_length);
    let mut frames = FramedRead::new(read_half, codec.clone());
    let mut sink = FramedWrite::new(write_half, codec);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if let Err(e) = sink.send(payload).await {
                tracing::warn!(peer = %peer, error = %e, "Failed to send response");
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            next = tokio::time::timeout(ctx.idle_timeout, frames.next()) => next,
            _ = shutdown.changed() => break,
        };

        let frame = match next {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                tracing::warn!(peer = %peer, error = %e, "Failed to read frame, closing connection");
                break;
            }
            Ok(None) => {
                tracing::debug!(peer = %peer, "Connection closed by peer");
                break;
            }
            Err(_) => {
                tracing::info!(
                    peer = %peer,
                    idle_secs = ctx.idle_timeout.as_secs(),
                    "Closing idle connection"
                );
                break;
            }
        };

        if frame.is_empty() {
            tracing::trace!(peer = %peer, "Heartbeat");
            continue;
        }

        let ctx = Arc::clone(&ctx);
        let tx = tx.clone();
        tokio::spawn(async move {
            let response = ctx.dispatcher.dispatch_frame(&frame).await;
            match JsonCodec::encode_response(&response) {
                Ok(payload) => {
                    let _ = tx.send(payload);
                }
                Err(e) => {
                    tracing::error!(request_id = response.id, error = %e, "Failed to encode response");
                }
            }
        });
    }

    // Writer drains once every in-flight dispatch has dropped its sender
    drop(tx);
    let _ = writer.await;
}
