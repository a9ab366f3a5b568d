//! A single persistent, framed connection to one server address.
//!
//! The socket is split into a reader task and a writer task. Callers never
//! touch the stream: outbound frames go through an unbounded channel to the
//! writer, and inbound responses are routed by the reader straight into the
//! shared [`PendingRequests`] table.
//!
//! The writer also sends an empty heartbeat frame whenever nothing has been
//! written for `heartbeat_interval`, so an idle connection survives the
//! server's idle timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use yurpc_common::protocol::error::{Result, YurpcError};
use yurpc_common::transport::{tcp, FrameCodec, JsonCodec};
use yurpc_common::ClientConfig;

use crate::pending::PendingRequests;

/// How long [`Connection::close`] waits for queued frames to flush.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Completion callback for one outbound frame, run on an I/O thread.
pub type SendCallback = Box<dyn FnOnce(Result<()>) + Send + 'static>;

enum Outbound {
    Frame { payload: String, on_sent: SendCallback },
    Close,
}

/// An open connection to `host:port`.
///
/// The connection is alive until either side closes it or an I/O error
/// occurs. Once dead it never comes back; the [`ConnectionManager`] replaces
/// it on the next acquire.
///
/// [`ConnectionManager`]: crate::ConnectionManager
pub struct Connection {
    addr: String,
    outbound: mpsc::UnboundedSender<Outbound>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: Mutex<Option<JoinHandle<std::io::Result<()>>>>,
}

impl Connection {
    /// Opens a connection to `addr` and starts its I/O tasks on the current
    /// runtime.
    ///
    /// # Errors
    ///
    /// Fails when the TCP connect fails or exceeds the configured connect
    /// timeout.
    pub async fn open(
        addr: &str,
        config: &ClientConfig,
        pending: Arc<PendingRequests>,
    ) -> Result<Arc<Self>> {
        let stream = tcp::connect(addr, &config.socket, config.connect_timeout).await?;
        let (read_half, write_half) = stream.into_split();

        let codec = FrameCodec::new().with_max_length(config.max_frame_length);
        let reader = FramedRead::new(read_half, codec.clone());
        let writer = FramedWrite::new(write_half, codec);

        let alive = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::unbounded_channel();

        let writer_task = tokio::spawn(write_loop(
            addr.to_string(),
            writer,
            rx,
            Arc::clone(&alive),
            config.heartbeat_interval,
        ));
        let reader_task = tokio::spawn(read_loop(addr.to_string(), reader, pending, Arc::clone(&alive)));

        tracing::debug!(addr = %addr, "Connection established");

        Ok(Arc::new(Self {
            addr: addr.to_string(),
            outbound: tx,
            alive,
            reader: reader_task,
            writer: Mutex::new(Some(writer_task)),
        }))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether the underlying channel is still open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Queues one frame for writing.
    ///
    /// Never blocks. `on_sent` runs exactly once with the write outcome; if
    /// the connection is already dead it runs immediately with an error.
    pub fn send(&self, payload: String, on_sent: SendCallback) {
        if !self.alive.load(Ordering::Acquire) {
            on_sent(Err(closed_error(&self.addr)));
            return;
        }
        if let Err(mpsc::error::SendError(Outbound::Frame { on_sent, .. })) =
            self.outbound.send(Outbound::Frame { payload, on_sent })
        {
            on_sent(Err(closed_error(&self.addr)));
        }
    }

    /// Flushes queued frames, then closes both directions.
    ///
    /// The flush is bounded by one second; a writer still blocked on a peer
    /// that stopped reading is aborted and the close reported as timed out.
    ///
    /// # Errors
    ///
    /// Returns the socket shutdown error, a writer task failure or
    /// [`YurpcError::Timeout`]. The connection is closed in every case.
    pub async fn close(&self) -> Result<()> {
        self.alive.store(false, Ordering::Release);
        let _ = self.outbound.send(Outbound::Close);

        let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner).take();
        let outcome = match writer {
            Some(mut writer) => match tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await {
                Ok(Ok(shutdown)) => shutdown.map_err(YurpcError::from),
                Ok(Err(e)) => Err(YurpcError::Connection(format!("Writer task failed: {}", e))),
                Err(_) => {
                    writer.abort();
                    Err(YurpcError::Timeout(format!(
                        "Flushing connection to {} took longer than {:?}",
                        self.addr, CLOSE_TIMEOUT
                    )))
                }
            },
            None => Ok(()),
        };
        self.reader.abort();
        outcome
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn closed_error(addr: &str) -> YurpcError {
    YurpcError::Connection(format!("Connection to {} is closed", addr))
}

async fn write_loop(
    addr: String,
    mut sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    alive: Arc<AtomicBool>,
    heartbeat_interval: Duration,
) -> std::io::Result<()> {
    let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let msg = tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            _ = heartbeat.tick() => {
                // Empty frame: resets the server's idle timer, never dispatched
                if let Err(e) = sink.send(String::new()).await {
                    tracing::warn!(addr = %addr, error = %e, "Heartbeat failed, closing connection");
                    break;
                }
                tracing::trace!(addr = %addr, "Sent heartbeat");
                continue;
            }
        };

        match msg {
            Outbound::Frame { payload, on_sent } => match sink.send(payload).await {
                Ok(()) => {
                    heartbeat.reset();
                    on_sent(Ok(()))
                }
                // Oversized frame: nothing was written, the stream is intact
                Err(e @ YurpcError::FrameTooLarge { .. }) => on_sent(Err(e)),
                Err(e) => {
                    tracing::warn!(addr = %addr, error = %e, "Write failed, closing connection");
                    alive.store(false, Ordering::Release);
                    on_sent(Err(e));
                    break;
                }
            },
            Outbound::Close => break,
        }
    }

    alive.store(false, Ordering::Release);
    rx.close();
    while let Ok(msg) = rx.try_recv() {
        if let Outbound::Frame { on_sent, .. } = msg {
            on_sent(Err(closed_error(&addr)));
        }
    }

    let mut write_half = sink.into_inner();
    tokio::io::AsyncWriteExt::shutdown(&mut write_half).await
}

async fn read_loop(
    addr: String,
    mut stream: FramedRead<OwnedReadHalf, FrameCodec>,
    pending: Arc<PendingRequests>,
    alive: Arc<AtomicBool>,
) {
    loop {
        match stream.next().await {
            Some(Ok(frame)) => handle_inbound(&addr, &frame, &pending),
            Some(Err(e)) => {
                tracing::warn!(addr = %addr, error = %e, "Read failed, closing connection");
                break;
            }
            None => {
                tracing::debug!(addr = %addr, "Connection closed by peer");
                break;
            }
        }
    }
    alive.store(false, Ordering::Release);
}

fn handle_inbound(addr: &str, frame: &str, pending: &PendingRequests) {
    let response = match JsonCodec::decode_response(frame) {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(addr = %addr, error = %e, "Discarding undecodable response");
            return;
        }
    };

    let id = response.id;
    if !pending.complete(id, response) {
        tracing::debug!(addr = %addr, request_id = id, "Dropping response with no pending request");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use yurpc_common::{Request, Response};

    fn test_config() -> ClientConfig {
        ClientConfig::default().with_connect_timeout(Duration::from_millis(500))
    }

    async fn read_frame(stream: &mut tokio::net::TcpStream) -> String {
        let len = stream.read_u32().await.unwrap() as usize;
        let mut buf = vec![0u8; len];
        stream.read_exact(&mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_send_and_route_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Echo server answering every request with its own id
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let frame = read_frame(&mut stream).await;
            let request = JsonCodec::decode_request(&frame).unwrap();
            let reply = JsonCodec::encode_response(&Response::success(request.id, json!("pong"))).unwrap();
            stream.write_all(&FrameCodec::encode_frame(&reply)).await.unwrap();
        });

        let pending = Arc::new(PendingRequests::new());
        let conn = Connection::open(&addr, &test_config(), Arc::clone(&pending)).await.unwrap();
        assert!(conn.is_alive());
        assert_eq!(conn.addr(), addr);

        let request = Request::new("Echo.ping", vec![]);
        let rx = pending.register(request.id);
        let (sent_tx, sent_rx) = tokio::sync::oneshot::channel();
        conn.send(
            JsonCodec::encode_request(&request).unwrap(),
            Box::new(move |result| {
                let _ = sent_tx.send(result.is_ok());
            }),
        );

        assert!(sent_rx.await.unwrap());
        let response = tokio::time::timeout(Duration::from_secs(2), rx).await.unwrap().unwrap();
        assert_eq!(response.id, request.id);
        assert_eq!(response.result, Some(json!("pong")));
    }

    #[tokio::test]
    async fn test_peer_close_marks_dead() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let conn = Connection::open(&addr, &test_config(), Arc::new(PendingRequests::new()))
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while conn.is_alive() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn test_send_after_close_fails_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let conn = Connection::open(&addr, &test_config(), Arc::new(PendingRequests::new()))
            .await
            .unwrap();
        conn.close().await.unwrap();
        assert!(!conn.is_alive());

        let (tx, rx) = std::sync::mpsc::channel();
        conn.send(
            "{}".to_string(),
            Box::new(move |result| {
                let _ = tx.send(result);
            }),
        );
        let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(matches!(result, Err(YurpcError::Connection(_))));
    }

    #[tokio::test]
    async fn test_unknown_response_id_ignored() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let stray = JsonCodec::encode_response(&Response::success(u64::MAX, json!(1))).unwrap();
            stream.write_all(&FrameCodec::encode_frame(&stray)).await.unwrap();
            stream.write_all(&FrameCodec::encode_frame("not json")).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let pending = Arc::new(PendingRequests::new());
        let conn = Connection::open(&addr, &test_config(), Arc::clone(&pending)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(conn.is_alive(), "stray and undecodable frames must not kill the connection");
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_idle_connection_sends_heartbeats() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            loop {
                let frame = read_frame(&mut stream).await;
                if frames_tx.send(frame).is_err() {
                    break;
                }
            }
        });

        let config = test_config().with_heartbeat_interval(Duration::from_millis(50));
        let conn = Connection::open(&addr, &config, Arc::new(PendingRequests::new())).await.unwrap();

        for _ in 0..3 {
            let frame = tokio::time::timeout(Duration::from_secs(2), frames_rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(frame.is_empty(), "heartbeat must be an empty frame");
        }
        assert!(conn.is_alive());
    }

    #[tokio::test]
    async fn test_close_bounded_when_peer_stops_reading() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        // Accepts and never reads, so the writer eventually blocks
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let conn = Connection::open(&addr, &test_config(), Arc::new(PendingRequests::new()))
            .await
            .unwrap();
        let payload = "x".repeat(1024 * 1024);
        for _ in 0..64 {
            conn.send(payload.clone(), Box::new(|_| {}));
        }

        let start = std::time::Instant::now();
        let closed = tokio::time::timeout(Duration::from_secs(5), conn.close())
            .await
            .expect("close must not hang on a stalled peer");
        assert!(matches!(closed, Err(YurpcError::Timeout(_))));
        assert!(start.elapsed() >= CLOSE_TIMEOUT);
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn test_open_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = Connection::open(&addr, &test_config(), Arc::new(PendingRequests::new())).await;
        assert!(result.is_err());
    }
}
