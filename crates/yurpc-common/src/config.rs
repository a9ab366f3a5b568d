//! Connection options for clients and servers.
//!
//! Both configurations are plain structs with defaults, builder-style
//! setters and a [`from_env`](ClientConfig::from_env) constructor that layers
//! `YURPC_*` environment variables over the defaults.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use yurpc_common::ClientConfig;
//!
//! let config = ClientConfig::new()
//!     .with_connect_timeout(Duration::from_millis(500))
//!     .with_invoke_timeout(Duration::from_secs(2));
//! assert!(config.validate().is_ok());
//! ```

use std::str::FromStr;
use std::time::Duration;

use crate::protocol::error::{Result, YurpcError};
use crate::transport::SocketOptions;

/// Largest frame accepted by the default transports (100 MB)
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 100 * 1024 * 1024;

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| YurpcError::InvalidConfig(format!("{} has an invalid value: '{}'", name, raw))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(YurpcError::InvalidConfig(format!("{}: {}", name, e))),
    }
}

fn check_socket_options(options: &SocketOptions) -> Result<()> {
    if options.send_buffer_size == 0 || options.recv_buffer_size == 0 {
        return Err(YurpcError::InvalidConfig(
            "socket buffer sizes must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

/// Client side connection options.
///
/// # Default Configuration
///
/// - `connect_timeout`: 3 seconds
/// - `invoke_timeout`: 5 seconds
/// - `socket`: `TCP_NODELAY` on, keep-alive off, 65535 byte buffers
/// - `io_threads`: available parallelism
/// - `max_frame_length`: 100 MB
/// - `heartbeat_interval`: 30 seconds, half the server's default idle timeout
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Upper bound for establishing a new connection
    pub connect_timeout: Duration,
    /// Upper bound for a blocked `invoke` waiting on its response
    pub invoke_timeout: Duration,
    pub socket: SocketOptions,
    /// Worker threads of the client I/O runtime
    pub io_threads: usize,
    pub max_frame_length: usize,
    /// A connection with no outbound frame for this long sends an empty
    /// heartbeat frame, keeping the server's idle timer from firing
    pub heartbeat_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(3000),
            invoke_timeout: Duration::from_millis(5000),
            socket: SocketOptions::default(),
            io_threads: default_threads(),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `YURPC_CONNECT_TIMEOUT_MS`, `YURPC_INVOKE_TIMEOUT_MS`,
    /// `YURPC_SEND_BUFFER_SIZE`, `YURPC_RECV_BUFFER_SIZE`, `YURPC_IO_THREADS`
    /// and `YURPC_HEARTBEAT_INTERVAL_MS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(ms) = env_var::<u64>("YURPC_CONNECT_TIMEOUT_MS")? {
            config.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env_var::<u64>("YURPC_INVOKE_TIMEOUT_MS")? {
            config.invoke_timeout = Duration::from_millis(ms);
        }
        if let Some(size) = env_var("YURPC_SEND_BUFFER_SIZE")? {
            config.socket.send_buffer_size = size;
        }
        if let Some(size) = env_var("YURPC_RECV_BUFFER_SIZE")? {
            config.socket.recv_buffer_size = size;
        }
        if let Some(threads) = env_var("YURPC_IO_THREADS")? {
            config.io_threads = threads;
        }
        if let Some(ms) = env_var::<u64>("YURPC_HEARTBEAT_INTERVAL_MS")? {
            config.heartbeat_interval = Duration::from_millis(ms);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout = timeout;
        self
    }

    pub fn with_socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads;
        self
    }

    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// # Errors
    ///
    /// Returns an error if a timeout, the heartbeat interval, the thread
    /// count, a buffer size or the frame cap is zero.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(YurpcError::InvalidConfig(
                "connect timeout must be greater than zero".to_string(),
            ));
        }
        if self.invoke_timeout.is_zero() {
            return Err(YurpcError::InvalidConfig(
                "invoke timeout must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(YurpcError::InvalidConfig(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if self.io_threads == 0 {
            return Err(YurpcError::InvalidConfig(
                "io threads must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_length == 0 {
            return Err(YurpcError::InvalidConfig(
                "max frame length must be greater than zero".to_string(),
            ));
        }
        check_socket_options(&self.socket)
    }
}

/// Server side connection options.
///
/// With `acceptor_threads == 0` the worker pool also accepts connections;
/// otherwise a separate acceptor pool of that size owns the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_host: String,
    /// Listening port, 0 picks an ephemeral port
    pub port: u16,
    /// Host announced to discovery for registered services
    pub advertise_host: String,
    pub acceptor_threads: usize,
    pub worker_threads: usize,
    pub socket: SocketOptions,
    /// Connections without inbound traffic for this long are closed
    pub idle_timeout: Duration,
    pub max_frame_length: usize,
    pub backlog: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 7777,
            advertise_host: "127.0.0.1".to_string(),
            acceptor_threads: 0,
            worker_threads: default_threads(),
            socket: SocketOptions::default(),
            idle_timeout: Duration::from_secs(60),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            backlog: 1024,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `YURPC_BIND_HOST`, `YURPC_PORT`, `YURPC_ADVERTISE_HOST`,
    /// `YURPC_ACCEPTOR_THREADS`, `YURPC_WORKER_THREADS` and `YURPC_IDLE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(host) = env_var("YURPC_BIND_HOST")? {
            config.bind_host = host;
        }
        if let Some(port) = env_var("YURPC_PORT")? {
            config.port = port;
        }
        if let Some(host) = env_var("YURPC_ADVERTISE_HOST")? {
            config.advertise_host = host;
        }
        if let Some(threads) = env_var("YURPC_ACCEPTOR_THREADS")? {
            config.acceptor_threads = threads;
        }
        if let Some(threads) = env_var("YURPC_WORKER_THREADS")? {
            config.worker_threads = threads;
        }
        if let Some(secs) = env_var::<u64>("YURPC_IDLE_TIMEOUT_SECS")? {
            config.idle_timeout = Duration::from_secs(secs);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_bind_host(mut self, host: impl Into<String>) -> Self {
        self.bind_host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_advertise_host(mut self, host: impl Into<String>) -> Self {
        self.advertise_host = host.into();
        self
    }

    pub fn with_acceptor_threads(mut self, threads: usize) -> Self {
        self.acceptor_threads = threads;
        self
    }

    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn with_socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(YurpcError::InvalidConfig(
                "worker threads must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(YurpcError::InvalidConfig(
                "idle timeout must be greater than zero".to_string(),
            ));
        }
        if self.max_frame_length == 0 {
            return Err(YurpcError::InvalidConfig(
                "max frame length must be greater than zero".to_string(),
            ));
        }
        check_socket_options(&self.socket)
    }
}
