use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};

use crate::protocol::error::{Result, YurpcError};

/// Socket level options applied to every connection.
///
/// Keep-alive probing is off by default: liveness is left to the
/// application level idle policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketOptions {
    pub tcp_nodelay: bool,
    pub keepalive: bool,
    pub send_buffer_size: u32,
    pub recv_buffer_size: u32,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            tcp_nodelay: true,
            keepalive: false,
            send_buffer_size: 65535,
            recv_buffer_size: 65535,
        }
    }
}

impl SocketOptions {
    fn socket_for(&self, addr: &SocketAddr) -> std::io::Result<TcpSocket> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_send_buffer_size(self.send_buffer_size)?;
        socket.set_recv_buffer_size(self.recv_buffer_size)?;
        socket.set_keepalive(self.keepalive)?;
        Ok(socket)
    }
}

/// Connects to `addr` (`host:port`) within `timeout`.
///
/// Name resolution counts against the timeout. Every resolved address is
/// tried in turn until one accepts.
///
/// # Errors
///
/// Returns [`YurpcError::Timeout`] when the deadline passes and
/// [`YurpcError::Connection`] when resolution fails or every address refuses.
pub async fn connect(addr: &str, options: &SocketOptions, timeout: Duration) -> Result<TcpStream> {
    match tokio::time::timeout(timeout, connect_any(addr, options)).await {
        Ok(result) => result,
        Err(_) => Err(YurpcError::Timeout(format!(
            "connect to {} exceeded {}ms",
            addr,
            timeout.as_millis()
        ))),
    }
}

async fn connect_any(addr: &str, options: &SocketOptions) -> Result<TcpStream> {
    let socket_addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| YurpcError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

    let mut last_err = None;
    for socket_addr in socket_addrs {
        let attempt = async {
            let socket = options.socket_for(&socket_addr)?;
            let stream = socket.connect(socket_addr).await?;
            stream.set_nodelay(options.tcp_nodelay)?;
            Ok::<_, std::io::Error>(stream)
        };
        match attempt.await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(YurpcError::Connection(format!(
        "Failed to connect to {}: {}",
        addr,
        last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no addresses resolved".to_string())
    )))
}

/// Binds a listening socket with the given options.
///
/// Must be called from within a tokio runtime context. Accepted sockets
/// inherit the buffer sizes and keep-alive setting of the listener.
pub fn bind(addr: SocketAddr, options: &SocketOptions, backlog: u32) -> Result<TcpListener> {
    let socket = options
        .socket_for(&addr)
        .map_err(|e| YurpcError::Connection(format!("Failed to create socket for {}: {}", addr, e)))?;
    socket.set_reuseaddr(true)?;
    socket
        .bind(addr)
        .map_err(|e| YurpcError::Connection(format!("Failed to bind to {}: {}", addr, e)))?;
    Ok(socket.listen(backlog)?)
}
