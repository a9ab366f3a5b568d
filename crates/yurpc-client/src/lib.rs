//! YuRPC Client
//!
//! Blocking RPC invocation over persistent, length-prefixed TCP connections.
//!
//! - [`YurpcClient`]: the invocation engine (`invoke` blocks the caller,
//!   network I/O runs on the client's own runtime)
//! - [`ConnectionManager`]: one lazily created connection per `host:port`
//! - [`PendingRequests`]: request id to waiting caller correlation
//! - [`ServiceProxy`]: typed method calls against one service

pub mod client;
pub mod connection;
pub mod connections;
pub mod load_balancer;
pub mod pending;
pub mod proxy;

pub use client::YurpcClient;
pub use connection::Connection;
pub use connections::ConnectionManager;
pub use pending::PendingRequests;
pub use proxy::ServiceProxy;
