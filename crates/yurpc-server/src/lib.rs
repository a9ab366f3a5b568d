//! YuRPC Server
//!
//! Exposes service objects over persistent, length-prefixed TCP connections.
//!
//! - [`ServiceRegistry`]: interface name to service object, optionally
//!   published to discovery
//! - [`Dispatcher`]: resolves a decoded request against the registry
//! - [`YurpcServer`]: acceptor and worker pools, per-connection idle policy

pub mod dispatcher;
pub mod registry;
pub mod server;
pub mod service;
mod tcp_server;

pub use dispatcher::Dispatcher;
pub use registry::ServiceRegistry;
pub use server::YurpcServer;
pub use service::{FnService, RpcService};
