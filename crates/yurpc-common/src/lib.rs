//! YuRPC Common Types and Transport
//!
//! This crate provides the protocol definitions, frame codec and TCP helpers
//! shared by the YuRPC client and server.
//!
//! # Overview
//!
//! YuRPC is a lightweight RPC transport: a caller invokes a method on a remote
//! process over a persistent, binary-framed TCP connection and blocks until the
//! response arrives or a timeout expires. This crate contains the pieces both
//! sides agree on:
//!
//! - **Protocol Layer**: Request/Response envelopes, status codes, endpoints, errors
//! - **Transport Layer**: length-prefixed frame codec and socket setup
//! - **Discovery**: the endpoint directory boundary used for service lookup
//! - **Configuration**: client and server connection options
//!
//! # Wire Format
//!
//! - **Transport**: TCP, one persistent connection per remote address
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [UTF-8 JSON text]`
//! - **Serialization**: JSON envelopes
//!
//! # Example
//!
//! ```
//! use yurpc_common::{Request, Response, ResponseCode};
//! use serde_json::json;
//!
//! let request = Request::new("Calc.add", vec![json!(2), json!(3)])
//!     .with_target("127.0.0.1", 7777);
//!
//! let response = Response::success(request.id, json!(5));
//! assert_eq!(response.code, ResponseCode::OK);
//! ```

pub mod config;
pub mod discovery;
pub mod protocol;
pub mod transport;

pub use config::{ClientConfig, ServerConfig};
pub use discovery::{DiscoveryService, StaticDiscovery};
pub use protocol::*;
