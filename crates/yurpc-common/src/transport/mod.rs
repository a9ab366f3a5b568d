//! YuRPC Transport Layer
//!
//! This module provides the frame codec and TCP socket helpers used by both
//! the client and the server.
//!
//! # Architecture
//!
//! - **Framing**: [`FrameCodec`] turns a byte stream into length-prefixed
//!   UTF-8 text frames and back (a `tokio_util` codec)
//! - **Envelopes**: [`JsonCodec`] maps frame text to `Request`/`Response`
//! - **Sockets**: [`tcp`] opens client connections and listeners with the
//!   configured socket options
//!
//! # Wire Format
//!
//! ```text
//! | 4-byte big-endian length N | N bytes UTF-8 payload | ...
//! ```
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use yurpc_common::transport::FrameCodec;
//!
//! let frame = FrameCodec::encode_frame("hello");
//! let mut buf = BytesMut::from(&frame[..]);
//!
//! let payloads = FrameCodec::new().decode_all(&mut buf).unwrap();
//! assert_eq!(payloads, vec!["hello".to_string()]);
//! ```

pub mod codec;
pub mod tcp;

pub use codec::{FrameCodec, JsonCodec, LENGTH_FIELD_LEN};
pub use tcp::SocketOptions;
