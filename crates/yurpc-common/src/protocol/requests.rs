use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

pub type RequestId = u64;
pub type MethodName = String;
pub type RpcArgs = Vec<serde_json::Value>;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Outcome of the asynchronous send of a request.
///
/// Clones share the same flag, so the send completion callback running on an
/// I/O thread can mark the request that the calling thread still holds.
#[derive(Clone, Default)]
pub struct SendFlag(Arc<AtomicBool>);

impl SendFlag {
    pub fn mark_sent(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_sent(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SendFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.is_sent())
    }
}

impl PartialEq for SendFlag {
    fn eq(&self, other: &Self) -> bool {
        self.is_sent() == other.is_sent()
    }
}

/// An RPC request sent from a client to a server.
///
/// Only `id`, `method` and `args` travel on the wire. The target address, the
/// `direct` flag and the send outcome are local routing state for the
/// invocation engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    /// Qualified method name, conventionally `<service>.<method>`
    pub method: MethodName,
    #[serde(default)]
    pub args: RpcArgs,
    #[serde(skip)]
    pub host: String,
    #[serde(skip)]
    pub port: u16,
    /// Bypass discovery even when a directory is configured
    #[serde(skip)]
    pub direct: bool,
    #[serde(skip)]
    pub sent: SendFlag,
}

impl Request {
    pub fn new(method: impl Into<String>, args: RpcArgs) -> Self {
        Request {
            id: generate_request_id(),
            method: method.into(),
            args,
            host: String::new(),
            port: 0,
            direct: false,
            sent: SendFlag::default(),
        }
    }

    pub fn with_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    /// Name of the service owning the method: everything before the last `.`.
    ///
    /// A method without a `.` is its own service name.
    pub fn service_name(&self) -> &str {
        match self.method.rfind('.') {
            Some(idx) => &self.method[..idx],
            None => &self.method,
        }
    }

    /// Method name without the service qualifier.
    pub fn method_name(&self) -> &str {
        match self.method.rfind('.') {
            Some(idx) => &self.method[idx + 1..],
            None => &self.method,
        }
    }

    /// Connection cache key, `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_sent(&self) -> bool {
        self.sent.is_sent()
    }
}

/// Process-wide monotonically increasing identifier, never reused while the
/// process lives.
fn generate_request_id() -> RequestId {
    REQUEST_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}
