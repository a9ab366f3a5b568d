use serde::{Deserialize, Serialize};
use std::fmt;

/// A network location serving one named service.
///
/// Produced by a [`DiscoveryService`](crate::discovery::DiscoveryService) and
/// read by the invocation engine when it selects a target for a call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Service (interface) name this endpoint provides
    pub service: String,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, service: impl Into<String>) -> Self {
        Endpoint {
            host: host.into(),
            port,
            service: service.into(),
        }
    }

    /// `host:port` form used as the connection cache key.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.service, self.host, self.port)
    }
}
