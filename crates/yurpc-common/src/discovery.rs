//! Endpoint directory boundary.
//!
//! The client asks a [`DiscoveryService`] which endpoints serve a service
//! name before each call; the server announces every registered interface
//! to it. Real deployments plug in their own directory; [`StaticDiscovery`]
//! is an in-process table for single-host setups and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::protocol::Endpoint;

/// Resolves service names to endpoints and accepts provider announcements.
pub trait DiscoveryService: Send + Sync {
    /// Candidate endpoints for `service`. Empty means "use the request's own
    /// host and port".
    fn query(&self, service: &str) -> Vec<Endpoint>;

    /// Announces `endpoint` as a provider. Fire-and-forget.
    fn register(&self, endpoint: Endpoint);
}

/// In-memory endpoint table.
///
/// Duplicate announcements of the same endpoint are ignored, so a provider
/// that re-registers does not skew random selection.
#[derive(Debug, Default)]
pub struct StaticDiscovery {
    endpoints: RwLock<HashMap<String, Vec<Endpoint>>>,
}

impl StaticDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory pre-populated with `endpoints`.
    pub fn with_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let discovery = Self::new();
        for endpoint in endpoints {
            discovery.register(endpoint);
        }
        discovery
    }

    /// Removes one provider of a service. Returns whether it was present.
    pub fn deregister(&self, endpoint: &Endpoint) -> bool {
        let mut endpoints = match self.endpoints.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match endpoints.get_mut(&endpoint.service) {
            Some(list) => {
                let before = list.len();
                list.retain(|e| e != endpoint);
                before != list.len()
            }
            None => false,
        }
    }

    pub fn service_count(&self) -> usize {
        match self.endpoints.read() {
            Ok(guard) => guard.values().filter(|list| !list.is_empty()).count(),
            Err(poisoned) => poisoned.into_inner().values().filter(|list| !list.is_empty()).count(),
        }
    }
}

impl DiscoveryService for StaticDiscovery {
    fn query(&self, service: &str) -> Vec<Endpoint> {
        let endpoints = match self.endpoints.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        endpoints.get(service).cloned().unwrap_or_default()
    }

    fn register(&self, endpoint: Endpoint) {
        let mut endpoints = match self.endpoints.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let list = endpoints.entry(endpoint.service.clone()).or_default();
        if !list.contains(&endpoint) {
            tracing::debug!(endpoint = %endpoint, "Registered endpoint");
            list.push(endpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_unknown_service_is_empty() {
        let discovery = StaticDiscovery::new();
        assert!(discovery.query("Calc").is_empty());
    }

    #[test]
    fn test_register_and_query() {
        let discovery = StaticDiscovery::new();
        discovery.register(Endpoint::new("10.0.0.1", 7777, "Calc"));
        discovery.register(Endpoint::new("10.0.0.2", 7777, "Calc"));
        discovery.register(Endpoint::new("10.0.0.1", 7777, "Echo"));

        let calc = discovery.query("Calc");
        assert_eq!(calc.len(), 2);
        assert_eq!(calc[0].address(), "10.0.0.1:7777");
        assert_eq!(discovery.query("Echo").len(), 1);
        assert_eq!(discovery.service_count(), 2);
    }

    #[test]
    fn test_duplicate_register_ignored() {
        let discovery = StaticDiscovery::new();
        discovery.register(Endpoint::new("10.0.0.1", 7777, "Calc"));
        discovery.register(Endpoint::new("10.0.0.1", 7777, "Calc"));
        assert_eq!(discovery.query("Calc").len(), 1);
    }

    #[test]
    fn test_deregister() {
        let endpoint = Endpoint::new("10.0.0.1", 7777, "Calc");
        let discovery = StaticDiscovery::with_endpoints(vec![endpoint.clone()]);

        assert!(discovery.deregister(&endpoint));
        assert!(!discovery.deregister(&endpoint));
        assert!(discovery.query("Calc").is_empty());
        assert_eq!(discovery.service_count(), 0);
    }
}
