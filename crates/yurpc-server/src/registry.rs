use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use yurpc_common::{DiscoveryService, Endpoint};

use crate::service::RpcService;

/// Interface name to service object mapping for one server.
///
/// Written on (rare) registrations, read on every inbound request; a single
/// read/write lock guards the map. When a directory is configured every
/// registered interface is announced with this server's advertised address.
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn RpcService>>>,
    discovery: Option<Arc<dyn DiscoveryService>>,
    host: String,
    port: u16,
}

impl ServiceRegistry {
    /// Creates a registry advertising `host:port` to discovery.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            discovery: None,
            host: host.into(),
            port,
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryService>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Registers `service` under every interface it implements.
    ///
    /// The last registration for an interface name wins. An object
    /// implementing no interfaces is logged and skipped entirely; nothing is
    /// stored or published. Returns the names registered.
    pub fn register(&self, service: Arc<dyn RpcService>) -> Vec<String> {
        let interfaces = service.interfaces();
        if interfaces.is_empty() {
            tracing::error!("Service implements no interfaces, registration skipped");
            return Vec::new();
        }

        {
            let mut services = self.services.write().unwrap_or_else(PoisonError::into_inner);
            for name in &interfaces {
                if services.insert(name.clone(), Arc::clone(&service)).is_some() {
                    tracing::info!(service = %name, "Replaced registered service");
                } else {
                    tracing::info!(service = %name, "Registered service");
                }
            }
        }

        if let Some(discovery) = &self.discovery {
            for name in &interfaces {
                discovery.register(Endpoint::new(self.host.clone(), self.port, name.clone()));
            }
        }

        interfaces
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn RpcService>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered interface names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.services.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Address announced to discovery, `host:port`.
    pub fn advertised_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.names())
            .field("advertised", &self.advertised_address())
            .finish()
    }
}
