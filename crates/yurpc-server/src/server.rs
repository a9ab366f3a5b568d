use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::watch;
use yurpc_common::protocol::error::{Result, YurpcError};
use yurpc_common::transport::tcp;
use yurpc_common::{DiscoveryService, ServerConfig};

use crate::dispatcher::Dispatcher;
use crate::registry::ServiceRegistry;
use crate::service::RpcService;
use crate::tcp_server::{accept_loop, ConnectionContext};

/// YuRPC server.
///
/// Owns a worker runtime that drives connection I/O and service calls, and
/// optionally a separate acceptor runtime for the listening socket. With
/// `acceptor_threads == 0` the worker pool also accepts.
///
/// The listener is bound in [`bind`](Self::bind), so the actual port is known
/// (and advertised to discovery) before any service is registered.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use yurpc_common::ServerConfig;
/// use yurpc_server::{FnService, YurpcServer};
/// use serde_json::json;
///
/// let server = YurpcServer::bind(ServerConfig::default().with_port(7777))?;
/// server.register(Arc::new(FnService::new("Echo").method("echo", |args| Ok(json!(args)))));
/// server.start()?;
/// // ...
/// server.shutdown();
/// # Ok::<(), yurpc_common::YurpcError>(())
/// ```
pub struct YurpcServer {
    config: ServerConfig,
    local_addr: SocketAddr,
    registry: Arc<ServiceRegistry>,
    listener: Mutex<Option<TcpListener>>,
    workers: Option<Runtime>,
    acceptor: Option<Runtime>,
    shutdown: watch::Sender<bool>,
}

impl YurpcServer {
    /// Starts the runtimes and binds the listening socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the bind address
    /// does not resolve, or the port cannot be bound.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Like [`bind`](Self::bind), announcing every registered service to
    /// `discovery`.
    pub fn bind_with_discovery(config: ServerConfig, discovery: Arc<dyn DiscoveryService>) -> Result<Self> {
        Self::build(config, Some(discovery))
    }

    fn build(config: ServerConfig, discovery: Option<Arc<dyn DiscoveryService>>) -> Result<Self> {
        config.validate()?;

        let workers = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.worker_threads)
            .thread_name("yurpc-server-worker")
            .enable_all()
            .build()?;

        let acceptor = match config.acceptor_threads {
            0 => None,
            threads => Some(
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(threads)
                    .thread_name("yurpc-server-acceptor")
                    .enable_all()
                    .build()?,
            ),
        };

        let bind_addr = config
            .bind_addr()
            .to_socket_addrs()
            .map_err(|e| YurpcError::InvalidConfig(format!("Invalid bind address {}: {}", config.bind_addr(), e)))?
            .next()
            .ok_or_else(|| YurpcError::InvalidConfig(format!("Bind address {} did not resolve", config.bind_addr())))?;

        let listener = {
            let _guard = acceptor.as_ref().unwrap_or(&workers).enter();
            tcp::bind(bind_addr, &config.socket, config.backlog)?
        };
        let local_addr = listener.local_addr()?;

        let mut registry = ServiceRegistry::new(config.advertise_host.clone(), local_addr.port());
        if let Some(discovery) = discovery {
            registry = registry.with_discovery(discovery);
        }

        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            addr = %local_addr,
            worker_threads = config.worker_threads,
            acceptor_threads = config.acceptor_threads,
            "Server bound"
        );

        Ok(Self {
            config,
            local_addr,
            registry: Arc::new(registry),
            listener: Mutex::new(Some(listener)),
            workers: Some(workers),
            acceptor,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Registers `service` under every interface it implements. See
    /// [`ServiceRegistry::register`].
    pub fn register(&self, service: Arc<dyn RpcService>) -> Vec<String> {
        self.registry.register(service)
    }

    /// Starts accepting connections. Returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the server was already started or shut down.
    pub fn start(&self) -> Result<()> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| YurpcError::Transport("Server already started".to_string()))?;
        let workers = self
            .workers
            .as_ref()
            .ok_or_else(|| YurpcError::Transport("Server is shut down".to_string()))?;

        let ctx = Arc::new(ConnectionContext {
            dispatcher: Dispatcher::new(Arc::clone(&self.registry)),
            idle_timeout: self.config.idle_timeout,
            max_frame_length: self.config.max_frame_length,
            tcp_nodelay: self.config.socket.tcp_nodelay,
        });

        let worker_handle: Handle = workers.handle().clone();
        let accept = accept_loop(listener, worker_handle, ctx, self.shutdown.subscribe());
        match &self.acceptor {
            Some(acceptor) => acceptor.spawn(accept),
            None => workers.spawn(accept),
        };

        tracing::info!(addr = %self.local_addr, services = ?self.registry.names(), "Server started");
        Ok(())
    }

    /// Blocks the calling thread until `signal` resolves, then shuts down.
    pub fn run_until<F>(mut self, signal: F)
    where
        F: std::future::Future<Output = ()>,
    {
        if let Some(workers) = &self.workers {
            workers.block_on(signal);
        }
        self.stop();
    }

    /// Stops accepting, closes open connections and stops the runtimes.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(true);
        // Never started: release the socket while its reactor is still up
        drop(self.listener.lock().unwrap_or_else(PoisonError::into_inner).take());

        let in_runtime = Handle::try_current().is_ok();
        for runtime in [self.acceptor.take(), self.workers.take()].into_iter().flatten() {
            if in_runtime {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(Duration::from_secs(1));
            }
        }
        tracing::info!(addr = %self.local_addr, "Server shut down");
    }
}

impl Drop for YurpcServer {
    fn drop(&mut self) {
        if self.workers.is_some() {
            self.stop();
        }
    }
}

impl std::fmt::Debug for YurpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YurpcServer")
            .field("local_addr", &self.local_addr)
            .field("registry", &self.registry)
            .finish()
    }
}
