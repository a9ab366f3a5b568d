use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use yurpc_common::protocol::error::Result;
use yurpc_common::transport::JsonCodec;
use yurpc_common::{ClientConfig, DiscoveryService, Request, Response, ResponseCode};

use crate::connections::ConnectionManager;
use crate::load_balancer::select_endpoint;
use crate::pending::PendingRequests;
use crate::proxy::ServiceProxy;

/// YuRPC client for making RPC calls
///
/// Turns the asynchronous exchange on a shared connection into a blocking
/// call with a deadline. Network I/O runs on the client's own I/O runtime;
/// the calling thread only blocks waiting for its response.
///
/// `invoke` never fails: connection problems, send failures and timeouts all
/// come back as a [`Response`] carrying a status code.
///
/// # Example
///
/// ```rust,no_run
/// use yurpc_client::YurpcClient;
/// use yurpc_common::{ClientConfig, Request};
/// use serde_json::json;
///
/// let client = YurpcClient::new(ClientConfig::default())?;
///
/// let request = Request::new("Calc.add", vec![json!(2), json!(3)]).with_target("127.0.0.1", 7777);
/// let response = client.invoke(request);
/// assert!(response.is_ok());
/// # Ok::<(), yurpc_common::YurpcError>(())
/// ```
pub struct YurpcClient {
    engine: Arc<Engine>,
    runtime: Option<Runtime>,
    handle: Handle,
}

/// State shared between the client handle and in-flight invocations.
struct Engine {
    config: ClientConfig,
    connections: ConnectionManager,
    pending: Arc<PendingRequests>,
    discovery: RwLock<Option<Arc<dyn DiscoveryService>>>,
}

impl YurpcClient {
    /// Creates a client with its own I/O runtime of `config.io_threads`
    /// worker threads.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the runtime cannot
    /// be started.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.io_threads)
            .thread_name("yurpc-client-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        tracing::debug!(io_threads = config.io_threads, "Client runtime started");
        Ok(Self::build(config, Some(runtime), handle))
    }

    /// Creates a client whose I/O runs on an existing runtime.
    ///
    /// Intended for applications that are already async and call
    /// [`invoke_async`](Self::invoke_async).
    pub fn with_handle(config: ClientConfig, handle: Handle) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, None, handle))
    }

    fn build(config: ClientConfig, runtime: Option<Runtime>, handle: Handle) -> Self {
        let pending = Arc::new(PendingRequests::new());
        let connections = ConnectionManager::new(config.clone(), Arc::clone(&pending));
        Self {
            engine: Arc::new(Engine {
                config,
                connections,
                pending,
                discovery: RwLock::new(None),
            }),
            runtime,
            handle,
        }
    }

    pub fn with_discovery(self, discovery: Arc<dyn DiscoveryService>) -> Self {
        self.set_discovery(Some(discovery));
        self
    }

    /// Installs or removes the endpoint directory consulted before each call.
    pub fn set_discovery(&self, discovery: Option<Arc<dyn DiscoveryService>>) {
        *self
            .engine
            .discovery
            .write()
            .unwrap_or_else(PoisonError::into_inner) = discovery;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.engine.config
    }

    /// Number of requests currently waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.engine.pending.len()
    }

    /// Number of cached connections.
    pub fn connection_count(&self) -> usize {
        self.engine.connections.connection_count()
    }

    /// Typed calls against `service`.
    pub fn proxy(self: &Arc<Self>, service: impl Into<String>) -> ServiceProxy {
        ServiceProxy::new(Arc::clone(self), service)
    }

    /// Invokes `request` and blocks the calling thread until its response
    /// arrives or the invocation timeout passes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime; use
    /// [`invoke_async`](Self::invoke_async) there.
    pub fn invoke(&self, request: Request) -> Response {
        self.handle.block_on(self.invoke_async(request))
    }

    /// Async form of [`invoke`](Self::invoke).
    ///
    /// The invocation runs on the client's I/O runtime so connections it
    /// creates outlive the calling task.
    pub async fn invoke_async(&self, request: Request) -> Response {
        let id = request.id;
        let engine = Arc::clone(&self.engine);
        match self.handle.spawn(async move { engine.invoke(request).await }).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = id, error = %e, "Invocation aborted");
                Response::connection_failure(id)
            }
        }
    }

    /// Closes every connection and stops the I/O runtime.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        let engine = Arc::clone(&self.engine);
        match self.runtime.take() {
            // Blocking is not allowed on a runtime thread
            Some(runtime) if Handle::try_current().is_ok() => runtime.shutdown_background(),
            Some(runtime) => {
                runtime.block_on(async move { engine.connections.close_all().await });
                runtime.shutdown_timeout(Duration::from_secs(1));
                tracing::info!("Client shut down");
            }
            None => {
                self.handle.spawn(async move { engine.connections.close_all().await });
            }
        }
    }
}

impl Drop for YurpcClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for YurpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YurpcClient")
            .field("config", &self.engine.config)
            .field("connections", &self.engine.connections)
            .field("pending", &self.engine.pending.len())
            .finish()
    }
}

impl Engine {
    fn discovery(&self) -> Option<Arc<dyn DiscoveryService>> {
        self.discovery
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Overwrites the request's target with a random provider of its
    /// service, if the directory knows any.
    fn resolve_target(&self, request: &mut Request) {
        if request.direct {
            return;
        }
        let Some(discovery) = self.discovery() else {
            return;
        };

        let endpoints = discovery.query(request.service_name());
        if let Some(endpoint) = select_endpoint(&endpoints) {
            tracing::debug!(
                request_id = request.id,
                endpoint = %endpoint,
                candidates = endpoints.len(),
                "Resolved endpoint"
            );
            request.host = endpoint.host.clone();
            request.port = endpoint.port;
        }
    }

    async fn invoke(&self, mut request: Request) -> Response {
        self.resolve_target(&mut request);
        let id = request.id;

        let conn = match self.connections.acquire(&request.host, request.port).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(
                    request_id = id,
                    addr = %request.address(),
                    error = %e,
                    "Failed to acquire connection"
                );
                return Response::connection_failure(id);
            }
        };

        let payload = match JsonCodec::encode_request(&request) {
            Ok(payload) => payload,
            Err(e) => return Response::error(id, ResponseCode::BAD_REQUEST, e.to_string()),
        };

        let mut rx = self.pending.register(id);

        let pending = Arc::clone(&self.pending);
        let sent = request.sent.clone();
        let method = request.method.clone();
        conn.send(
            payload,
            Box::new(move |result| match result {
                Ok(()) => sent.mark_sent(),
                Err(e) => {
                    tracing::error!(request_id = id, method = %method, error = %e, "Failed to send request");
                    pending.cancel(id, e);
                }
            }),
        );

        match tokio::time::timeout(self.config.invoke_timeout, &mut rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                // Slot dropped undelivered: the id was registered again elsewhere
                self.pending.remove(id);
                Response::send_failure(id, "response slot dropped")
            }
            Err(_) if self.pending.remove(id) => {
                tracing::warn!(
                    request_id = id,
                    method = %request.method,
                    addr = %request.address(),
                    sent = request.is_sent(),
                    timeout_ms = self.config.invoke_timeout.as_millis() as u64,
                    "Invocation timed out"
                );
                Response::invoke_timeout(id)
            }
            // A delivery claimed the entry just as the deadline passed
            Err(_) => rx.await.unwrap_or_else(|_| Response::invoke_timeout(id)),
        }
    }
}
