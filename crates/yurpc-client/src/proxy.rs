use std::sync::Arc;

use serde::de::DeserializeOwned;
use yurpc_common::protocol::error::Result;
use yurpc_common::{Request, RpcArgs};

use crate::client::YurpcClient;

/// Method-call trampoline for one remote service.
///
/// Each call becomes a [`Request`] for `"<service>.<method>"`, goes through
/// the client's invocation engine, and the [`Response`](yurpc_common::Response)
/// is turned back into the method's return type. The proxy holds no state
/// beyond the client reference and its default target.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use yurpc_client::YurpcClient;
/// use yurpc_common::ClientConfig;
/// use serde_json::json;
///
/// let client = Arc::new(YurpcClient::new(ClientConfig::default())?);
/// let calc = client.proxy("Calc").with_target("127.0.0.1", 7777);
///
/// let sum: i64 = calc.call("add", vec![json!(2), json!(3)])?;
/// assert_eq!(sum, 5);
/// # Ok::<(), yurpc_common::YurpcError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ServiceProxy {
    client: Arc<YurpcClient>,
    service: String,
    host: String,
    port: u16,
    direct: bool,
}

impl ServiceProxy {
    pub fn new(client: Arc<YurpcClient>, service: impl Into<String>) -> Self {
        Self {
            client,
            service: service.into(),
            host: String::new(),
            port: 0,
            direct: false,
        }
    }

    /// Target used when discovery is off or has no providers.
    pub fn with_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Always use the configured target, even when discovery is installed.
    pub fn with_direct(mut self, direct: bool) -> Self {
        self.direct = direct;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Builds the request for `method` without sending it.
    pub fn request(&self, method: &str, args: RpcArgs) -> Request {
        Request::new(format!("{}.{}", self.service, method), args)
            .with_target(self.host.clone(), self.port)
            .with_direct(self.direct)
    }

    /// Calls `method` and blocks for its typed result.
    ///
    /// # Errors
    ///
    /// - [`YurpcError::Connection`] / [`YurpcError::Timeout`] for local
    ///   transport failures
    /// - [`YurpcError::Remote`] for failures reported by the server
    /// - [`YurpcError::Json`] when the result does not deserialize into `T`
    ///
    /// [`YurpcError::Connection`]: yurpc_common::YurpcError::Connection
    /// [`YurpcError::Timeout`]: yurpc_common::YurpcError::Timeout
    /// [`YurpcError::Remote`]: yurpc_common::YurpcError::Remote
    /// [`YurpcError::Json`]: yurpc_common::YurpcError::Json
    pub fn call<T: DeserializeOwned>(&self, method: &str, args: RpcArgs) -> Result<T> {
        self.client.invoke(self.request(method, args)).into_result()
    }

    pub async fn call_async<T: DeserializeOwned>(&self, method: &str, args: RpcArgs) -> Result<T> {
        self.client
            .invoke_async(self.request(method, args))
            .await
            .into_result()
    }
}
