//! Service objects exposed by a server.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use yurpc_common::protocol::error::{Result, YurpcError};
use yurpc_common::RpcArgs;

/// An object whose methods can be invoked remotely.
///
/// `interfaces` is the explicit capability set: every name returned is a
/// service name under which the registry publishes this object. Returning an
/// empty set makes the object unregistrable.
pub trait RpcService: Send + Sync {
    /// Service names this object implements.
    fn interfaces(&self) -> Vec<String>;

    /// Invokes `method` (unqualified) with positional `args`.
    ///
    /// Return [`YurpcError::MethodNotFound`] for unknown methods; any other
    /// error is reported to the caller as an invocation failure.
    fn call(&self, method: &str, args: RpcArgs) -> Result<Value>;
}

type Handler = Arc<dyn Fn(RpcArgs) -> Result<Value> + Send + Sync>;

/// Service assembled from closures, one per method.
///
/// # Example
///
/// ```rust
/// use yurpc_server::{FnService, RpcService};
/// use serde_json::json;
///
/// let calc = FnService::new("Calc").method("add", |args| {
///     let a = args.first().and_then(|v| v.as_i64()).unwrap_or(0);
///     let b = args.get(1).and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok(json!(a + b))
/// });
///
/// assert_eq!(calc.interfaces(), vec!["Calc".to_string()]);
/// assert_eq!(calc.call("add", vec![json!(2), json!(3)]).unwrap(), json!(5));
/// ```
#[derive(Clone, Default)]
pub struct FnService {
    interfaces: Vec<String>,
    methods: HashMap<String, Handler>,
}

impl FnService {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interfaces: vec![interface.into()],
            methods: HashMap::new(),
        }
    }

    /// A service implementing no interfaces. Only useful once
    /// [`implements`](Self::implements) adds some.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Publishes this object under an additional service name.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(RpcArgs) -> Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }
}

impl RpcService for FnService {
    fn interfaces(&self) -> Vec<String> {
        self.interfaces.clone()
    }

    fn call(&self, method: &str, args: RpcArgs) -> Result<Value> {
        match self.methods.get(method) {
            Some(handler) => handler(args),
            None => Err(YurpcError::MethodNotFound(method.to_string())),
        }
    }
}

impl fmt::Debug for FnService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        f.debug_struct("FnService")
            .field("interfaces", &self.interfaces)
            .field("methods", &methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_method() {
        let service = FnService::new("Echo").method("echo", |args| Ok(json!(args)));
        let result = service.call("shout", vec![]);
        assert!(matches!(result, Err(YurpcError::MethodNotFound(m)) if m == "shout"));
    }

    #[test]
    fn test_multiple_interfaces() {
        let service = FnService::new("Calc").implements("com.example.Calc");
        assert_eq!(service.interfaces(), vec!["Calc".to_string(), "com.example.Calc".to_string()]);
    }

    #[test]
    fn test_anonymous_has_no_interfaces() {
        let service = FnService::anonymous().method("noop", |_| Ok(Value::Null));
        assert!(service.interfaces().is_empty());
        assert!(service.has_method("noop"));
    }

    #[test]
    fn test_handler_error_propagates() {
        let service = FnService::new("Calc").method("fail", |_| {
            Err(YurpcError::InvalidRequest("boom".to_string()))
        });
        assert!(matches!(service.call("fail", vec![]), Err(YurpcError::InvalidRequest(_))));
    }
}
