use std::sync::Arc;

use yurpc_common::protocol::error::YurpcError;
use yurpc_common::transport::JsonCodec;
use yurpc_common::{Request, Response, ResponseCode};

use crate::registry::ServiceRegistry;

/// Resolves inbound requests against the registry and produces responses.
///
/// Status mapping:
/// - undecodable payload or unqualified method name: `BAD_REQUEST`
/// - no service registered under the name before the last `.`: `SERVICE_NOT_FOUND`
/// - service has no such method: `METHOD_NOT_FOUND`
/// - the method returned an error or panicked: `INVOKE_FAILURE`
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ServiceRegistry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Handles one frame payload. Service code runs on the blocking pool so
    /// slow methods never stall connection I/O.
    pub async fn dispatch_frame(&self, frame: &str) -> Response {
        let request = match JsonCodec::decode_request(frame) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to decode request");
                return Response::error(0, ResponseCode::BAD_REQUEST, e.to_string());
            }
        };

        let id = request.id;
        let dispatcher = self.clone();
        match tokio::task::spawn_blocking(move || dispatcher.dispatch(request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(request_id = id, error = %e, "Service invocation panicked");
                Response::error(id, ResponseCode::INVOKE_FAILURE, "service invocation panicked")
            }
        }
    }

    /// Invokes `request` on the calling thread.
    pub fn dispatch(&self, request: Request) -> Response {
        let id = request.id;
        if !request.method.contains('.') {
            return Response::error(
                id,
                ResponseCode::BAD_REQUEST,
                format!("method '{}' is not qualified with a service name", request.method),
            );
        }

        let service_name = request.service_name().to_string();
        let method = request.method_name().to_string();

        let Some(service) = self.registry.lookup(&service_name) else {
            tracing::debug!(request_id = id, service = %service_name, "Unknown service");
            return Response::error(
                id,
                ResponseCode::SERVICE_NOT_FOUND,
                format!("no such service: {}", service_name),
            );
        };

        match service.call(&method, request.args) {
            Ok(result) => Response::success(id, result),
            Err(YurpcError::MethodNotFound(_)) => Response::error(
                id,
                ResponseCode::METHOD_NOT_FOUND,
                format!("no such method: {}", request.method),
            ),
            Err(e) => {
                tracing::debug!(request_id = id, method = %request.method, error = %e, "Service method failed");
                Response::error(id, ResponseCode::INVOKE_FAILURE, e.to_string())
            }
        }
    }
}
