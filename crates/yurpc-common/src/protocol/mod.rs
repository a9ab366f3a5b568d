pub mod endpoint;
pub mod error;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use endpoint::Endpoint;
pub use error::{Result, YurpcError};
pub use requests::{MethodName, Request, RequestId, RpcArgs, SendFlag};
pub use responses::{Response, ResponseCode, RpcResult};
