//! Tracking of in-flight requests awaiting responses.
//!
//! Every call registers its request id here before the request is written.
//! The entry is removed exactly once, by whichever comes first: the inbound
//! response ([`complete`](PendingRequests::complete)), a failed send
//! ([`cancel`](PendingRequests::cancel)) or the caller's timeout
//! ([`remove`](PendingRequests::remove)). Removal hands out the one-shot
//! sender, so at most one response is ever delivered per call.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use yurpc_common::{RequestId, Response};

/// Concurrent map from request id to the waiting caller's response slot.
///
/// Registration happens on calling threads and completion on the I/O
/// threads. Entries are independent, so a single short-lived lock around the
/// map is all the coordination needed; it is never held across an await.
///
/// # Example
///
/// ```rust
/// use yurpc_client::PendingRequests;
/// use yurpc_common::Response;
/// use serde_json::json;
///
/// let pending = PendingRequests::new();
/// let mut rx = pending.register(42);
///
/// assert!(pending.complete(42, Response::success(42, json!(5))));
/// assert_eq!(rx.try_recv().unwrap().result, Some(json!(5)));
///
/// // Late or duplicate responses are dropped
/// assert!(!pending.complete(42, Response::success(42, json!(6))));
/// ```
#[derive(Debug, Default)]
pub struct PendingRequests {
    requests: Mutex<HashMap<RequestId, oneshot::Sender<Response>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Response>>> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `id` and returns the receiver the caller waits on.
    pub fn register(&self, id: RequestId) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        if self.lock().insert(id, tx).is_some() {
            tracing::warn!(request_id = id, "Request id registered twice, previous waiter dropped");
        }
        rx
    }

    /// Delivers `response` to the caller waiting on `id`.
    ///
    /// Returns `false` when `id` is not pending (the caller already timed out,
    /// or the id is unknown); the response is discarded.
    pub fn complete(&self, id: RequestId, response: Response) -> bool {
        let sender = self.lock().remove(&id);
        match sender {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Removes `id` after a failed send and wakes its caller with a
    /// synthesized failure response.
    pub fn cancel(&self, id: RequestId, cause: impl fmt::Display) -> bool {
        let sender = self.lock().remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(Response::send_failure(id, cause));
                true
            }
            None => false,
        }
    }

    /// Removes `id` without delivering anything (timeout cleanup).
    ///
    /// Returns `false` when a response or cancellation already claimed it.
    pub fn remove(&self, id: RequestId) -> bool {
        self.lock().remove(&id).is_some()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use yurpc_common::ResponseCode;

    #[tokio::test]
    async fn test_register_and_complete() {
        let pending = PendingRequests::new();
        let rx = pending.register(42);
        assert_eq!(pending.len(), 1);

        assert!(pending.complete(42, Response::success(42, json!("response"))));

        let response = rx.await.unwrap();
        assert_eq!(response.result, Some(json!("response")));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_complete_unknown_is_noop() {
        let pending = PendingRequests::new();
        assert!(!pending.complete(99, Response::success(99, json!(1))));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_delivers_failure() {
        let pending = PendingRequests::new();
        let rx = pending.register(7);

        assert!(pending.cancel(7, "broken pipe"));
        assert!(!pending.contains(7));

        let response = rx.await.unwrap();
        assert_eq!(response.id, 7);
        assert_eq!(response.code, ResponseCode::INVOKE_TIMEOUT);
        assert!(response.message.unwrap().contains("broken pipe"));
    }

    #[test]
    fn test_cancel_unknown() {
        let pending = PendingRequests::new();
        assert!(!pending.cancel(1, "nothing"));
    }

    #[tokio::test]
    async fn test_remove_then_late_complete_dropped() {
        let pending = PendingRequests::new();
        let rx = pending.register(5);

        assert!(pending.remove(5));
        assert!(!pending.complete(5, Response::success(5, json!(1))));
        assert!(!pending.cancel(5, "late"));
        assert!(!pending.remove(5));

        // Nothing was ever delivered
        assert!(rx.await.is_err());
    }

    #[test]
    fn test_first_delivery_wins() {
        let pending = PendingRequests::new();
        let mut rx = pending.register(3);

        assert!(pending.complete(3, Response::success(3, json!("first"))));
        assert!(!pending.cancel(3, "second"));
        assert!(!pending.complete(3, Response::success(3, json!("third"))));

        assert_eq!(rx.try_recv().unwrap().result, Some(json!("first")));
    }

    #[test]
    fn test_concurrent_register_and_complete() {
        let pending = Arc::new(PendingRequests::new());
        let mut handles = Vec::new();

        for t in 0..8u64 {
            let pending = Arc::clone(&pending);
            handles.push(std::thread::spawn(move || {
                for i in 0..500u64 {
                    let id = t * 1_000 + i;
                    let mut rx = pending.register(id);
                    let delivered = if i % 3 == 0 {
                        pending.cancel(id, "send failed")
                    } else if i % 3 == 1 {
                        pending.complete(id, Response::success(id, json!(i)))
                    } else {
                        pending.remove(id)
                    };
                    assert!(delivered);
                    match i % 3 {
                        2 => assert!(rx.try_recv().is_err()),
                        _ => assert_eq!(rx.try_recv().unwrap().id, id),
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pending.is_empty(), "every registered id must be removed exactly once");
    }
}
