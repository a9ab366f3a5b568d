//! Tests for the protocol module
//!
//! These tests verify request/response construction, ID generation, the
//! wire shape of the envelopes and response-to-result translation.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_request_creation() {
        let req = Request::new("Calc.add", vec![json!(2), json!(3)]);
        assert_eq!(req.method, "Calc.add");
        assert_eq!(req.args, vec![json!(2), json!(3)]);
        assert!(!req.direct);
        assert!(!req.is_sent());
    }

    #[test]
    fn test_request_target_and_direct() {
        let req = Request::new("Calc.add", vec![])
            .with_target("10.0.0.5", 7777)
            .with_direct(true);
        assert_eq!(req.address(), "10.0.0.5:7777");
        assert!(req.direct);
    }

    #[test]
    fn test_service_and_method_name() {
        let req = Request::new("com.example.Calc.add", vec![]);
        assert_eq!(req.service_name(), "com.example.Calc");
        assert_eq!(req.method_name(), "add");

        let bare = Request::new("ping", vec![]);
        assert_eq!(bare.service_name(), "ping");
        assert_eq!(bare.method_name(), "ping");
    }

    #[test]
    fn test_send_flag_is_shared_between_clones() {
        let req = Request::new("Calc.add", vec![]);
        let flag = req.sent.clone();
        flag.mark_sent();
        assert!(req.is_sent());
    }

    #[test]
    fn test_request_id_uniqueness() {
        let ids: HashSet<_> = (0..1000)
            .map(|_| Request::new("test", vec![]).id)
            .collect();
        assert_eq!(ids.len(), 1000, "All request IDs should be unique");
    }

    #[test]
    fn test_request_wire_shape_omits_routing_state() {
        let req = Request::new("Calc.add", vec![json!(2), json!(3)])
            .with_target("127.0.0.1", 9000)
            .with_direct(true);
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["method"], json!("Calc.add"));
        assert_eq!(value["args"], json!([2, 3]));
        assert_eq!(value["id"], json!(req.id));
        assert!(value.get("host").is_none());
        assert!(value.get("port").is_none());
        assert!(value.get("direct").is_none());
    }

    #[test]
    fn test_response_success() {
        let resp = Response::success(123, json!({"result": "ok"}));
        assert!(resp.is_ok());
        assert_eq!(resp.id, 123);
        assert_eq!(resp.code, ResponseCode::OK);
        assert_eq!(resp.result, Some(json!({"result": "ok"})));
        assert!(resp.message.is_none());
    }

    #[test]
    fn test_synthesized_responses() {
        let failure = Response::connection_failure(9);
        assert_eq!(failure.code, ResponseCode::CONNECTION_FAILURE);
        assert!(failure.code.is_local());

        let timeout = Response::invoke_timeout(9);
        assert_eq!(timeout.code, ResponseCode::INVOKE_TIMEOUT);

        let send = Response::send_failure(9, "broken pipe");
        assert_eq!(send.code, ResponseCode::INVOKE_TIMEOUT);
        assert!(send.message.unwrap().contains("broken pipe"));
    }

    #[test]
    fn test_response_wire_shape() {
        let resp = Response::error(5, ResponseCode::METHOD_NOT_FOUND, "no such method");
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value, json!({"id": 5, "code": 405, "message": "no such method", "result": null}));
    }

    #[test]
    fn test_response_deserializes_without_optional_fields() {
        let resp: Response = serde_json::from_str(r#"{"id":1,"code":200}"#).unwrap();
        assert!(resp.is_ok());
        assert!(resp.result.is_none());
    }

    #[test]
    fn test_into_result_ok() {
        let value: i64 = Response::success(1, json!(5)).into_result().unwrap();
        assert_eq!(value, 5);

        let unit: () = Response {
            id: 1,
            code: ResponseCode::OK,
            message: None,
            result: None,
        }
        .into_result()
        .unwrap();
        assert_eq!(unit, ());
    }

    #[test]
    fn test_into_result_errors() {
        let err = Response::connection_failure(1).into_result::<i64>().unwrap_err();
        assert!(matches!(err, YurpcError::Connection(_)));

        let err = Response::invoke_timeout(1).into_result::<i64>().unwrap_err();
        assert!(matches!(err, YurpcError::Timeout(_)));

        let err = Response::error(1, ResponseCode(42), "custom")
            .into_result::<i64>()
            .unwrap_err();
        match err {
            YurpcError::Remote { code, message } => {
                assert_eq!(code, 42);
                assert_eq!(message, "custom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_into_result_type_mismatch() {
        let err = Response::success(1, json!("five"))
            .into_result::<i64>()
            .unwrap_err();
        assert!(matches!(err, YurpcError::Json(_)));
    }

    // ========================================================================
    // Request ID Stress Tests
    // ========================================================================

    #[test]
    fn test_request_id_uniqueness_under_stress() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let ids = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = vec![];

        for _ in 0..10 {
            let ids_clone = Arc::clone(&ids);
            let handle = thread::spawn(move || {
                for _ in 0..1000 {
                    let id = Request::new("test", vec![]).id;
                    let mut ids = ids_clone.lock().unwrap();
                    assert!(ids.insert(id), "Duplicate ID detected: {}", id);
                }
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ids.lock().unwrap().len(), 10_000);
    }

    #[test]
    fn test_request_id_monotonicity() {
        let mut prev_id = Request::new("test", vec![]).id;

        for _ in 0..1000 {
            let id = Request::new("test", vec![]).id;
            assert!(id > prev_id, "ID went backward: {} -> {}", prev_id, id);
            prev_id = id;
        }
    }
}
