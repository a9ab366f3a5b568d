//! CLI Integration Tests
//!
//! Runs the `yurpc` binary against an in-process server exposing the demo
//! services.
//!
//! Addresses use `127.0.0.1` with an OS-assigned port to avoid DNS and
//! port-collision issues.

use std::process::Command;
use std::sync::Arc;

use yurpc_common::ServerConfig;
use yurpc_server::YurpcServer;

// ============================================================================
// Test Helpers
// ============================================================================

fn yurpc() -> Command {
    Command::new(env!("CARGO_BIN_EXE_yurpc"))
}

fn start_demo_server() -> YurpcServer {
    let config = ServerConfig::default()
        .with_bind_host("127.0.0.1")
        .with_port(0)
        .with_worker_threads(1);
    let server = YurpcServer::bind(config).unwrap();
    server.register(Arc::new(yurpc_cli::demo::calc()));
    server.register(Arc::new(yurpc_cli::demo::echo()));
    server.start().unwrap();
    server
}

// ============================================================================
// call
// ============================================================================

#[test]
fn test_call_prints_raw_json() {
    let server = start_demo_server();
    let addr = server.local_addr().to_string();

    let output = yurpc().args(["call", &addr, "Calc.add", "-a", "[2, 3]"]).output().unwrap();

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "5");
}

#[test]
fn test_call_echo_object() {
    let server = start_demo_server();
    let addr = server.local_addr().to_string();

    let output = yurpc()
        .args(["call", &addr, "Echo.echo", "-a", r#"[{"k": "v"}]"#])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), r#"{"k":"v"}"#);
}

#[test]
fn test_call_unknown_method_fails() {
    let server = start_demo_server();
    let addr = server.local_addr().to_string();

    let output = yurpc().args(["call", &addr, "Calc.pow", "-a", "[2, 3]"]).output().unwrap();

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("405"));
}

#[test]
fn test_call_unreachable_reports_connection_failure() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let output = yurpc()
        .args(["call", &format!("127.0.0.1:{}", port), "Calc.add"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1000"));
}

#[test]
fn test_call_invalid_args_json() {
    let output = yurpc()
        .args(["call", "127.0.0.1:7777", "Calc.add", "-a", "[1,"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid JSON"));
}

#[test]
fn test_call_invalid_address() {
    let output = yurpc().args(["call", "no-port", "Calc.add"]).output().unwrap();
    assert!(!output.status.success());
}
