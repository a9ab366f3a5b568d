//! # YuRPC CLI Entry Point
//!
//! Main binary for the YuRPC transport. Starts a demo server or makes a
//! single blocking RPC call.
//!
//! ## Usage
//!
//! ```bash
//! # Start a server with the built-in Calc and Echo services
//! yurpc serve -b 0.0.0.0 -p 7777
//!
//! # Make an RPC call (outputs raw JSON)
//! yurpc call 127.0.0.1:7777 Calc.add -a '[2, 3]'
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use serde_json::Value;
use yurpc_client::YurpcClient;
use yurpc_common::{ClientConfig, Request, ServerConfig};
use yurpc_server::YurpcServer;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// YuRPC - lightweight RPC over persistent TCP connections
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for starting a server.
///
/// Defaults come from `ServerConfig::from_env`, so `YURPC_*` environment
/// variables apply unless overridden here.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start a YuRPC server with the built-in demo services
struct ServeArgs {
    /// host to bind the listener to
    #[argh(option, short = 'b', long = "bind")]
    bind: Option<String>,

    /// port to listen on (0 picks a free port)
    #[argh(option, short = 'p', long = "port")]
    port: Option<u16>,

    /// acceptor threads; 0 lets the worker pool accept
    #[argh(option, long = "acceptor-threads")]
    acceptor_threads: Option<usize>,

    /// worker threads for connection I/O and service calls
    #[argh(option, long = "worker-threads")]
    worker_threads: Option<usize>,

    /// close connections idle for this many seconds
    #[argh(option, long = "idle-timeout-secs")]
    idle_timeout_secs: Option<u64>,
}

/// Arguments for making a single RPC call.
///
/// Outputs raw JSON (no pretty-printing) to stdout. Failures are reported to
/// stderr with their status code and a non-zero exit code.
///
/// # Examples
///
/// ```bash
/// yurpc call 127.0.0.1:7777 Echo.echo -a '["hello"]'
/// yurpc call 127.0.0.1:7777 Calc.div -a '[1, 4]' | jq .
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// call an RPC method on a server
struct CallArgs {
    /// server address as host:port
    #[argh(positional)]
    server_address: String,

    /// qualified method name, e.g. Calc.add
    #[argh(positional)]
    method: String,

    /// JSON array of positional arguments (default `[]`)
    #[argh(option, short = 'a', long = "args", default = "\"[]\".into()")]
    args: String,

    /// invocation timeout in milliseconds
    #[argh(option, long = "timeout-ms", default = "5000")]
    timeout_ms: u64,
}

fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // call: keep output clean for unix tool usage (piping to jq, etc.)
    if !matches!(cli.command, Commands::Call(_)) {
        // Set default log level to INFO, but allow RUST_LOG env var to override
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args),
        Commands::Call(args) => run_call(args),
    }
}

fn server_config(args: &ServeArgs) -> Result<ServerConfig> {
    let mut config = ServerConfig::from_env()?;
    if let Some(bind) = &args.bind {
        config = config.with_bind_host(bind.clone());
    }
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(threads) = args.acceptor_threads {
        config = config.with_acceptor_threads(threads);
    }
    if let Some(threads) = args.worker_threads {
        config = config.with_worker_threads(threads);
    }
    if let Some(secs) = args.idle_timeout_secs {
        config = config.with_idle_timeout(Duration::from_secs(secs));
    }
    config.validate()?;
    Ok(config)
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let config = server_config(&args)?;
    tracing::info!("Binding to: {}", config.bind_addr());

    let server = YurpcServer::bind(config)?;
    server.register(Arc::new(yurpc_cli::demo::calc()));
    server.register(Arc::new(yurpc_cli::demo::echo()));
    server.start()?;

    tracing::info!("Listening on {} (Ctrl-C to stop)", server.local_addr());
    server.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    });

    Ok(())
}

/// Executes the `call` subcommand.
///
/// No tracing subscriber is installed for this command so stdout carries only
/// the result.
fn run_call(args: CallArgs) -> Result<()> {
    let (host, port) = parse_address(&args.server_address)?;
    let call_args = parse_args(&args.args)?;

    let config = ClientConfig::from_env()?
        .with_invoke_timeout(Duration::from_millis(args.timeout_ms))
        .with_io_threads(1);
    let client = YurpcClient::new(config)?;

    let request = Request::new(args.method, call_args)
        .with_target(host, port)
        .with_direct(true);
    let response = client.invoke(request);
    client.shutdown();

    if !response.is_ok() {
        eprintln!(
            "{} {}",
            response.code,
            response.message.unwrap_or_default()
        );
        std::process::exit(1);
    }

    // Output raw JSON to stdout
    println!("{}", serde_json::to_string(&response.result.unwrap_or(Value::Null))?);
    Ok(())
}

fn parse_address(addr: &str) -> Result<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Invalid server address '{}': expected host:port", addr))?;
    let port = port
        .parse::<u16>()
        .map_err(|e| anyhow::anyhow!("Invalid port in '{}': {}", addr, e))?;
    if host.is_empty() {
        anyhow::bail!("Invalid server address '{}': missing host", addr);
    }
    Ok((host.trim_start_matches('[').trim_end_matches(']').to_string(), port))
}

fn parse_args(raw: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))? {
        Value::Array(values) => Ok(values),
        other => Ok(vec![other]),
    }
}
