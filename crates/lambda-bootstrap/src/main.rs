//! Lambda bootstrap - entry point of a custom runtime.
//!
//! Reads the runtime API endpoint from the environment, then processes
//! invocations one at a time until one can no longer be fetched or reported.
//! The bundled handler echoes the event back; applications link
//! `lambda-runtime-core` and supply their own.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use lambda_runtime_core::{
    HandlerError, KeepAliveTransport, LambdaRuntime, OneShotTransport, ReqwestTransport,
    RuntimeEndpoint, Transport,
};
use serde_json::{json, Value};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "bootstrap")]
#[command(about = "Custom runtime loop for the AWS Lambda runtime API")]
struct Args {
    /// Connection strategy used to talk to the runtime API
    #[arg(long, value_enum, default_value_t = TransportKind::OneShot)]
    transport: TransportKind,

    /// Runtime API host:port (defaults to AWS_LAMBDA_RUNTIME_API)
    #[arg(long)]
    endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TransportKind {
    OneShot,
    KeepAlive,
    Reqwest,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging; stdout is reserved for invocation diagnostics
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let endpoint = match args.endpoint {
        Some(authority) => RuntimeEndpoint::new(authority)?,
        None => RuntimeEndpoint::from_env()?,
    };

    info!(
        "Starting Lambda runtime loop against {} ({:?} transport)",
        endpoint.authority(),
        args.transport
    );

    match args.transport {
        TransportKind::OneShot => {
            serve(LambdaRuntime::with_endpoint(endpoint, OneShotTransport::new())).await
        }
        TransportKind::KeepAlive => {
            serve(LambdaRuntime::with_endpoint(endpoint, KeepAliveTransport::new())).await
        }
        TransportKind::Reqwest => {
            serve(LambdaRuntime::with_endpoint(endpoint, ReqwestTransport::new()?)).await
        }
    }
}

async fn serve<T: Transport>(mut runtime: LambdaRuntime<T>) -> Result<()> {
    if let Err(e) = runtime.run(echo).await {
        error!("Runtime loop stopped ({}): {}", e.kind(), e);
        return Err(e.into());
    }
    Ok(())
}

fn echo(event: Value) -> std::result::Result<Value, HandlerError> {
    Ok(json!({ "event": event }))
}
