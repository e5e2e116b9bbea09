//! Lambda Runtime Core - client for the AWS Lambda custom runtime API.
//!
//! This crate provides the loop that turns an executable into a Lambda
//! runtime: poll the runtime API for the next invocation, run a handler on
//! its payload, and report the result or the failure back.
//!
//! It is kept small because it runs on every cold start before the handler
//! can serve its first request.
//!
//! # Example
//!
//! ```rust,ignore
//! use lambda_runtime_core::{HandlerError, LambdaRuntime};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> lambda_runtime_core::Result<()> {
//!     let mut runtime = LambdaRuntime::from_env()?;
//!     runtime
//!         .run(|event| Ok::<_, HandlerError>(serde_json::json!({ "echo": event })))
//!         .await
//! }
//! ```

pub mod config;
pub mod error;
pub mod failure;
pub mod runtime;
pub mod transport;

// Re-export commonly used types
pub use config::{RuntimeApiConfig, RuntimeEndpoint};
pub use error::{LambdaError, Result};
pub use failure::{ErrorReport, HandlerError, InvocationFailure, InvocationOutcome, SourceLocation};
pub use runtime::LambdaRuntime;
pub use transport::{
    InvocationRequest, KeepAliveTransport, OneShotTransport, ReqwestTransport, Transport,
};
