//! The invocation loop.
//!
//! [`LambdaRuntime`] fetches one invocation at a time, runs the user handler
//! on it and reports either the handler's result or a failure back to the
//! coordinator.

use crate::config::RuntimeEndpoint;
use crate::failure::{HandlerError, InvocationFailure, InvocationOutcome};
use crate::transport::{OneShotTransport, Transport};
use crate::Result;
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, error, warn};

/// Client for the AWS Lambda runtime API.
///
/// This allows to:
/// - fetch events to process
/// - send invocation responses
/// - signal errors
///
/// # Example
///
/// ```rust,ignore
/// use lambda_runtime_core::{HandlerError, LambdaRuntime};
///
/// let mut runtime = LambdaRuntime::from_env()?;
/// runtime
///     .process_next_event(|event| Ok::<_, HandlerError>(format!("Hello {}", event["name"])))
///     .await?;
/// ```
pub struct LambdaRuntime<T = OneShotTransport> {
    endpoint: RuntimeEndpoint,
    transport: T,
    /// Where `Fatal error: ...` lines go; the Lambda host captures stdout.
    diagnostics: Box<dyn Write + Send>,
}

impl LambdaRuntime<OneShotTransport> {
    /// Create a runtime for the endpoint in `AWS_LAMBDA_RUNTIME_API`.
    ///
    /// Fails with `Config` outside of a Lambda environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_endpoint(RuntimeEndpoint::from_env()?, OneShotTransport::new()))
    }

    /// Create a runtime for a `host:port` endpoint with the default transport.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        Self::with_transport(endpoint, OneShotTransport::new())
    }
}

impl<T: Transport> LambdaRuntime<T> {
    /// Create a runtime for a `host:port` endpoint with a specific transport.
    pub fn with_transport(endpoint: impl Into<String>, transport: T) -> Result<Self> {
        Ok(Self::with_endpoint(RuntimeEndpoint::new(endpoint)?, transport))
    }

    /// Create a runtime from an already validated endpoint.
    pub fn with_endpoint(endpoint: RuntimeEndpoint, transport: T) -> Self {
        Self {
            endpoint,
            transport,
            diagnostics: Box::new(std::io::stdout()),
        }
    }

    /// Redirect the diagnostic output (stdout by default).
    pub fn with_diagnostics(mut self, sink: impl Write + Send + 'static) -> Self {
        self.diagnostics = Box::new(sink);
        self
    }

    pub fn endpoint(&self) -> &RuntimeEndpoint {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Process the next event.
    ///
    /// Waits for an invocation, passes its payload to `handler` and posts the
    /// returned value to the response endpoint. If the handler fails or
    /// panics, or the response cannot be encoded or posted, the failure is
    /// written to the diagnostic output and posted to the error endpoint.
    /// An invocation whose body is not JSON never reaches the handler and is
    /// reported the same way.
    ///
    /// Returns an error when no invocation could be fetched (nothing can be
    /// reported without an invocation id) or when posting the error report
    /// itself failed.
    pub async fn process_next_event<F, R, E>(&mut self, handler: F) -> Result<()>
    where
        F: FnOnce(Value) -> std::result::Result<R, E>,
        R: Serialize + Sync,
        E: Into<HandlerError>,
    {
        let invocation = match self
            .transport
            .wait_next_invocation(&self.endpoint.next_invocation_url())
            .await
        {
            Ok(invocation) => invocation,
            Err(e) => match e.invocation_id().map(str::to_string) {
                Some(invocation_id) => {
                    let failure = InvocationFailure::from_runtime_error(&e);
                    return self.signal_failure(&invocation_id, failure).await;
                }
                None => return Err(e),
            },
        };
        let invocation_id = invocation.id;
        debug!("Processing invocation {}", invocation_id);

        let outcome = match catch_unwind(AssertUnwindSafe(|| handler(invocation.payload))) {
            Ok(Ok(payload)) => InvocationOutcome::Success { payload },
            Ok(Err(err)) => {
                InvocationOutcome::Failure(InvocationFailure::from_handler_error(err.into()))
            }
            Err(panic) => InvocationOutcome::Failure(InvocationFailure::from_panic(panic)),
        };

        let failure = match outcome {
            InvocationOutcome::Success { payload } => {
                let url = self.endpoint.response_url(&invocation_id);
                match self.transport.post_json(&url, &payload).await {
                    Ok(()) => {
                        debug!("Invocation {} succeeded", invocation_id);
                        return Ok(());
                    }
                    Err(e) => InvocationFailure::from_runtime_error(&e),
                }
            }
            InvocationOutcome::Failure(failure) => failure,
        };

        self.signal_failure(&invocation_id, failure).await
    }

    /// Process events until one cannot be fetched or reported.
    ///
    /// Only returns on error; the caller decides whether to keep polling.
    pub async fn run<F, R, E>(&mut self, mut handler: F) -> Result<()>
    where
        F: FnMut(Value) -> std::result::Result<R, E>,
        R: Serialize + Sync,
        E: Into<HandlerError>,
    {
        loop {
            self.process_next_event(&mut handler).await?;
        }
    }

    async fn signal_failure(&mut self, invocation_id: &str, failure: InvocationFailure) -> Result<()> {
        error!(
            invocation_id = %invocation_id,
            kind = %failure.kind,
            "Invocation failed: {}",
            failure.message
        );

        let log_line = failure.log_line();
        if let Err(e) = self
            .diagnostics
            .write_all(log_line.as_bytes())
            .and_then(|()| self.diagnostics.flush())
        {
            warn!("Failed to write diagnostic output: {}", e);
        }

        let url = self.endpoint.error_url(invocation_id);
        self.transport.post_json(&url, &failure.report()).await
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for LambdaRuntime<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LambdaRuntime")
            .field("endpoint", &self.endpoint)
            .field("transport", &self.transport)
            .finish()
    }
}
