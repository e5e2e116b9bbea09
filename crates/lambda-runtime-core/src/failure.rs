//! Failure model for invocations.
//!
//! User handlers fail with a [`HandlerError`]; the runtime turns that, its
//! own reporting errors and handler panics into an [`InvocationFailure`],
//! which is logged in the fixed diagnostic format and posted to the error
//! endpoint as an [`ErrorReport`].

use crate::LambdaError;
use serde::Serialize;
use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;
use std::panic::Location;

/// Source position a failure was raised at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl From<&Location<'_>> for SourceLocation {
    fn from(location: &Location<'_>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
        }
    }
}

/// Error returned by a user handler.
///
/// Any `std::error::Error` converts into it with `?`, recording the error's
/// type name as its kind, its source chain and (when `RUST_BACKTRACE` is set)
/// a backtrace as its trace, and the position of the `?` as its location.
///
/// Like `anyhow::Error`, this type deliberately does not implement
/// `std::error::Error` itself, which is what allows the blanket conversion.
pub struct HandlerError {
    kind: String,
    message: String,
    trace: Vec<String>,
    location: Option<SourceLocation>,
}

impl HandlerError {
    /// Create an error with an explicit kind.
    #[track_caller]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: capture_backtrace(),
            location: Some(Location::caller().into()),
        }
    }

    /// Create an error of kind `Error` from a plain message.
    #[track_caller]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    /// Replace the captured trace.
    pub fn with_trace(mut self, trace: Vec<String>) -> Self {
        self.trace = trace;
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn trace(&self) -> &[String] {
        &self.trace
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn from(err: E) -> Self {
        let mut trace = source_chain(&err);
        trace.extend(capture_backtrace());
        Self {
            kind: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            trace,
            location: Some(Location::caller().into()),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerError")
            .field("kind", &self.kind)
            .field("message", &self.message)
            .field("location", &self.location)
            .finish()
    }
}

/// Result of running a handler on one invocation.
#[derive(Debug)]
pub enum InvocationOutcome<T> {
    Success { payload: T },
    Failure(InvocationFailure),
}

/// A failure about to be reported for an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationFailure {
    pub message: String,
    pub kind: String,
    pub trace: Vec<String>,
    pub location: Option<SourceLocation>,
    /// Recovered error (as opposed to a panic); its log line is prefixed
    /// with `Uncaught <kind>: `.
    pub uncaught: bool,
}

impl InvocationFailure {
    /// Failure returned by the user handler.
    pub fn from_handler_error(err: HandlerError) -> Self {
        Self {
            message: err.message,
            kind: err.kind,
            trace: err.trace,
            location: err.location,
            uncaught: true,
        }
    }

    /// Failure raised by the runtime itself while reading an invocation or
    /// reporting its result.
    #[track_caller]
    pub fn from_runtime_error(err: &LambdaError) -> Self {
        let mut trace = source_chain(err);
        trace.extend(capture_backtrace());
        Self {
            message: err.to_string(),
            kind: err.kind().to_string(),
            trace,
            location: Some(Location::caller().into()),
            uncaught: true,
        }
    }

    /// Failure caused by the handler panicking.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "handler panicked".to_string()
        };

        Self {
            message,
            kind: "Panic".to_string(),
            trace: Vec::new(),
            location: None,
            uncaught: false,
        }
    }

    /// The diagnostic line written to the process output.
    ///
    /// `Fatal error: <message> in <file>:<line>\nStack trace:\n<trace>`
    pub fn log_line(&self) -> String {
        let message = if self.uncaught {
            format!("Uncaught {}: {}", self.kind, self.message)
        } else {
            self.message.clone()
        };
        let (file, line) = match &self.location {
            Some(location) => (location.file.as_str(), location.line.to_string()),
            None => ("", String::new()),
        };

        let mut out = format!("Fatal error: {} in {}:{}\nStack trace:\n", message, file, line);
        for frame in &self.trace {
            out.push_str(frame);
            out.push('\n');
        }
        out
    }

    /// Body posted to the error endpoint.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            error_message: self.message.clone(),
            error_type: self.kind.clone(),
            stack_trace: self.trace.clone(),
        }
    }
}

/// JSON body of the runtime API error endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub error_message: String,
    pub error_type: String,
    pub stack_trace: Vec<String>,
}

fn source_chain(err: &dyn std::error::Error) -> Vec<String> {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(format!("Caused by: {}", cause));
        source = cause.source();
    }
    chain
}

/// One entry per backtrace line, empty unless backtraces are enabled.
fn capture_backtrace() -> Vec<String> {
    let backtrace = Backtrace::capture();
    if backtrace.status() != BacktraceStatus::Captured {
        return Vec::new();
    }
    backtrace
        .to_string()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("order {0} not found")]
    struct OrderNotFound(u32);

    #[derive(Debug, thiserror::Error)]
    #[error("lookup failed")]
    struct LookupFailed(#[source] OrderNotFound);

    fn failing_lookup() -> Result<(), HandlerError> {
        Err::<(), _>(LookupFailed(OrderNotFound(7)))?;
        Ok(())
    }

    #[test]
    fn test_handler_error_from_std_error() {
        let err = failing_lookup().unwrap_err();
        assert!(err.kind().ends_with("LookupFailed"));
        assert_eq!(err.message(), "lookup failed");
        assert_eq!(err.trace()[0], "Caused by: order 7 not found");
        assert!(err.location().is_some());
    }

    #[test]
    fn test_handler_error_new() {
        let err = HandlerError::new("ValidationError", "name is required");
        assert_eq!(err.kind(), "ValidationError");
        assert_eq!(err.to_string(), "ValidationError: name is required");
        assert_eq!(HandlerError::msg("boom").kind(), "Error");
    }

    #[test]
    fn test_log_line_prefixes_uncaught_failures() {
        let failure = InvocationFailure::from_handler_error(
            HandlerError::new("ValidationError", "name is required")
                .with_trace(vec!["#0 handler".into(), "#1 main".into()]),
        );
        let line = failure.log_line();
        assert!(line.starts_with("Fatal error: Uncaught ValidationError: name is required in "));
        assert!(line.contains("failure.rs:"));
        assert!(line.ends_with("\nStack trace:\n#0 handler\n#1 main\n"));
    }

    #[test]
    fn test_runtime_error_failure() {
        let failure = InvocationFailure::from_runtime_error(&LambdaError::post("HTTP status 400 Bad Request"));
        assert_eq!(failure.kind, "PostFailure");
        assert!(failure.uncaught);
        assert!(failure
            .log_line()
            .starts_with("Fatal error: Uncaught PostFailure: Error while calling the Lambda runtime API: "));

        let report = failure.report();
        assert_eq!(
            report.error_message,
            "Error while calling the Lambda runtime API: HTTP status 400 Bad Request"
        );
    }

    #[test]
    fn test_panic_failure_is_not_prefixed() {
        let payload = std::panic::catch_unwind(|| panic!("index out of range")).unwrap_err();
        let failure = InvocationFailure::from_panic(payload);
        assert_eq!(failure.kind, "Panic");
        assert_eq!(failure.message, "index out of range");
        assert!(failure
            .log_line()
            .starts_with("Fatal error: index out of range in :\nStack trace:\n"));
    }

    #[test]
    fn test_error_report_wire_format() {
        let report = ErrorReport {
            error_message: "boom".into(),
            error_type: "Error".into(),
            stack_trace: vec!["#0 main".into()],
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "errorMessage": "boom",
                "errorType": "Error",
                "stackTrace": ["#0 main"]
            })
        );
    }
}
