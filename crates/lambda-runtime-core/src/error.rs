//! Error types for the Lambda runtime client.
//!
//! Every failure the invocation loop can see is normalized into [`LambdaError`]
//! before any decision logic looks at it. Collaborator errors (hyper, reqwest,
//! io) are converted inside the transport module and only survive here as the
//! optional `source`.

use thiserror::Error;

/// Boxed collaborator error kept as the source of a normalized failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the runtime client.
#[derive(Debug, Error)]
pub enum LambdaError {
    // Fetch-stage errors
    #[error("Failed to fetch next Lambda invocation: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to determine the Lambda invocation ID")]
    MissingInvocationId,

    #[error("Empty Lambda runtime API response")]
    EmptyResponseBody,

    /// The invocation id was read before the body failed to decode, so this
    /// failure is reported against that invocation.
    #[error("Invalid Lambda runtime API response: {source}")]
    InvalidResponseBody {
        invocation_id: String,
        #[source]
        source: serde_json::Error,
    },

    // Report-stage errors
    #[error("Failed encoding Lambda JSON response: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("Error while calling the Lambda runtime API: {message}")]
    Post {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for runtime client operations.
pub type Result<T> = std::result::Result<T, LambdaError>;

impl LambdaError {
    /// Fetch failure described by `message` alone.
    pub fn network(message: impl Into<String>) -> Self {
        LambdaError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Fetch failure caused by a collaborator error; its text becomes the detail.
    pub fn network_from(err: impl Into<BoxError>) -> Self {
        let err = err.into();
        LambdaError::Network {
            message: describe(&*err),
            source: Some(err),
        }
    }

    /// Report failure described by `message` alone.
    pub fn post(message: impl Into<String>) -> Self {
        LambdaError::Post {
            message: message.into(),
            source: None,
        }
    }

    /// Report failure caused by a collaborator error; its text becomes the detail.
    pub fn post_from(err: impl Into<BoxError>) -> Self {
        let err = err.into();
        LambdaError::Post {
            message: describe(&*err),
            source: Some(err),
        }
    }

    /// Stable category name, used as `errorType` in error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            LambdaError::Network { .. } => "NetworkFailure",
            LambdaError::MissingInvocationId => "MissingInvocationId",
            LambdaError::EmptyResponseBody => "EmptyResponseBody",
            LambdaError::InvalidResponseBody { .. } => "InvalidResponseBody",
            LambdaError::Serialization(_) => "SerializationFailure",
            LambdaError::Post { .. } => "PostFailure",
            LambdaError::Config { .. } => "ConfigError",
        }
    }

    /// Whether this error was raised while polling for the next invocation.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(
            self,
            LambdaError::Network { .. }
                | LambdaError::MissingInvocationId
                | LambdaError::EmptyResponseBody
                | LambdaError::InvalidResponseBody { .. }
        )
    }

    /// Invocation a fetch failure can still be reported against.
    ///
    /// Only a body that fails to decode after its id was read has one; every
    /// other fetch failure happens before an invocation id exists.
    pub fn invocation_id(&self) -> Option<&str> {
        match self {
            LambdaError::InvalidResponseBody { invocation_id, .. } => Some(invocation_id),
            _ => None,
        }
    }
}

/// Render an error and its source chain on one line.
///
/// hyper and reqwest keep the useful part ("connection refused") in the
/// source chain, so the top-level `Display` alone is not enough.
pub(crate) fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            LambdaError::MissingInvocationId.to_string(),
            "Failed to determine the Lambda invocation ID"
        );
        assert_eq!(
            LambdaError::EmptyResponseBody.to_string(),
            "Empty Lambda runtime API response"
        );
        assert_eq!(
            LambdaError::network("HTTP status 404 Not Found").to_string(),
            "Failed to fetch next Lambda invocation: HTTP status 404 Not Found"
        );
        assert_eq!(
            LambdaError::post("HTTP status 400 Bad Request").to_string(),
            "Error while calling the Lambda runtime API: HTTP status 400 Bad Request"
        );
    }

    #[test]
    fn test_collaborator_text_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = LambdaError::network_from(io);
        assert_eq!(
            err.to_string(),
            "Failed to fetch next Lambda invocation: connection refused"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_describe_walks_source_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let outer = LambdaError::post_from(inner);
        let wrapped = LambdaError::network_from(outer);
        assert_eq!(
            wrapped.to_string(),
            "Failed to fetch next Lambda invocation: \
             Error while calling the Lambda runtime API: reset by peer"
        );
    }

    #[test]
    fn test_serialization_error_display() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = LambdaError::Serialization(serde_err);
        assert!(err
            .to_string()
            .starts_with("Failed encoding Lambda JSON response: "));
        assert_eq!(err.kind(), "SerializationFailure");
    }

    #[test]
    fn test_fetch_failures() {
        assert!(LambdaError::network("down").is_fetch_failure());
        assert!(LambdaError::MissingInvocationId.is_fetch_failure());
        assert!(LambdaError::EmptyResponseBody.is_fetch_failure());
        assert!(!LambdaError::post("down").is_fetch_failure());
        assert!(LambdaError::network("down").invocation_id().is_none());
        assert!(!LambdaError::Config {
            message: "missing".into()
        }
        .is_fetch_failure());
    }

    #[test]
    fn test_invalid_body_keeps_invocation_id() {
        let source = serde_json::from_slice::<serde_json::Value>(b"{not json").unwrap_err();
        let err = LambdaError::InvalidResponseBody {
            invocation_id: "abc".to_string(),
            source,
        };
        assert!(err.is_fetch_failure());
        assert_eq!(err.invocation_id(), Some("abc"));
        assert_eq!(
            err.to_string(),
            "Invalid Lambda runtime API response: key must be a string at line 1 column 2"
        );
    }
}
