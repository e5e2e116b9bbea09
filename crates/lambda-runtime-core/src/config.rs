//! Centralized configuration for the Lambda runtime client.
//!
//! This module provides the runtime API constants and the endpoint type that
//! builds the three URLs the invocation loop talks to.

use crate::{LambdaError, Result};
use url::Url;

/// Runtime API protocol constants.
pub struct RuntimeApiConfig;

impl RuntimeApiConfig {
    /// Environment variable holding the coordinator `host:port`.
    pub const ENDPOINT_ENV_VAR: &'static str = "AWS_LAMBDA_RUNTIME_API";
    pub const API_VERSION: &'static str = "2018-06-01";
    /// Header carrying the invocation correlation id (matched case-insensitively).
    pub const REQUEST_ID_HEADER: &'static str = "lambda-runtime-aws-request-id";
    pub const CONTENT_TYPE_JSON: &'static str = "application/json";
    /// Redirect hops followed by a poll before giving up.
    pub const MAX_REDIRECTS: usize = 10;
}

/// Location of the runtime API coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEndpoint {
    authority: String,
    /// `http://{authority}/{API_VERSION}/runtime/invocation`
    base: Url,
}

impl RuntimeEndpoint {
    /// Create an endpoint from a `host:port` string.
    ///
    /// An empty value is refused: the loop only makes sense inside a hosted
    /// Lambda environment.
    pub fn new(authority: impl Into<String>) -> Result<Self> {
        let authority = authority.into().trim().to_string();
        if authority.is_empty() {
            return Err(LambdaError::Config {
                message: "At the moment lambdas can only be executed in a Lambda environment"
                    .to_string(),
            });
        }

        let invalid = |detail: String| LambdaError::Config {
            message: format!("Invalid runtime API endpoint `{}`: {}", authority, detail),
        };
        let mut base = Url::parse(&format!("http://{}/", authority))
            .map_err(|e| invalid(e.to_string()))?;
        if base.path() != "/" || base.query().is_some() || base.fragment().is_some() {
            return Err(invalid("expected host:port".to_string()));
        }
        base.path_segments_mut()
            .map_err(|()| invalid("expected host:port".to_string()))?
            .pop_if_empty()
            .extend([RuntimeApiConfig::API_VERSION, "runtime", "invocation"]);

        Ok(Self { authority, base })
    }

    /// Read the endpoint from `AWS_LAMBDA_RUNTIME_API`.
    pub fn from_env() -> Result<Self> {
        let value = std::env::var(RuntimeApiConfig::ENDPOINT_ENV_VAR).map_err(|e| {
            LambdaError::Config {
                message: format!("{} is not usable: {}", RuntimeApiConfig::ENDPOINT_ENV_VAR, e),
            }
        })?;
        Self::new(value)
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// URL of the long-polling "next invocation" call.
    pub fn next_invocation_url(&self) -> String {
        self.invocation_url(&["next"])
    }

    /// URL accepting the success payload of an invocation.
    pub fn response_url(&self, invocation_id: &str) -> String {
        self.invocation_url(&[invocation_id, "response"])
    }

    /// URL accepting the error report of an invocation.
    pub fn error_url(&self, invocation_id: &str) -> String {
        self.invocation_url(&[invocation_id, "error"])
    }

    /// Append path segments, percent-encoding each one.
    fn invocation_url(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        // http URLs always have a path
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url.into()
    }
}
