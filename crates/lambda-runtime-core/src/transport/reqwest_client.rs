//! Transport backed by `reqwest`.
//!
//! Connection pooling is left to the client; this module only translates its
//! error surface into [`LambdaError`] kinds, keeping reqwest's own message text
//! as the failure detail. Polls follow redirects; posts never do, so a 3xx
//! answer to a report is a failed post.

use super::{encode_json, parse_invocation, status_detail, InvocationRequest, Transport};
use crate::config::RuntimeApiConfig;
use crate::{LambdaError, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

/// Transport delegating to a general-purpose HTTP client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    poll_client: Client,
    post_client: Client,
}

impl ReqwestTransport {
    /// Create a transport with clients configured for the runtime API.
    pub fn new() -> Result<Self> {
        let poll_client = build_client(Policy::limited(RuntimeApiConfig::MAX_REDIRECTS))?;
        let post_client = build_client(Policy::none())?;
        Ok(Self::with_clients(poll_client, post_client))
    }

    /// Wrap existing clients. Their timeout and proxy settings apply as-is.
    ///
    /// `post_client` should not follow redirects, so that a 3xx answer to a
    /// report surfaces as a failed post.
    pub fn with_clients(poll_client: Client, post_client: Client) -> Self {
        Self {
            poll_client,
            post_client,
        }
    }
}

fn build_client(redirects: Policy) -> Result<Client> {
    Client::builder()
        .redirect(redirects)
        .user_agent(concat!("lambda-runtime-core/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LambdaError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn wait_next_invocation(&mut self, url: &str) -> Result<InvocationRequest> {
        let response = self
            .poll_client
            .get(url)
            .send()
            .await
            .map_err(LambdaError::network_from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LambdaError::network(status_detail(status)));
        }

        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(LambdaError::network_from)?;
        debug!("Received {} byte invocation from {}", body.len(), url);

        parse_invocation(&headers, &body)
    }

    async fn post_json<T>(&mut self, url: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let body = encode_json(value)?;

        let response = self
            .post_client
            .post(url)
            .header(CONTENT_TYPE, RuntimeApiConfig::CONTENT_TYPE_JSON)
            .header(CONTENT_LENGTH, body.len().to_string())
            .body(body)
            .send()
            .await
            .map_err(LambdaError::post_from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LambdaError::post(status_detail(status)));
        }

        Ok(())
    }
}
