//! Transports for the Lambda runtime API.
//!
//! A [`Transport`] performs the two raw network operations the invocation
//! loop needs: waiting for the next invocation and posting a JSON document.
//! Three interchangeable implementations differ only in how they manage
//! connections:
//! - [`OneShotTransport`]: a fresh connection for every call (default)
//! - [`KeepAliveTransport`]: one fetch and one post connection reused across calls
//! - [`ReqwestTransport`]: delegates to a `reqwest::Client`
//!
//! All of them report failures through the same [`LambdaError`] kinds with the
//! same wording; collaborator errors never leave this module unconverted.

mod connection;
mod keep_alive;
mod one_shot;
mod reqwest_client;

pub use keep_alive::KeepAliveTransport;
pub use one_shot::OneShotTransport;
pub use reqwest_client::ReqwestTransport;

use crate::config::RuntimeApiConfig;
use crate::{LambdaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::Serialize;

/// An invocation handed out by the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Opaque correlation token, never empty.
    pub id: String,
    /// Decoded event body, passed through without schema validation.
    pub payload: serde_json::Value,
}

/// Capability contract shared by every transport.
///
/// Calls are strictly sequential: the runtime never issues a call before the
/// previous one has returned.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next invocation.
    ///
    /// Issues a GET to `url` that blocks until the coordinator has work,
    /// following redirects. Fails with `Network` on transport errors or a
    /// non-2xx status, `MissingInvocationId` when the correlation header is
    /// absent or empty, `EmptyResponseBody` when there is no body and
    /// `InvalidResponseBody` (carrying the already read id) when the body is
    /// not JSON.
    async fn wait_next_invocation(&mut self, url: &str) -> Result<InvocationRequest>;

    /// Serialize `value` and POST it to `url`.
    ///
    /// Fails with `Serialization` when `value` cannot be encoded (no request
    /// is sent in that case) and with `Post` on transport errors or a non-2xx
    /// status.
    async fn post_json<T>(&mut self, url: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized;
}

/// Encode a value as the exact bytes of a JSON request body.
pub(crate) fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(LambdaError::Serialization)
}

/// Wording shared by all transports for an unexpected status code.
pub(crate) fn status_detail(status: StatusCode) -> String {
    format!("HTTP status {}", status)
}

/// Turn the headers and body of a successful poll into an invocation.
pub(crate) fn parse_invocation(headers: &HeaderMap, body: &[u8]) -> Result<InvocationRequest> {
    let id = headers
        .get(RuntimeApiConfig::REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if id.is_empty() {
        return Err(LambdaError::MissingInvocationId);
    }

    if body.is_empty() {
        return Err(LambdaError::EmptyResponseBody);
    }

    let payload =
        serde_json::from_slice(body).map_err(|source| LambdaError::InvalidResponseBody {
            invocation_id: id.to_string(),
            source,
        })?;

    Ok(InvocationRequest {
        id: id.to_string(),
        payload,
    })
}
