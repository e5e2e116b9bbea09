//! Transport opening a fresh connection for every call.

use super::connection::{get_request, parse_url, post_request, Connection, PollStep};
use super::{encode_json, InvocationRequest, Transport};
use crate::config::RuntimeApiConfig;
use crate::{LambdaError, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// Connection-per-call transport.
///
/// Every poll hop and every post gets its own connection, which is closed as
/// soon as the response has been read, whether the call succeeded or not.
/// This is the runtime's default transport.
#[derive(Debug, Default, Clone, Copy)]
pub struct OneShotTransport;

impl OneShotTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for OneShotTransport {
    async fn wait_next_invocation(&mut self, url: &str) -> Result<InvocationRequest> {
        let mut url = parse_url(url).map_err(LambdaError::network_from)?;

        for _ in 0..=RuntimeApiConfig::MAX_REDIRECTS {
            let response = async {
                let mut connection = Connection::open(&url).await?;
                connection.send(get_request(&url)?).await
            }
            .await
            .map_err(LambdaError::network_from)?;

            match response.into_poll_step(&url)? {
                PollStep::Redirect(next) => {
                    debug!("Following redirect from {} to {}", url, next);
                    url = next;
                }
                PollStep::Done(invocation) => return Ok(invocation),
            }
        }

        Err(LambdaError::network(format!(
            "more than {} redirects",
            RuntimeApiConfig::MAX_REDIRECTS
        )))
    }

    async fn post_json<T>(&mut self, url: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let body = encode_json(value)?;
        let url = parse_url(url).map_err(LambdaError::post_from)?;

        let response = async {
            let mut connection = Connection::open(&url).await?;
            connection.send(post_request(&url, body)?).await
        }
        .await
        .map_err(LambdaError::post_from)?;

        response.ensure_accepted()
    }
}
