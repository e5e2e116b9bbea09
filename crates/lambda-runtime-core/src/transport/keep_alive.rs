//! Transport reusing persistent connections across invocations.

use super::connection::{get_request, parse_url, post_request, Connection, PollStep, RawResponse};
use super::{encode_json, InvocationRequest, Transport};
use crate::config::RuntimeApiConfig;
use crate::error::BoxError;
use crate::{LambdaError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

/// Connection-reusing transport.
///
/// Holds one connection for polling and one for posting. Each is opened on
/// first use and kept across invocations. A connection is discarded when a
/// call on it fails (it may be left mid-response) and rebuilt on the next
/// call; it is also replaced when the peer has closed it or the target
/// `host:port` changes. Dropping the transport closes both connections.
#[derive(Default)]
pub struct KeepAliveTransport {
    fetch: Option<Connection>,
    post: Option<Connection>,
}

impl KeepAliveTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections currently held open.
    pub fn open_connections(&self) -> usize {
        usize::from(self.fetch.is_some()) + usize::from(self.post.is_some())
    }

    async fn fetch_hop(&mut self, url: &Url) -> std::result::Result<RawResponse, BoxError> {
        let connection = checkout(&mut self.fetch, url).await?;
        connection.send(get_request(url)?).await
    }

    async fn post_hop(&mut self, url: &Url, body: Bytes) -> std::result::Result<RawResponse, BoxError> {
        let connection = checkout(&mut self.post, url).await?;
        connection.send(post_request(url, body)?).await
    }

    fn discard_fetch(&mut self) {
        if self.fetch.take().is_some() {
            warn!("Discarding runtime API poll connection after a failed call");
        }
    }

    fn discard_post(&mut self) {
        if self.post.take().is_some() {
            warn!("Discarding runtime API post connection after a failed call");
        }
    }
}

impl std::fmt::Debug for KeepAliveTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeepAliveTransport")
            .field("fetch_open", &self.fetch.is_some())
            .field("post_open", &self.post.is_some())
            .finish()
    }
}

/// Return the connection in `slot`, opening a new one when it cannot serve `url`.
async fn checkout<'a>(
    slot: &'a mut Option<Connection>,
    url: &Url,
) -> std::result::Result<&'a mut Connection, BoxError> {
    if !slot.as_ref().is_some_and(|connection| connection.serves(url)) {
        if slot.take().is_some() {
            debug!("Kept connection cannot serve {}, reconnecting", url);
        }
        *slot = Some(Connection::open(url).await?);
    }
    slot.as_mut()
        .ok_or_else(|| BoxError::from("connection slot is empty"))
}

#[async_trait]
impl Transport for KeepAliveTransport {
    async fn wait_next_invocation(&mut self, url: &str) -> Result<InvocationRequest> {
        let mut url = parse_url(url).map_err(LambdaError::network_from)?;

        for _ in 0..=RuntimeApiConfig::MAX_REDIRECTS {
            let step = match self.fetch_hop(&url).await {
                Ok(response) => response.into_poll_step(&url),
                Err(e) => Err(LambdaError::network_from(e)),
            };

            match step {
                Ok(PollStep::Redirect(next)) => {
                    debug!("Following redirect from {} to {}", url, next);
                    url = next;
                }
                Ok(PollStep::Done(invocation)) => return Ok(invocation),
                Err(e) => {
                    if matches!(e, LambdaError::Network { .. }) {
                        self.discard_fetch();
                    }
                    return Err(e);
                }
            }
        }

        self.discard_fetch();
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

        let result = match self.post_hop(&url, body).await {
            Ok(response) => response.ensure_accepted(),
            Err(e) => Err(LambdaError::post_from(e)),
        };

        if result.is_err() {
            self.discard_post();
        }
        result
    }
}
