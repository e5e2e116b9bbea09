//! A single HTTP/1.1 client connection to the coordinator.
//!
//! Used by the one-shot and keep-alive transports. The connection owns the
//! hyper driver task and aborts it on drop, so releasing a `Connection` is
//! deterministic and cannot fail.

use super::{parse_invocation, status_detail, InvocationRequest};
use crate::config::RuntimeApiConfig;
use crate::error::BoxError;
use crate::{LambdaError, Result};
use bytes::Bytes;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, LOCATION};
use http::{HeaderMap, Request, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::{self, SendRequest};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::debug;
use url::{Host, Url};

/// Open HTTP/1.1 connection bound to one `host:port`.
pub(crate) struct Connection {
    authority: String,
    sender: SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
}

impl Connection {
    /// Connect to the host of `url` and complete the HTTP/1.1 handshake.
    pub(crate) async fn open(url: &Url) -> std::result::Result<Self, BoxError> {
        if url.scheme() != "http" {
            return Err(format!("unsupported URL scheme `{}`", url.scheme()).into());
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(format!("URL `{}` has no host", url).into()),
        };
        let port = url
            .port_or_known_default()
            .ok_or_else(|| format!("URL `{}` has no port", url))?;

        let stream = TcpStream::connect((host.as_str(), port)).await?;
        stream.set_nodelay(true)?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream)).await?;
        let authority = authority_of(url);
        let driver_authority = authority.clone();
        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Connection to {} ended: {}", driver_authority, e);
            }
        });

        debug!("Opened runtime API connection to {}", authority);

        Ok(Self {
            authority,
            sender,
            driver,
        })
    }

    /// Whether this connection can carry a request for `url`.
    pub(crate) fn serves(&self, url: &Url) -> bool {
        self.authority == authority_of(url) && !self.sender.is_closed()
    }

    /// Send one request and read the whole response.
    pub(crate) async fn send(
        &mut self,
        request: Request<Full<Bytes>>,
    ) -> std::result::Result<RawResponse, BoxError> {
        self.sender.ready().await?;
        let response = self.sender.send_request(request).await?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await?.to_bytes();

        Ok(RawResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Fully buffered response.
#[derive(Debug)]
pub(crate) struct RawResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

/// Result of a single poll hop.
#[derive(Debug)]
pub(crate) enum PollStep {
    Redirect(Url),
    Done(InvocationRequest),
}

impl RawResponse {
    /// Interpret the response to a GET on `url`.
    pub(crate) fn into_poll_step(self, url: &Url) -> Result<PollStep> {
        if self.status.is_redirection() {
            let location = self
                .headers
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| LambdaError::network(status_detail(self.status)))?;
            let next = url.join(location).map_err(LambdaError::network_from)?;
            return Ok(PollStep::Redirect(next));
        }

        if !self.status.is_success() {
            return Err(LambdaError::network(status_detail(self.status)));
        }

        parse_invocation(&self.headers, &self.body).map(PollStep::Done)
    }

    /// Check that a POST was accepted.
    pub(crate) fn ensure_accepted(self) -> Result<()> {
        if self.status.is_success() {
            Ok(())
        } else {
            Err(LambdaError::post(status_detail(self.status)))
        }
    }
}

/// Parse a URL handed to a transport.
pub(crate) fn parse_url(url: &str) -> std::result::Result<Url, BoxError> {
    Ok(Url::parse(url)?)
}

/// Build the GET request for a poll hop.
pub(crate) fn get_request(url: &Url) -> std::result::Result<Request<Full<Bytes>>, BoxError> {
    Ok(Request::get(origin_form(url))
        .header(HOST, host_header(url))
        .body(Full::new(Bytes::new()))?)
}

/// Build a JSON POST request carrying `body` verbatim.
pub(crate) fn post_request(
    url: &Url,
    body: Bytes,
) -> std::result::Result<Request<Full<Bytes>>, BoxError> {
    Ok(Request::post(origin_form(url))
        .header(HOST, host_header(url))
        .header(CONTENT_TYPE, RuntimeApiConfig::CONTENT_TYPE_JSON)
        .header(CONTENT_LENGTH, body.len().to_string())
        .body(Full::new(body))?)
}

fn origin_form(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn authority_of(url: &Url) -> String {
    format!(
        "{}:{}",
        url.host_str().unwrap_or_default(),
        url.port_or_known_default().unwrap_or_default()
    )
}
