//! Default transport backed by a pooled `reqwest::Client`.
//!
//! # Examples
//!
//! ## Sharing the process-wide pool
//!
//! ```ignore
//! use rest_chain::{HttpTransport, RequestBuilder, Method};
//!
//! // `RequestBuilder::new()` already uses this instance
//! let shared = HttpTransport::shared();
//! let response = RequestBuilder::new()
//!     .transport(shared)
//!     .send(Method::GET, "http://localhost:8080/user/detail/1")
//!     .await?;
//! ```
//!
//! ## Isolated pool with custom limits
//!
//! ```
//! use rest_chain::HttpTransport;
//! use rest_chain::client::ClientConfig;
//!
//! let transport = HttpTransport::with_config(ClientConfig {
//!     request_timeout_ms: 2_000,
//!     pool_max_idle_per_host: 8,
//!     ..Default::default()
//! });
//! assert_eq!(transport.config().pool_max_idle_per_host, 8);
//! ```

use super::{ByteStream, EventHandler, EventReader, StreamTransport, Transport};
use crate::client::ClientConfig;
use crate::error::{RestError, Result};
use crate::types::{status_text, PreparedRequest, RequestContext, Response, StreamResponse};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::StatusCode;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::Instrument;

static SHARED: OnceLock<HttpTransport> = OnceLock::new();

/// Pooled HTTP transport
///
/// Cloning is cheap and clones share one connection pool, so connections are
/// reused across every request sent through the same instance.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a transport with its own pool and default configuration
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a transport with its own pool and custom configuration
    pub fn with_config(config: ClientConfig) -> Self {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.pool_max_idle_per_host);

        if let Some(agent) = &config.user_agent {
            builder = builder.user_agent(agent.clone());
        }

        let client = builder.build().unwrap_or_else(|e| {
            tracing::warn!("client configuration rejected, using defaults: {}", e);
            reqwest::Client::default()
        });

        HttpTransport {
            client,
            config: Arc::new(config),
        }
    }

    /// Wrap an existing client, e.g. one with proxies or custom TLS
    pub fn from_client(client: reqwest::Client, config: ClientConfig) -> Self {
        HttpTransport {
            client,
            config: Arc::new(config),
        }
    }

    /// The process-wide instance, built on first use
    pub fn shared() -> Self {
        SHARED.get_or_init(HttpTransport::new).clone()
    }

    /// Get the transport configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn build_request(&self, request: PreparedRequest, event_stream: bool) -> Result<reqwest::RequestBuilder> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| RestError::RequestConstruction(format!("{} {}: {}", request.method, request.url, e)))?;

        let mut req_builder = self.client.request(request.method, url);
        if !request.content_type.is_empty() {
            req_builder = req_builder.header(CONTENT_TYPE, request.content_type);
        }
        if event_stream {
            req_builder = req_builder.header(ACCEPT, "text/event-stream");
        }
        for (k, v) in request.headers {
            req_builder = req_builder.header(k, v);
        }
        if !request.body.is_empty() {
            req_builder = req_builder.body(request.body);
        }
        Ok(req_builder)
    }

    fn span(&self, request: &PreparedRequest) -> tracing::Span {
        tracing::debug_span!("http.request", method = %request.method, url = %request.url)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, ctx: &RequestContext, request: PreparedRequest) -> Result<Response> {
        let span = self.span(&request);
        let req_builder = self.build_request(request, false)?;
        let logging = self.config.enable_logging;

        let exchange = async move {
            if logging {
                tracing::debug!("dispatching request");
            }
            let response = req_builder.send().await?;
            let status = response.status();
            let version = response.version();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| RestError::BodyRead(format!("{}: {}", status_text(status), e)))?;
            if logging {
                tracing::debug!(status = status.as_u16(), bytes = body.len(), "response received");
            }
            Ok(Response::new(status, version, headers, body))
        };

        ctx.run(exchange.instrument(span)).await
    }
}

#[async_trait]
impl StreamTransport for HttpTransport {
    async fn open_stream(
        &self,
        ctx: &RequestContext,
        request: PreparedRequest,
    ) -> Result<(StreamResponse, ByteStream)> {
        let span = self.span(&request);
        let req_builder = self.build_request(request, true)?;
        let logging = self.config.enable_logging;

        let exchange = async move {
            if logging {
                tracing::debug!("opening event stream");
            }
            let response = req_builder.send().await?;
            let status = response.status();
            let meta = StreamResponse::new(status, response.version(), response.headers().clone());

            if status != StatusCode::OK {
                let status = status_text(status);
                let body = response
                    .text()
                    .await
                    .map_err(|_| RestError::BodyRead(status.clone()))?;
                return Err(RestError::NonOkStatus { status, body });
            }

            let body = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| RestError::StreamRead(e.to_string())));
            Ok((meta, Box::pin(body) as ByteStream))
        };

        ctx.run(exchange.instrument(span)).await
    }
}

/// Drive `on_event` from a chunked event-stream body.
///
/// Returns `Ok` on `[DONE]` or end of body, the callback's error as soon as it
/// fails, and the body's own error when reading fails.
pub async fn dispatch_events<S>(
    meta: &StreamResponse,
    body: S,
    on_event: &mut EventHandler<'_>,
) -> Result<()>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut events = EventReader::new(body);
    while let Some(event) = events.next_event().await {
        on_event(meta, &event?)?;
    }
    Ok(())
}
