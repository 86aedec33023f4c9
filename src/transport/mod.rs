//! Transports: where a [`PreparedRequest`] meets the network.
//!
//! The builder never talks to the network itself. It hands a fully resolved
//! request to a [`Transport`] (buffered responses) or a [`StreamTransport`]
//! (server-sent events). Both are traits so callers can inject
//! instrumentation, isolated connection pools or test doubles through
//! [`RequestBuilder::transport`](crate::RequestBuilder::transport) and
//! [`RequestBuilder::stream_transport`](crate::RequestBuilder::stream_transport).
//!
//! # Module Organization
//!
//! ```text
//! transport/
//! ├── fetch        - HttpTransport, the pooled reqwest-backed default
//! ├── parser       - Incremental server-sent-event line parser
//! └── subscription - EventStream, a Stream view over an event stream
//! ```
//!
//! # Contract
//!
//! Implementations must be safe to call from many tasks at once. A buffered
//! transport drains the whole body before returning. A stream transport
//! returns as soon as the status line is in and leaves the body unread; the
//! caller pulls chunks at its own pace, so a slow consumer slows the read.

mod fetch;
mod parser;
mod subscription;

pub use fetch::{dispatch_events, HttpTransport};
pub use parser::{EventParser, EventReader, ParseState, SseFrame};
pub use subscription::EventStream;

use crate::error::Result;
use crate::types::{PreparedRequest, RequestContext, Response, StreamResponse};
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;

/// Callback invoked once per event with the stream metadata and the event data
pub type EventHandler<'a> = dyn FnMut(&StreamResponse, &str) -> Result<()> + Send + 'a;

/// Raw chunks of an event-stream body; read failures are [`RestError::StreamRead`](crate::RestError::StreamRead)
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Executes a prepared request and returns the buffered response
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` under `ctx`, draining the whole response body
    async fn send(&self, ctx: &RequestContext, request: PreparedRequest) -> Result<Response>;
}

/// Executes a prepared request whose response is a server-sent-event stream
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Send `request` under `ctx` and return the metadata and body of a 200
    /// response. Any other status fails with
    /// [`RestError::NonOkStatus`](crate::RestError::NonOkStatus).
    async fn open_stream(
        &self,
        ctx: &RequestContext,
        request: PreparedRequest,
    ) -> Result<(StreamResponse, ByteStream)>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, ctx: &RequestContext, request: PreparedRequest) -> Result<Response> {
        (**self).send(ctx, request).await
    }
}

#[async_trait]
impl<T: StreamTransport + ?Sized> StreamTransport for std::sync::Arc<T> {
    async fn open_stream(
        &self,
        ctx: &RequestContext,
        request: PreparedRequest,
    ) -> Result<(StreamResponse, ByteStream)> {
        (**self).open_stream(ctx, request).await
    }
}
