//! Fluent request builder.
//!
//! A [`RequestBuilder`] collects everything about one logical request through
//! chained setters, then a terminal `send*` call runs the pipeline:
//!
//! 1. Uppercase and validate the method
//! 2. Substitute `:name` path variables (fails fast, before any I/O)
//! 3. Encode the payload for the content-type
//! 4. Assemble `base_url + path + "?" + query`
//! 5. Emit the curl reconstruction, if a sink is configured
//! 6. Hand the [`PreparedRequest`] to the transport
//! 7. Deserialize the body into the response target, if one is set
//!
//! Terminal calls borrow the builder mutably and may be repeated; every call
//! re-runs the whole pipeline, re-reading file attachments from disk.
//!
//! # Examples
//!
//! ## Simple GET request
//!
//! ```ignore
//! use rest_chain::{Method, RequestBuilder};
//! use std::collections::BTreeMap;
//!
//! let response = RequestBuilder::new()
//!     .base_url("http://localhost:8080")
//!     .path_variables([("id", "2")])
//!     .query([("verbose", "1")])
//!     .send(Method::GET, "/user/detail/:id")
//!     .await?;
//! println!("{} {}", response.status_code(), response.body_as_string());
//! ```
//!
//! ## POST JSON and decode the reply
//!
//! ```ignore
//! use rest_chain::{print_curl, ContentType, Method, RequestBuilder};
//!
//! #[derive(serde::Deserialize, Default)]
//! struct Reply { code: i32 }
//!
//! let mut reply = Reply::default();
//! RequestBuilder::new()
//!     .content_type(ContentType::Json)
//!     .payload(&serde_json::json!({"user_id": 5, "username": "Rose"}))
//!     .deserialize_response_into(&mut reply)
//!     .on_curl_generated(print_curl)
//!     .send(Method::POST, "http://localhost:8080/user/register")
//!     .await?;
//! ```
//!
//! ## Retrying until the server answers 200
//!
//! ```ignore
//! use rest_chain::client::{require_success, RetryOptions};
//! use std::time::Duration;
//!
//! let response = RequestBuilder::new()
//!     .send_with_retry(
//!         Method::GET,
//!         "http://localhost:8080/retry/test",
//!         require_success,
//!         RetryOptions::new().attempts(5).delay(Duration::from_millis(500)),
//!     )
//!     .await?;
//! ```

use crate::client::payload::{FileAttachment, Payload, PayloadEncoder, RemoteFetch};
use crate::client::retry::RetryLoop;
use crate::client::{assemble_url, build_query, curl, substitute_path_variables, RetryOptions};
use crate::error::{RestError, Result};
use crate::transport::{
    dispatch_events, EventReader, EventStream, HttpTransport, StreamTransport, Transport,
};
use crate::types::{ContentType, PreparedRequest, RequestContext, Response, StreamResponse};
use bytes::Bytes;
use http::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

type CurlSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Events `subscribe` buffers ahead of the consumer
const EVENT_BUFFER: usize = 100;

/// Anything a response body can be decoded into
pub trait ResponseTarget {
    /// Replace `self` with the decoded body
    fn fill_from(&mut self, response: &Response) -> Result<()>;
}

impl<T: DeserializeOwned> ResponseTarget for T {
    fn fill_from(&mut self, response: &Response) -> Result<()> {
        response.deserialize_body_into(self)
    }
}

/// Fluent, reusable configuration for one logical request
///
/// Not meant for concurrent mutation: build one per request. The transports it
/// points at are shared and safe to use from many builders at once.
pub struct RequestBuilder<'a> {
    content_type: ContentType,
    payload: Option<Payload>,
    payload_error: Option<String>,
    raw_body: Bytes,
    headers: BTreeMap<String, String>,
    file: Option<FileAttachment>,
    file_reader: Option<FileAttachment>,
    query: BTreeMap<String, String>,
    path_variables: BTreeMap<String, String>,
    base_url: Option<String>,
    response_target: Option<&'a mut (dyn ResponseTarget + Send)>,
    curl_sink: Option<CurlSink>,
    transport: Arc<dyn Transport>,
    stream_transport: Arc<dyn StreamTransport>,
}

impl<'a> RequestBuilder<'a> {
    /// Empty JSON request on the process-wide [`HttpTransport`]
    pub fn new() -> Self {
        let shared = HttpTransport::shared();
        RequestBuilder {
            content_type: ContentType::Json,
            payload: None,
            payload_error: None,
            raw_body: Bytes::new(),
            headers: BTreeMap::new(),
            file: None,
            file_reader: None,
            query: BTreeMap::new(),
            path_variables: BTreeMap::new(),
            base_url: None,
            response_target: None,
            curl_sink: None,
            transport: Arc::new(shared.clone()),
            stream_transport: Arc::new(shared),
        }
    }

    /// Declare how the payload is encoded
    pub fn content_type(mut self, content_type: impl Into<ContentType>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Replace the header map
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = collect_map(headers);
        self
    }

    /// Merge the pair `f` computes, only when both key and value are non-empty
    pub fn conditional_header<K, V>(mut self, f: impl FnOnce() -> (K, V)) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let (k, v) = f();
        let (k, v) = (k.into(), v.into());
        if !k.is_empty() && !v.is_empty() {
            self.headers.insert(k, v);
        }
        self
    }

    /// Set one header, replacing an earlier value for the same key
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the header map with the one `f` computes
    pub fn header_fn<K, V, I>(self, f: impl FnOnce() -> I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers(f())
    }

    /// Structured payload; encoded according to the content-type at send time.
    ///
    /// A value that cannot be serialized fails the terminal call with
    /// [`RestError::Serialization`].
    pub fn payload<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match Payload::json(value) {
            Ok(payload) => {
                self.payload = Some(payload);
                self.payload_error = None;
            }
            Err(e) => {
                self.payload = None;
                self.payload_error = Some(e.to_string());
            }
        }
        self
    }

    /// Payload computed by `f`
    pub fn payload_fn<T: Serialize>(self, f: impl FnOnce() -> T) -> Self {
        let value = f();
        self.payload(&value)
    }

    /// Flat string fields, for form content-types (or a JSON object)
    pub fn form<K, V>(mut self, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.payload = Some(Payload::form(fields));
        self.payload_error = None;
        self
    }

    /// Raw bytes payload for `binary/octet-stream`
    pub fn bytes(mut self, data: impl Into<Bytes>) -> Self {
        self.payload = Some(Payload::Bytes(data.into()));
        self.payload_error = None;
        self
    }

    /// Payload already in its encoded-shape form
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self.payload_error = None;
        self
    }

    /// Body sent verbatim, bypassing payload encoding entirely
    pub fn raw_body(mut self, body: impl Into<Bytes>) -> Self {
        self.raw_body = body.into();
        self
    }

    /// Decode every successful dispatch's JSON body into `target`
    pub fn deserialize_response_into<T>(mut self, target: &'a mut T) -> Self
    where
        T: DeserializeOwned + Send,
    {
        self.response_target = Some(target);
        self
    }

    /// Attach a file from a local path, or from an `http(s)://` URL that is
    /// downloaded on every send. Forces `multipart/form-data`.
    pub fn file(mut self, key: impl Into<String>, path: impl Into<String>) -> Self {
        self.file = Some(FileAttachment::path(key, path));
        self
    }

    /// Attach a file read from `reader` under `filename`. Forces
    /// `multipart/form-data`; the reader is drained once and reused by later sends.
    ///
    /// A file set with [`file`](Self::file) wins over the reader, whichever was set last.
    pub fn file_from_reader(
        mut self,
        key: impl Into<String>,
        filename: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        self.file_reader = Some(FileAttachment::reader(key, filename, reader));
        self
    }

    /// Replace the query parameters; values are not percent-encoded
    pub fn query<K, V>(mut self, query: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query = collect_map(query);
        self
    }

    /// Replace the values for `:name` path segments
    pub fn path_variables<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.path_variables = collect_map(vars);
        self
    }

    /// Prefix prepended verbatim to the resolved path
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Receive the equivalent curl command before every dispatch
    pub fn on_curl_generated(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.curl_sink = Some(Arc::new(sink));
        self
    }

    /// Use a custom transport for buffered sends
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Use a custom transport for event streams
    pub fn stream_transport(mut self, transport: impl StreamTransport + 'static) -> Self {
        self.stream_transport = Arc::new(transport);
        self
    }

    /// Send with no deadline or cancellation
    pub async fn send(&mut self, method: impl AsRef<str>, url: &str) -> Result<Response> {
        self.send_with_context(&RequestContext::background(), method, url)
            .await
    }

    /// Send under `ctx`
    pub async fn send_with_context(
        &mut self,
        ctx: &RequestContext,
        method: impl AsRef<str>,
        url: &str,
    ) -> Result<Response> {
        let request = self.prepare(ctx, method.as_ref(), url).await?;
        let response = self.transport.send(ctx, request).await?;

        if let Some(target) = self.response_target.as_deref_mut() {
            target.fill_from(&response)?;
        }
        Ok(response)
    }

    /// Send until `predicate` accepts the outcome or the attempts run out
    pub async fn send_with_retry<P>(
        &mut self,
        method: impl AsRef<str>,
        url: &str,
        predicate: P,
        options: RetryOptions,
    ) -> Result<Response>
    where
        P: FnMut(&Result<Response>) -> Result<()> + Send,
    {
        self.send_with_context_and_retry(&RequestContext::background(), method, url, predicate, options)
            .await
    }

    /// Send under `ctx` until `predicate` accepts the outcome or the attempts run out.
    ///
    /// The predicate sees every outcome, success or error. `Ok(())` ends the
    /// loop and returns that outcome; `Err(reason)` counts as a failed attempt.
    pub async fn send_with_context_and_retry<P>(
        &mut self,
        ctx: &RequestContext,
        method: impl AsRef<str>,
        url: &str,
        mut predicate: P,
        options: RetryOptions,
    ) -> Result<Response>
    where
        P: FnMut(&Result<Response>) -> Result<()> + Send,
    {
        let method = method.as_ref();
        let mut retry = RetryLoop::new(&options);
        while retry.next_attempt() {
            ctx.check()?;
            let outcome = self.send_with_context(ctx, method, url).await;
            match predicate(&outcome) {
                Ok(()) => return outcome,
                Err(reason) => retry.failed(ctx, reason).await?,
            }
        }
        Err(retry.exhausted())
    }

    /// Send and feed each server-sent event to `on_event`, in order.
    ///
    /// An error returned by `on_event` stops reading and is returned as is.
    pub async fn send_stream<F>(
        &mut self,
        ctx: &RequestContext,
        method: impl AsRef<str>,
        url: &str,
        mut on_event: F,
    ) -> Result<()>
    where
        F: FnMut(&StreamResponse, &str) -> Result<()> + Send,
    {
        let request = self.prepare(ctx, method.as_ref(), url).await?;
        let transport = &self.stream_transport;
        ctx.run(async {
            let (meta, body) = transport.open_stream(ctx, request).await?;
            dispatch_events(&meta, body, &mut on_event).await
        })
        .await
    }

    /// Send and expose the server-sent events as an [`EventStream`]
    pub async fn subscribe(
        &mut self,
        ctx: RequestContext,
        method: impl AsRef<str>,
        url: &str,
    ) -> Result<EventStream> {
        let request = self.prepare(&ctx, method.as_ref(), url).await?;
        let transport = Arc::clone(&self.stream_transport);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let task = tokio::spawn(async move {
            let forwarded = ctx
                .run(forward_events(transport.as_ref(), &ctx, request, &tx))
                .await;
            if let Err(e) = forwarded {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(EventStream::new(rx, Some(task)))
    }

    /// Resolve, encode and assemble without dispatching
    async fn prepare(
        &mut self,
        ctx: &RequestContext,
        method: &str,
        url: &str,
    ) -> Result<PreparedRequest> {
        if let Some(msg) = &self.payload_error {
            return Err(RestError::Serialization(msg.clone()));
        }
        let method = normalize_method(method)?;
        let path = substitute_path_variables(url, &self.path_variables)?;

        let encoder = PayloadEncoder {
            content_type: &self.content_type,
            payload: self.payload.as_ref(),
            raw_body: &self.raw_body,
            emit_curl: self.curl_sink.is_some(),
        };
        let remote = RemoteFetch {
            transport: self.transport.as_ref(),
            ctx,
        };
        let file = self.file.as_mut().or(self.file_reader.as_mut());
        let encoded = encoder.encode(file, &remote).await?;

        let url = assemble_url(self.base_url.as_deref(), &path, &build_query(&self.query));
        let headers: Vec<(String, String)> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(sink) = &self.curl_sink {
            let command = curl::build_curl(
                method.as_str(),
                &url,
                &encoded.content_type,
                &headers,
                encoded.curl_clause.as_deref().unwrap_or_default(),
            );
            sink(&command);
        }

        Ok(PreparedRequest {
            method,
            url,
            body: encoded.body,
            content_type: encoded.content_type,
            headers,
        })
    }
}

impl Default for RequestBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pump events into `tx` until the body ends, a read fails or the receiver is gone.
///
/// `tx.send` waits while the channel is full, which holds back the body read.
async fn forward_events(
    transport: &dyn StreamTransport,
    ctx: &RequestContext,
    request: PreparedRequest,
    tx: &mpsc::Sender<Result<String>>,
) -> Result<()> {
    let (_meta, body) = transport.open_stream(ctx, request).await?;
    let mut events = EventReader::new(body);
    while let Some(event) = events.next_event().await {
        if tx.send(Ok(event?)).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// Uppercase `method` and parse it as an HTTP token
fn normalize_method(method: &str) -> Result<Method> {
    let upper = method.trim().to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes())
        .map_err(|_| RestError::RequestConstruction(format!("invalid method [{}]", method)))
}

fn collect_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> BTreeMap<String, String>
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
