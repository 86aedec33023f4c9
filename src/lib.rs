#![warn(missing_docs)]

//! # rest-chain: Fluent HTTP Requests
//!
//! This crate builds HTTP requests through a chain of setters and sends them
//! through a pluggable, connection-pooled transport.
//!
//! ## Overview
//!
//! A request is described once on a [`RequestBuilder`] and sent with one of
//! its terminal operations:
//!
//! 1. **Buffered** - `send` / `send_with_context` return a fully read [`Response`]
//! 2. **Retrying** - `send_with_retry` repeats the send until a predicate accepts it
//! 3. **Streaming** - `send_stream` / `subscribe` deliver server-sent events in order
//!
//! ## Key Features
//!
//! - **Payload Encoding**: JSON, `multipart/form-data` with file parts,
//!   `application/x-www-form-urlencoded` and `binary/octet-stream`
//! - **Path Templating**: `:name` segments filled from a map, failing before any I/O
//! - **Curl Reconstruction**: the exact request as a copy-pasteable curl command
//! - **Cancellation**: deadlines and cancel handles via [`RequestContext`]
//! - **Connection Reuse**: one process-wide pool shared by every builder
//!
//! ## Client Usage
//!
//! ```ignore
//! use rest_chain::{ContentType, Method, RequestBuilder};
//!
//! #[derive(serde::Deserialize, Default)]
//! struct Reply {
//!     code: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> rest_chain::Result<()> {
//!     let mut reply = Reply::default();
//!     let response = RequestBuilder::new()
//!         .content_type(ContentType::FormUrlEncoded)
//!         .form([("id", "5"), ("username", "Rose")])
//!         .header("token", "234")
//!         .deserialize_response_into(&mut reply)
//!         .send(Method::POST, "http://localhost:8080/user/register")
//!         .await?;
//!     println!("{} -> code {}", response.status_text(), reply.code);
//!     Ok(())
//! }
//! ```
//!
//! ## Server-Sent Events
//!
//! ```ignore
//! use rest_chain::{Method, RequestBuilder, RequestContext};
//! use std::time::Duration;
//!
//! let mut events = RequestBuilder::new()
//!     .payload(&serde_json::json!({"prompt": "hi"}))
//!     .subscribe(RequestContext::with_timeout(Duration::from_secs(30)), Method::POST, url)
//!     .await?;
//! while let Some(event) = events.next().await {
//!     println!("{}", event?);
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[client]** - Request builder, payload encoding, path templating, curl and retry
//! - **[transport]** - Transport traits, the default HTTP transport and event streaming
//! - **[types]** - Content types, prepared requests, responses and request contexts
//! - **[error]** - Error types and result handling

pub mod client;
pub mod error;
pub mod transport;
pub mod types;

pub use client::{log_curl, print_curl, Payload, RequestBuilder, RetryOptions};
pub use error::{RestError, Result};
pub use http::Method;
pub use transport::{EventStream, HttpTransport, StreamTransport, Transport};
pub use types::{
    CancelHandle, ContentType, PreparedRequest, RequestContext, Response, StreamResponse,
};

#[cfg(test)]
mod tests;
