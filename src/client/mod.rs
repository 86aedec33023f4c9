//! Request building, payload encoding and retry.
//!
//! This module holds everything that happens before a request reaches a
//! [`Transport`](crate::Transport):
//!
//! - **Fluent configuration** of content-type, headers, payload, files, query and path variables
//! - **Payload encoding** for JSON, multipart, url-encoded and octet-stream bodies
//! - **Path templating** of `:name` segments
//! - **Curl reconstruction** of the exact request being sent
//! - **Retrying** a send under a caller predicate
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── builder   - RequestBuilder and the send pipeline
//! ├── payload   - Payload shapes, file attachments and the encoder
//! ├── multipart - multipart/form-data body writer
//! ├── path      - Path variable substitution and URL assembly
//! ├── curl      - Curl command reconstruction and sinks
//! ├── retry     - Retry options and predicates
//! └── config    - Default transport configuration
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RequestBuilder`] | Fluent request configuration and terminal sends |
//! | [`Payload`] | JSON value, flat form fields or raw bytes |
//! | [`FileAttachment`] | File part from a path, URL or reader |
//! | [`RetryOptions`] | Attempts, delays and hooks for retrying sends |
//! | [`ClientConfig`] | Pool and timeout settings for the default transport |
//!
//! # Examples
//!
//! ## Path Templating
//!
//! ```
//! use rest_chain::client::substitute_path_variables;
//! use std::collections::BTreeMap;
//!
//! let mut vars = BTreeMap::new();
//! vars.insert("id".to_string(), "2".to_string());
//! let path = substitute_path_variables("/user/detail/:id", &vars).unwrap();
//! assert_eq!(path, "/user/detail/2");
//! ```
//!
//! ## Multipart Bodies
//!
//! ```
//! use rest_chain::client::MultipartWriter;
//!
//! let mut writer = MultipartWriter::with_boundary("b");
//! writer.write_field("user", "erik");
//! let body = writer.finish();
//! assert!(body.ends_with(b"--b--\r\n"));
//! ```
//!
//! ## Utility Functions
//!
//! ```
//! use rest_chain::client::{exponential_backoff, is_retryable_status};
//! use std::time::Duration;
//!
//! assert!(is_retryable_status(503));
//! assert!(!is_retryable_status(404));
//! assert_eq!(exponential_backoff(2, 100), Duration::from_millis(400));
//! ```

mod builder;
mod config;
pub mod curl;
mod multipart;
mod path;
mod payload;
mod retry;

pub use builder::{RequestBuilder, ResponseTarget};
pub use config::ClientConfig;
pub use curl::{log_curl, print_curl};
pub use multipart::MultipartWriter;
pub use path::{assemble_url, build_query, substitute_path_variables};
pub use payload::{EncodedBody, FileAttachment, Payload};
pub use retry::{exponential_backoff, is_retryable_status, require_success, DelayType, RetryOptions};
