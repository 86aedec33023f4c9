//! Response views handed back by transports.
//!
//! [`Response`] drains the body once at receipt time, so every accessor can be
//! called any number of times. [`StreamResponse`] carries the same metadata
//! without a body; an event stream is consumed through a callback instead.
//!
//! # Examples
//!
//! ```
//! use rest_chain::Response;
//! use http::{HeaderMap, StatusCode, Version};
//!
//! let mut headers = HeaderMap::new();
//! headers.insert("logId", "123".parse().unwrap());
//! let response = Response::new(StatusCode::OK, Version::HTTP_11, headers, r#"{"code":0}"#);
//!
//! assert_eq!(response.status_text(), "200 OK");
//! assert_eq!(response.header("LOGID"), Some("123"));
//! assert_eq!(response.body_as_string(), response.body_as_string());
//! ```

use crate::error::{RestError, Result};
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use serde::de::DeserializeOwned;
use std::path::Path;

/// A completed response with its body fully buffered
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Assemble a response; transports and test doubles use this
    pub fn new(
        status: StatusCode,
        version: Version,
        headers: HeaderMap,
        body: impl Into<Bytes>,
    ) -> Self {
        Response {
            status,
            version,
            headers,
            body: body.into(),
        }
    }

    /// First value of a header, looked up case-insensitively
    pub fn header(&self, key: &str) -> Option<&str> {
        header_value(&self.headers, key)
    }

    /// All response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body decoded as UTF-8, invalid sequences replaced
    pub fn body_as_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Raw body bytes
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the JSON body into `target`, replacing its value
    pub fn deserialize_body_into<T: DeserializeOwned>(&self, target: &mut T) -> Result<()> {
        *target = self.json()?;
        Ok(())
    }

    /// Deserialize the JSON body into a new value
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| RestError::Deserialization(e.to_string()))
    }

    /// Status line text, e.g. `200 OK`
    pub fn status_text(&self) -> String {
        status_text(self.status)
    }

    /// Numeric status code
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Status as an `http` type
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Protocol as `(major, minor)`
    pub fn protocol_version(&self) -> (u8, u8) {
        protocol_version(self.version)
    }

    /// Protocol text, e.g. `HTTP/1.1`
    pub fn proto(&self) -> String {
        proto(self.version)
    }

    /// Save the body to `path`, creating missing parent directories.
    ///
    /// Handy when the response is a file download.
    pub async fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let display = path.display().to_string();
        if display.is_empty() {
            return Err(RestError::file_access(display, "path must not be empty"));
        }
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| RestError::file_access(display.clone(), e))?;
        }
        tokio::fs::write(path, &self.body)
            .await
            .map_err(|e| RestError::file_access(display, e))
    }
}

/// Status and headers of an event-stream response
#[derive(Debug, Clone)]
pub struct StreamResponse {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
}

impl StreamResponse {
    /// Assemble stream metadata
    pub fn new(status: StatusCode, version: Version, headers: HeaderMap) -> Self {
        StreamResponse {
            status,
            version,
            headers,
        }
    }

    /// First value of a header, looked up case-insensitively
    pub fn header(&self, key: &str) -> Option<&str> {
        header_value(&self.headers, key)
    }

    /// All response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Status line text, e.g. `200 OK`
    pub fn status_text(&self) -> String {
        status_text(self.status)
    }

    /// Numeric status code
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Protocol as `(major, minor)`
    pub fn protocol_version(&self) -> (u8, u8) {
        protocol_version(self.version)
    }

    /// Protocol text, e.g. `HTTP/1.1`
    pub fn proto(&self) -> String {
        proto(self.version)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, key: &str) -> Option<&'a str> {
    headers.get(key).and_then(|v| v.to_str().ok())
}

pub(crate) fn status_text(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    }
}

fn protocol_version(version: Version) -> (u8, u8) {
    match version {
        Version::HTTP_09 => (0, 9),
        Version::HTTP_10 => (1, 0),
        Version::HTTP_2 => (2, 0),
        Version::HTTP_3 => (3, 0),
        _ => (1, 1),
    }
}

fn proto(version: Version) -> String {
    let (major, minor) = protocol_version(version);
    format!("HTTP/{}.{}", major, minor)
}
