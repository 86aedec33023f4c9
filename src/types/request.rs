//! Wire-ready request description.

use bytes::Bytes;
use http::Method;

/// A request after path resolution, payload encoding and URL assembly.
///
/// This is the whole contract between [`RequestBuilder`](crate::RequestBuilder)
/// and a [`Transport`](crate::Transport): transports never see builder state.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// Uppercased method
    pub method: Method,
    /// Final URL: base URL + resolved path + query
    pub url: String,
    /// Encoded body, empty when there is nothing to send
    pub body: Bytes,
    /// Final content-type, empty when the body carries none
    pub content_type: String,
    /// Caller headers; keys may repeat and are added, not overwritten
    pub headers: Vec<(String, String)>,
}

impl PreparedRequest {
    /// Create a bodiless request
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        PreparedRequest {
            method,
            url: url.into(),
            body: Bytes::new(),
            content_type: String::new(),
            headers: Vec::new(),
        }
    }

    /// First header value for a case-insensitive key
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
