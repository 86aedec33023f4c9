//! Declared body encodings.

use std::fmt;

/// Content-type a [`RequestBuilder`](crate::RequestBuilder) encodes its payload with.
///
/// Selecting a file attachment forces [`ContentType::FormData`] regardless of
/// what was declared.
///
/// # Examples
///
/// ```
/// use rest_chain::ContentType;
///
/// assert_eq!(ContentType::from("application/json"), ContentType::Json);
/// assert_eq!(ContentType::FormUrlEncoded.as_str(), "application/x-www-form-urlencoded");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContentType {
    /// `application/json`
    #[default]
    Json,
    /// `multipart/form-data`
    FormData,
    /// `application/x-www-form-urlencoded`
    FormUrlEncoded,
    /// `binary/octet-stream`
    OctetStream,
    /// Anything else; rejected by the encoder
    Other(String),
}

impl ContentType {
    /// MIME text of this content-type
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Json => "application/json",
            ContentType::FormData => "multipart/form-data",
            ContentType::FormUrlEncoded => "application/x-www-form-urlencoded",
            ContentType::OctetStream => "binary/octet-stream",
            ContentType::Other(s) => s,
        }
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "application/json" => ContentType::Json,
            "multipart/form-data" => ContentType::FormData,
            "application/x-www-form-urlencoded" => ContentType::FormUrlEncoded,
            "binary/octet-stream" => ContentType::OctetStream,
            _ => ContentType::Other(value.to_string()),
        }
    }
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        ContentType::from(value.as_str())
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
