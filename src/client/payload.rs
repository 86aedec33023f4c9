//! Payload encoding.
//!
//! Turns the builder's declared content-type, payload and file attachment into
//! body bytes, the final content-type string and (only when a curl sink is
//! configured) the body clause of the equivalent curl command.
//!
//! # Dispatch Order
//!
//! 1. Raw body bytes, when non-empty, are sent verbatim with the declared
//!    content-type.
//! 2. A file attachment forces `multipart/form-data`.
//! 3. Otherwise the declared content-type picks the encoder:
//!
//! | Content-Type | Accepts | Body |
//! |--------------|---------|------|
//! | `application/json` | `Json`, `Form` | JSON text; empty when no payload |
//! | `multipart/form-data` | `Form`, flat `Json` object | file part, then one part per field |
//! | `application/x-www-form-urlencoded` | `Form`, flat `Json` object | `k=v&k=v`, percent-encoded |
//! | `binary/octet-stream` | `Bytes` | bytes verbatim |
//!
//! A "flat" JSON object is one whose every value is a string; anything else
//! under a form content-type fails with [`RestError::Serialization`].

use crate::client::{curl, MultipartWriter};
use crate::error::{RestError, Result};
use crate::transport::Transport;
use crate::types::{ContentType, PreparedRequest, RequestContext};
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Request payload, shaped for the content-types that accept it
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured value, sent as JSON or flattened into form fields
    Json(Value),
    /// Flat string map for form content-types (also valid as a JSON object)
    Form(Vec<(String, String)>),
    /// Raw bytes for `binary/octet-stream`
    Bytes(Bytes),
}

impl Payload {
    /// Convert any serializable value into a JSON payload
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Flat string map from key/value pairs
    pub fn form<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Payload::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// File attached to a multipart request
pub struct FileAttachment {
    key: String,
    source: FileSource,
}

enum FileSource {
    /// Local path, or an `http(s)://` URL downloaded on every send
    Path(String),
    /// Caller reader, drained once and cached for later sends
    Reader {
        filename: String,
        reader: Option<Box<dyn AsyncRead + Send + Unpin>>,
        cached: Option<Bytes>,
    },
}

impl FileAttachment {
    /// Attachment read from a local path or downloaded from an absolute URL
    pub fn path(key: impl Into<String>, path: impl Into<String>) -> Self {
        FileAttachment {
            key: key.into(),
            source: FileSource::Path(path.into()),
        }
    }

    /// Attachment streamed from a reader under `filename`
    pub fn reader(
        key: impl Into<String>,
        filename: impl Into<String>,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        FileAttachment {
            key: key.into(),
            source: FileSource::Reader {
                filename: filename.into(),
                reader: Some(Box::new(reader)),
                cached: None,
            },
        }
    }

    /// Form field name of the file part
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path, URL or filename as shown in the curl command
    pub fn display_path(&self) -> &str {
        match &self.source {
            FileSource::Path(p) => p,
            FileSource::Reader { filename, .. } => filename,
        }
    }
}

impl std::fmt::Debug for FileAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAttachment")
            .field("key", &self.key)
            .field("source", &self.display_path())
            .finish()
    }
}

/// Output of the encoder
#[derive(Debug, Clone, Default)]
pub struct EncodedBody {
    /// Wire bytes
    pub body: Bytes,
    /// Final content-type; empty when the body carries none
    pub content_type: String,
    /// Curl body clause, present only when requested
    pub curl_clause: Option<String>,
}

/// Transport and context used to download URL attachments
pub(crate) struct RemoteFetch<'a> {
    pub transport: &'a dyn Transport,
    pub ctx: &'a RequestContext,
}

/// Borrowed view of the builder state the encoder reads
pub(crate) struct PayloadEncoder<'a> {
    pub content_type: &'a ContentType,
    pub payload: Option<&'a Payload>,
    pub raw_body: &'a [u8],
    pub emit_curl: bool,
}

impl PayloadEncoder<'_> {
    pub(crate) async fn encode(
        &self,
        file: Option<&mut FileAttachment>,
        remote: &RemoteFetch<'_>,
    ) -> Result<EncodedBody> {
        if !self.raw_body.is_empty() {
            return Ok(EncodedBody {
                body: Bytes::copy_from_slice(self.raw_body),
                content_type: self.content_type.as_str().to_string(),
                curl_clause: self.clause(|| {
                    curl::json_clause(&String::from_utf8_lossy(self.raw_body))
                }),
            });
        }

        let content_type = if file.is_some() {
            &ContentType::FormData
        } else {
            self.content_type
        };

        match content_type {
            ContentType::Json => self.encode_json(),
            ContentType::FormData => self.encode_form_data(file, remote).await,
            ContentType::FormUrlEncoded => self.encode_urlencoded(),
            ContentType::OctetStream => self.encode_octet_stream(),
            ContentType::Other(other) => Err(RestError::UnsupportedContentType(other.clone())),
        }
    }

    fn encode_json(&self) -> Result<EncodedBody> {
        let bytes = match self.payload {
            None => return Ok(EncodedBody::default()),
            Some(Payload::Json(value)) => serde_json::to_vec(value)?,
            Some(Payload::Form(fields)) => {
                let object: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                serde_json::to_vec(&object)?
            }
            Some(Payload::Bytes(_)) => {
                return Err(type_mismatch(&ContentType::Json, "a serializable value"))
            }
        };
        Ok(EncodedBody {
            curl_clause: self.clause(|| curl::json_clause(&String::from_utf8_lossy(&bytes))),
            body: Bytes::from(bytes),
            content_type: ContentType::Json.as_str().to_string(),
        })
    }

    async fn encode_form_data(
        &self,
        file: Option<&mut FileAttachment>,
        remote: &RemoteFetch<'_>,
    ) -> Result<EncodedBody> {
        let mut writer = MultipartWriter::new();
        let mut curl_file = None;

        if let Some(file) = file {
            let (filename, data) = read_attachment(file, remote).await?;
            writer.write_file(file.key(), &filename, &data);
            curl_file = Some((file.key().to_string(), file.display_path().to_string()));
        }

        let fields = match self.payload {
            Some(payload) => flatten(payload, &ContentType::FormData)?,
            None => Vec::new(),
        };
        for (k, v) in &fields {
            writer.write_field(k, v);
        }

        let content_type = writer.content_type();
        Ok(EncodedBody {
            curl_clause: self.clause(|| {
                curl::form_data_clause(
                    fields.iter().map(|(k, v)| (k.as_str(), v.as_str())),
                    curl_file.as_ref().map(|(k, p)| (k.as_str(), p.as_str())),
                )
            }),
            body: writer.finish(),
            content_type,
        })
    }

    fn encode_urlencoded(&self) -> Result<EncodedBody> {
        let Some(payload) = self.payload else {
            return Ok(EncodedBody::default());
        };
        let fields = flatten(payload, &ContentType::FormUrlEncoded)?;
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields.iter())
            .finish();
        Ok(EncodedBody {
            body: Bytes::from(encoded),
            content_type: ContentType::FormUrlEncoded.as_str().to_string(),
            curl_clause: self.clause(|| {
                curl::urlencoded_clause(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            }),
        })
    }

    fn encode_octet_stream(&self) -> Result<EncodedBody> {
        match self.payload {
            Some(Payload::Bytes(bytes)) => Ok(EncodedBody {
                body: bytes.clone(),
                content_type: ContentType::OctetStream.as_str().to_string(),
                curl_clause: self.clause(curl::octet_stream_clause),
            }),
            _ => Err(type_mismatch(&ContentType::OctetStream, "raw bytes")),
        }
    }

    fn clause(&self, f: impl FnOnce() -> String) -> Option<String> {
        self.emit_curl.then(f)
    }
}

/// Flatten a payload into string fields for form content-types
fn flatten(payload: &Payload, content_type: &ContentType) -> Result<Vec<(String, String)>> {
    match payload {
        Payload::Form(fields) => Ok(fields.clone()),
        Payload::Json(Value::Null) => Ok(Vec::new()),
        Payload::Json(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => Ok((k.clone(), s.clone())),
                other => Err(RestError::Serialization(format!(
                    "field [{}] is not a string: {}",
                    k, other
                ))),
            })
            .collect(),
        Payload::Json(other) => Err(RestError::Serialization(format!(
            "payload is not a flat string map: {}",
            other
        ))),
        Payload::Bytes(_) => Err(type_mismatch(content_type, "a flat string map")),
    }
}

fn type_mismatch(content_type: &ContentType, expected: &'static str) -> RestError {
    RestError::TypeMismatch {
        content_type: content_type.as_str().to_string(),
        expected,
    }
}

/// Filename and contents of an attachment
async fn read_attachment(
    file: &mut FileAttachment,
    remote: &RemoteFetch<'_>,
) -> Result<(String, Bytes)> {
    match &mut file.source {
        FileSource::Path(path) if is_remote(path) => {
            let temp = download_to_temp(path, remote).await?;
            let read = read_local(&temp.path.to_string_lossy()).await;
            temp.remove().await;
            read
        }
        FileSource::Path(path) => read_local(path).await,
        FileSource::Reader {
            filename,
            reader,
            cached,
        } => {
            if cached.is_none() {
                let mut reader = reader
                    .take()
                    .ok_or_else(|| RestError::file_access(filename.clone(), "reader already consumed"))?;
                let mut data = Vec::new();
                reader
                    .read_to_end(&mut data)
                    .await
                    .map_err(|e| RestError::file_access(filename.clone(), e))?;
                *cached = Some(Bytes::from(data));
            }
            let data = cached.clone().unwrap_or_default();
            Ok((base_name(filename), data))
        }
    }
}

async fn read_local(path: &str) -> Result<(String, Bytes)> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| RestError::file_access(path, e))?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)
        .await
        .map_err(|e| RestError::file_access(path, e))?;
    Ok((base_name(path), Bytes::from(data)))
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn is_remote(path: &str) -> bool {
    url::Url::parse(path)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Temporary download; removed by [`TempFile::remove`], or in the background
/// when dropped first
struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        TempFile { path, armed: true }
    }

    async fn remove(mut self) {
        self.armed = false;
        report_removal(&self.path, tokio::fs::remove_file(&self.path).await);
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let path = std::mem::take(&mut self.path);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    report_removal(&path, tokio::fs::remove_file(&path).await);
                });
            }
            Err(_) => report_removal(&path, std::fs::remove_file(&path)),
        }
    }
}

fn report_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            tracing::warn!("del tmp file [{}] failed: {}", path.display(), e);
        }
        _ => {}
    }
}

async fn download_to_temp(url: &str, remote: &RemoteFetch<'_>) -> Result<TempFile> {
    let response = remote
        .transport
        .send(remote.ctx, PreparedRequest::new(Method::GET, url))
        .await
        .map_err(|e| RestError::file_access(url, e))?;
    if !response.is_success() {
        return Err(RestError::file_access(url, response.status_text()));
    }

    let body = response.body_bytes();
    let mime = match sniff_content_type(body) {
        "application/octet-stream" => response
            .header("content-type")
            .unwrap_or("application/octet-stream"),
        sniffed => sniffed,
    };
    let temp = TempFile::new(temp_path(&mime_suffix(mime)));

    if let Some(dir) = temp.path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RestError::file_access(url, e))?;
    }
    tokio::fs::write(&temp.path, body)
        .await
        .map_err(|e| RestError::file_access(url, e))?;
    Ok(temp)
}

/// Unique per call: nanosecond timestamp plus a random component
fn temp_path(suffix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    std::env::temp_dir().join("rest-chain").join(format!(
        "resource_{}_{}.{}",
        nanos,
        uuid::Uuid::new_v4().simple(),
        suffix
    ))
}

/// File extension for a MIME type: `image/svg+xml` → `svg`, `bin` when unparsable
fn mime_suffix(content_type: &str) -> String {
    content_type
        .parse::<mime::Mime>()
        .map(|m| m.subtype().as_str().to_string())
        .unwrap_or_else(|_| "bin".to_string())
}

/// Content-type from leading magic bytes
fn sniff_content_type(data: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"%PDF-", "application/pdf"),
        (b"PK\x03\x04", "application/zip"),
        (b"\x1f\x8b\x08", "application/x-gzip"),
    ];
    // RIFF containers name their format in bytes 8..12.
    const RIFF_FORMATS: &[(&[u8], &str)] = &[
        (b"WEBP", "image/webp"),
        (b"WAVE", "audio/wave"),
        (b"AVI ", "video/avi"),
    ];

    if let Some(&(_, mime)) = SIGNATURES.iter().find(|(magic, _)| data.starts_with(magic)) {
        return mime;
    }
    if data.starts_with(b"RIFF") && data.len() >= 12 {
        if let Some(&(_, mime)) = RIFF_FORMATS.iter().find(|(tag, _)| data[8..12] == **tag) {
            return mime;
        }
    }

    let head = &data[..data.len().min(512)];
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let text = &head[start..];
    if text.starts_with(b"<?xml") {
        return "text/xml";
    }
    match text.first() {
        Some(b'<') => "text/html",
        Some(b'{') | Some(b'[') => "application/json",
        _ if std::str::from_utf8(head).is_ok() && !head.contains(&0) => "text/plain",
        _ => "application/octet-stream",
    }
}
