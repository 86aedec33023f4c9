//! In-memory `multipart/form-data` writer.
//!
//! Produces the complete body up front because transports receive bytes, not
//! a stream. Parts are written in call order; [`MultipartWriter::finish`]
//! appends the closing delimiter and must be called exactly once.

use bytes::{BufMut, Bytes, BytesMut};

/// Accumulates form fields and file parts into one body buffer
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    buffer: BytesMut,
    parts: usize,
}

impl MultipartWriter {
    /// Writer with a random boundary
    pub fn new() -> Self {
        Self::with_boundary(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Writer with a fixed boundary
    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        MultipartWriter {
            boundary: boundary.into(),
            buffer: BytesMut::with_capacity(1024),
            parts: 0,
        }
    }

    /// Boundary separating the parts
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the request `Content-Type` header
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Append a plain form field
    pub fn write_field(&mut self, name: &str, value: &str) {
        self.start_part();
        self.put_line(&format!(
            "Content-Disposition: form-data; name=\"{}\"",
            escape_quotes(name)
        ));
        self.put_line("");
        self.buffer.put_slice(value.as_bytes());
    }

    /// Append a file part
    pub fn write_file(&mut self, name: &str, filename: &str, data: &[u8]) {
        self.start_part();
        self.put_line(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"",
            escape_quotes(name),
            escape_quotes(filename)
        ));
        self.put_line("Content-Type: application/octet-stream");
        self.put_line("");
        self.buffer.put_slice(data);
    }

    /// Close the body and return it
    pub fn finish(mut self) -> Bytes {
        if self.parts > 0 {
            self.buffer.put_slice(b"\r\n");
        }
        self.buffer.put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buffer.freeze()
    }

    fn start_part(&mut self) {
        if self.parts > 0 {
            self.buffer.put_slice(b"\r\n");
        }
        self.put_line(&format!("--{}", self.boundary));
        self.parts += 1;
    }

    fn put_line(&mut self, line: &str) {
        self.buffer.put_slice(line.as_bytes());
        self.buffer.put_slice(b"\r\n");
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
