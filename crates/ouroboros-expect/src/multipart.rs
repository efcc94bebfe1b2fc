//! multipart/form-data accumulation
//!
//! State machine: `Absent` → `Open` → `Closed`. Only encoding closes it.

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;

/// Append-only multipart/form-data writer over an owned buffer.
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    buf: BytesMut,
}

impl MultipartWriter {
    pub fn new() -> Self {
        Self::with_boundary(gen_boundary())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            buf: BytesMut::new(),
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `multipart/form-data; boundary=...`
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Bytes written so far (without the closing boundary)
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_field(&mut self, name: &str, value: &str) {
        self.write_part_header(name, None);
        self.buf.put_slice(value.as_bytes());
    }

    pub fn write_file(&mut self, name: &str, file_name: &str, contents: &[u8]) {
        self.write_part_header(name, Some(file_name));
        self.buf.put_slice(contents);
    }

    fn write_part_header(&mut self, name: &str, file_name: Option<&str>) {
        if !self.buf.is_empty() {
            self.buf.put_slice(b"\r\n");
        }
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"\r\nContent-Disposition: form-data; name=\"");
        self.buf.put_slice(escape_quotes(name).as_bytes());
        self.buf.put_slice(b"\"");
        if let Some(file_name) = file_name {
            self.buf.put_slice(b"; filename=\"");
            self.buf.put_slice(escape_quotes(file_name).as_bytes());
            self.buf.put_slice(b"\"\r\nContent-Type: application/octet-stream");
        }
        self.buf.put_slice(b"\r\n\r\n");
    }

    /// Writes the closing boundary and hands out the encoded body.
    pub fn finish(mut self) -> Bytes {
        if !self.buf.is_empty() {
            self.buf.put_slice(b"\r\n");
        }
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"--\r\n");
        self.buf.freeze()
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn escape_quotes(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Random boundary, 60 hex characters
fn gen_boundary() -> String {
    let mut rng = rand::thread_rng();
    let a: u64 = rng.gen();
    let b: u64 = rng.gen();
    let c: u64 = rng.gen();
    let d: u64 = rng.gen();
    format!("{a:016x}{b:016x}{c:016x}{d:012x}", d = d >> 16)
}

/// Multipart state of a request
#[derive(Debug, Default)]
pub enum Multipart {
    #[default]
    Absent,
    Open(MultipartWriter),
    /// Finalized during encoding; holds the content type that was produced
    Closed(String),
}

impl Multipart {
    pub fn is_open(&self) -> bool {
        matches!(self, Multipart::Open(_))
    }

    /// Opens a writer unless one is already open.
    ///
    /// Returns true on the absent → open transition.
    pub fn open(&mut self) -> bool {
        if self.is_open() {
            return false;
        }
        *self = Multipart::Open(MultipartWriter::new());
        true
    }

    pub fn writer_mut(&mut self) -> Option<&mut MultipartWriter> {
        match self {
            Multipart::Open(writer) => Some(writer),
            _ => None,
        }
    }

    /// Open → closed. Returns the content type and the encoded body.
    pub fn close(&mut self) -> Option<(String, Bytes)> {
        match std::mem::take(self) {
            Multipart::Open(writer) => {
                let content_type = writer.content_type();
                let body = writer.finish();
                *self = Multipart::Closed(content_type.clone());
                Some((content_type, body))
            }
            other => {
                *self = other;
                None
            }
        }
    }
}
