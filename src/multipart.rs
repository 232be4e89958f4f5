//! Single-file `multipart/form-data` bodies for the upload endpoint

use bytes::{BufMut, Bytes, BytesMut};
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{Error, Result};

/// Name of the form field carrying the file.
const FILE_FIELD: &str = "file";

/// A form with one file part.
#[derive(Debug, Clone)]
pub struct MultipartForm {
    boundary: String,
    file_name: String,
    content_type: String,
    data: Bytes,
}

impl MultipartForm {
    /// Build a form around `data` with a random boundary.
    pub fn new(file_name: &str, data: impl Into<Bytes>) -> Result<Self> {
        let mut nonce = [0u8; 16];
        SystemRandom::new()
            .fill(&mut nonce)
            .map_err(|_| Error::Io(std::io::Error::other("failed to generate multipart boundary")))?;

        Ok(Self {
            boundary: format!("------------------------koji{}", hex::encode(nonce)),
            file_name: sanitize_file_name(file_name),
            content_type: "application/octet-stream".to_string(),
            data: data.into(),
        })
    }

    /// Override the part's content type (default `application/octet-stream`).
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Value for the request's `Content-Type` header.
    pub fn content_type_header(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Encode the form into a request body.
    pub fn into_body(self) -> Bytes {
        let head = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{name}\"\r\nContent-Type: {ct}\r\n\r\n",
            b = self.boundary,
            field = FILE_FIELD,
            name = self.file_name,
            ct = self.content_type,
        );
        let tail = format!("\r\n--{}--\r\n", self.boundary);

        let mut body = BytesMut::with_capacity(head.len() + self.data.len() + tail.len());
        body.put_slice(head.as_bytes());
        body.put_slice(&self.data);
        body.put_slice(tail.as_bytes());
        body.freeze()
    }
}

/// Quotes and line breaks would break the part header.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| if c == '"' { '\'' } else { c })
        .collect()
}
