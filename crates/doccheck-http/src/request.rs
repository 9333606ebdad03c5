//! Call options.
//!
//! Options are plain data so that a call can be replayed verbatim after the
//! credential pair is renewed.

use std::fmt;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Serialize;

use doccheck_core::Result;
use doccheck_core::error::{Error, InvalidInputError};

/// Request body variants. Every variant can be rebuilt for a retry.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    File(FilePart),
}

/// A file sent as a single multipart form field.
#[derive(Clone)]
pub struct FilePart {
    field: String,
    file_name: String,
    mime: Option<String>,
    bytes: Vec<u8>,
}

impl FilePart {
    /// A document sent under the `file` form field.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            field: "file".to_string(),
            file_name: file_name.into(),
            mime: None,
            bytes,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Build a fresh multipart form for one attempt.
    pub(crate) fn to_form(&self) -> Result<Form> {
        let mut part = Part::bytes(self.bytes.clone()).file_name(self.file_name.clone());
        if let Some(ref mime) = self.mime {
            part = part.mime_str(mime).map_err(|e| InvalidInputError::Other {
                message: format!("invalid MIME type '{}': {}", mime, e),
            })?;
        }
        Ok(Form::new().part(self.field.clone(), part))
    }
}

// Skip the payload bytes in Debug output
impl fmt::Debug for FilePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilePart")
            .field("field", &self.field)
            .field("file_name", &self.file_name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Method, body and extra headers for [`AuthClient::call`](crate::AuthClient::call).
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: RequestBody,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Attach a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            Error::InvalidInput(InvalidInputError::Other {
                message: e.to_string(),
            })
        })?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    /// Attach a multipart file upload.
    pub fn file(mut self, file: FilePart) -> Self {
        self.body = RequestBody::File(file);
        self
    }

    /// Add an extra header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_get_without_body() {
        let options = RequestOptions::default();
        assert_eq!(options.method, Method::GET);
        assert!(matches!(options.body, RequestBody::Empty));
    }

    #[test]
    fn json_body_is_captured() {
        let options = RequestOptions::put().json(&json!({"role": "admin"})).unwrap();
        match options.body {
            RequestBody::Json(value) => assert_eq!(value, json!({"role": "admin"})),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn file_part_debug_omits_bytes() {
        let part = FilePart::new("thesis.pdf", b"%PDF-1.7".to_vec()).with_mime("application/pdf");
        let debug = format!("{:?}", part);
        assert!(debug.contains("thesis.pdf"));
        assert!(debug.contains("len: 8"));
        assert!(!debug.contains("PDF-1.7"));
    }

    #[test]
    fn bad_mime_is_rejected() {
        let part = FilePart::new("x.bin", vec![1, 2, 3]).with_mime("not a mime");
        assert!(part.to_form().is_err());
    }

    #[test]
    fn form_can_be_built_repeatedly() {
        let part = FilePart::new("scan.png", vec![0x89, 0x50]).with_mime("image/png");
        assert!(part.to_form().is_ok());
        assert!(part.to_form().is_ok());
    }
}
