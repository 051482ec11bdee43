//! Outgoing HTTP response scratchpad.
//!
//! One [`Response`] exists per request. The dispatcher creates it, then hands
//! the same `&mut` to every hook, the responder and the error translator in
//! turn. Nobody gets a copy.

use std::fmt;
use std::io::Read;

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::HeaderMap;

use crate::error::Error;
use crate::status::Status;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for [`Response::set_body`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Csv,
    EventStream,
    Html,
    Json,
    OctetStream,
    Text,
    Xml,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

impl From<ContentType> for HeaderValue {
    fn from(ct: ContentType) -> Self {
        HeaderValue::from_static(ct.as_str())
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

pub(crate) enum Payload {
    Bytes(Bytes),
    Stream(Box<dyn Read + Send>),
}

/// An outgoing HTTP response: status, headers (last write wins) and a body
/// that is either a byte payload or a one-shot reader.
///
/// ```rust
/// use roost::{ContentType, Response, Status};
///
/// let mut resp = Response::new();
/// resp.set_status(Status::Created);
/// resp.set_header("location", "/users/42").unwrap();
/// resp.set_body(ContentType::Json, br#"{"id":42}"#.to_vec());
/// assert_eq!(resp.status(), Status::Created);
/// ```
pub struct Response {
    status: Status,
    headers: HeaderMap,
    payload: Payload,
}

impl Response {
    /// `200 OK`, no headers, empty body.
    pub fn new() -> Self {
        Self {
            status: Status::Ok,
            headers: HeaderMap::new(),
            payload: Payload::Bytes(Bytes::new()),
        }
    }

    pub fn status(&self) -> Status { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets `name`, replacing any earlier value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Adds another value for `name`, keeping the earlier ones.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        self.headers.append(name, HeaderValue::from_str(value)?);
        Ok(())
    }

    /// Sets the body and its content type.
    pub fn set_body(&mut self, content_type: ContentType, body: impl Into<Bytes>) {
        self.headers.insert(header::CONTENT_TYPE, content_type.into());
        self.payload = Payload::Bytes(body.into());
    }

    /// `application/json` body. The caller serialises:
    /// `serde_json::to_vec(&value)?`.
    pub fn set_json(&mut self, body: impl Into<Bytes>) {
        self.set_body(ContentType::Json, body);
    }

    pub fn set_text(&mut self, body: impl Into<String>) {
        self.set_body(ContentType::Text, body.into());
    }

    /// Streams the body from `reader` when the response is emitted. The
    /// bundled server reads it in chunks and sends each as it arrives.
    pub fn set_stream(&mut self, reader: impl Read + Send + 'static) {
        self.payload = Payload::Stream(Box::new(reader));
    }

    /// The byte payload. Empty while the body is a stream.
    pub fn body(&self) -> &[u8] {
        match &self.payload {
            Payload::Bytes(b) => &b[..],
            Payload::Stream(_) => &[],
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.payload, Payload::Stream(_))
    }

    /// Drops any body, byte or stream.
    pub fn clear_body(&mut self) {
        self.payload = Payload::Bytes(Bytes::new());
    }

    pub(crate) fn into_parts(self) -> (Status, HeaderMap, Payload) {
        (self.status, self.headers, self.payload)
    }
}

impl Default for Response {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body().len())
            .field("stream", &self.is_stream())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_header_last_write_wins() {
        let mut resp = Response::new();
        resp.set_header("X-Trace", "a").unwrap();
        resp.set_header("x-trace", "b").unwrap();
        assert_eq!(resp.header("X-TRACE"), Some("b"));
        assert_eq!(resp.headers().get_all("x-trace").iter().count(), 1);
    }

    #[test]
    fn test_append_header_keeps_values() {
        let mut resp = Response::new();
        resp.append_header("vary", "accept").unwrap();
        resp.append_header("vary", "origin").unwrap();
        assert_eq!(resp.headers().get_all("vary").iter().count(), 2);
    }

    #[test]
    fn test_invalid_header_is_an_error() {
        let mut resp = Response::new();
        assert!(resp.set_header("bad header", "x").is_err());
        assert!(resp.set_header("x-ok", "line\nbreak").is_err());
    }

    #[test]
    fn test_body_setters() {
        let mut resp = Response::new();
        resp.set_json(r#"[1,2]"#);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.body(), b"[1,2]");

        resp.set_stream(std::io::Cursor::new(b"streamed".to_vec()));
        assert!(resp.is_stream());
        assert!(resp.body().is_empty());
    }

    #[test]
    fn test_into_parts_keeps_stream() {
        let mut resp = Response::new();
        resp.set_status(Status::Accepted);
        resp.set_stream(std::io::Cursor::new(b"chunked".to_vec()));
        let (status, _, payload) = resp.into_parts();
        assert_eq!(status, Status::Accepted);
        let Payload::Stream(mut reader) = payload else {
            panic!("expected a stream payload");
        };
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "chunked");
    }
}
