//! Incoming HTTP request context.
//!
//! A [`Request`] is built once per inbound call by the host and is owned by
//! that call's dispatch for its whole life. Hooks get it by `&mut` so they can
//! read the body stream or stash data in [`Request::context_mut`] for the
//! responder.

use std::fmt;
use std::io::{self, Read};

use bytes::{Buf, Bytes};
use http::{Extensions, HeaderMap, header};

use crate::config::RequestOptions;
use crate::error::{Error, ValidationError};
use crate::method::Method;

// ── Body ──────────────────────────────────────────────────────────────────────

/// A one-shot request body stream.
///
/// Reading is synchronous and happens at most once. Nothing here re-buffers:
/// once a reader has taken the body from the request it is gone.
pub struct Body {
    reader: Box<dyn Read + Send>,
}

impl Body {
    pub fn empty() -> Self {
        Self::from_bytes(Bytes::new())
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_reader(bytes.into().reader())
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self { reader: Box::new(reader) }
    }
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Body { .. }")
    }
}

/// The body stream was taken earlier in the pipeline.
#[derive(Debug, thiserror::Error)]
#[error("request body has already been consumed")]
pub struct BodyConsumed;

// ── Request ───────────────────────────────────────────────────────────────────

/// An incoming HTTP request.
pub struct Request {
    method: Method,
    path: String,
    query_string: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Body>,
    context: Extensions,
}

impl Request {
    /// Builds a request from a request-target such as `/42/things?limit=5`,
    /// using default [`RequestOptions`].
    pub fn new(method: Method, target: &str, headers: HeaderMap, body: Body) -> Self {
        Self::with_options(method, target, headers, body, &RequestOptions::default())
    }

    pub fn with_options(
        method: Method,
        target: &str,
        headers: HeaderMap,
        body: Body,
        options: &RequestOptions,
    ) -> Self {
        let (raw_path, query_string) = target.split_once('?').unwrap_or((target, ""));

        let mut path = if raw_path.is_empty() { "/" } else { raw_path };
        if options.strip_trailing_slash && path.len() > 1 {
            path = path.trim_end_matches('/');
            if path.is_empty() {
                path = "/";
            }
        }

        Self {
            method,
            path: path.to_owned(),
            query_string: query_string.to_owned(),
            query: parse_query(query_string, options),
            headers,
            body: Some(body),
            context: Extensions::new(),
        }
    }

    pub fn method(&self) -> Method { self.method }
    /// The path as received, still percent-encoded. Path parameters are
    /// decoded during matching.
    pub fn path(&self) -> &str { &self.path }
    pub fn query_string(&self) -> &str { &self.query_string }
    pub fn headers(&self) -> &HeaderMap { &self.headers }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(header::CONTENT_TYPE.as_str())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header(header::CONTENT_LENGTH.as_str())?.parse().ok()
    }

    // ── Body ──────────────────────────────────────────────────────────────────

    /// Takes the body stream. Every later call fails with [`BodyConsumed`].
    pub fn take_body(&mut self) -> Result<Body, BodyConsumed> {
        self.body.take().ok_or(BodyConsumed)
    }

    /// Reads the whole body stream, consuming it.
    pub fn read_body(&mut self) -> Result<Vec<u8>, Error> {
        let mut body = self.take_body()?;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf)?;
        Ok(buf)
    }

    // ── Query parameters ──────────────────────────────────────────────────────

    /// First value of the query parameter `name`.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Every value of `name`, in the order they appeared.
    pub fn query_all(&self, name: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Every value of `name`, with each value additionally split on `,`.
    pub fn query_list(&self, name: &str) -> Vec<&str> {
        self.query_all(name)
            .into_iter()
            .flat_map(|v| v.split(','))
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn require_query(&self, name: &str) -> Result<&str, ValidationError> {
        self.query(name).ok_or_else(|| ValidationError::Missing {
            name: name.to_owned(),
        })
    }

    pub fn query_int(&self, name: &str) -> Result<Option<i64>, ValidationError> {
        let Some(raw) = self.query(name) else {
            return Ok(None);
        };
        raw.trim().parse().map(Some).map_err(|_| ValidationError::Invalid {
            name: name.to_owned(),
            value: raw.to_owned(),
            expected: "integer",
        })
    }

    /// Like [`query_int`](Self::query_int), also enforcing `min..=max`.
    pub fn query_int_in(
        &self,
        name: &str,
        min: i64,
        max: i64,
    ) -> Result<Option<i64>, ValidationError> {
        match self.query_int(name)? {
            Some(value) if value < min || value > max => Err(ValidationError::OutOfRange {
                name: name.to_owned(),
                value,
                min,
                max,
            }),
            other => Ok(other),
        }
    }

    /// Accepts `true/false`, `t/f`, `yes/no`, `y/n`, `on/off` and `1/0`,
    /// case-insensitively.
    pub fn query_bool(&self, name: &str) -> Result<Option<bool>, ValidationError> {
        let Some(raw) = self.query(name) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Some(true)),
            "false" | "f" | "no" | "n" | "off" | "0" => Ok(Some(false)),
            _ => Err(ValidationError::Invalid {
                name: name.to_owned(),
                value: raw.to_owned(),
                expected: "boolean",
            }),
        }
    }

    // ── Context ───────────────────────────────────────────────────────────────

    /// Request-scoped values set by hooks for later stages.
    pub fn context(&self) -> &Extensions {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Extensions {
        &mut self.context
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query_string", &self.query_string)
            .finish_non_exhaustive()
    }
}

fn parse_query(query_string: &str, options: &RequestOptions) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
        if options.parse_csv && value.contains(',') {
            pairs.extend(
                value
                    .split(',')
                    .filter(|v| options.keep_blank_values || !v.is_empty())
                    .map(|v| (name.to_string(), v.to_owned())),
            );
        } else if options.keep_blank_values || !value.is_empty() {
            pairs.push((name.into_owned(), value.into_owned()));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(target: &str) -> Request {
        Request::new(Method::Get, target, HeaderMap::new(), Body::empty())
    }

    #[test]
    fn test_splits_path_and_query() {
        let req = get("/42/things?limit=5&tag=a%20b");
        assert_eq!(req.path(), "/42/things");
        assert_eq!(req.query_string(), "limit=5&tag=a%20b");
        assert_eq!(req.query("tag"), Some("a b"));
        assert_eq!(req.query_int("limit"), Ok(Some(5)));
    }

    #[test]
    fn test_typed_accessors_fail_with_validation_error() {
        let req = get("/?limit=five&flag=maybe&n=50");
        assert!(matches!(req.query_int("limit"), Err(ValidationError::Invalid { .. })));
        assert!(matches!(req.query_bool("flag"), Err(ValidationError::Invalid { .. })));
        assert!(matches!(
            req.query_int_in("n", 1, 10),
            Err(ValidationError::OutOfRange { value: 50, .. })
        ));
        assert!(matches!(req.require_query("q"), Err(ValidationError::Missing { .. })));
        assert_eq!(req.query_int("absent"), Ok(None));
    }

    #[test]
    fn test_bool_spellings() {
        let req = get("/?a=Yes&b=0&c=on");
        assert_eq!(req.query_bool("a"), Ok(Some(true)));
        assert_eq!(req.query_bool("b"), Ok(Some(false)));
        assert_eq!(req.query_bool("c"), Ok(Some(true)));
    }

    #[test]
    fn test_blank_values_dropped_by_default() {
        let req = get("/?a=&b=1");
        assert_eq!(req.query("a"), None);

        let opts = RequestOptions { keep_blank_values: true, ..Default::default() };
        let req = Request::with_options(Method::Get, "/?a=&b=1", HeaderMap::new(), Body::empty(), &opts);
        assert_eq!(req.query("a"), Some(""));
    }

    #[test]
    fn test_repeated_and_csv_values() {
        let req = get("/?id=1&id=2,3");
        assert_eq!(req.query_all("id"), ["1", "2,3"]);
        assert_eq!(req.query_list("id"), ["1", "2", "3"]);

        let opts = RequestOptions { parse_csv: true, ..Default::default() };
        let req = Request::with_options(Method::Get, "/?id=2,3", HeaderMap::new(), Body::empty(), &opts);
        assert_eq!(req.query_all("id"), ["2", "3"]);
    }

    #[test]
    fn test_strip_trailing_slash() {
        let opts = RequestOptions { strip_trailing_slash: true, ..Default::default() };
        let req = Request::with_options(Method::Get, "/things/", HeaderMap::new(), Body::empty(), &opts);
        assert_eq!(req.path(), "/things");
        let req = Request::with_options(Method::Get, "/", HeaderMap::new(), Body::empty(), &opts);
        assert_eq!(req.path(), "/");
        assert_eq!(get("/things/").path(), "/things/");
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::HeaderName::from_bytes(b"X-Api-Key").unwrap(),
            "secret".parse().unwrap(),
        );
        let req = Request::new(Method::Get, "/", headers, Body::empty());
        assert_eq!(req.header("x-api-key"), Some("secret"));
        assert_eq!(req.header("X-API-KEY"), Some("secret"));
    }

    #[test]
    fn test_body_is_read_once() {
        let mut req = Request::new(Method::Post, "/", HeaderMap::new(), Body::from_bytes("payload"));
        assert_eq!(req.read_body().unwrap(), b"payload");
        let err = req.read_body().unwrap_err();
        assert!(err.is::<BodyConsumed>());
        assert!(req.take_body().is_err());
    }
}
