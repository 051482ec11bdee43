//! Error types.
//!
//! Two families live here. Startup errors ([`TemplateError`], [`ServeError`])
//! are returned from registration and binding so `main` can abort before a
//! single request is served. Request-time errors travel as [`Error`] from a
//! hook, responder or sink into the error translator, which always turns them
//! into a terminal [`Response`](crate::Response).

use std::error::Error as StdError;
use std::fmt;

use http::{HeaderMap, HeaderName, HeaderValue, header};

use crate::method::Method;
use crate::status::Status;

// ── Error ─────────────────────────────────────────────────────────────────────

/// A request-time error raised by a hook, responder, sink or error handler.
///
/// Any `std::error::Error + Send + Sync + 'static` converts into it with `?`,
/// so handlers can raise [`HttpError`], [`ValidationError`] or their own types.
/// The error translator downcasts to pick the most specific handler.
pub struct Error {
    inner: Box<dyn StdError + Send + Sync + 'static>,
}

impl Error {
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self { inner: Box::new(error) }
    }

    /// An error carrying only a message. Maps to `500` unless a catch-all
    /// handler says otherwise.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// Recovers the concrete error, or gives `self` back untouched.
    pub fn downcast<E: StdError + 'static>(self) -> Result<E, Self> {
        match self.inner.downcast::<E>() {
            Ok(e) => Ok(*e),
            Err(inner) => Err(Self { inner }),
        }
    }

    /// `true` when the error belongs to the HTTP-mapped family: an
    /// [`HttpError`] or anything that derives from it.
    pub fn is_http(&self) -> bool {
        self.is::<HttpError>() || self.is::<ValidationError>()
    }

    /// Views the error as its [`HttpError`] base, converting derived kinds.
    pub fn into_http(self) -> Result<HttpError, Self> {
        match self.downcast::<HttpError>() {
            Ok(e) => Ok(e),
            Err(this) => this.downcast::<ValidationError>().map(HttpError::from),
        }
    }
}

impl<E> From<E> for Error
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

// ── HttpError ─────────────────────────────────────────────────────────────────

/// An error that maps directly onto an HTTP response.
///
/// The built-in translator renders it as a JSON body
/// `{"title": "...", "description": "..."}` and applies the carried headers.
///
/// ```rust
/// use roost::{HttpError, Status};
///
/// let err = HttpError::service_unavailable(Some(120)).with_description("maintenance");
/// assert_eq!(err.status(), Status::ServiceUnavailable);
/// assert_eq!(err.headers()["retry-after"], "120");
/// ```
#[derive(Clone, Debug, thiserror::Error)]
#[error("{status}")]
pub struct HttpError {
    status: Status,
    title: Option<String>,
    description: Option<String>,
    headers: HeaderMap,
}

impl HttpError {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            title: None,
            description: None,
            headers: HeaderMap::new(),
        }
    }

    pub fn bad_request() -> Self {
        Self::new(Status::BadRequest)
    }

    /// `401`. Attach a challenge with
    /// `.with_header(header::WWW_AUTHENTICATE, ...)`.
    pub fn unauthorized() -> Self {
        Self::new(Status::Unauthorized)
    }

    pub fn forbidden() -> Self {
        Self::new(Status::Forbidden)
    }

    pub fn not_found() -> Self {
        Self::new(Status::NotFound)
    }

    /// `405` with an `Allow` header listing `allowed` in the given order.
    pub fn method_not_allowed(allowed: &[Method]) -> Self {
        Self::new(Status::MethodNotAllowed).with_header(header::ALLOW, allow_value(allowed))
    }

    pub fn conflict() -> Self {
        Self::new(Status::Conflict)
    }

    pub fn content_too_large() -> Self {
        Self::new(Status::ContentTooLarge)
    }

    pub fn unsupported_media_type() -> Self {
        Self::new(Status::UnsupportedMediaType)
    }

    pub fn unprocessable() -> Self {
        Self::new(Status::UnprocessableContent)
    }

    /// `429`, with `Retry-After` in seconds when known.
    pub fn too_many_requests(retry_after: Option<u64>) -> Self {
        Self::new(Status::TooManyRequests).with_retry_after(retry_after)
    }

    pub fn internal() -> Self {
        Self::new(Status::InternalServerError)
    }

    pub fn not_implemented() -> Self {
        Self::new(Status::NotImplemented)
    }

    /// `503`, with `Retry-After` in seconds when known.
    pub fn service_unavailable(retry_after: Option<u64>) -> Self {
        Self::new(Status::ServiceUnavailable).with_retry_after(retry_after)
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a header to the eventual response. Last write wins.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    fn with_retry_after(self, seconds: Option<u64>) -> Self {
        match seconds {
            Some(s) => self.with_header(header::RETRY_AFTER, HeaderValue::from(s)),
            None => self,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// The explicit title, or the status line (e.g. `404 Not Found`).
    pub fn title(&self) -> String {
        self.title.clone().unwrap_or_else(|| self.status.to_string())
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The JSON document the default translator writes as the body.
    pub fn to_json(&self) -> serde_json::Value {
        let mut doc = serde_json::Map::new();
        doc.insert("title".to_owned(), self.title().into());
        if let Some(d) = &self.description {
            doc.insert("description".to_owned(), d.clone().into());
        }
        serde_json::Value::Object(doc)
    }
}

pub(crate) fn allow_value(methods: &[Method]) -> HeaderValue {
    let joined = methods
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    // Method tokens are plain ASCII.
    HeaderValue::from_str(&joined).unwrap_or_else(|_| HeaderValue::from_static(""))
}

// ── ValidationError ───────────────────────────────────────────────────────────

/// A typed accessor could not coerce request input. Derives from
/// [`HttpError`] as `400 Bad Request`.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("the `{name}` parameter is required")]
    Missing { name: String },

    #[error("the `{name}` parameter is invalid: `{value}` is not a valid {expected}")]
    Invalid {
        name: String,
        value: String,
        expected: &'static str,
    },

    #[error("the `{name}` parameter is invalid: {value} is outside {min}..={max}")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("path segment `{segment}` is not valid percent-encoded UTF-8")]
    InvalidPath { segment: String },
}

impl From<ValidationError> for HttpError {
    fn from(e: ValidationError) -> Self {
        let title = match e {
            ValidationError::Missing { .. } => "Missing parameter",
            ValidationError::InvalidPath { .. } => "Invalid path",
            _ => "Invalid parameter",
        };
        HttpError::bad_request()
            .with_title(title)
            .with_description(e.to_string())
    }
}

// ── Startup errors ────────────────────────────────────────────────────────────

/// A route template or sink pattern was rejected at registration.
///
/// Always a startup failure: the application must not begin serving.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("route template `{template}` must start with `/`")]
    MissingLeadingSlash { template: String },

    #[error("route template `{template}` contains an empty segment")]
    EmptySegment { template: String },

    #[error("route template `{template}` has malformed parameter syntax in `{segment}`")]
    MalformedParam { template: String, segment: String },

    #[error("route template `{template}` declares parameter `{name}` more than once")]
    DuplicateParam { template: String, name: String },

    #[error("route template `{template}` is already registered")]
    Duplicate { template: String },

    #[error("route `{template}` has no responders")]
    EmptyResource { template: String },

    #[error("parameter `{name}` in `{template}` conflicts with `{existing}` at the same position")]
    ConflictingParam {
        template: String,
        name: String,
        existing: String,
    },

    #[error("invalid sink pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Infrastructure failures of the bundled host adapter: binding to a port or
/// accepting a connection.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("invalid socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
