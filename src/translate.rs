//! Error translation: raised errors become terminal responses.
//!
//! Handlers are keyed by how specific the error kind they catch is:
//!
//! | Rank | Registered with | Catches |
//! |---|---|---|
//! | 0 | [`App::error_handler::<E>`](crate::App::error_handler) | exactly `E` |
//! | 1 | [`App::http_error_handler`](crate::App::http_error_handler) | [`HttpError`] and kinds derived from it, e.g. [`ValidationError`](crate::ValidationError) |
//! | 2 | [`App::catch_all`](crate::App::catch_all) | anything |
//!
//! Lookup walks ranks from most to least specific, newest registration first
//! within a rank. A handler that returns `Err` re-raises: the returned error
//! continues down the list, and whatever is left at the end goes to the
//! built-in default mapping.

use std::any::TypeId;
use std::error::Error as StdError;
use std::sync::Arc;

use tracing::{error, warn};

use crate::error::{Error, HttpError};
use crate::params::PathParams;
use crate::request::Request;
use crate::response::{ContentType, Response};

type BoxedErrorHandler =
    Arc<dyn Fn(Error, &Request, &mut Response, &PathParams) -> Result<(), Error> + Send + Sync>;

#[derive(Clone, Copy)]
enum Catch {
    Exact(fn(&Error) -> bool),
    Http,
    Any,
}

impl Catch {
    fn rank(self) -> u8 {
        match self {
            Catch::Exact(_) => 0,
            Catch::Http => 1,
            Catch::Any => 2,
        }
    }

    fn matches(self, err: &Error) -> bool {
        match self {
            Catch::Exact(is) => is(err),
            Catch::Http => err.is_http(),
            Catch::Any => true,
        }
    }
}

struct Entry {
    catch: Catch,
    kind: &'static str,
    seq: usize,
    handler: BoxedErrorHandler,
}

#[derive(Default)]
pub(crate) struct ErrorTranslator {
    entries: Vec<Entry>,
    expose_internal: bool,
}

impl ErrorTranslator {
    pub(crate) fn set_expose_internal(&mut self, expose: bool) {
        self.expose_internal = expose;
    }

    pub(crate) fn register_exact<E, F>(&mut self, handler: F)
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(E, &Request, &mut Response, &PathParams) -> Result<(), Error> + Send + Sync + 'static,
    {
        // `HttpError` also catches its derived kinds.
        if TypeId::of::<E>() == TypeId::of::<HttpError>() {
            self.register_http(
                move |http: HttpError, req: &Request, resp: &mut Response, params: &PathParams| {
                    match Error::from(http).downcast::<E>() {
                        Ok(e) => handler(e, req, resp, params),
                        Err(err) => Err(err),
                    }
                },
            );
            return;
        }

        let handler: BoxedErrorHandler = Arc::new(
            move |err: Error, req: &Request, resp: &mut Response, params: &PathParams| {
                match err.downcast::<E>() {
                    Ok(e) => handler(e, req, resp, params),
                    Err(err) => Err(err),
                }
            },
        );
        self.push(Catch::Exact(Error::is::<E>), std::any::type_name::<E>(), handler);
    }

    pub(crate) fn register_http<F>(&mut self, handler: F)
    where
        F: Fn(HttpError, &Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        let handler: BoxedErrorHandler = Arc::new(
            move |err: Error, req: &Request, resp: &mut Response, params: &PathParams| {
                match err.into_http() {
                    Ok(e) => handler(e, req, resp, params),
                    Err(err) => Err(err),
                }
            },
        );
        self.push(Catch::Http, "HttpError", handler);
    }

    pub(crate) fn register_any<F>(&mut self, handler: F)
    where
        F: Fn(Error, &Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.push(Catch::Any, "any", Arc::new(handler));
    }

    fn push(&mut self, catch: Catch, kind: &'static str, handler: BoxedErrorHandler) {
        let seq = self.entries.len();
        self.entries.push(Entry { catch, kind, seq, handler });
        self.entries
            .sort_by_key(|e| (e.catch.rank(), std::cmp::Reverse(e.seq)));
    }

    /// Turns `err` into the terminal state of `resp`. Never fails.
    pub(crate) fn translate(
        &self,
        mut err: Error,
        req: &Request,
        resp: &mut Response,
        params: &PathParams,
    ) {
        for entry in &self.entries {
            if !entry.catch.matches(&err) {
                continue;
            }
            match (entry.handler)(err, req, resp, params) {
                Ok(()) => return,
                Err(next) => {
                    warn!(kind = entry.kind, error = %next, "error handler re-raised");
                    err = next;
                }
            }
        }
        self.apply_default(err, req, resp);
    }

    /// Built-in mapping: the HTTP-mapped family renders as itself,
    /// everything else is a `500` whose cause goes to the log only.
    fn apply_default(&self, err: Error, req: &Request, resp: &mut Response) {
        match err.into_http() {
            Ok(http) => write_error(&http, resp),
            Err(other) => {
                error!(
                    method = %req.method(),
                    path = req.path(),
                    error = %other,
                    cause = ?other,
                    "unhandled error"
                );
                let mut http = HttpError::internal();
                if self.expose_internal {
                    http = http.with_description(other.to_string());
                }
                write_error(&http, resp);
            }
        }
    }
}

/// Renders `err` into `resp`: status, carried headers, JSON body.
pub(crate) fn write_error(err: &HttpError, resp: &mut Response) {
    resp.set_status(err.status());
    for (name, value) in err.headers() {
        resp.headers_mut().insert(name.clone(), value.clone());
    }
    let body = serde_json::to_vec(&err.to_json()).unwrap_or_default();
    resp.set_body(ContentType::Json, body);
}

impl HttpError {
    /// Writes this error into `resp` the way the default translator does.
    /// Handy for custom handlers that only want to tweak the result.
    pub fn apply(&self, resp: &mut Response) {
        write_error(self, resp);
    }
}
