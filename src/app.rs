//! Application builder: everything registered at startup.
//!
//! Registration is the only time the route table, hook scopes and error
//! registry change. [`App::build`] resolves every hook chain once and hands
//! back an immutable [`Dispatcher`].

use std::error::Error as StdError;
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::{Error, HttpError, TemplateError};
use crate::hooks::{self, Flow, Hooks};
use crate::params::PathParams;
use crate::request::Request;
use crate::resource::Resource;
use crate::response::Response;
use crate::table::{CompiledRoute, RouteTable, SinkEntry};
use crate::template::UriTemplate;
use crate::translate::ErrorTranslator;

/// The application under construction.
///
/// Each call consumes and returns `self`, so registrations chain. Fallible
/// registrations return `Result` so a bad template aborts startup with `?`:
///
/// ```rust
/// use roost::{App, Error, PathParams, Request, Resource, Response};
///
/// fn get_user(_: &mut Request, resp: &mut Response, params: &PathParams) -> Result<(), Error> {
///     let id: u64 = params.parse("id")?;
///     resp.set_json(format!(r#"{{"id":{id}}}"#));
///     Ok(())
/// }
///
/// # fn main() -> Result<(), roost::TemplateError> {
/// let dispatcher = App::new()
///     .route("/users/{id}", Resource::new().get(get_user))?
///     .build();
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct App {
    config: Config,
    table: RouteTable,
    translator: ErrorTranslator,
    global: Hooks,
}

impl App {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Config) -> Self {
        Self { config, ..Self::default() }
    }

    /// Registers `resource` under `template`.
    ///
    /// Fails on a malformed template, a template that is already registered,
    /// a parameter name that conflicts with another route's at the same
    /// position, or a resource without a single responder.
    pub fn route(mut self, template: &str, resource: Resource) -> Result<Self, TemplateError> {
        let template = UriTemplate::parse(template)?;
        if resource.methods().next().is_none() {
            return Err(TemplateError::EmptyResource {
                template: template.to_string(),
            });
        }
        self.table.insert(CompiledRoute::new(template, resource))?;
        Ok(self)
    }

    /// Registers a fallback for paths no route matches.
    ///
    /// `pattern` is a regular expression matched from the start of the path;
    /// named capture groups become [`PathParams`]. Sinks are tried in
    /// registration order and bypass every hook.
    pub fn sink<F>(mut self, pattern: &str, callback: F) -> Result<Self, TemplateError>
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.table.add_sink(SinkEntry::new(pattern, Arc::new(callback))?);
        Ok(self)
    }

    /// Runs `hook` before every routed responder.
    pub fn before<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<R, Error>
            + Send
            + Sync
            + 'static,
        R: Into<Flow>,
    {
        self.global.push_before(hooks::erase(hook));
        self
    }

    /// Runs `hook` after every routed responder, last in the after stage.
    pub fn after<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<R, Error>
            + Send
            + Sync
            + 'static,
        R: Into<Flow>,
    {
        self.global.push_after(hooks::erase(hook));
        self
    }

    /// Handles errors of exactly type `E`. The most specific kind.
    ///
    /// The handler owns the error; returning `Err` re-raises it (or a new
    /// error) to the next less specific handler.
    ///
    /// `E = HttpError` is the one family type: it registers like
    /// [`http_error_handler`](Self::http_error_handler) and so also receives
    /// [`ValidationError`](crate::ValidationError)s, converted.
    pub fn error_handler<E, F>(mut self, handler: F) -> Self
    where
        E: StdError + Send + Sync + 'static,
        F: Fn(E, &Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.translator.register_exact::<E, F>(handler);
        self
    }

    /// Handles every [`HttpError`], including kinds derived from it such as
    /// [`ValidationError`](crate::ValidationError), which arrive converted.
    pub fn http_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(HttpError, &Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.translator.register_http(handler);
        self
    }

    /// Handles any error. The least specific kind.
    pub fn catch_all<F>(mut self, handler: F) -> Self
    where
        F: Fn(Error, &Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.translator.register_any(handler);
        self
    }

    /// Freezes the application into a [`Dispatcher`], resolving each route's
    /// hook chains exactly once.
    pub fn build(mut self) -> Dispatcher {
        self.table.resolve_hooks(&self.global);
        self.translator.set_expose_internal(self.config.errors.expose_internal);
        info!(
            routes = self.table.routes().len(),
            sinks = self.table.sinks().len(),
            "application built"
        );
        Dispatcher::new(self.table, self.translator, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Request, _: &mut Response, _: &PathParams) -> Result<(), Error> {
        Ok(())
    }

    #[test]
    fn test_bad_template_aborts_registration() {
        let result = App::new().route("/things/{id", Resource::new().get(noop));
        assert!(matches!(result, Err(TemplateError::MalformedParam { .. })));
    }

    #[test]
    fn test_duplicate_template_rejected() {
        let result = App::new()
            .route("/things", Resource::new().get(noop))
            .and_then(|app| app.route("/things", Resource::new().post(noop)));
        assert!(matches!(result, Err(TemplateError::Duplicate { .. })));
    }

    #[test]
    fn test_empty_resource_rejected() {
        let result = App::new().route("/empty", Resource::new().before(noop));
        assert!(matches!(result, Err(TemplateError::EmptyResource { .. })));
    }

    #[test]
    fn test_http_error_handler_via_type_sees_validation_errors() {
        let dispatcher = App::new()
            .route(
                "/things/{id}",
                Resource::new().get(|_: &mut Request, _: &mut Response, params: &PathParams| {
                    let _: u32 = params.parse("id")?;
                    Ok(())
                }),
            )
            .unwrap()
            .error_handler(|e: HttpError, _: &Request, resp: &mut Response, _: &PathParams| {
                resp.set_status(crate::Status::UnprocessableContent);
                resp.set_text(e.title());
                Ok(())
            })
            .build();

        let req = Request::new(
            crate::Method::Get,
            "/things/abc",
            http::HeaderMap::new(),
            crate::Body::empty(),
        );
        let resp = dispatcher.dispatch(req);
        assert_eq!(resp.status(), crate::Status::UnprocessableContent);
        assert_eq!(resp.body(), b"Invalid parameter");
    }

    #[test]
    fn test_bad_sink_pattern_rejected() {
        let result = App::new().sink("/v1/(", noop);
        assert!(matches!(result, Err(TemplateError::InvalidPattern { .. })));
    }
}
