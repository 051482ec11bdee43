//! Per-request state machine.
//!
//! ```text
//! MATCHING ─▶ GLOBAL_BEFORE ─▶ RESOURCE_BEFORE ─▶ METHOD_BEFORE ─▶ RESPONDER ─▶ AFTER_HOOKS ─▶ DONE
//!    │  │                                                                │
//!    │  └─ sink ─▶ callback ─▶ DONE              unsupported method ─▶ 405 ─▶ DONE
//!    └─ miss ─▶ ERROR (404)
//!
//! any stage ── Err ──▶ ERROR (translator) ─▶ DONE
//! ```
//!
//! The three before stages run as one pre-flattened chain. A
//! [`Dispatcher`] is immutable and `Sync`: one instance serves every
//! concurrent request, each with its own `Request`, `Response` and
//! `PathParams`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use http::header;
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{Error, HttpError, allow_value};
use crate::hooks::Flow;
use crate::method::Method;
use crate::params::PathParams;
use crate::request::Request;
use crate::response::Response;
use crate::status::Status;
use crate::table::{CompiledRoute, Match, RouteTable};
use crate::translate::{ErrorTranslator, write_error};

/// The built, read-only request pipeline. Obtain via [`App::build`](crate::App::build).
pub struct Dispatcher {
    table: RouteTable,
    translator: ErrorTranslator,
    config: Config,
}

impl Dispatcher {
    pub(crate) fn new(table: RouteTable, translator: ErrorTranslator, config: Config) -> Self {
        Self { table, translator, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one request to completion. Always yields a response: errors go
    /// through the translator and a panic becomes a `500`.
    pub fn dispatch(&self, mut req: Request) -> Response {
        let mut resp = Response::new();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut params = PathParams::new();
            if let Err(err) = self.run(&mut req, &mut resp, &mut params) {
                self.translator.translate(err, &req, &mut resp, &params);
            }
        }));

        if let Err(payload) = outcome {
            error!(
                method = %req.method(),
                path = req.path(),
                panic = panic_message(&*payload),
                "request handler panicked"
            );
            resp = Response::new();
            write_error(&HttpError::internal(), &mut resp);
        }
        resp
    }

    fn run(
        &self,
        req: &mut Request,
        resp: &mut Response,
        params: &mut PathParams,
    ) -> Result<(), Error> {
        match self.table.find(req.path())? {
            Match::Route { route, params: found } => {
                *params = found;
                self.respond(route, req, resp, &*params)
            }
            Match::Sink { sink, params: found } => {
                debug!(path = req.path(), pattern = sink.pattern(), "sink matched");
                *params = found;
                (sink.callback)(req, resp, &*params)
            }
            Match::NotFound => {
                debug!(method = %req.method(), path = req.path(), "no route matched");
                Err(HttpError::not_found().into())
            }
        }
    }

    fn respond(
        &self,
        route: &CompiledRoute,
        req: &mut Request,
        resp: &mut Response,
        params: &PathParams,
    ) -> Result<(), Error> {
        let Some(method) = route.method(req.method()) else {
            return self.synthesize(route, req, resp, params);
        };
        debug!(method = %req.method(), template = %route.template(), "route matched");

        if method.chain.run_before(req, resp, params)? == Flow::Continue {
            (method.call)(req, resp, params)?;
        }
        method.chain.run_after(req, resp, params)
    }

    /// The route exists but nothing is registered for the method. Global
    /// before-hooks still run; resource, method and after hooks do not.
    fn synthesize(
        &self,
        route: &CompiledRoute,
        req: &mut Request,
        resp: &mut Response,
        params: &PathParams,
    ) -> Result<(), Error> {
        if route.fallback.run_before(req, resp, params)? == Flow::Halt {
            return Ok(());
        }

        let allowed = route.allowed_methods();
        if req.method() == Method::Options && self.config.request.auto_options {
            // This answer makes OPTIONS itself allowed.
            let mut methods = allowed.to_vec();
            methods.push(Method::Options);
            methods.sort();
            resp.set_status(Status::Ok);
            resp.headers_mut().insert(header::ALLOW, allow_value(&methods));
            resp.clear_body();
        } else {
            debug!(method = %req.method(), template = %route.template(), "method not allowed");
            write_error(&HttpError::method_not_allowed(allowed), resp);
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use http::HeaderMap;

    use super::*;
    use crate::app::App;
    use crate::error::ValidationError;
    use crate::request::Body;
    use crate::resource::{Resource, Responder};

    type Log = Arc<Mutex<Vec<String>>>;

    fn request(method: Method, target: &str) -> Request {
        Request::new(method, target, HeaderMap::new(), Body::empty())
    }

    fn tracing_app(log: &Log) -> App {
        hooked(App::new(), log)
    }

    fn hooked(app: App, log: &Log) -> App {
        let (l1, l2, l3, l4, l5) =
            (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
        let responder = Responder::new(move |_: &mut Request, resp: &mut Response, _: &PathParams| {
            l1.lock().unwrap().push("responder".into());
            resp.set_text("done");
            Ok(())
        })
        .before(move |_: &mut Request, _: &mut Response, _: &PathParams| {
            l2.lock().unwrap().push("method-before".into());
            Ok(())
        });
        let resource = Resource::new()
            .responder(Method::Get, responder)
            .before(move |_: &mut Request, _: &mut Response, _: &PathParams| {
                l3.lock().unwrap().push("resource-before".into());
                Ok(())
            });

        app
            .before(move |_: &mut Request, _: &mut Response, _: &PathParams| {
                l4.lock().unwrap().push("global-before".into());
                Ok(())
            })
            .after(move |_: &mut Request, _: &mut Response, _: &PathParams| {
                l5.lock().unwrap().push("global-after".into());
                Ok(())
            })
            .route("/things/{id}", resource)
            .unwrap()
    }

    #[test]
    fn test_stage_order() {
        let log = Log::default();
        let dispatcher = tracing_app(&log).build();
        let resp = dispatcher.dispatch(request(Method::Get, "/things/1"));
        assert_eq!(resp.status(), Status::Ok);
        assert_eq!(resp.body(), b"done");
        assert_eq!(
            *log.lock().unwrap(),
            ["global-before", "resource-before", "method-before", "responder", "global-after"]
        );
    }

    #[test]
    fn test_unsupported_method_runs_only_global_before() {
        let log = Log::default();
        let dispatcher = tracing_app(&log).build();
        let resp = dispatcher.dispatch(request(Method::Delete, "/things/1"));
        assert_eq!(resp.status(), Status::MethodNotAllowed);
        assert_eq!(resp.header("allow"), Some("GET"));
        assert_eq!(*log.lock().unwrap(), ["global-before"]);
    }

    #[test]
    fn test_auto_options() {
        let log = Log::default();
        let dispatcher = tracing_app(&log).build();
        let resp = dispatcher.dispatch(request(Method::Options, "/things/1"));
        assert_eq!(resp.status(), Status::Ok);
        assert_eq!(resp.header("allow"), Some("GET, OPTIONS"));
        assert!(resp.body().is_empty());

        // Only the OPTIONS answer advertises OPTIONS, not the 405.
        let resp = dispatcher.dispatch(request(Method::Put, "/things/1"));
        assert_eq!(resp.header("allow"), Some("GET"));
    }

    #[test]
    fn test_auto_options_disabled() {
        let log = Log::default();
        let config = Config::from_toml_str("[request]\nauto_options = false").unwrap();
        let dispatcher = hooked(App::with_config(config), &log).build();
        let resp = dispatcher.dispatch(request(Method::Options, "/things/1"));
        assert_eq!(resp.status(), Status::MethodNotAllowed);
    }

    #[test]
    fn test_halt_skips_responder_but_not_after_hooks() {
        let log = Log::default();
        let l = log.clone();
        let dispatcher = tracing_app(&log)
            .before(|_: &mut Request, resp: &mut Response, _: &PathParams| {
                resp.set_status(Status::NotModified);
                Ok(Flow::Halt)
            })
            .after(move |_: &mut Request, _: &mut Response, _: &PathParams| {
                l.lock().unwrap().push("second-global-after".into());
                Ok(())
            })
            .build();

        let resp = dispatcher.dispatch(request(Method::Get, "/things/1"));
        assert_eq!(resp.status(), Status::NotModified);
        assert_eq!(
            *log.lock().unwrap(),
            ["global-before", "global-after", "second-global-after"]
        );
    }

    #[test]
    fn test_miss_is_404() {
        let dispatcher = App::new().build();
        let resp = dispatcher.dispatch(request(Method::Get, "/nowhere"));
        assert_eq!(resp.status(), Status::NotFound);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["title"], "404 Not Found");
    }

    #[test]
    fn test_panic_becomes_500() {
        let dispatcher = App::new()
            .route(
                "/boom",
                Resource::new().get(|_: &mut Request, _: &mut Response, _: &PathParams| {
                    panic!("responder exploded")
                }),
            )
            .unwrap()
            .build();
        let resp = dispatcher.dispatch(request(Method::Get, "/boom"));
        assert_eq!(resp.status(), Status::InternalServerError);
        assert!(!String::from_utf8_lossy(resp.body()).contains("exploded"));
    }

    #[test]
    fn test_error_after_partial_write_replaces_body() {
        let dispatcher = App::new()
            .route(
                "/half",
                Resource::new().get(|_: &mut Request, resp: &mut Response, _: &PathParams| {
                    resp.set_text("partial");
                    Err(HttpError::conflict().into())
                }),
            )
            .unwrap()
            .build();
        let resp = dispatcher.dispatch(request(Method::Get, "/half"));
        assert_eq!(resp.status(), Status::Conflict);
        assert_eq!(resp.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_after_hook_error_is_translated() {
        let log = Log::default();
        let dispatcher = tracing_app(&log)
            .after(|_: &mut Request, _: &mut Response, _: &PathParams| {
                Err::<(), _>(HttpError::conflict().into())
            })
            .build();

        let resp = dispatcher.dispatch(request(Method::Get, "/things/1"));
        assert_eq!(resp.status(), Status::Conflict);
        // The responder ran before the after stage failed.
        assert!(log.lock().unwrap().contains(&"responder".to_owned()));
    }

    #[test]
    fn test_halt_in_after_stage_skips_outer_after_hooks() {
        let log = Log::default();
        let l = log.clone();
        let responder = Responder::new(|_: &mut Request, resp: &mut Response, _: &PathParams| {
            resp.set_text("kept");
            Ok(())
        })
        .after(move |_: &mut Request, _: &mut Response, _: &PathParams| {
            l.lock().unwrap().push("method-after".into());
            Ok(Flow::Halt)
        });
        let l = log.clone();
        let dispatcher = App::new()
            .after(move |_: &mut Request, _: &mut Response, _: &PathParams| {
                l.lock().unwrap().push("global-after".into());
                Err::<(), _>(HttpError::internal().into())
            })
            .route("/things", Resource::new().responder(Method::Get, responder))
            .unwrap()
            .build();

        let resp = dispatcher.dispatch(request(Method::Get, "/things"));
        assert_eq!(resp.status(), Status::Ok);
        assert_eq!(resp.body(), b"kept");
        assert_eq!(*log.lock().unwrap(), ["method-after"]);
    }

    #[test]
    fn test_miss_goes_through_http_error_handler() {
        let dispatcher = App::new()
            .http_error_handler(|e: HttpError, _: &Request, resp: &mut Response, _: &PathParams| {
                resp.set_status(e.status());
                resp.set_json(format!(r#"{{"error":{}}}"#, u16::from(e.status())));
                Ok(())
            })
            .build();
        let resp = dispatcher.dispatch(request(Method::Get, "/nowhere"));
        assert_eq!(resp.status(), Status::NotFound);
        assert_eq!(resp.body(), br#"{"error":404}"#);
    }

    #[test]
    fn test_undecodable_path_is_400() {
        let dispatcher = App::new()
            .route("/files/{name}", Resource::new().get(|_: &mut Request, _: &mut Response, _: &PathParams| Ok(())))
            .unwrap()
            .error_handler(|e: ValidationError, _: &Request, resp: &mut Response, _: &PathParams| {
                assert!(matches!(e, ValidationError::InvalidPath { .. }));
                HttpError::from(e).apply(resp);
                Ok(())
            })
            .build();
        let resp = dispatcher.dispatch(request(Method::Get, "/files/%C3%28"));
        assert_eq!(resp.status(), Status::BadRequest);
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["title"], "Invalid path");
    }
}
