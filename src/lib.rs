//! # roost
//!
//! URI-template routing and hook-driven request dispatch for HTTP APIs.
//!
//! ## The pipeline
//!
//! Everything routing-related is registered once at startup on an [`App`]
//! and frozen into a [`Dispatcher`]. From then on it is read-only, so one
//! dispatcher serves any number of concurrent requests without locks.
//!
//! For each request the dispatcher:
//!
//! - matches the path against a segment trie of compiled templates
//!   (literal segments beat parameters, one deterministic descent);
//! - runs the route's pre-flattened before-hooks (global, resource, method),
//!   the responder for the request's method, then the after-hooks;
//! - falls back to regex sinks when no route matches, and to `404` when no
//!   sink does;
//! - answers `405` with an `Allow` header for an unregistered method;
//! - hands every raised error to the most specific registered error handler,
//!   or to the built-in mapping (`500` for anything unknown, cause logged,
//!   never shown to the client).
//!
//! What stays out: body serialisation formats, content negotiation, the
//! socket layer. [`Server`] is a small hyper host you can use or replace.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use roost::{App, Error, PathParams, Request, Resource, Response, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = App::new()
//!         .route("/{user_id}/things", Resource::new().get(list_things))?;
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await?;
//!     Ok(())
//! }
//!
//! fn list_things(req: &mut Request, resp: &mut Response, params: &PathParams) -> Result<(), Error> {
//!     let user = params.get("user_id").unwrap_or_default();
//!     let limit = req.query_int_in("limit", 1, 100)?.unwrap_or(10);
//!     // roost sends bytes; serialise however you like.
//!     resp.set_json(format!(r#"{{"user":"{user}","limit":{limit},"things":[]}}"#));
//!     Ok(())
//! }
//! ```

mod app;
mod config;
mod dispatch;
mod error;
mod hooks;
mod method;
mod params;
mod request;
mod resource;
mod response;
mod server;
mod status;
mod table;
mod template;
mod translate;

pub use app::App;
pub use config::{Config, ConfigError, ErrorOptions, RequestOptions};
pub use dispatch::Dispatcher;
pub use error::{Error, HttpError, ServeError, TemplateError, ValidationError};
pub use hooks::Flow;
pub use method::{Method, UnknownMethod};
pub use params::PathParams;
pub use request::{Body, BodyConsumed, Request};
pub use resource::{Resource, Responder};
pub use response::{ContentType, Response};
pub use server::Server;
pub use status::Status;
pub use template::{Segment, UriTemplate};
