//! Resources, responders and how their callables are stored.
//!
//! # How callables are stored
//!
//! A route table holds responders of *different* closure types side by side,
//! so every callable is type-erased behind one `Arc<dyn Fn>` signature:
//!
//! ```text
//! fn get_things(req, resp, params) -> Result<(), Error>   ← user writes this
//!        ↓ Resource::new().get(get_things)
//! Arc::new(get_things)                                    ← BoxedResponder
//!        ↓ moved into the CompiledRoute at App::route
//! (route.responder)(req, resp, params) at request time    ← one vtable call
//! ```
//!
//! The `Arc` lets a [`Dispatcher`](crate::Dispatcher) shared across threads
//! call the same responder from many concurrent requests without copying it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::Error;
use crate::hooks::{self, Flow, Hooks};
use crate::method::Method;
use crate::params::PathParams;
use crate::request::Request;
use crate::response::Response;

/// A type-erased responder or sink callback.
pub(crate) type BoxedResponder =
    Arc<dyn Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error> + Send + Sync>;

// ── Responder ─────────────────────────────────────────────────────────────────

/// The handler for one HTTP method on a resource, plus its method-scoped
/// hooks.
///
/// ```rust
/// use roost::{Error, HttpError, PathParams, Request, Responder, Response};
///
/// fn require_body(req: &mut Request, _: &mut Response, _: &PathParams) -> Result<(), Error> {
///     match req.content_length() {
///         Some(n) if n > 0 => Ok(()),
///         _ => Err(HttpError::bad_request().with_description("empty body").into()),
///     }
/// }
///
/// let create = Responder::new(|_req: &mut Request, resp: &mut Response, _: &PathParams| {
///     resp.set_status(roost::Status::Created);
///     Ok(())
/// })
/// .before(require_body);
/// ```
pub struct Responder {
    pub(crate) call: BoxedResponder,
    pub(crate) hooks: Hooks,
}

impl Responder {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            call: Arc::new(responder),
            hooks: Hooks::default(),
        }
    }

    /// Runs `hook` before this responder, after global and resource hooks.
    pub fn before<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<R, Error>
            + Send
            + Sync
            + 'static,
        R: Into<Flow>,
    {
        self.hooks.push_before(hooks::erase(hook));
        self
    }

    /// Runs `hook` after this responder, ahead of resource and global
    /// after-hooks.
    pub fn after<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<R, Error>
            + Send
            + Sync
            + 'static,
        R: Into<Flow>,
    {
        self.hooks.push_after(hooks::erase(hook));
        self
    }
}

// ── Resource ──────────────────────────────────────────────────────────────────

/// Everything attached to one route template: a responder per method and
/// the resource-scoped hooks shared by all of them.
///
/// ```rust
/// use roost::{Method, PathParams, Request, Resource, Response};
///
/// fn list(_: &mut Request, resp: &mut Response, _: &PathParams) -> Result<(), roost::Error> {
///     resp.set_json("[]");
///     Ok(())
/// }
///
/// let things = Resource::new()
///     .get(list)
///     .on(Method::Head, list);
/// assert_eq!(things.methods().collect::<Vec<_>>(), [Method::Get, Method::Head]);
/// ```
#[derive(Default)]
pub struct Resource {
    pub(crate) responders: BTreeMap<Method, Responder>,
    pub(crate) hooks: Hooks,
}

impl Resource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `responder` for `method`. A second registration for the same
    /// method replaces the first.
    pub fn on<F>(self, method: Method, responder: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.responder(method, Responder::new(responder))
    }

    /// Registers a [`Responder`] that carries its own method-scoped hooks.
    pub fn responder(mut self, method: Method, responder: Responder) -> Self {
        self.responders.insert(method, responder);
        self
    }

    pub fn get<F>(self, responder: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.on(Method::Get, responder)
    }

    pub fn post<F>(self, responder: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.on(Method::Post, responder)
    }

    pub fn put<F>(self, responder: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.on(Method::Put, responder)
    }

    pub fn patch<F>(self, responder: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.on(Method::Patch, responder)
    }

    pub fn delete<F>(self, responder: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.on(Method::Delete, responder)
    }

    /// Runs `hook` before every responder of this resource.
    pub fn before<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<R, Error>
            + Send
            + Sync
            + 'static,
        R: Into<Flow>,
    {
        self.hooks.push_before(hooks::erase(hook));
        self
    }

    /// Runs `hook` after every responder of this resource.
    pub fn after<F, R>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Request, &mut Response, &PathParams) -> Result<R, Error>
            + Send
            + Sync
            + 'static,
        R: Into<Flow>,
    {
        self.hooks.push_after(hooks::erase(hook));
        self
    }

    /// Registered methods in `Allow` order.
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.responders.keys().copied()
    }
}
