//! Before/after hooks and the flattened per-route chain.
//!
//! Hooks are registered in three scopes: global (on the [`App`](crate::App)),
//! resource (on a [`Resource`](crate::Resource)) and method (on a
//! [`Responder`](crate::Responder)). When the app is built every
//! route/method pair gets one [`HookChain`] with the scopes already merged:
//!
//! ```text
//! before:  global ─▶ resource ─▶ method ─▶ responder
//! after:                        method ─▶ resource ─▶ global
//! ```
//!
//! Nothing is reassembled per request.

use std::sync::Arc;

use crate::error::Error;
use crate::params::PathParams;
use crate::request::Request;
use crate::response::Response;

/// What a hook wants the pipeline to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Run the next stage.
    Continue,
    /// The response is complete. In the before stages this skips the
    /// remaining before-hooks and the responder; after-hooks still run.
    /// In the after stage it skips the remaining after-hooks.
    Halt,
}

impl From<()> for Flow {
    fn from(_: ()) -> Self {
        Flow::Continue
    }
}

pub(crate) type BoxedHook =
    Arc<dyn Fn(&mut Request, &mut Response, &PathParams) -> Result<Flow, Error> + Send + Sync>;

pub(crate) fn erase<F, R>(hook: F) -> BoxedHook
where
    F: Fn(&mut Request, &mut Response, &PathParams) -> Result<R, Error> + Send + Sync + 'static,
    R: Into<Flow>,
{
    Arc::new(move |req: &mut Request, resp: &mut Response, params: &PathParams| {
        hook(req, resp, params).map(Into::into)
    })
}

/// The hooks of one scope, in registration order.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    before: Vec<BoxedHook>,
    after: Vec<BoxedHook>,
}

impl Hooks {
    pub(crate) fn push_before(&mut self, hook: BoxedHook) {
        self.before.push(hook);
    }

    pub(crate) fn push_after(&mut self, hook: BoxedHook) {
        self.after.push(hook);
    }
}

/// A route's resolved hooks for one method, outermost scope first.
#[derive(Clone, Default)]
pub(crate) struct HookChain {
    before: Vec<BoxedHook>,
    after: Vec<BoxedHook>,
}

impl HookChain {
    /// Merges `scopes`, given outermost first.
    pub(crate) fn flatten(scopes: &[&Hooks]) -> Self {
        let before = scopes
            .iter()
            .flat_map(|s| s.before.iter().cloned())
            .collect();
        let after = scopes
            .iter()
            .rev()
            .flat_map(|s| s.after.iter().cloned())
            .collect();
        Self { before, after }
    }

    /// Runs the before-hooks. An error aborts the rest of the chain.
    pub(crate) fn run_before(
        &self,
        req: &mut Request,
        resp: &mut Response,
        params: &PathParams,
    ) -> Result<Flow, Error> {
        run(&self.before, req, resp, params)
    }

    pub(crate) fn run_after(
        &self,
        req: &mut Request,
        resp: &mut Response,
        params: &PathParams,
    ) -> Result<(), Error> {
        run(&self.after, req, resp, params).map(|_| ())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> (usize, usize) {
        (self.before.len(), self.after.len())
    }
}

fn run(
    hooks: &[BoxedHook],
    req: &mut Request,
    resp: &mut Response,
    params: &PathParams,
) -> Result<Flow, Error> {
    for hook in hooks {
        if hook(req, resp, params)? == Flow::Halt {
            return Ok(Flow::Halt);
        }
    }
    Ok(Flow::Continue)
}
