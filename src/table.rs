//! Route table: a segment trie of compiled routes plus ordered sinks.
//!
//! Each trie level corresponds to one path segment. A node holds literal
//! children keyed by their exact text and at most one parameter child.
//!
//! Lookup is a single deterministic descent:
//!
//! - a literal child equal to the segment beats the parameter child, no
//!   matter which route was registered first;
//! - with neither, the lookup fails. There is no backtracking into a
//!   sibling branch;
//! - a parameter never matches an empty segment.
//!
//! The path is split on `/` before each segment is percent-decoded, so an
//! encoded `%2F` stays inside its segment. Literals compare against the
//! decoded text and parameters carry it.
//!
//! Only when no route matches are sinks tried, in registration order,
//! against the path as received.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::error::{TemplateError, ValidationError};
use crate::hooks::{HookChain, Hooks};
use crate::method::Method;
use crate::params::PathParams;
use crate::resource::{BoxedResponder, Resource};
use crate::template::{Segment, UriTemplate};

// ── CompiledRoute ─────────────────────────────────────────────────────────────

pub(crate) struct RouteMethod {
    pub(crate) call: BoxedResponder,
    hooks: Hooks,
    pub(crate) chain: HookChain,
}

/// A template together with its method map and resolved hook chains.
///
/// Created at registration. Chains are resolved once, when the app is built,
/// and nothing changes after that.
pub struct CompiledRoute {
    template: UriTemplate,
    methods: BTreeMap<Method, RouteMethod>,
    allowed: Vec<Method>,
    resource_hooks: Hooks,
    /// Global before-hooks only, for responses the route itself synthesizes.
    pub(crate) fallback: HookChain,
}

impl CompiledRoute {
    pub(crate) fn new(template: UriTemplate, resource: Resource) -> Self {
        let methods: BTreeMap<_, _> = resource
            .responders
            .into_iter()
            .map(|(method, r)| {
                let entry = RouteMethod {
                    call: r.call,
                    hooks: r.hooks,
                    chain: HookChain::default(),
                };
                (method, entry)
            })
            .collect();
        let allowed = methods.keys().copied().collect();

        Self {
            template,
            methods,
            allowed,
            resource_hooks: resource.hooks,
            fallback: HookChain::default(),
        }
    }

    fn resolve_hooks(&mut self, global: &Hooks) {
        for entry in self.methods.values_mut() {
            entry.chain = HookChain::flatten(&[global, &self.resource_hooks, &entry.hooks]);
        }
        self.fallback = HookChain::flatten(&[global]);
    }

    pub fn template(&self) -> &UriTemplate {
        &self.template
    }

    /// Registered methods in `Allow` order.
    pub fn allowed_methods(&self) -> &[Method] {
        &self.allowed
    }

    pub(crate) fn method(&self, method: Method) -> Option<&RouteMethod> {
        self.methods.get(&method)
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

pub(crate) struct SinkEntry {
    pattern: Regex,
    source: String,
    pub(crate) callback: BoxedResponder,
}

impl SinkEntry {
    /// Compiles `pattern` anchored at the start of the path, so it matches
    /// any path it is a prefix of.
    pub(crate) fn new(pattern: &str, callback: BoxedResponder) -> Result<Self, TemplateError> {
        let anchored = Regex::new(&format!("^(?:{pattern})")).map_err(|source| {
            TemplateError::InvalidPattern {
                pattern: pattern.to_owned(),
                source,
            }
        })?;
        Ok(Self {
            pattern: anchored,
            source: pattern.to_owned(),
            callback,
        })
    }

    pub(crate) fn pattern(&self) -> &str {
        &self.source
    }

    /// Named capture groups that took part in the match become parameters.
    fn captures(&self, path: &str) -> Option<PathParams> {
        let caps = self.pattern.captures(path)?;
        Some(
            self.pattern
                .capture_names()
                .flatten()
                .filter_map(|name| caps.name(name).map(|m| (name, m.as_str())))
                .collect(),
        )
    }
}

fn decode_segment(raw: &str) -> Result<Cow<'_, str>, ValidationError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ValidationError::InvalidPath {
            segment: raw.to_owned(),
        })
}

// ── Trie ──────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Node {
    literals: HashMap<String, Node>,
    param: Option<(String, Box<Node>)>,
    route: Option<usize>,
}

/// The outcome of looking a path up.
pub(crate) enum Match<'a> {
    Route {
        route: &'a CompiledRoute,
        params: PathParams,
    },
    Sink {
        sink: &'a SinkEntry,
        params: PathParams,
    },
    NotFound,
}

#[derive(Default)]
pub(crate) struct RouteTable {
    root: Node,
    routes: Vec<CompiledRoute>,
    sinks: Vec<SinkEntry>,
}

impl RouteTable {
    /// Attaches `route` at the node its template leads to.
    ///
    /// Rejects a template that is already registered, and a parameter whose
    /// name differs from the one already occupying that trie position.
    pub(crate) fn insert(&mut self, route: CompiledRoute) -> Result<(), TemplateError> {
        let template = route.template.as_str().to_owned();
        let mut node = &mut self.root;

        for segment in route.template.segments() {
            node = match segment {
                Segment::Literal(text) => node.literals.entry(text.clone()).or_default(),
                Segment::Param(name) => {
                    let (existing, child) = node
                        .param
                        .get_or_insert_with(|| (name.clone(), Box::default()));
                    if existing != name {
                        return Err(TemplateError::ConflictingParam {
                            template,
                            name: name.clone(),
                            existing: existing.clone(),
                        });
                    }
                    &mut **child
                }
            };
        }

        if node.route.is_some() {
            return Err(TemplateError::Duplicate { template });
        }
        node.route = Some(self.routes.len());
        self.routes.push(route);
        Ok(())
    }

    pub(crate) fn add_sink(&mut self, sink: SinkEntry) {
        self.sinks.push(sink);
    }

    /// Resolves every route's hook chains against the global scope.
    pub(crate) fn resolve_hooks(&mut self, global: &Hooks) {
        for route in &mut self.routes {
            route.resolve_hooks(global);
        }
    }

    /// Looks `path` up. A segment that does not decode is an error only when
    /// no sink takes the path either.
    pub(crate) fn find(&self, path: &str) -> Result<Match<'_>, ValidationError> {
        let undecodable = match self.descend(path) {
            Ok(Some((index, params))) => {
                return Ok(Match::Route {
                    route: &self.routes[index],
                    params,
                });
            }
            Ok(None) => None,
            Err(e) => Some(e),
        };
        for sink in &self.sinks {
            if let Some(params) = sink.captures(path) {
                return Ok(Match::Sink { sink, params });
            }
        }
        match undecodable {
            Some(e) => Err(e),
            None => Ok(Match::NotFound),
        }
    }

    fn descend(&self, path: &str) -> Result<Option<(usize, PathParams)>, ValidationError> {
        let Some(rest) = path.strip_prefix('/') else {
            return Ok(None);
        };
        let mut node = &self.root;
        let mut params = PathParams::new();

        if !rest.is_empty() {
            for raw in rest.split('/') {
                let segment = decode_segment(raw)?;
                if let Some(child) = node.literals.get(&*segment) {
                    node = child;
                    continue;
                }
                match &node.param {
                    Some((name, child)) if !segment.is_empty() => {
                        params.push(name.as_str(), segment.into_owned());
                        node = child;
                    }
                    _ => return Ok(None),
                }
            }
        }

        Ok(node.route.map(|index| (index, params)))
    }

    pub(crate) fn routes(&self) -> &[CompiledRoute] {
        &self.routes
    }

    pub(crate) fn sinks(&self) -> &[SinkEntry] {
        &self.sinks
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::request::Request;
    use crate::response::Response;

    fn noop(_: &mut Request, _: &mut Response, _: &PathParams) -> Result<(), crate::Error> {
        Ok(())
    }

    fn table(templates: &[&str]) -> RouteTable {
        let mut table = RouteTable::default();
        for t in templates {
            let route = CompiledRoute::new(UriTemplate::parse(t).unwrap(), Resource::new().get(noop));
            table.insert(route).unwrap();
        }
        table
    }

    fn matched(table: &RouteTable, path: &str) -> Option<(String, Vec<(String, String)>)> {
        match table.find(path).unwrap() {
            Match::Route { route, params } => Some((
                route.template().to_string(),
                params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect(),
            )),
            _ => None,
        }
    }

    #[test]
    fn test_extracts_params_in_order() {
        let t = table(&["/repos/{org}/{repo}/issues"]);
        let (template, params) = matched(&t, "/repos/acme/roost/issues").unwrap();
        assert_eq!(template, "/repos/{org}/{repo}/issues");
        assert_eq!(
            params,
            [
                ("org".to_owned(), "acme".to_owned()),
                ("repo".to_owned(), "roost".to_owned()),
            ]
        );
    }

    #[test]
    fn test_literal_beats_param_regardless_of_order() {
        for order in [["/things/{id}", "/things/recent"], ["/things/recent", "/things/{id}"]] {
            let t = table(&order);
            assert_eq!(matched(&t, "/things/recent").unwrap().0, "/things/recent");
            assert_eq!(matched(&t, "/things/7").unwrap().0, "/things/{id}");
        }
    }

    #[test]
    fn test_segment_count_must_match() {
        let t = table(&["/things/{id}"]);
        assert!(matched(&t, "/things").is_none());
        assert!(matched(&t, "/things/1/2").is_none());
        assert!(matched(&t, "/things/").is_none());
    }

    #[test]
    fn test_no_backtracking() {
        let t = table(&["/a/{x}/c", "/a/b/d"]);
        // The literal `b` is taken, `c` is absent below it, and the lookup
        // does not retry through `{x}`.
        assert!(matched(&t, "/a/b/c").is_none());
        assert_eq!(matched(&t, "/a/z/c").unwrap().0, "/a/{x}/c");
    }

    #[test]
    fn test_segments_decoded_after_split() {
        let t = table(&["/files/{name}", "/café"]);
        let (_, params) = matched(&t, "/files/a%2Fb%20c").unwrap();
        assert_eq!(params, [("name".to_owned(), "a/b c".to_owned())]);
        assert_eq!(matched(&t, "/caf%C3%A9").unwrap().0, "/café");
        // `%2F` does not open a new segment.
        assert!(matched(&t, "/files%2Fx").is_none());
    }

    #[test]
    fn test_undecodable_segment() {
        let mut t = table(&["/files/{name}"]);
        assert!(matches!(
            t.find("/files/%FF"),
            Err(ValidationError::InvalidPath { ref segment }) if segment == "%FF"
        ));

        t.add_sink(SinkEntry::new("/files/", Arc::new(noop)).unwrap());
        assert!(matches!(t.find("/files/%FF"), Ok(Match::Sink { .. })));
    }

    #[test]
    fn test_root_route() {
        let t = table(&["/"]);
        assert_eq!(matched(&t, "/").unwrap().0, "/");
        assert!(matched(&t, "/x").is_none());
    }

    #[test]
    fn test_duplicate_and_conflicting_templates_rejected() {
        let mut t = table(&["/things/{id}"]);
        let dup = CompiledRoute::new(UriTemplate::parse("/things/{id}").unwrap(), Resource::new());
        assert!(matches!(t.insert(dup), Err(TemplateError::Duplicate { .. })));

        let clash = CompiledRoute::new(
            UriTemplate::parse("/things/{thing_id}/parts").unwrap(),
            Resource::new(),
        );
        assert!(matches!(
            t.insert(clash),
            Err(TemplateError::ConflictingParam { ref existing, .. }) if existing == "id"
        ));
    }

    #[test]
    fn test_sinks_in_registration_order_after_routes() {
        let mut t = table(&["/v1/things"]);
        t.add_sink(SinkEntry::new(r"/v1/(?P<rest>.+)", Arc::new(noop)).unwrap());
        t.add_sink(SinkEntry::new(r"/v1/", Arc::new(noop)).unwrap());

        assert!(matches!(t.find("/v1/things"), Ok(Match::Route { .. })));
        match t.find("/v1/charts/x").unwrap() {
            Match::Sink { sink, params } => {
                assert_eq!(sink.pattern(), r"/v1/(?P<rest>.+)");
                assert_eq!(params.get("rest"), Some("charts/x"));
            }
            _ => panic!("expected sink match"),
        }
        assert!(matches!(t.find("/v2/x"), Ok(Match::NotFound)));
        // Anchored at the start: a pattern appearing mid-path does not match.
        assert!(matches!(t.find("/api/v1/x"), Ok(Match::NotFound)));
    }

    #[test]
    fn test_invalid_sink_pattern() {
        assert!(matches!(
            SinkEntry::new("/(unclosed", Arc::new(noop)),
            Err(TemplateError::InvalidPattern { .. })
        ));
    }
}
