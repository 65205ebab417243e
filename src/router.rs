//! HTTP route registry and matcher.
//!
//! Routes are registered eagerly at startup and never mutated afterwards.
//! Matching resolves `(method, path)` to a definition plus extracted path
//! parameters, scanning candidates in descending specificity: a literal
//! segment scores 3, a `:name` parameter 2, a trailing `:name*` wildcard 1.
//! Ties keep registration order. The per-method candidate list is built
//! lazily on first match and swapped atomically, so a concurrent `register`
//! is seen either entirely or not at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::middleware::{Handler, HandlerFuture, Middleware, RequestArgs};
use crate::request::Method;
use crate::schema::Schema;

static PARAM_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap()
});

/// Errors raised while building or registering a route.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("route path {path:?} must start with '/'")]
    NoLeadingSlash { path: String },
    #[error("invalid parameter name {name:?} in route path {path:?}")]
    InvalidParamName { name: String, path: String },
    #[error("duplicate parameter name {name:?} in route path {path:?}")]
    DuplicateParam { name: String, path: String },
    #[error("wildcard segment must be last in route path {path:?}")]
    WildcardNotLast { path: String },
    #[error("wildcard segments are not allowed in WebSocket route path {path:?}")]
    WildcardNotAllowed { path: String },
    #[error("duplicate message type {msg_type:?} on WebSocket route {path:?}")]
    DuplicateMessageType { msg_type: String, path: String },
}

/// One segment of a parsed path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    /// Trailing `:name*`; consumes one or more remaining segments.
    Wildcard(String),
}

/// A parsed, validated path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    score: u32,
}

impl PathPattern {
    /// Parse an HTTP route path: literals, `:name` parameters, and at most
    /// one trailing `:name*` wildcard.
    pub fn parse(path: &str) -> Result<Self, RouteError> {
        Self::parse_inner(path, true)
    }

    /// Parse a WebSocket route path: literals and `:name` parameters only.
    pub fn parse_ws(path: &str) -> Result<Self, RouteError> {
        Self::parse_inner(path, false)
    }

    fn parse_inner(path: &str, allow_wildcard: bool) -> Result<Self, RouteError> {
        if !path.starts_with('/') {
            return Err(RouteError::NoLeadingSlash {
                path: path.to_string(),
            });
        }
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut seen = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            let Some(raw) = part.strip_prefix(':') else {
                segments.push(Segment::Literal((*part).to_string()));
                continue;
            };
            let (name, wildcard) = match raw.strip_suffix('*') {
                Some(name) => (name, true),
                None => (raw, false),
            };
            if wildcard && !allow_wildcard {
                return Err(RouteError::WildcardNotAllowed {
                    path: path.to_string(),
                });
            }
            if wildcard && index != parts.len() - 1 {
                return Err(RouteError::WildcardNotLast {
                    path: path.to_string(),
                });
            }
            if !PARAM_NAME.is_match(name) {
                return Err(RouteError::InvalidParamName {
                    name: name.to_string(),
                    path: path.to_string(),
                });
            }
            if seen.contains(&name) {
                return Err(RouteError::DuplicateParam {
                    name: name.to_string(),
                    path: path.to_string(),
                });
            }
            seen.push(name);
            if wildcard {
                segments.push(Segment::Wildcard(name.to_string()));
            } else {
                segments.push(Segment::Param(name.to_string()));
            }
        }
        let score = segments
            .iter()
            .map(|s| match s {
                Segment::Literal(_) => 3,
                Segment::Param(_) => 2,
                Segment::Wildcard(_) => 1,
            })
            .sum();
        Ok(PathPattern {
            raw: path.to_string(),
            segments,
            score,
        })
    }

    /// The original path string.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Specificity score; higher wins.
    pub fn specificity(&self) -> u32 {
        self.score
    }

    /// Names of all parameters, wildcard included, in path order.
    pub fn param_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) | Segment::Wildcard(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Match an actual path, extracting parameters. A wildcard captures the
    /// `/`-join of the remaining segments and must consume at least one.
    pub fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let has_wildcard = matches!(self.segments.last(), Some(Segment::Wildcard(_)));
        if has_wildcard {
            if actual.len() < self.segments.len() {
                return None;
            }
        } else if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (index, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if actual[index] != lit {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    params.insert(name.clone(), actual[index].to_string());
                }
                Segment::Wildcard(name) => {
                    params.insert(name.clone(), actual[index..].join("/"));
                }
            }
        }
        Some(params)
    }
}

/// Documentation metadata attached to a route.
#[derive(Debug, Clone, Default)]
pub struct RouteMeta {
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
}

/// Declared success response of a route.
pub struct SuccessResponse {
    pub status: u16,
    pub description: Option<String>,
    pub schema: Option<Schema>,
}

/// One declared error response of a route.
pub struct ErrorResponseDef {
    pub description: String,
    pub schema: Option<Schema>,
}

/// An immutable HTTP route definition.
pub struct RouteDef {
    pub method: Method,
    pub pattern: PathPattern,
    pub meta: RouteMeta,
    pub query_schema: Option<Schema>,
    pub body_schema: Option<Schema>,
    pub success: Option<SuccessResponse>,
    /// Declared error responses, keyed by status.
    pub errors: BTreeMap<u16, ErrorResponseDef>,
    pub middlewares: Vec<Middleware>,
    /// Security requirements: scheme name to required scopes.
    pub security: Vec<HashMap<String, Vec<String>>>,
    pub exclude_from_docs: bool,
    pub handler: Handler,
}

/// Fluent builder for [`RouteDef`]. All setters are idempotent updates;
/// `handler` is the terminal step that validates the path and freezes the
/// definition.
pub struct RouteBuilder {
    method: Method,
    path: String,
    meta: RouteMeta,
    query_schema: Option<Value>,
    body_schema: Option<Value>,
    success: Option<(u16, Option<String>, Option<Value>)>,
    errors: BTreeMap<u16, (String, Option<Value>)>,
    middlewares: Vec<Middleware>,
    security: Vec<HashMap<String, Vec<String>>>,
    exclude_from_docs: bool,
}

impl RouteBuilder {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        RouteBuilder {
            method,
            path: path.into(),
            meta: RouteMeta::default(),
            query_schema: None,
            body_schema: None,
            success: None,
            errors: BTreeMap::new(),
            middlewares: Vec::new(),
            security: Vec::new(),
            exclude_from_docs: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::Head, path)
    }

    pub fn options(path: impl Into<String>) -> Self {
        Self::new(Method::Options, path)
    }

    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.meta.operation_id = Some(id.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.meta.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.meta.description = Some(description.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.meta.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.meta.deprecated = true;
        self
    }

    /// JSON Schema for the query map.
    pub fn query(mut self, schema: Value) -> Self {
        self.query_schema = Some(schema);
        self
    }

    /// JSON Schema for the request body.
    pub fn body(mut self, schema: Value) -> Self {
        self.body_schema = Some(schema);
        self
    }

    /// Declare the success response. At most one; a second call replaces
    /// the first.
    pub fn response(
        mut self,
        status: u16,
        description: Option<&str>,
        schema: Option<Value>,
    ) -> Self {
        self.success = Some((status, description.map(str::to_string), schema));
        self
    }

    /// Declare an error response for a status.
    pub fn error_response(
        mut self,
        status: u16,
        description: impl Into<String>,
        schema: Option<Value>,
    ) -> Self {
        self.errors.insert(status, (description.into(), schema));
        self
    }

    /// Append a route-level middleware; runs after the globals, in
    /// declaration order.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Append a security requirement (scheme name to scopes).
    pub fn security(mut self, scheme: impl Into<String>, scopes: Vec<String>) -> Self {
        let mut requirement = HashMap::new();
        requirement.insert(scheme.into(), scopes);
        self.security.push(requirement);
        self
    }

    /// Omit this route from the generated OpenAPI document.
    pub fn exclude_from_docs(mut self) -> Self {
        self.exclude_from_docs = true;
        self
    }

    /// Terminal step: attach the handler and freeze the definition.
    pub fn handler<F, Fut>(self, f: F) -> Result<RouteDef, RouteError>
    where
        F: Fn(Arc<RequestArgs>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = crate::error::Result<crate::response::Response>>
            + Send
            + 'static,
    {
        self.handler_arc(Arc::new(move |args| -> HandlerFuture { Box::pin(f(args)) }))
    }

    /// Like [`RouteBuilder::handler`] but for an already-boxed handler.
    pub fn handler_arc(self, handler: Handler) -> Result<RouteDef, RouteError> {
        let pattern = PathPattern::parse(&self.path)?;
        Ok(RouteDef {
            method: self.method,
            pattern,
            meta: self.meta,
            query_schema: self.query_schema.map(Schema::new),
            body_schema: self.body_schema.map(Schema::new),
            success: self
                .success
                .map(|(status, description, schema)| SuccessResponse {
                    status,
                    description,
                    schema: schema.map(Schema::new),
                }),
            errors: self
                .errors
                .into_iter()
                .map(|(status, (description, schema))| {
                    (
                        status,
                        ErrorResponseDef {
                            description,
                            schema: schema.map(Schema::new),
                        },
                    )
                })
                .collect(),
            middlewares: self.middlewares,
            security: self.security,
            exclude_from_docs: self.exclude_from_docs,
            handler,
        })
    }
}

/// A successful match: the definition plus extracted parameters.
#[derive(Clone)]
pub struct MatchedRoute {
    pub def: Arc<RouteDef>,
    pub params: HashMap<String, String>,
}

/// Registry of HTTP routes with a per-method, specificity-sorted candidate
/// cache.
pub struct RouteRegistry {
    routes: RwLock<Vec<Arc<RouteDef>>>,
    cache: RwLock<HashMap<Method, Arc<Vec<Arc<RouteDef>>>>>,
}

impl Default for RouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteRegistry {
    pub fn new() -> Self {
        RouteRegistry {
            routes: RwLock::new(Vec::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Register a definition. Invalidates the candidate cache.
    pub fn register(&self, def: RouteDef) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(def));
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Resolve a `(method, path)` pair. Returns `None` for no route; never
    /// fails.
    pub fn find(&self, method: Method, path: &str) -> Option<MatchedRoute> {
        let candidates = self.candidates(method);
        for def in candidates.iter() {
            if let Some(params) = def.pattern.matches(path) {
                return Some(MatchedRoute {
                    def: def.clone(),
                    params,
                });
            }
        }
        None
    }

    fn candidates(&self, method: Method) -> Arc<Vec<Arc<RouteDef>>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&method)
        {
            return cached.clone();
        }
        let mut list: Vec<Arc<RouteDef>> = self
            .routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|def| def.method == method)
            .cloned()
            .collect();
        // Stable sort keeps registration order for equal scores.
        list.sort_by_key(|def| std::cmp::Reverse(def.pattern.specificity()));
        let list = Arc::new(list);
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(method, list.clone());
        list
    }

    /// Every registered definition, in registration order.
    pub fn all(&self) -> Vec<Arc<RouteDef>> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every route and the cache.
    pub fn clear(&self) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

static GLOBAL: Lazy<RouteRegistry> = Lazy::new(RouteRegistry::new);

/// The process-global HTTP registry, used by servers without local routes.
pub fn global() -> &'static RouteRegistry {
    &GLOBAL
}
