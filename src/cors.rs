//! CORS engine.
//!
//! Three concerns: deciding whether an origin is allowed, synthesizing the
//! OPTIONS preflight response, and decorating ordinary responses on their
//! way out. The pipeline wires these in; nothing here inspects routes.

use std::sync::Arc;

use crate::error::ErrorCode;
use crate::request::{Method, Request};
use crate::response::Response;

/// Origin policy: everything, one literal, a list, or a predicate.
#[derive(Clone)]
pub enum CorsOrigin {
    Any,
    Exact(String),
    List(Vec<String>),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl CorsOrigin {
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            CorsOrigin::Any => true,
            CorsOrigin::Exact(allowed) => allowed == origin,
            CorsOrigin::List(allowed) => allowed.iter().any(|o| o == origin),
            CorsOrigin::Predicate(pred) => pred(origin),
        }
    }
}

impl std::fmt::Debug for CorsOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorsOrigin::Any => f.write_str("CorsOrigin::Any"),
            CorsOrigin::Exact(o) => write!(f, "CorsOrigin::Exact({o})"),
            CorsOrigin::List(o) => write!(f, "CorsOrigin::List({o:?})"),
            CorsOrigin::Predicate(_) => f.write_str("CorsOrigin::Predicate"),
        }
    }
}

/// CORS policy configuration.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub origin: CorsOrigin,
    pub methods: Vec<Method>,
    pub allowed_headers: Vec<String>,
    pub exposed_headers: Vec<String>,
    pub credentials: bool,
    pub max_age: Option<u32>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            origin: CorsOrigin::Any,
            methods: vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Patch,
                Method::Delete,
                Method::Options,
            ],
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: None,
        }
    }
}

impl CorsConfig {
    /// A permissive policy: any origin, default methods and headers.
    pub fn permissive() -> Self {
        CorsConfig::default()
    }

    pub fn origin(mut self, origin: CorsOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    pub fn allowed_headers(
        mut self,
        headers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.allowed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn exposed_headers(
        mut self,
        headers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.exposed_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    pub fn max_age(mut self, seconds: u32) -> Self {
        self.max_age = Some(seconds);
        self
    }

    fn methods_header(&self) -> String {
        self.methods
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Synthesize the preflight response. Disallowed origins get the 403
    /// envelope; requests without an `Origin` header get the header block
    /// without an origin echo.
    pub fn preflight(&self, request: &Request) -> Response {
        let mut response = Response::new(204);
        if let Some(origin) = request.origin() {
            if !self.origin.allows(origin) {
                return Response::error(
                    403,
                    "Origin not allowed",
                    Some(ErrorCode::Forbidden),
                    None,
                );
            }
            response.set_header("Access-Control-Allow-Origin", origin);
        }
        response.set_header("Access-Control-Allow-Methods", self.methods_header());
        response.set_header(
            "Access-Control-Allow-Headers",
            self.allowed_headers.join(", "),
        );
        if let Some(max_age) = self.max_age {
            response.set_header("Access-Control-Max-Age", max_age.to_string());
        }
        if self.credentials {
            response.set_header("Access-Control-Allow-Credentials", "true");
        }
        response
    }

    /// Decorate an outgoing non-preflight response for an allowed origin.
    pub fn decorate(&self, response: &mut Response, origin: &str) {
        response.set_header("Access-Control-Allow-Origin", origin);
        if !self.exposed_headers.is_empty() {
            response.set_header(
                "Access-Control-Expose-Headers",
                self.exposed_headers.join(", "),
            );
        }
        if self.credentials {
            response.set_header("Access-Control-Allow-Credentials", "true");
        }
    }
}
