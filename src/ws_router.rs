//! WebSocket route registry and matcher.
//!
//! Same shape as the HTTP registry, with two differences: routes are keyed
//! by path only (no method) and wildcard segments are not allowed, so a
//! match always requires an exact segment count. Each route carries per-type
//! message handlers; the `type` string is unique within a route.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::request::Request;
use crate::router::{PathPattern, RouteError};
use crate::schema::Schema;
use crate::ws::WsConnection;

/// Future returned by WebSocket handlers.
pub type WsFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Future returned by the auth function: a user value, `None` for an
/// anonymous rejection, or an error for a failed authentication.
pub type WsAuthFuture = Pin<Box<dyn Future<Output = Result<Option<Value>>> + Send>>;

/// Authenticates an upgrade request before it is accepted.
pub type WsAuthFn = Arc<dyn Fn(Request) -> WsAuthFuture + Send + Sync>;

/// Handles one validated message of a registered type.
pub type WsMessageHandler = Arc<dyn Fn(WsConnection, Value) -> WsFuture + Send + Sync>;

/// Handles binary frames.
pub type WsBinaryHandler = Arc<dyn Fn(WsConnection, Vec<u8>) -> WsFuture + Send + Sync>;

/// Runs once when the connection opens.
pub type WsConnectHandler = Arc<dyn Fn(WsConnection) -> WsFuture + Send + Sync>;

/// Runs once when the connection closes, with the close code and reason.
pub type WsCloseHandler = Arc<dyn Fn(WsConnection, u16, String) -> WsFuture + Send + Sync>;

/// Final sink for per-connection dispatch errors.
pub type WsErrorHandler =
    Arc<dyn Fn(WsConnection, Error) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// One registered message type: its schema and handler.
pub struct MessageRoute {
    pub msg_type: String,
    pub schema: Option<Schema>,
    pub handler: WsMessageHandler,
}

/// An immutable WebSocket route definition.
pub struct WsRouteDef {
    pub pattern: PathPattern,
    pub auth: Option<WsAuthFn>,
    pub messages: Vec<MessageRoute>,
    pub binary: Option<WsBinaryHandler>,
    pub on_connect: Option<WsConnectHandler>,
    pub on_close: Option<WsCloseHandler>,
    pub on_error: Option<WsErrorHandler>,
    /// Schema of server-to-client messages; only consumed by the type
    /// generator.
    pub server_message_schema: Option<Value>,
}

impl WsRouteDef {
    /// Look up the handler entry for a message type.
    pub fn message_route(&self, msg_type: &str) -> Option<&MessageRoute> {
        self.messages.iter().find(|m| m.msg_type == msg_type)
    }
}

/// Fluent builder for [`WsRouteDef`]; `build` validates the path and the
/// message-type uniqueness.
pub struct WsRouteBuilder {
    path: String,
    auth: Option<WsAuthFn>,
    messages: Vec<(String, Option<Value>, WsMessageHandler)>,
    binary: Option<WsBinaryHandler>,
    on_connect: Option<WsConnectHandler>,
    on_close: Option<WsCloseHandler>,
    on_error: Option<WsErrorHandler>,
    server_message_schema: Option<Value>,
}

impl WsRouteBuilder {
    pub fn new(path: impl Into<String>) -> Self {
        WsRouteBuilder {
            path: path.into(),
            auth: None,
            messages: Vec::new(),
            binary: None,
            on_connect: None,
            on_close: None,
            on_error: None,
            server_message_schema: None,
        }
    }

    /// Authenticate upgrades. Returning `Ok(None)` rejects with 401
    /// `UNAUTHORIZED`; an error rejects with 401 `AUTH_ERROR`.
    pub fn auth<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
    {
        self.auth = Some(Arc::new(move |req| -> WsAuthFuture { Box::pin(f(req)) }));
        self
    }

    /// Register a handler for one message type, with an optional schema for
    /// its `data`.
    pub fn on_message<F, Fut>(mut self, msg_type: impl Into<String>, schema: Option<Value>, f: F) -> Self
    where
        F: Fn(WsConnection, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handler: WsMessageHandler =
            Arc::new(move |conn, data| -> WsFuture { Box::pin(f(conn, data)) });
        self.messages.push((msg_type.into(), schema, handler));
        self
    }

    pub fn on_binary<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(WsConnection, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.binary = Some(Arc::new(move |conn, data| -> WsFuture {
            Box::pin(f(conn, data))
        }));
        self
    }

    pub fn on_connect<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(WsConnection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_connect = Some(Arc::new(move |conn| -> WsFuture { Box::pin(f(conn)) }));
        self
    }

    pub fn on_close<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(WsConnection, u16, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.on_close = Some(Arc::new(move |conn, code, reason| -> WsFuture {
            Box::pin(f(conn, code, reason))
        }));
        self
    }

    /// Final sink for dispatch errors on this route. Without one, errors
    /// are logged and swallowed; the connection stays open either way.
    pub fn on_error<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(WsConnection, Error) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_error = Some(Arc::new(move |conn, err| Box::pin(f(conn, err))));
        self
    }

    /// Schema of messages the server sends on this route, for client type
    /// generation.
    pub fn server_messages(mut self, schema: Value) -> Self {
        self.server_message_schema = Some(schema);
        self
    }

    /// Validate and freeze the definition.
    pub fn build(self) -> std::result::Result<WsRouteDef, RouteError> {
        let pattern = PathPattern::parse_ws(&self.path)?;
        let mut messages: Vec<MessageRoute> = Vec::with_capacity(self.messages.len());
        for (msg_type, schema, handler) in self.messages {
            if messages.iter().any(|m| m.msg_type == msg_type) {
                return Err(RouteError::DuplicateMessageType {
                    msg_type,
                    path: self.path,
                });
            }
            messages.push(MessageRoute {
                msg_type,
                schema: schema.map(Schema::new),
                handler,
            });
        }
        Ok(WsRouteDef {
            pattern,
            auth: self.auth,
            messages,
            binary: self.binary,
            on_connect: self.on_connect,
            on_close: self.on_close,
            on_error: self.on_error,
            server_message_schema: self.server_message_schema,
        })
    }
}

/// A successful WebSocket match.
#[derive(Clone)]
pub struct WsMatchedRoute {
    pub def: Arc<WsRouteDef>,
    pub params: HashMap<String, String>,
}

/// Registry of WebSocket routes with a lazily built, specificity-sorted
/// candidate cache.
pub struct WsRouteRegistry {
    routes: RwLock<Vec<Arc<WsRouteDef>>>,
    cache: RwLock<Option<Arc<Vec<Arc<WsRouteDef>>>>>,
}

impl Default for WsRouteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl WsRouteRegistry {
    pub fn new() -> Self {
        WsRouteRegistry {
            routes: RwLock::new(Vec::new()),
            cache: RwLock::new(None),
        }
    }

    pub fn register(&self, def: WsRouteDef) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(def));
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Resolve a path. Returns `None` on segment-count mismatch even when a
    /// parameterized route exists elsewhere.
    pub fn find(&self, path: &str) -> Option<WsMatchedRoute> {
        let candidates = self.candidates();
        for def in candidates.iter() {
            if let Some(params) = def.pattern.matches(path) {
                return Some(WsMatchedRoute {
                    def: def.clone(),
                    params,
                });
            }
        }
        None
    }

    /// Look up a definition by its exact registered path. Connections store
    /// the path string and re-resolve here on every callback.
    pub fn get(&self, raw_path: &str) -> Option<Arc<WsRouteDef>> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|def| def.pattern.raw() == raw_path)
            .cloned()
    }

    fn candidates(&self) -> Arc<Vec<Arc<WsRouteDef>>> {
        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            return cached.clone();
        }
        let mut list: Vec<Arc<WsRouteDef>> = self
            .routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        list.sort_by_key(|def| std::cmp::Reverse(def.pattern.specificity()));
        let list = Arc::new(list);
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = Some(list.clone());
        list
    }

    pub fn all(&self) -> Vec<Arc<WsRouteDef>> {
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

    pub fn clear(&self) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        *self.cache.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

static GLOBAL: Lazy<Arc<WsRouteRegistry>> = Lazy::new(|| Arc::new(WsRouteRegistry::new()));

/// The process-global WebSocket registry. Shared so that per-connection
/// callbacks can keep resolving definitions after the upgrade.
pub fn global() -> Arc<WsRouteRegistry> {
    GLOBAL.clone()
}
