use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::cors::CorsConfig;
use crate::middleware::Middleware;

/// WebSocket transport tunables.
#[derive(Clone, Debug)]
pub struct WsOptions {
    /// Maximum accepted frame payload.
    pub max_payload_len: usize,
    /// A connection idle longer than this is closed.
    pub idle_timeout: Duration,
    /// Per-message compression. Carried for the transport; the current
    /// axum-based transport has no per-upgrade compression switch.
    pub compression: bool,
    /// Advisory write-buffer ceiling; exposed via `buffered_amount`, never
    /// enforced here.
    pub backpressure_limit: usize,
}

impl Default for WsOptions {
    fn default() -> Self {
        WsOptions {
            max_payload_len: 16 * 1024 * 1024,
            idle_timeout: Duration::from_secs(120),
            compression: true,
            backpressure_limit: 16 * 1024 * 1024,
        }
    }
}

/// Document-level metadata for the generated OpenAPI spec.
#[derive(Clone, Debug)]
pub struct DocsOptions {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    /// OpenAPI `servers` entries, passed through as-is.
    pub servers: Vec<Value>,
    /// `components.securitySchemes`, passed through as-is.
    pub security_schemes: Option<Value>,
}

impl Default for DocsOptions {
    fn default() -> Self {
        DocsOptions {
            title: "API".to_string(),
            version: "0.1.0".to_string(),
            description: None,
            servers: Vec::new(),
            security_schemes: None,
        }
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    pub development: bool,
    pub cors: Option<CorsConfig>,
    /// Requests with a larger body are rejected with 400.
    pub max_body_size: usize,
    /// Global middlewares, run before route middlewares in this order.
    pub middlewares: Vec<Middleware>,
    /// Static mounts, passed through opaquely to the embedding application.
    pub static_mounts: HashMap<String, String>,
    pub docs: DocsOptions,
    pub ws: WsOptions,
}

impl Default for ServerOptions {
    fn default() -> Self {
        ServerOptions {
            host: "0.0.0.0".to_string(),
            port: 3000,
            development: false,
            cors: None,
            max_body_size: 10 * 1024 * 1024,
            middlewares: Vec::new(),
            static_mounts: HashMap::new(),
            docs: DocsOptions::default(),
            ws: WsOptions::default(),
        }
    }
}
