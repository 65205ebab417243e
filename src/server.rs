//! Server object.
//!
//! Binds the listener and serves every request through one fallback
//! handler: WebSocket upgrades consult the WebSocket matcher first,
//! everything else runs the HTTP pipeline. Registries resolve local-first:
//! the first route registered against a server flips a one-way latch, and
//! from then on only the server's local registries are consulted; without
//! local routes the process-global registries apply. `stop` shuts down
//! gracefully: in-flight requests complete, new connections are refused.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, State};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};

use crate::connections::ConnectionRegistry;
use crate::error::{ErrorCode, Result, ServerError};
use crate::openapi;
use crate::pipeline;
use crate::request::Request;
use crate::response::Response;
use crate::router::{RouteDef, RouteRegistry};
use crate::settings::ServerOptions;
use crate::typegen;
use crate::ws;
use crate::ws_router::{WsRouteDef, WsRouteRegistry};
use crate::{router, ws_router};

struct ServerInner {
    options: ServerOptions,
    local_http: RouteRegistry,
    local_ws: Arc<WsRouteRegistry>,
    uses_local: AtomicBool,
    connections: Arc<ConnectionRegistry>,
    started: AtomicBool,
}

impl ServerInner {
    fn uses_local(&self) -> bool {
        self.uses_local.load(Ordering::SeqCst)
    }

    fn http_registry(&self) -> &RouteRegistry {
        if self.uses_local() {
            &self.local_http
        } else {
            router::global()
        }
    }

    fn ws_registry(&self) -> Arc<WsRouteRegistry> {
        if self.uses_local() {
            self.local_ws.clone()
        } else {
            ws_router::global()
        }
    }
}

struct Running {
    shutdown: oneshot::Sender<()>,
    handle: tokio::task::JoinHandle<std::io::Result<()>>,
    addr: SocketAddr,
}

/// An HTTP + WebSocket server instance.
pub struct Server {
    inner: Arc<ServerInner>,
    runtime: Mutex<Option<Running>>,
}

impl Default for Server {
    fn default() -> Self {
        Server::new(ServerOptions::default())
    }
}

impl Server {
    pub fn new(options: ServerOptions) -> Self {
        Server {
            inner: Arc::new(ServerInner {
                options,
                local_http: RouteRegistry::new(),
                local_ws: Arc::new(WsRouteRegistry::new()),
                uses_local: AtomicBool::new(false),
                connections: Arc::new(ConnectionRegistry::new()),
                started: AtomicBool::new(false),
            }),
            runtime: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.inner.options
    }

    /// Register an HTTP route against this server. The first local
    /// registration latches the server onto its local registries; global
    /// routes become invisible to it from then on.
    pub fn route(&self, def: RouteDef) {
        self.inner.uses_local.store(true, Ordering::SeqCst);
        self.inner.local_http.register(def);
    }

    /// Register a WebSocket route against this server. Latches like
    /// [`Server::route`].
    pub fn ws_route(&self, def: WsRouteDef) {
        self.inner.uses_local.store(true, Ordering::SeqCst);
        self.inner.local_ws.register(def);
    }

    /// The live-connection registry of this server.
    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        self.inner.connections.clone()
    }

    /// Bind and serve. Returns the bound address (useful with port 0).
    pub async fn start(&self) -> std::result::Result<SocketAddr, ServerError> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Err(ServerError::Start {
                cause: "server is already running".to_string(),
            });
        }

        if self.inner.uses_local() {
            let shadowed = router::global().len() + ws_router::global().len();
            if shadowed > 0 {
                log::warn!(
                    "server uses local registries; {} globally registered route(s) are invisible to it",
                    shadowed
                );
            }
        }

        let addr = format!("{}:{}", self.inner.options.host, self.inner.options.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|err| ServerError::Start {
                cause: err.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|err| ServerError::Start {
            cause: err.to_string(),
        })?;

        let app = axum::Router::new()
            .fallback(dispatch)
            .with_state(self.inner.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let handle = tokio::spawn(async move { serve.await });

        self.inner.started.store(true, Ordering::SeqCst);
        println!("Server running on http://{}", local_addr);
        *runtime = Some(Running {
            shutdown: shutdown_tx,
            handle,
            addr: local_addr,
        });
        Ok(local_addr)
    }

    /// Signal shutdown and wait for in-flight work to drain.
    pub async fn stop(&self) -> std::result::Result<(), ServerError> {
        let mut runtime = self.runtime.lock().await;
        let Some(running) = runtime.take() else {
            return Err(ServerError::Stop {
                cause: "server is not running".to_string(),
            });
        };
        let _ = running.shutdown.send(());
        let outcome = running.handle.await;
        self.inner.started.store(false, Ordering::SeqCst);
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ServerError::Stop {
                cause: err.to_string(),
            }),
            Err(err) => Err(ServerError::Stop {
                cause: err.to_string(),
            }),
        }
    }

    /// The bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.runtime.lock().await.as_ref().map(|r| r.addr)
    }

    /// Publish a JSON message to a topic's subscribers. Before `start` this
    /// is a no-op with a warning, since no connection can exist yet.
    pub fn publish(&self, topic: &str, data: &impl Serialize) -> Result<usize> {
        if !self.inner.started.load(Ordering::SeqCst) {
            log::warn!("publish to {:?} ignored: server has not started", topic);
            return Ok(0);
        }
        self.inner.connections.publish(topic, data)
    }

    /// Publish a binary payload to a topic's subscribers.
    pub fn publish_binary(&self, topic: &str, data: &[u8]) -> usize {
        if !self.inner.started.load(Ordering::SeqCst) {
            log::warn!("publish to {:?} ignored: server has not started", topic);
            return 0;
        }
        self.inner.connections.publish_binary(topic, data)
    }

    /// The OpenAPI 3.1 document for the effective HTTP registry.
    pub fn openapi_spec(&self) -> Value {
        openapi::build_document(self.inner.http_registry(), &self.inner.options.docs)
    }

    /// Write the OpenAPI document to a file as pretty-printed JSON.
    pub async fn export_openapi_spec(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let spec = serde_json::to_string_pretty(&self.openapi_spec())?;
        tokio::fs::write(path, spec).await?;
        Ok(())
    }

    /// TypeScript message types for the effective WebSocket registry.
    pub fn generate_websocket_types(&self) -> String {
        typegen::generate_client_types(&self.inner.ws_registry())
    }
}

/// The single transport entry point: WebSocket matcher first for upgrade
/// requests, HTTP pipeline otherwise.
async fn dispatch(
    State(inner): State<Arc<ServerInner>>,
    req: axum::extract::Request,
) -> axum::response::Response {
    let (mut parts, body) = req.into_parts();

    let wants_upgrade = parts
        .headers
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if wants_upgrade && inner.ws_registry().find(parts.uri.path()).is_some() {
        match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
            Ok(upgrade) => {
                let request = Request::from_http_parts(&parts, Vec::new());
                if let Some(response) = ws::handle_upgrade(
                    upgrade,
                    request,
                    inner.ws_registry(),
                    inner.connections.clone(),
                    inner.options.ws.clone(),
                )
                .await
                {
                    return response;
                }
            }
            Err(_) => {
                return Response::error(
                    400,
                    "WebSocket upgrade failed",
                    Some(ErrorCode::UpgradeFailed),
                    None,
                )
                .into_axum();
            }
        }
    }

    let bytes = match axum::body::to_bytes(body, inner.options.max_body_size).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => {
            return Response::error(
                400,
                "Request body exceeds maximum size",
                Some(ErrorCode::BadRequest),
                None,
            )
            .into_axum();
        }
    };
    let request = Request::from_http_parts(&parts, bytes);
    let response = pipeline::handle(request, inner.http_registry(), &inner.options).await;
    response.into_axum()
}
