//! WebSocket dispatch core.
//!
//! Owns the upgrade flow (match, auth, context install, accept), the
//! per-connection read loop, and the routing of frames into the handlers a
//! route registered. A connection stores only its route *path*; the
//! definition is re-resolved from the registry on every callback, which
//! keeps definitions free of references to live sockets.
//!
//! Dispatch model: callbacks start in arrival order, but every message runs
//! on its own task, so a slow handler does not hold up the next frame.
//! Handler failures go to the route's error handler (or the log) and never
//! close the connection by themselves.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use chrono::{DateTime, Utc};
use futures::{FutureExt, SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::connections::ConnectionRegistry;
use crate::error::{Error, ErrorCode, Result, panic_message};
use crate::request::Request;
use crate::response::Response;
use crate::settings::WsOptions;
use crate::ws_router::{WsRouteDef, WsRouteRegistry};

/// Per-connection state, owned by the connection for its lifetime.
pub struct ConnectionContext {
    /// Stable unique id, generated at upgrade.
    pub id: String,
    pub connected_at: DateTime<Utc>,
    /// Whatever the route's auth function produced; `None` without auth.
    pub user: Option<Value>,
    /// Path parameters extracted at upgrade.
    pub params: HashMap<String, String>,
    data: Mutex<HashMap<String, Value>>,
}

impl ConnectionContext {
    pub fn new(user: Option<Value>, params: HashMap<String, String>) -> Self {
        ConnectionContext {
            id: uuid::Uuid::new_v4().to_string(),
            connected_at: Utc::now(),
            user,
            params,
            data: Mutex::new(HashMap::new()),
        }
    }

    /// Read an entry of the handler-local state bag (cloned).
    pub fn data_get(&self, key: &str) -> Option<Value> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Write an entry of the handler-local state bag.
    pub fn data_set(&self, key: impl Into<String>, value: Value) {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value);
    }

    pub fn data_remove(&self, key: &str) -> Option<Value> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key)
    }
}

/// Typed façade over a live connection, handed to every handler. Cheap to
/// clone; all clones refer to the same socket.
#[derive(Clone)]
pub struct WsConnection {
    context: Arc<ConnectionContext>,
    route_path: Arc<str>,
    tx: mpsc::UnboundedSender<Message>,
    buffered: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
    topics: Arc<Mutex<HashSet<String>>>,
    hub: Weak<ConnectionRegistry>,
}

impl WsConnection {
    pub(crate) fn new(
        context: Arc<ConnectionContext>,
        route_path: Arc<str>,
        tx: mpsc::UnboundedSender<Message>,
        hub: Weak<ConnectionRegistry>,
    ) -> Self {
        WsConnection {
            context,
            route_path,
            tx,
            buffered: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            topics: Arc::new(Mutex::new(HashSet::new())),
            hub,
        }
    }

    pub fn id(&self) -> &str {
        &self.context.id
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// The registered path of the route this connection matched.
    pub fn route_path(&self) -> &str {
        &self.route_path
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Bytes queued towards the socket but not yet written. Observational;
    /// accuracy depends on how fast the writer drains.
    pub fn buffered_amount(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }

    /// Send a value as a JSON text frame.
    pub fn send(&self, data: &impl Serialize) -> Result<()> {
        let text = serde_json::to_string(data)?;
        self.send_text(&text)
    }

    /// Send a raw text frame.
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send_raw(Message::Text(text.to_string().into()))
    }

    /// Send a binary frame.
    pub fn send_binary(&self, data: Vec<u8>) -> Result<()> {
        self.send_raw(Message::Binary(data.into()))
    }

    /// Escape hatch: queue a raw frame towards the socket.
    pub fn send_raw(&self, message: Message) -> Result<()> {
        if !self.is_open() {
            return Err(Error::custom("connection is closed"));
        }
        self.buffered
            .fetch_add(frame_len(&message), Ordering::Relaxed);
        self.tx
            .send(message)
            .map_err(|_| Error::custom("connection is closed"))
    }

    /// Ask the peer to close. Code defaults to 1000 (normal closure).
    pub fn close(&self, code: Option<u16>, reason: Option<String>) -> Result<()> {
        self.send_raw(Message::Close(Some(CloseFrame {
            code: code.unwrap_or(1000),
            reason: reason.unwrap_or_default().into(),
        })))
    }

    pub fn subscribe(&self, topic: &str) {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(topic.to_string());
    }

    pub fn unsubscribe(&self, topic: &str) {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(topic);
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(topic)
    }

    /// Publish to a topic's subscribers, excluding this connection. Returns
    /// the number of subscribers reached.
    pub fn publish(&self, topic: &str, data: &impl Serialize) -> Result<usize> {
        let Some(hub) = self.hub.upgrade() else {
            return Ok(0);
        };
        let text = serde_json::to_string(data)?;
        Ok(hub.publish_text(topic, &text, Some(self.id())))
    }

    pub(crate) fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn frame_len(message: &Message) -> usize {
    match message {
        Message::Text(text) => text.len(),
        Message::Binary(data) => data.len(),
        Message::Ping(data) | Message::Pong(data) => data.len(),
        Message::Close(_) => 0,
    }
}

/// Gate an upgrade request. `None` means the path matched no WebSocket
/// route and HTTP should handle the request; `Some` is the final transport
/// response (the accepted upgrade or a rejection envelope).
pub(crate) async fn handle_upgrade(
    upgrade: WebSocketUpgrade,
    request: Request,
    registry: Arc<WsRouteRegistry>,
    hub: Arc<ConnectionRegistry>,
    options: WsOptions,
) -> Option<axum::response::Response> {
    let matched = registry.find(&request.path)?;

    let user = match &matched.def.auth {
        None => None,
        Some(auth) => match auth(request.clone()).await {
            Ok(Some(user)) => Some(user),
            Ok(None) => {
                return Some(
                    Response::error(401, "Unauthorized", Some(ErrorCode::Unauthorized), None)
                        .into_axum(),
                );
            }
            Err(err) => {
                log::warn!("websocket auth failed for {}: {}", request.path, err);
                return Some(
                    Response::error(
                        401,
                        "Authentication failed",
                        Some(ErrorCode::AuthError),
                        None,
                    )
                    .into_axum(),
                );
            }
        },
    };

    let context = Arc::new(ConnectionContext::new(user, matched.params));
    let route_path: Arc<str> = Arc::from(matched.def.pattern.raw());
    let upgrade = upgrade
        .max_message_size(options.max_payload_len)
        .on_failed_upgrade(|err| log::warn!("websocket upgrade failed: {}", err));

    Some(upgrade.on_upgrade(move |socket| {
        run_connection(socket, registry, hub, context, route_path, options)
    }))
}

/// Drive one accepted connection to completion.
async fn run_connection(
    socket: WebSocket,
    registry: Arc<WsRouteRegistry>,
    hub: Arc<ConnectionRegistry>,
    context: Arc<ConnectionContext>,
    route_path: Arc<str>,
    options: WsOptions,
) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let conn = WsConnection::new(context, route_path, tx, Arc::downgrade(&hub));

    let buffered = conn.buffered.clone();
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let len = frame_len(&message);
            let failed = sink.send(message).await.is_err();
            buffered.fetch_sub(len, Ordering::Relaxed);
            if failed {
                break;
            }
        }
    });

    hub.insert(conn.clone());
    log::debug!("websocket {} connected on {}", conn.id(), conn.route_path());
    dispatch_open(&registry, &conn).await;

    // 1005: closed without a status code from the peer.
    let mut close_code: u16 = 1005;
    let mut close_reason = String::new();
    loop {
        match tokio::time::timeout(options.idle_timeout, stream.next()).await {
            Err(_) => {
                let _ = conn.close(Some(1001), Some("idle timeout".to_string()));
                close_code = 1001;
                close_reason = "idle timeout".to_string();
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                log::debug!("websocket {} read error: {}", conn.id(), err);
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                let registry = registry.clone();
                let conn = conn.clone();
                let text = text.to_string();
                tokio::spawn(async move {
                    dispatch_text(&registry, &conn, &text).await;
                });
            }
            Ok(Some(Ok(Message::Binary(data)))) => {
                let registry = registry.clone();
                let conn = conn.clone();
                let data = data.to_vec();
                tokio::spawn(async move {
                    dispatch_binary(&registry, &conn, data).await;
                });
            }
            Ok(Some(Ok(Message::Close(frame)))) => {
                if let Some(frame) = frame {
                    close_code = frame.code;
                    close_reason = frame.reason.to_string();
                }
                break;
            }
            // Ping/pong are handled by the transport.
            Ok(Some(Ok(_))) => {}
        }
    }

    conn.mark_closed();
    dispatch_close(&registry, &conn, close_code, close_reason).await;
    hub.remove(conn.id());
    log::debug!("websocket {} closed", conn.id());
}

/// Run the connect handler, if any.
pub(crate) async fn dispatch_open(registry: &WsRouteRegistry, conn: &WsConnection) {
    let Some(def) = registry.get(conn.route_path()) else {
        return;
    };
    if let Some(handler) = &def.on_connect {
        let outcome = AssertUnwindSafe(handler(conn.clone())).catch_unwind().await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => fire_error(&def, conn, err).await,
            Err(panic) => fire_error(&def, conn, Error::custom(panic_message(panic))).await,
        }
    }
}

/// Route one text frame: parse, check shape, look up the type, validate,
/// invoke. Every failure goes to the route's error handler exactly once.
pub(crate) async fn dispatch_text(registry: &WsRouteRegistry, conn: &WsConnection, text: &str) {
    let Some(def) = registry.get(conn.route_path()) else {
        log::debug!("websocket route {} no longer registered", conn.route_path());
        return;
    };

    let parsed: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(_) => {
            fire_error(&def, conn, Error::custom("Invalid message format")).await;
            return;
        }
    };
    let msg_type = match parsed.as_object().and_then(|o| o.get("type")).and_then(Value::as_str) {
        Some(t) => t.to_string(),
        None => {
            fire_error(&def, conn, Error::custom("Invalid message format")).await;
            return;
        }
    };

    let Some(message_route) = def.message_route(&msg_type) else {
        fire_error(
            &def,
            conn,
            Error::custom(format!("Unknown message type: {}", msg_type)),
        )
        .await;
        return;
    };

    let data = parsed
        .as_object()
        .and_then(|o| o.get("data"))
        .cloned()
        .unwrap_or(Value::Null);
    let data = match &message_route.schema {
        None => data,
        Some(schema) => match schema.validate(&data) {
            Ok(valid) => valid,
            Err(issues) => {
                let detail = issues
                    .first()
                    .map(|issue| issue.message.clone())
                    .unwrap_or_else(|| "validation failed".to_string());
                fire_error(
                    &def,
                    conn,
                    Error::custom(format!("Validation error for \"{}\": {}", msg_type, detail)),
                )
                .await;
                return;
            }
        },
    };

    let outcome = AssertUnwindSafe((message_route.handler)(conn.clone(), data))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => fire_error(&def, conn, err).await,
        Err(panic) => fire_error(&def, conn, Error::custom(panic_message(panic))).await,
    }
}

/// Route one binary frame to the binary handler, or drop it.
pub(crate) async fn dispatch_binary(
    registry: &WsRouteRegistry,
    conn: &WsConnection,
    data: Vec<u8>,
) {
    let Some(def) = registry.get(conn.route_path()) else {
        return;
    };
    let Some(handler) = &def.binary else {
        log::debug!(
            "websocket {} dropped a binary frame: no binary handler",
            conn.id()
        );
        return;
    };
    let outcome = AssertUnwindSafe(handler(conn.clone(), data)).catch_unwind().await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => fire_error(&def, conn, err).await,
        Err(panic) => fire_error(&def, conn, Error::custom(panic_message(panic))).await,
    }
}

/// Run the close handler once. Its failures are logged and swallowed.
pub(crate) async fn dispatch_close(
    registry: &WsRouteRegistry,
    conn: &WsConnection,
    code: u16,
    reason: String,
) {
    let Some(def) = registry.get(conn.route_path()) else {
        return;
    };
    if let Some(handler) = &def.on_close {
        let outcome = AssertUnwindSafe(handler(conn.clone(), code, reason))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => log::warn!("websocket {} close handler failed: {}", conn.id(), err),
            Err(panic) => log::warn!(
                "websocket {} close handler panicked: {}",
                conn.id(),
                panic_message(panic)
            ),
        }
    }
}

/// Deliver an error to the route's error handler, or log it. The connection
/// stays open either way.
async fn fire_error(def: &WsRouteDef, conn: &WsConnection, err: Error) {
    match &def.on_error {
        Some(handler) => handler(conn.clone(), err).await,
        None => log::warn!("unhandled websocket error on {}: {}", conn.id(), err),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use serde_json::json;

    use super::*;
    use crate::ws_router::WsRouteBuilder;

    fn test_conn(route_path: &str) -> (WsConnection, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = Arc::new(ConnectionContext::new(None, HashMap::new()));
        (
            WsConnection::new(context, Arc::from(route_path), tx, Weak::new()),
            rx,
        )
    }

    fn chat_registry(
        seen: Arc<StdMutex<Vec<Value>>>,
        errors: Arc<StdMutex<Vec<String>>>,
    ) -> WsRouteRegistry {
        let registry = WsRouteRegistry::new();
        let route = WsRouteBuilder::new("/ws/chat")
            .on_message(
                "join",
                Some(json!({
                    "type": "object",
                    "properties": {"roomId": {"type": "string", "minLength": 1}},
                    "required": ["roomId"]
                })),
                move |_conn, data| {
                    let seen = seen.clone();
                    async move {
                        seen.lock().unwrap().push(data);
                        Ok(())
                    }
                },
            )
            .on_error(move |_conn, err| {
                let errors = errors.clone();
                async move {
                    errors.lock().unwrap().push(err.to_string());
                }
            })
            .build()
            .unwrap();
        registry.register(route);
        registry
    }

    #[tokio::test]
    async fn valid_frame_reaches_the_handler_once() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let registry = chat_registry(seen.clone(), errors.clone());
        let (conn, _rx) = test_conn("/ws/chat");

        dispatch_text(
            &registry,
            &conn,
            r#"{"type":"join","data":{"roomId":"r1"}}"#,
        )
        .await;

        assert_eq!(seen.lock().unwrap().as_slice(), &[json!({"roomId": "r1"})]);
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn schema_failure_goes_to_the_error_handler() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let registry = chat_registry(seen.clone(), errors.clone());
        let (conn, _rx) = test_conn("/ws/chat");

        dispatch_text(&registry, &conn, r#"{"type":"join","data":{"roomId":""}}"#).await;

        assert!(seen.lock().unwrap().is_empty());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Validation error for \"join\""));
    }

    #[tokio::test]
    async fn unknown_type_goes_to_the_error_handler() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let registry = chat_registry(seen.clone(), errors.clone());
        let (conn, _rx) = test_conn("/ws/chat");

        dispatch_text(&registry, &conn, r#"{"type":"unknown","data":{}}"#).await;

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0], "Unknown message type: unknown");
    }

    #[tokio::test]
    async fn malformed_frames_are_invalid_format_errors() {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let registry = chat_registry(seen.clone(), errors.clone());
        let (conn, _rx) = test_conn("/ws/chat");

        dispatch_text(&registry, &conn, "not json").await;
        dispatch_text(&registry, &conn, r#"["an","array"]"#).await;
        dispatch_text(&registry, &conn, r#"{"data":{}}"#).await;

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e == "Invalid message format"));
    }

    #[tokio::test]
    async fn handler_failure_stays_on_the_connection() {
        let errors = Arc::new(StdMutex::new(Vec::new()));
        let registry = WsRouteRegistry::new();
        let errors_sink = errors.clone();
        let route = WsRouteBuilder::new("/ws/fragile")
            .on_message("boom", None, |_conn, _data| async {
                Err(Error::custom("handler exploded"))
            })
            .on_error(move |_conn, err| {
                let errors = errors_sink.clone();
                async move {
                    errors.lock().unwrap().push(err.to_string());
                }
            })
            .build()
            .unwrap();
        registry.register(route);
        let (conn, _rx) = test_conn("/ws/fragile");

        dispatch_text(&registry, &conn, r#"{"type":"boom"}"#).await;

        assert_eq!(errors.lock().unwrap().as_slice(), &["handler exploded"]);
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn send_is_rejected_after_close() {
        let (conn, mut rx) = test_conn("/ws/chat");
        conn.send(&json!({"type": "ping"})).unwrap();
        assert!(rx.try_recv().is_ok());

        conn.mark_closed();
        assert!(conn.send(&json!({"type": "ping"})).is_err());
    }

    #[tokio::test]
    async fn binary_frames_without_handler_are_dropped() {
        let registry = chat_registry(
            Arc::new(StdMutex::new(Vec::new())),
            Arc::new(StdMutex::new(Vec::new())),
        );
        let (conn, _rx) = test_conn("/ws/chat");
        // No binary handler registered; nothing to assert beyond not hanging.
        dispatch_binary(&registry, &conn, vec![1, 2, 3]).await;
    }
}
