use serde_json::json;

use vanadio::router::RouteError;
use vanadio::ws_router::{WsRouteBuilder, WsRouteRegistry};

fn echo_route(path: &str) -> vanadio::ws_router::WsRouteDef {
    WsRouteBuilder::new(path)
        .on_message("echo", None, |conn, data| async move {
            conn.send(&data)?;
            Ok(())
        })
        .build()
        .unwrap()
}

#[test]
fn test_match_extracts_params() {
    let registry = WsRouteRegistry::new();
    registry.register(echo_route("/ws/rooms/:roomId"));

    let matched = registry.find("/ws/rooms/lobby").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/ws/rooms/:roomId");
    assert_eq!(matched.params.get("roomId").unwrap(), "lobby");
}

#[test]
fn test_segment_count_must_match_exactly() {
    let registry = WsRouteRegistry::new();
    registry.register(echo_route("/ws/rooms/:roomId"));

    assert!(registry.find("/ws/rooms").is_none());
    assert!(registry.find("/ws/rooms/lobby/extra").is_none());
}

#[test]
fn test_literal_routes_beat_parameterized_ones() {
    let registry = WsRouteRegistry::new();
    registry.register(echo_route("/ws/:channel"));
    registry.register(echo_route("/ws/control"));

    let matched = registry.find("/ws/control").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/ws/control");

    let matched = registry.find("/ws/news").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/ws/:channel");
}

#[test]
fn test_wildcards_are_rejected() {
    let result = WsRouteBuilder::new("/ws/:path*").build();
    assert!(matches!(
        result,
        Err(RouteError::WildcardNotAllowed { .. })
    ));
}

#[test]
fn test_duplicate_message_types_are_rejected() {
    let result = WsRouteBuilder::new("/ws/chat")
        .on_message("join", None, |_conn, _data| async { Ok(()) })
        .on_message("join", None, |_conn, _data| async { Ok(()) })
        .build();
    assert!(matches!(
        result,
        Err(RouteError::DuplicateMessageType { .. })
    ));
}

#[test]
fn test_get_resolves_by_exact_registered_path() {
    let registry = WsRouteRegistry::new();
    registry.register(echo_route("/ws/rooms/:roomId"));

    assert!(registry.get("/ws/rooms/:roomId").is_some());
    // `get` is a key lookup, not a match.
    assert!(registry.get("/ws/rooms/lobby").is_none());
}

#[test]
fn test_clear_empties_the_registry() {
    let registry = WsRouteRegistry::new();
    registry.register(echo_route("/ws/a"));
    registry.register(
        WsRouteBuilder::new("/ws/b")
            .server_messages(json!({"type": "object"}))
            .build()
            .unwrap(),
    );
    assert_eq!(registry.len(), 2);
    registry.clear();
    assert!(registry.is_empty());
    assert!(registry.find("/ws/a").is_none());
}
