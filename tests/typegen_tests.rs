use serde_json::json;

use vanadio::typegen::{generate_client_types, generate_client_types_filtered};
use vanadio::ws_router::{WsRouteBuilder, WsRouteRegistry};

fn chat_registry() -> WsRouteRegistry {
    let registry = WsRouteRegistry::new();
    registry.register(
        WsRouteBuilder::new("/ws/chat-room/:roomId")
            .on_message(
                "join",
                Some(json!({
                    "type": "object",
                    "properties": {"roomId": {"type": "string"}},
                    "required": ["roomId"]
                })),
                |_conn, _data| async { Ok(()) },
            )
            .on_message("leave", None, |_conn, _data| async { Ok(()) })
            .server_messages(json!({
                "type": "object",
                "properties": {"event": {"enum": ["joined", "left"]}},
                "required": ["event"]
            }))
            .build()
            .unwrap(),
    );
    registry
}

#[test]
fn test_namespace_drops_params_and_camel_cases() {
    let output = generate_client_types(&chat_registry());
    assert!(output.contains("export namespace WsChatRoomWebSocket {"));
    // The `:roomId` segment contributes nothing to the name.
    assert!(!output.contains("RoomId WebSocket"));
}

#[test]
fn test_client_message_is_a_tagged_union() {
    let output = generate_client_types(&chat_registry());
    assert!(output.contains("export type ClientMessage ="));
    assert!(output.contains("| { type: \"join\"; data: {"));
    assert!(output.contains("roomId: string;"));
    assert!(output.contains("| { type: \"leave\"; data?: unknown };"));
}

#[test]
fn test_server_message_uses_the_declared_schema() {
    let output = generate_client_types(&chat_registry());
    assert!(output.contains("export type ServerMessage = {"));
    assert!(output.contains("event: \"joined\" | \"left\";"));
}

#[test]
fn test_server_message_falls_back_to_unknown() {
    let registry = WsRouteRegistry::new();
    registry.register(
        WsRouteBuilder::new("/ws/stream")
            .on_message("ping", None, |_conn, _data| async { Ok(()) })
            .build()
            .unwrap(),
    );
    let output = generate_client_types(&registry);
    assert!(output.contains("// No server message schema was registered for this route."));
    assert!(output.contains("export type ServerMessage = unknown;"));
}

#[test]
fn test_route_without_messages_renders_never() {
    let registry = WsRouteRegistry::new();
    registry.register(WsRouteBuilder::new("/ws/quiet").build().unwrap());
    let output = generate_client_types(&registry);
    assert!(output.contains("export namespace WsQuietWebSocket {"));
    assert!(output.contains("export type ClientMessage = never;"));
}

#[test]
fn test_filter_limits_the_emitted_routes() {
    let registry = chat_registry();
    registry.register(
        WsRouteBuilder::new("/ws/metrics")
            .on_message("sample", None, |_conn, _data| async { Ok(()) })
            .build()
            .unwrap(),
    );

    let output = generate_client_types_filtered(&registry, |path| path.starts_with("/ws/chat"));
    assert!(output.contains("WsChatRoomWebSocket"));
    assert!(!output.contains("WsMetricsWebSocket"));
}

#[test]
fn test_root_only_path_gets_a_fallback_namespace() {
    let registry = WsRouteRegistry::new();
    registry.register(WsRouteBuilder::new("/:session").build().unwrap());
    let output = generate_client_types(&registry);
    assert!(output.contains("export namespace RootWebSocket {"));
}
