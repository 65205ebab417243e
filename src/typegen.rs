//! WebSocket client type generator.
//!
//! Walks the registered WebSocket routes and emits one TypeScript namespace
//! per route: a `ClientMessage` tagged union over the route's message types
//! and a `ServerMessage` derived from the optional server-message schema.
//! The result is returned as a string; callers decide where it lands.

use heck::ToUpperCamelCase;

use crate::router::Segment;
use crate::schema::type_string;
use crate::ws_router::{WsRouteDef, WsRouteRegistry};

/// Generate type declarations for every registered route.
pub fn generate_client_types(registry: &WsRouteRegistry) -> String {
    generate_client_types_filtered(registry, |_| true)
}

/// Generate type declarations for the routes whose path passes the filter.
pub fn generate_client_types_filtered(
    registry: &WsRouteRegistry,
    filter: impl Fn(&str) -> bool,
) -> String {
    let mut out = String::from(
        "// Generated WebSocket message types. Do not edit by hand.\n",
    );
    for def in registry.all() {
        if !filter(def.pattern.raw()) {
            continue;
        }
        out.push('\n');
        out.push_str(&render_route(&def));
    }
    out
}

fn render_route(def: &WsRouteDef) -> String {
    let mut out = format!("export namespace {} {{\n", namespace_name(def));

    if def.messages.is_empty() {
        out.push_str("  export type ClientMessage = never;\n");
    } else {
        out.push_str("  export type ClientMessage =\n");
        for (index, message) in def.messages.iter().enumerate() {
            let data = match &message.schema {
                Some(schema) => format!("data: {}", schema.type_string(2)),
                None => "data?: unknown".to_string(),
            };
            let terminator = if index == def.messages.len() - 1 { ";" } else { "" };
            out.push_str(&format!(
                "    | {{ type: \"{}\"; {} }}{}\n",
                message.msg_type, data, terminator
            ));
        }
    }

    out.push('\n');
    match &def.server_message_schema {
        Some(schema) => {
            out.push_str(&format!(
                "  export type ServerMessage = {};\n",
                type_string(schema, 1)
            ));
        }
        None => {
            out.push_str("  // No server message schema was registered for this route.\n");
            out.push_str("  export type ServerMessage = unknown;\n");
        }
    }
    out.push_str("}\n");
    out
}

/// Derive the namespace name from the route path: parameter segments are
/// dropped, the rest is UpperCamelCase-joined, `WebSocket` is appended.
fn namespace_name(def: &WsRouteDef) -> String {
    let joined: String = def
        .pattern
        .segments()
        .iter()
        .filter_map(|segment| match segment {
            Segment::Literal(lit) => Some(lit.to_upper_camel_case()),
            _ => None,
        })
        .collect();
    if joined.is_empty() {
        "RootWebSocket".to_string()
    } else {
        format!("{}WebSocket", joined)
    }
}
