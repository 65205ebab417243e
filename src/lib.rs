pub mod connections;
pub mod cors;
pub mod error;
pub mod middleware;
pub mod openapi;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod router;
pub mod schema;
pub mod server;
pub mod settings;
pub mod typegen;
pub mod ws;
pub mod ws_router;

pub use error::{Error, ErrorCode, Result, ServerError};
pub use request::{Method, Request};
pub use response::{Cookie, Response, ResponseBuilder, SameSite};
pub use router::{RouteBuilder, RouteDef};
pub use server::Server;
pub use settings::{DocsOptions, ServerOptions, WsOptions};
pub use ws::WsConnection;
pub use ws_router::{WsRouteBuilder, WsRouteDef};

/// Register an HTTP route in the process-global registry.
pub fn route(def: RouteDef) {
    router::global().register(def);
}

/// Register a WebSocket route in the process-global registry.
pub fn ws_route(def: WsRouteDef) {
    ws_router::global().register(def);
}
