//! HTTP request pipeline.
//!
//! Glues matching, parsing, validation, the middleware chain and CORS into
//! one deterministic order:
//!
//! 1. OPTIONS with CORS configured short-circuits to the preflight.
//! 2. Route resolution; a miss is a decorated 404 envelope.
//! 3. Query and body parsing (body capped at the configured maximum).
//! 4. Query schema validation.
//! 5. Body schema validation.
//! 6. Fresh response builder and context map.
//! 7. Middleware chain, handler last; failures and panics become 500.
//! 8. CORS decoration of whatever comes out.
//!
//! Validation runs before the chain, so a handler only ever sees data that
//! passed the route's schemas.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value, json};

use crate::cors::CorsConfig;
use crate::error::{ErrorCode, panic_message};
use crate::middleware::{Middleware, RequestArgs, run_chain};
use crate::request::{Method, Request, parse_form, parse_query};
use crate::response::Response;
use crate::router::RouteRegistry;
use crate::schema::Issue;
use crate::settings::ServerOptions;

/// Run one request through the pipeline.
pub async fn handle(
    request: Request,
    registry: &RouteRegistry,
    options: &ServerOptions,
) -> Response {
    // Preflight bypasses routing entirely.
    if request.method == Method::Options {
        if let Some(cors) = &options.cors {
            return cors.preflight(&request);
        }
    }

    let Some(matched) = registry.find(request.method, &request.path) else {
        let response = Response::error(404, "Not found", Some(ErrorCode::NotFound), None);
        return decorate(response, &request, options.cors.as_ref());
    };

    if request.body.len() > options.max_body_size {
        let response = Response::error(
            400,
            "Request body exceeds maximum size",
            Some(ErrorCode::BadRequest),
            None,
        );
        return decorate(response, &request, options.cors.as_ref());
    }

    let query = parse_query(&request.query_string);
    let body = match parse_body(&request) {
        Ok(body) => body,
        Err(message) => {
            let response = Response::error(
                400,
                "Failed to parse request body",
                Some(ErrorCode::BadRequest),
                Some(Value::String(message)),
            );
            return decorate(response, &request, options.cors.as_ref());
        }
    };

    if let Some(schema) = &matched.def.query_schema {
        if let Err(issues) = schema.validate(&query) {
            let response = validation_failure("Invalid query parameters", &issues);
            return decorate(response, &request, options.cors.as_ref());
        }
    }
    if let Some(schema) = &matched.def.body_schema {
        if let Err(issues) = schema.validate(&body) {
            let response = validation_failure("Invalid request body", &issues);
            return decorate(response, &request, options.cors.as_ref());
        }
    }

    let chain: Vec<Middleware> = options
        .middlewares
        .iter()
        .cloned()
        .chain(matched.def.middlewares.iter().cloned())
        .collect();
    let args = Arc::new(RequestArgs::new(request, matched.params, query, body));

    let outcome = AssertUnwindSafe(run_chain(
        Arc::new(chain),
        matched.def.handler.clone(),
        args.clone(),
    ))
    .catch_unwind()
    .await;

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => Response::error(
            500,
            "Internal server error",
            Some(ErrorCode::InternalError),
            Some(Value::String(err.to_string())),
        ),
        Err(panic) => Response::error(
            500,
            "Internal server error",
            Some(ErrorCode::InternalError),
            Some(Value::String(panic_message(panic))),
        ),
    };

    decorate(response, &args.request, options.cors.as_ref())
}

/// Parse the body according to Content-Type. The error string is a parse
/// message surfaced as `details` of the 400 envelope.
fn parse_body(request: &Request) -> Result<Value, String> {
    let content_type = request
        .content_type()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if content_type.starts_with("application/json") {
        serde_json::from_slice(&request.body).map_err(|err| err.to_string())
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        Ok(parse_form(&String::from_utf8_lossy(&request.body)))
    } else if content_type.starts_with("text/") {
        Ok(Value::String(
            String::from_utf8_lossy(&request.body).into_owned(),
        ))
    } else if request.method.is_bodyless() {
        Ok(Value::Object(Map::new()))
    } else {
        Ok(Value::String(
            String::from_utf8_lossy(&request.body).into_owned(),
        ))
    }
}

fn validation_failure(message: &str, issues: &[Issue]) -> Response {
    let details: Vec<Value> = issues
        .iter()
        .map(|issue| json!({"field": issue.field(), "message": issue.message}))
        .collect();
    Response::error(
        400,
        message,
        Some(ErrorCode::BadRequest),
        Some(Value::Array(details)),
    )
}

/// Apply the CORS policy to an outgoing non-preflight response. Error
/// responses are decorated the same as successes; an explicitly disallowed
/// origin is rejected outright.
fn decorate(mut response: Response, request: &Request, cors: Option<&CorsConfig>) -> Response {
    let Some(cors) = cors else {
        return response;
    };
    let Some(origin) = request.origin() else {
        return response;
    };
    if cors.origin.allows(origin) {
        cors.decorate(&mut response, origin);
        response
    } else {
        Response::error(403, "Origin not allowed", Some(ErrorCode::Forbidden), None)
    }
}
