use vanadio::request::Method;
use vanadio::response::Response;
use vanadio::router::{PathPattern, RouteBuilder, RouteError, RouteRegistry};

fn dummy_route(method: Method, path: &str) -> vanadio::router::RouteDef {
    RouteBuilder::new(method, path)
        .handler(|args| async move { Ok(args.res().ok(serde_json::json!({}))) })
        .unwrap()
}

// ========== PathPattern parsing ==========

#[test]
fn test_pattern_parse_literals_and_params() {
    let pattern = PathPattern::parse("/api/users/:id").unwrap();
    assert_eq!(pattern.specificity(), 3 + 3 + 2);
    assert_eq!(pattern.param_names(), vec!["id"]);
}

#[test]
fn test_pattern_rejects_bad_paths() {
    assert!(matches!(
        PathPattern::parse("api/users"),
        Err(RouteError::NoLeadingSlash { .. })
    ));
    assert!(matches!(
        PathPattern::parse("/api/:1bad"),
        Err(RouteError::InvalidParamName { .. })
    ));
    assert!(matches!(
        PathPattern::parse("/api/:id/:id"),
        Err(RouteError::DuplicateParam { .. })
    ));
    assert!(matches!(
        PathPattern::parse("/files/:path*/extra"),
        Err(RouteError::WildcardNotLast { .. })
    ));
    assert!(matches!(
        PathPattern::parse_ws("/files/:path*"),
        Err(RouteError::WildcardNotAllowed { .. })
    ));
}

#[test]
fn test_pattern_matching_static_and_params() {
    let pattern = PathPattern::parse("/user/:id").unwrap();
    let params = pattern.matches("/user/99").unwrap();
    assert_eq!(params.get("id").unwrap(), "99");

    // Segment-count mismatches never match.
    assert!(pattern.matches("/user").is_none());
    assert!(pattern.matches("/user/99/extra").is_none());
    // Literal mismatch.
    assert!(PathPattern::parse("/foo/bar").unwrap().matches("/foo/qux").is_none());
    // Trailing slashes are tolerated.
    assert!(pattern.matches("/user/99/").is_some());
}

#[test]
fn test_wildcard_captures_remaining_segments() {
    let pattern = PathPattern::parse("/public/:path*").unwrap();
    let params = pattern.matches("/public/css/site.css").unwrap();
    assert_eq!(params.get("path").unwrap(), "css/site.css");

    // A wildcard must consume at least one segment.
    assert!(pattern.matches("/public").is_none());
}

// ========== Registry matching and specificity ==========

#[test]
fn test_specificity_ordering_across_route_shapes() {
    let registry = RouteRegistry::new();
    // Registered least-specific first on purpose.
    registry.register(dummy_route(Method::Get, "/:path*"));
    registry.register(dummy_route(Method::Get, "/api/:resource"));
    registry.register(dummy_route(Method::Get, "/api/users"));
    registry.register(dummy_route(Method::Get, "/api/users/:id"));

    let matched = registry.find(Method::Get, "/api/users/123").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/api/users/:id");
    assert_eq!(matched.params.get("id").unwrap(), "123");

    let matched = registry.find(Method::Get, "/api/users").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/api/users");
    assert!(matched.params.is_empty());

    let matched = registry.find(Method::Get, "/api/posts").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/api/:resource");
    assert_eq!(matched.params.get("resource").unwrap(), "posts");

    let matched = registry.find(Method::Get, "/random/path").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/:path*");
    assert_eq!(matched.params.get("path").unwrap(), "random/path");
}

#[test]
fn test_equal_scores_keep_registration_order() {
    let registry = RouteRegistry::new();
    registry.register(dummy_route(Method::Get, "/things/:a"));
    registry.register(dummy_route(Method::Get, "/things/:b"));

    let matched = registry.find(Method::Get, "/things/1").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/things/:a");
}

#[test]
fn test_method_filtering() {
    let registry = RouteRegistry::new();
    registry.register(dummy_route(Method::Post, "/api/users"));
    assert!(registry.find(Method::Get, "/api/users").is_none());
    assert!(registry.find(Method::Post, "/api/users").is_some());
}

#[test]
fn test_register_after_match_invalidates_cache() {
    let registry = RouteRegistry::new();
    registry.register(dummy_route(Method::Get, "/api/:resource"));

    let matched = registry.find(Method::Get, "/api/users").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/api/:resource");

    // A more specific route registered later must win on the next match.
    registry.register(dummy_route(Method::Get, "/api/users"));
    let matched = registry.find(Method::Get, "/api/users").unwrap();
    assert_eq!(matched.def.pattern.raw(), "/api/users");
}

#[test]
fn test_clear_and_reregister_round_trips() {
    let registry = RouteRegistry::new();
    registry.register(dummy_route(Method::Get, "/a"));
    assert_eq!(registry.len(), 1);

    registry.clear();
    assert!(registry.is_empty());
    assert!(registry.find(Method::Get, "/a").is_none());

    registry.register(dummy_route(Method::Get, "/a"));
    assert!(registry.find(Method::Get, "/a").is_some());
}

// ========== Builder ==========

#[test]
fn test_builder_collects_metadata_and_schemas() {
    let def = RouteBuilder::post("/api/users")
        .operation_id("createUser")
        .summary("Create a user")
        .tags(["users"])
        .body(serde_json::json!({"type": "object"}))
        .error_response(409, "Already exists", None)
        .security("bearerAuth", vec![])
        .handler(|args| async move {
            Ok(args.res().created(serde_json::json!({"id": 1}), None))
        })
        .unwrap();

    assert_eq!(def.method, Method::Post);
    assert_eq!(def.meta.operation_id.as_deref(), Some("createUser"));
    assert!(def.body_schema.is_some());
    assert!(def.errors.contains_key(&409));
    assert_eq!(def.security.len(), 1);
}

#[test]
fn test_builder_success_response_is_single() {
    let def = RouteBuilder::get("/api/ping")
        .response(200, Some("First"), None)
        .response(202, Some("Second"), None)
        .handler(|_args| async move { Ok(Response::new(202)) })
        .unwrap();
    let success = def.success.unwrap();
    assert_eq!(success.status, 202);
    assert_eq!(success.description.as_deref(), Some("Second"));
}

#[test]
fn test_builder_propagates_path_errors() {
    let result = RouteBuilder::get("no-slash")
        .handler(|_args| async move { Ok(Response::new(200)) });
    assert!(matches!(result, Err(RouteError::NoLeadingSlash { .. })));
}
