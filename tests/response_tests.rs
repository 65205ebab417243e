use std::collections::HashMap;

use chrono::TimeZone;
use serde_json::json;

use vanadio::error::ErrorCode;
use vanadio::response::{Cookie, Response, ResponseBuilder, SameSite};

// ========== Terminals ==========

#[test]
fn test_ok_is_json_with_charset() {
    let resp = ResponseBuilder::new().ok(json!({"foo": "bar"}));
    assert_eq!(resp.status_code, 200);
    assert_eq!(
        resp.header("Content-Type").unwrap(),
        "application/json; charset=utf-8"
    );
    assert!(resp.body_text().unwrap().contains("\"foo\":\"bar\""));
}

#[test]
fn test_created_sets_location() {
    let resp = ResponseBuilder::new().created(json!({"id": 7}), Some("/api/users/7"));
    assert_eq!(resp.status_code, 201);
    assert_eq!(resp.header("Location").unwrap(), "/api/users/7");
}

#[test]
fn test_no_content_has_empty_body() {
    let resp = ResponseBuilder::new().no_content();
    assert_eq!(resp.status_code, 204);
    assert!(resp.body_text().is_none());
}

#[test]
fn test_text_and_html_content_types() {
    let resp = ResponseBuilder::new().text("plain");
    assert_eq!(resp.header("Content-Type").unwrap(), "text/plain; charset=utf-8");
    assert_eq!(resp.body_text().unwrap(), "plain");

    let resp = ResponseBuilder::new().html("<h1>hi</h1>");
    assert_eq!(resp.header("Content-Type").unwrap(), "text/html; charset=utf-8");
}

#[test]
fn test_redirect_defaults_to_302() {
    let resp = ResponseBuilder::new().redirect("/elsewhere", None);
    assert_eq!(resp.status_code, 302);
    assert_eq!(resp.header("Location").unwrap(), "/elsewhere");

    let resp = ResponseBuilder::new().redirect("/elsewhere", Some(301));
    assert_eq!(resp.status_code, 301);
}

#[test]
fn test_redirect_to_substitutes_params() {
    let mut params = HashMap::new();
    params.insert("id".to_string(), "42".to_string());
    let resp = ResponseBuilder::new().redirect_to("/api/users/:id", &params, None);
    assert_eq!(resp.header("Location").unwrap(), "/api/users/42");

    let mut params = HashMap::new();
    params.insert("path".to_string(), "css/site.css".to_string());
    let resp = ResponseBuilder::new().redirect_to("/public/:path*", &params, None);
    assert_eq!(resp.header("Location").unwrap(), "/public/css/site.css");
}

#[tokio::test]
async fn test_missing_file_is_the_standard_envelope() {
    let resp = ResponseBuilder::new().file("/definitely/not/here.txt").await;
    assert_eq!(resp.status_code, 404);
    let body = resp.body_json().unwrap();
    assert_eq!(body["message"], "File not found");
    assert_eq!(body["code"], "FILE_NOT_FOUND");
}

// ========== Error terminals and defaults ==========

#[test]
fn test_error_terminals_use_default_codes() {
    let cases: Vec<(Response, u16, &str)> = vec![
        (
            ResponseBuilder::new().bad_request("bad", None, None),
            400,
            "BAD_REQUEST",
        ),
        (
            ResponseBuilder::new().unauthorized("who", None, None),
            401,
            "UNAUTHORIZED",
        ),
        (
            ResponseBuilder::new().forbidden("no", None, None),
            403,
            "FORBIDDEN",
        ),
        (
            ResponseBuilder::new().not_found("gone", None, None),
            404,
            "NOT_FOUND",
        ),
        (
            ResponseBuilder::new().conflict("clash", None, None),
            409,
            "CONFLICT",
        ),
        (
            ResponseBuilder::new().internal_error("oops", None, None),
            500,
            "INTERNAL_ERROR",
        ),
    ];
    for (resp, status, code) in cases {
        assert_eq!(resp.status_code, status);
        assert_eq!(resp.body_json().unwrap()["code"], code);
    }
}

#[test]
fn test_explicit_code_overrides_the_default() {
    let resp =
        ResponseBuilder::new().unauthorized("session", Some(ErrorCode::Unauthenticated), None);
    assert_eq!(resp.body_json().unwrap()["code"], "UNAUTHENTICATED");
}

#[test]
fn test_unknown_status_falls_back_to_internal_error() {
    let resp = Response::error(999, "strange", None, None);
    assert_eq!(resp.body_json().unwrap()["code"], "INTERNAL_ERROR");
}

// ========== Accumulated modifiers ==========

#[test]
fn test_modifiers_apply_to_every_terminal() {
    let builder = ResponseBuilder::new();
    builder
        .status(418)
        .header("X-Trace", "abc")
        .cookie(Cookie::new("session", "s1"));

    let first = builder.ok(json!({}));
    let second = builder.text("tea");

    for resp in [first, second] {
        assert_eq!(resp.status_code, 418);
        assert_eq!(resp.header("X-Trace").unwrap(), "abc");
        assert_eq!(resp.header_all("Set-Cookie").len(), 1);
    }
}

#[test]
fn test_custom_headers_overwrite_base_headers() {
    let builder = ResponseBuilder::new();
    builder.header("Content-Type", "application/vnd.custom+json");
    let resp = builder.ok(json!({}));
    assert_eq!(
        resp.header("Content-Type").unwrap(),
        "application/vnd.custom+json"
    );
    assert_eq!(resp.header_all("Content-Type").len(), 1);
}

#[test]
fn test_custom_applies_modifiers_to_foreign_responses() {
    let builder = ResponseBuilder::new();
    builder.status(207).cookie(Cookie::new("a", "1"));
    let resp = builder.custom(Response::new(200));
    assert_eq!(resp.status_code, 207);
    assert_eq!(resp.header_all("Set-Cookie").len(), 1);
}

// ========== Cookies ==========

#[test]
fn test_cookie_attribute_order_is_fixed() {
    let expires = chrono::Utc.with_ymd_and_hms(2027, 1, 2, 3, 4, 5).unwrap();
    let cookie = Cookie::new("name", "value with space")
        .domain("example.com")
        .path("/")
        .expires(expires)
        .max_age(3600)
        .http_only()
        .secure()
        .same_site(SameSite::Lax);
    assert_eq!(
        cookie.serialize(),
        "name=value%20with%20space; Domain=example.com; Path=/; \
         Expires=Sat, 02 Jan 2027 03:04:05 GMT; Max-Age=3600; HttpOnly; Secure; SameSite=Lax"
    );
}

#[test]
fn test_cookie_names_and_values_are_encoded() {
    let cookie = Cookie::new("se;ssion", "a=b&c");
    assert_eq!(cookie.serialize(), "se%3Bssion=a%3Db%26c");
}

#[test]
fn test_multiple_cookies_become_multiple_headers() {
    let builder = ResponseBuilder::new();
    builder
        .cookie(Cookie::new("first", "1"))
        .cookie(Cookie::new("second", "2"));
    let resp = builder.no_content();
    let cookies = resp.header_all("Set-Cookie");
    assert_eq!(cookies, vec!["first=1", "second=2"]);
}
