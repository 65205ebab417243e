//! Request model.
//!
//! The pipeline consumes an owned [`Request`] so that matching, parsing and
//! validation are testable without a live listener. The server builds one
//! from the incoming hyper parts; tests build them by hand.

use std::str::FromStr;

use serde_json::{Map, Value};

/// HTTP methods understood by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }

    /// Methods that carry no body by convention; their missing bodies parse
    /// to an empty object instead of raw text.
    pub fn is_bodyless(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Options)
    }
}

impl FromStr for Method {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An owned HTTP request as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub query_string: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request by hand, mostly for tests and embedding.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let full: String = path.into();
        let (path, query_string) = match full.split_once('?') {
            Some((p, q)) => (p.to_string(), q.to_string()),
            None => (full, String::new()),
        };
        Request {
            method,
            path,
            query_string,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn origin(&self) -> Option<&str> {
        self.header("origin")
    }

    /// Whether the request asks for a protocol upgrade to WebSocket.
    pub fn wants_websocket(&self) -> bool {
        self.header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
    }

    /// Build a request from hyper parts, body already collected.
    pub(crate) fn from_http_parts(parts: &axum::http::request::Parts, body: Vec<u8>) -> Self {
        let method = parts
            .method
            .as_str()
            .parse::<Method>()
            .unwrap_or(Method::Get);
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        Request {
            method,
            path: parts.uri.path().to_string(),
            query_string: parts.uri.query().unwrap_or_default().to_string(),
            headers,
            body,
        }
    }
}

/// Parse a query string into a JSON object whose values are strings, or
/// arrays of strings for repeated keys.
pub fn parse_query(query_string: &str) -> Value {
    let mut out = Map::new();
    for pair in query_string.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        let key = decode_component(key);
        let value = Value::String(decode_component(value));
        match out.get_mut(&key) {
            Some(Value::Array(list)) => list.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                out.insert(key, value);
            }
        }
    }
    Value::Object(out)
}

/// Parse an `application/x-www-form-urlencoded` body into a flat string map.
/// Repeated keys keep the last value.
pub fn parse_form(body: &str) -> Value {
    let mut out = Map::new();
    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        out.insert(
            decode_component(key),
            Value::String(decode_component(value)),
        );
    }
    Value::Object(out)
}

/// Percent-decode one query component, treating `+` as a space.
fn decode_component(raw: &str) -> String {
    let plussed = raw.replace('+', " ");
    match urlencoding::decode(&plussed) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => plussed,
    }
}
