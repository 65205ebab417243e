//! Response model and builder.
//!
//! [`Response`] is an owned status + headers + body triple, in the same
//! spirit as the request model: constructible and inspectable without a
//! listener. [`ResponseBuilder`] accumulates cookies, a status override and
//! custom headers, and applies them uniformly to whatever terminal response
//! is produced. One builder instance travels with a request through the
//! middleware chain, so the accumulated state is shared behind a lock.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorBody, ErrorCode};

/// A boxed stream of body chunks for streaming responses.
pub type BoxByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static>>;

/// Response payload.
pub enum Body {
    Empty,
    Text(String),
    Bytes(Vec<u8>),
    Stream(BoxByteStream),
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Empty => f.write_str("Body::Empty"),
            Body::Text(t) => write!(f, "Body::Text({} bytes)", t.len()),
            Body::Bytes(b) => write!(f, "Body::Bytes({} bytes)", b.len()),
            Body::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

/// An owned HTTP response.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    /// Header list; a name may repeat (`Set-Cookie`).
    pub headers: Vec<(String, String)>,
    pub body: Body,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        Response {
            status_code,
            headers: Vec::new(),
            body: Body::Empty,
        }
    }

    /// First header with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for a header name, in insertion order.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Replace every value of a header with a single one.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    pub fn append_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// The body as text, when it is textual.
    pub fn body_text(&self) -> Option<&str> {
        match &self.body {
            Body::Text(t) => Some(t.as_str()),
            _ => None,
        }
    }

    /// The body parsed as JSON, when it is textual JSON.
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_str(self.body_text()?).ok()
    }

    /// A JSON response with the given status.
    pub fn json_value(status_code: u16, data: &impl Serialize) -> Self {
        let mut response = Response::new(status_code);
        match serde_json::to_string(data) {
            Ok(body) => {
                response.body = Body::Text(body);
            }
            Err(_) => {
                response.status_code = 500;
                let envelope = ErrorBody::new("Serialization failed", ErrorCode::InternalError);
                response.body = Body::Text(
                    serde_json::to_string(&envelope).unwrap_or_else(|_| String::from("{}")),
                );
            }
        }
        response.set_header("Content-Type", "application/json; charset=utf-8");
        response
    }

    /// A standard error-envelope response. The code defaults per status when
    /// not supplied.
    pub fn error(
        status_code: u16,
        message: impl Into<String>,
        code: Option<ErrorCode>,
        details: Option<Value>,
    ) -> Self {
        let code = code.unwrap_or_else(|| ErrorCode::default_for_status(status_code));
        let mut envelope = ErrorBody::new(message, code);
        envelope.details = details;
        Response::json_value(status_code, &envelope)
    }

    /// Convert into an axum response for the transport layer.
    pub(crate) fn into_axum(self) -> axum::response::Response {
        use axum::http::{HeaderName, HeaderValue, StatusCode};

        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = match self.body {
            Body::Empty => axum::body::Body::empty(),
            Body::Text(t) => axum::body::Body::from(t),
            Body::Bytes(b) => axum::body::Body::from(b),
            Body::Stream(s) => axum::body::Body::from_stream(s),
        };
        let mut response = axum::response::Response::new(body);
        *response.status_mut() = status;
        for (name, value) in self.headers {
            let Ok(name) = HeaderName::try_from(name.as_str()) else {
                continue;
            };
            let Ok(value) = HeaderValue::try_from(value.as_str()) else {
                continue;
            };
            response.headers_mut().append(name, value);
        }
        response
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// A response cookie. Name and value are URL-encoded on serialization;
/// attributes render in a fixed order.
#[derive(Debug, Clone)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub expires: Option<DateTime<Utc>>,
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Cookie {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            expires: None,
            max_age: None,
            http_only: false,
            secure: false,
            same_site: None,
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn expires(mut self, at: DateTime<Utc>) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn http_only(mut self) -> Self {
        self.http_only = true;
        self
    }

    pub fn secure(mut self) -> Self {
        self.secure = true;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Serialize to a `Set-Cookie` value. Attribute order: Domain, Path,
    /// Expires, Max-Age, HttpOnly, Secure, SameSite.
    pub fn serialize(&self) -> String {
        let mut out = format!(
            "{}={}",
            urlencoding::encode(&self.name),
            urlencoding::encode(&self.value)
        );
        if let Some(domain) = &self.domain {
            out.push_str(&format!("; Domain={}", domain));
        }
        if let Some(path) = &self.path {
            out.push_str(&format!("; Path={}", path));
        }
        if let Some(expires) = &self.expires {
            out.push_str(&format!(
                "; Expires={}",
                expires.format("%a, %d %b %Y %H:%M:%S GMT")
            ));
        }
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={}", max_age));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if let Some(same_site) = self.same_site {
            out.push_str(&format!("; SameSite={}", same_site.as_str()));
        }
        out
    }
}

#[derive(Default, Clone)]
struct BuilderState {
    cookies: Vec<Cookie>,
    status: Option<u16>,
    headers: Vec<(String, String)>,
}

/// Accumulates response modifiers and produces responses through terminal
/// methods. Modifier application order is fixed: custom headers (overwriting
/// existing ones), then the status override, then one `Set-Cookie` per
/// accumulated cookie. Calling two terminals yields two independent
/// responses that both reflect the accumulated state.
#[derive(Default)]
pub struct ResponseBuilder {
    state: Mutex<BuilderState>,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        ResponseBuilder::default()
    }

    /// Override the status of every subsequently produced response.
    pub fn status(&self, status_code: u16) -> &Self {
        self.lock().status = Some(status_code);
        self
    }

    /// Add a custom header. Overwrites any same-named header of the base
    /// response at apply time.
    pub fn header(&self, name: impl Into<String>, value: impl Into<String>) -> &Self {
        self.lock().headers.push((name.into(), value.into()));
        self
    }

    /// Add a cookie to be set on every produced response.
    pub fn cookie(&self, cookie: Cookie) -> &Self {
        self.lock().cookies.push(cookie);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BuilderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply the accumulated modifiers to a base response.
    fn apply(&self, mut response: Response) -> Response {
        let state = self.lock().clone();
        for (name, value) in state.headers {
            response.set_header(&name, value);
        }
        if let Some(status) = state.status {
            response.status_code = status;
        }
        for cookie in &state.cookies {
            response.append_header("Set-Cookie", cookie.serialize());
        }
        response
    }

    // ----- JSON success terminals -----

    /// 200 with a JSON body.
    pub fn ok(&self, data: impl Serialize) -> Response {
        self.apply(Response::json_value(200, &data))
    }

    /// 201 with a JSON body and an optional `Location`.
    pub fn created(&self, data: impl Serialize, location: Option<&str>) -> Response {
        let mut response = Response::json_value(201, &data);
        if let Some(location) = location {
            response.set_header("Location", location);
        }
        self.apply(response)
    }

    /// 202 with a JSON body.
    pub fn accepted(&self, data: impl Serialize) -> Response {
        self.apply(Response::json_value(202, &data))
    }

    /// 204 with no body.
    pub fn no_content(&self) -> Response {
        self.apply(Response::new(204))
    }

    // ----- error terminals -----

    pub fn bad_request(
        &self,
        message: impl Into<String>,
        code: Option<ErrorCode>,
        details: Option<Value>,
    ) -> Response {
        self.apply(Response::error(400, message, code, details))
    }

    pub fn unauthorized(
        &self,
        message: impl Into<String>,
        code: Option<ErrorCode>,
        details: Option<Value>,
    ) -> Response {
        self.apply(Response::error(401, message, code, details))
    }

    pub fn forbidden(
        &self,
        message: impl Into<String>,
        code: Option<ErrorCode>,
        details: Option<Value>,
    ) -> Response {
        self.apply(Response::error(403, message, code, details))
    }

    pub fn not_found(
        &self,
        message: impl Into<String>,
        code: Option<ErrorCode>,
        details: Option<Value>,
    ) -> Response {
        self.apply(Response::error(404, message, code, details))
    }

    pub fn conflict(
        &self,
        message: impl Into<String>,
        code: Option<ErrorCode>,
        details: Option<Value>,
    ) -> Response {
        self.apply(Response::error(409, message, code, details))
    }

    pub fn internal_error(
        &self,
        message: impl Into<String>,
        code: Option<ErrorCode>,
        details: Option<Value>,
    ) -> Response {
        self.apply(Response::error(500, message, code, details))
    }

    // ----- content terminals -----

    /// 200 `text/plain` response.
    pub fn text(&self, body: impl Into<String>) -> Response {
        let mut response = Response::new(200);
        response.body = Body::Text(body.into());
        response.set_header("Content-Type", "text/plain; charset=utf-8");
        self.apply(response)
    }

    /// 200 `text/html` response.
    pub fn html(&self, body: impl Into<String>) -> Response {
        let mut response = Response::new(200);
        response.body = Body::Text(body.into());
        response.set_header("Content-Type", "text/html; charset=utf-8");
        self.apply(response)
    }

    /// JSON response with an explicit status.
    pub fn json(&self, data: impl Serialize, status_code: u16) -> Response {
        self.apply(Response::json_value(status_code, &data))
    }

    /// Serve a file from disk. A missing file yields the standard 404
    /// `FILE_NOT_FOUND` envelope; an unreadable one a 500.
    pub async fn file(&self, path: impl AsRef<std::path::Path>) -> Response {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let mime = mime_guess::from_path(path).first_or_octet_stream();
                let mut response = Response::new(200);
                response.body = Body::Bytes(bytes);
                response.set_header("Content-Type", mime.to_string());
                self.apply(response)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => self.apply(Response::error(
                404,
                "File not found",
                Some(ErrorCode::FileNotFound),
                None,
            )),
            Err(err) => self.apply(Response::error(
                500,
                "Failed to read file",
                Some(ErrorCode::InternalError),
                Some(Value::String(err.to_string())),
            )),
        }
    }

    /// Stream a body. Content type defaults to `application/octet-stream`.
    pub fn stream(
        &self,
        stream: impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static,
        content_type: Option<&str>,
    ) -> Response {
        let mut response = Response::new(200);
        response.body = Body::Stream(Box::pin(stream));
        response.set_header(
            "Content-Type",
            content_type.unwrap_or("application/octet-stream"),
        );
        self.apply(response)
    }

    /// Redirect to a URL. Status defaults to 302.
    pub fn redirect(&self, location: impl Into<String>, status_code: Option<u16>) -> Response {
        let mut response = Response::new(status_code.unwrap_or(302));
        response.set_header("Location", location.into());
        self.apply(response)
    }

    /// Redirect to a registered route path, substituting `:name` and
    /// `:name*` segments from the parameter map.
    pub fn redirect_to(
        &self,
        route_path: &str,
        params: &HashMap<String, String>,
        status_code: Option<u16>,
    ) -> Response {
        self.redirect(substitute_params(route_path, params), status_code)
    }

    /// Apply the accumulated modifiers to a response built elsewhere.
    pub fn custom(&self, response: Response) -> Response {
        self.apply(response)
    }
}

/// Replace `:name` and `:name*` segments of a route path with values from
/// the parameter map. Unknown parameters are left as-is.
fn substitute_params(route_path: &str, params: &HashMap<String, String>) -> String {
    let substituted: Vec<String> = route_path
        .split('/')
        .map(|segment| {
            let Some(raw) = segment.strip_prefix(':') else {
                return segment.to_string();
            };
            let name = raw.strip_suffix('*').unwrap_or(raw);
            match params.get(name) {
                Some(value) => value.clone(),
                None => segment.to_string(),
            }
        })
        .collect();
    substituted.join("/")
}
