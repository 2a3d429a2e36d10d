//! Shared admin code and player session extraction

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, Response, StatusCode},
    middleware::Next,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::state::AppState;

/// Default admin code, only meant for local parties
pub const DEFAULT_ADMIN_CODE: &str = "nye2026admin";

pub const ADMIN_CODE_HEADER: &str = "x-admin-code";
pub const ADMIN_CODE_COOKIE: &str = "admin_code";
pub const SESSION_COOKIE: &str = "session_token";

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub admin_code: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_code: DEFAULT_ADMIN_CODE.to_string(),
        }
    }
}

impl AuthConfig {
    pub fn new(admin_code: impl Into<String>) -> Self {
        Self {
            admin_code: admin_code.into(),
        }
    }

    /// Load the admin code from ADMIN_CODE
    pub fn from_env() -> Self {
        match std::env::var("ADMIN_CODE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        {
            Some(code) => {
                tracing::info!("Admin code loaded from environment");
                Self { admin_code: code }
            }
            None => {
                tracing::warn!(
                    "ADMIN_CODE not set, using the built-in default. Anyone who knows it can run the game!"
                );
                Self::default()
            }
        }
    }

    pub fn validate(&self, code: &str) -> bool {
        constant_time_eq(self.admin_code.as_bytes(), code.as_bytes())
    }
}

/// Constant-time byte comparison to prevent timing attacks
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

fn query_param<'a>(request: &'a Request<Body>, key: &str) -> Option<&'a str> {
    let query = request.uri().query()?;
    for pair in query.split('&') {
        let Some((k, v)) = pair.split_once('=') else {
            continue;
        };
        if k == key {
            return Some(v);
        }
    }
    None
}

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(raw) = value.to_str() else {
            continue;
        };
        for pair in raw.split(';') {
            if let Some((k, v)) = pair.trim().split_once('=') {
                if k == name && !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

/// Session token from `Authorization: Bearer` or the session cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    bearer.or_else(|| cookie_value(headers, SESSION_COOKIE))
}

/// Admin code from `?code=`, the `X-Admin-Code` header or the admin cookie
pub fn admin_code(request: &Request<Body>) -> Option<String> {
    if let Some(code) = query_param(request, "code") {
        return Some(code.to_string());
    }
    if let Some(code) = request
        .headers()
        .get(ADMIN_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(code.to_string());
    }
    cookie_value(request.headers(), ADMIN_CODE_COOKIE)
}

/// Middleware guarding the admin HTTP routes
pub async fn admin_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let authorized = admin_code(&request)
        .map(|code| state.auth.validate(&code))
        .unwrap_or(false);

    if authorized {
        return next.run(request).await;
    }

    tracing::warn!("Rejected admin request to {}", request.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "code": "UNAUTHORIZED",
            "error": "Invalid admin code",
        })),
    )
        .into_response()
}
