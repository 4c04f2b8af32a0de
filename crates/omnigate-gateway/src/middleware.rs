use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Auth configuration for the gateway.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Keys allowed to call the API. Empty together with `admin_keys` means
    /// no auth is required.
    pub api_keys: Vec<String>,
    /// Keys that may also call admin operations.
    pub admin_keys: Vec<String>,
}

impl AuthConfig {
    pub fn new(api_keys: Vec<String>, admin_keys: Vec<String>) -> Self {
        Self {
            api_keys,
            admin_keys,
        }
    }

    /// Returns true if authentication is enabled (at least one key configured).
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty() || !self.admin_keys.is_empty()
    }

    fn accepts(&self, key: &str) -> bool {
        self.api_keys.iter().any(|k| k == key) || self.admin_keys.iter().any(|k| k == key)
    }

    /// An admin key always grants admin. Without configured admin keys the
    /// `x-role: admin` header does.
    pub fn is_admin(&self, headers: &HeaderMap) -> bool {
        if let Some(key) = presented_key(headers) {
            if self.admin_keys.iter().any(|k| k == key) {
                return true;
            }
        }
        self.admin_keys.is_empty()
            && headers
                .get("x-role")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|role| role.eq_ignore_ascii_case("admin"))
    }
}

/// `Authorization: Bearer <key>` first, then `x-api-key: <key>`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))
}

/// Auth middleware: validates the API key when any keys are configured.
pub async fn auth_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }

    match presented_key(&headers) {
        Some(k) if auth.accepts(k) => next.run(request).await,
        Some(_) => {
            warn!("Rejected request: invalid API key");
            (StatusCode::UNAUTHORIZED, "Invalid API key").into_response()
        }
        None => {
            warn!("Rejected request: missing API key");
            (StatusCode::UNAUTHORIZED, "API key required").into_response()
        }
    }
}

/// Admin middleware: guards operations that change the orchestrator itself.
pub async fn admin_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if auth.is_admin(&headers) {
        return next.run(request).await;
    }
    warn!(path = %request.uri().path(), "Rejected request: admin role required");
    (StatusCode::FORBIDDEN, "Admin role required").into_response()
}
