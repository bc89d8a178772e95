//! HTTP Basic Authentication for admin routes and the shared secret that
//! guards the auto-approve trigger.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use std::sync::Arc;

use crate::config::env_string;
use crate::protocol::{ErrorBody, SecretQuery};

/// Admin authentication configuration
#[derive(Debug, Clone, Default)]
pub struct AdminAuthConfig {
    /// Username for admin routes (None = auth disabled)
    pub username: Option<String>,
    pub password: Option<String>,
}

impl AdminAuthConfig {
    /// ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        let username = env_string("ADMIN_USERNAME");
        let password = env_string("ADMIN_PASSWORD");

        if username.is_some() && password.is_some() {
            tracing::info!("Admin authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "ADMIN_USERNAME and ADMIN_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Admin authentication DISABLED - anyone can call admin routes!");
            Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate credentials
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                // Both comparisons always run
                let user_ok = constant_time_eq(u.as_bytes(), username.as_bytes());
                let pass_ok = constant_time_eq(p.as_bytes(), password.as_bytes());
                user_ok & pass_ok
            }
            _ => true,
        }
    }

    /// Check an `Authorization: Basic ...` header value
    fn accepts_header(&self, value: &str) -> bool {
        let Some(credentials) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(credentials.trim())
        else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((username, password)) => self.validate(username, password),
            None => false,
        }
    }
}

/// Constant-time byte comparison
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

fn bearer(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Decoded `?secret=` value
fn secret_param(request: &Request<Body>) -> Option<String> {
    Query::<SecretQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.secret)
}

/// Middleware for HTTP Basic Authentication on admin routes
pub async fn admin_auth_middleware(
    State(auth_config): State<Arc<AdminAuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !auth_config.is_enabled() {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .is_some_and(|h| auth_config.accepts_header(h));
    if authorized {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Assassin Admin\"")],
        Json(ErrorBody::new("unauthorized", "UNAUTHORIZED")),
    )
        .into_response()
}

/// Secret expected by the auto-approve trigger (None = open)
#[derive(Debug, Clone, Default)]
pub struct SweepSecret(pub Option<String>);

impl SweepSecret {
    /// Accepts `?secret=...` or `Authorization: Bearer ...`
    pub fn accepts(&self, request: &Request<Body>) -> bool {
        let Some(expected) = &self.0 else {
            return true;
        };
        let from_query = secret_param(request);
        let accepted = [from_query.as_deref(), bearer(request)]
            .into_iter()
            .flatten()
            .any(|given| constant_time_eq(expected.as_bytes(), given.as_bytes()));
        accepted
    }
}

pub async fn sweep_secret_middleware(
    State(secret): State<Arc<SweepSecret>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if secret.accepts(&request) {
        return next.run(request).await;
    }
    tracing::warn!("Rejected auto-approve trigger with a bad secret");
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody::new("unauthorized", "UNAUTHORIZED")),
    )
        .into_response()
}
