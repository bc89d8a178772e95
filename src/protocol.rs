//! HTTP request and response bodies.

use crate::error::GameError;
use crate::types::PlayerId;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Body of every token-driven POST
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub token: Option<String>,
}

/// `?token=` on emailed GET links
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndGameRequest {
    pub winner_id: Option<PlayerId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetRequest {
    pub keep_players: bool,
    pub delete_verify_tokens: bool,
    pub reset_player_statuses: bool,
}

impl Default for ResetRequest {
    fn default() -> Self {
        Self {
            keep_players: false,
            delete_verify_tokens: true,
            reset_player_statuses: false,
        }
    }
}

/// `?secret=` on the sweep trigger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecretQuery {
    pub secret: Option<String>,
}

/// Success envelope: `{"ok": true, ...body}`
#[derive(Debug, Serialize)]
pub struct Reply<T: Serialize> {
    ok: bool,
    #[serde(flatten)]
    body: T,
}

pub fn ok<T: Serialize>(body: T) -> Json<Reply<T>> {
    Json(Reply { ok: true, body })
}

/// Failure envelope: `{"ok": false, "error": ..., "code": ...}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            code: code.into(),
        }
    }
}

impl IntoResponse for GameError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(code = self.code(), "Request failed: {}", self);
        }
        (status, Json(ErrorBody::new(self.to_string(), self.code()))).into_response()
    }
}

/// 400 for a request that did not carry a token at all
pub fn missing_token() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new("missing token", "MISSING_TOKEN")),
    )
        .into_response()
}
