//! HTTP API endpoints.
//!
//! Player routes are authorized by the emailed token alone. Admin routes sit
//! behind Basic auth and the sweep trigger behind a shared secret.

use axum::{
    body::Bytes,
    extract::{Query, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;

use crate::auth::{self, AdminAuthConfig, SweepSecret};
use crate::error::{GameError, GameResult};
use crate::protocol::*;
use crate::state::export::GameStateExport;
use crate::state::{AppState, ResetOptions, TargetView};
use crate::store::RingView;

fn respond<T: Serialize>(result: GameResult<T>) -> Response {
    match result {
        Ok(body) => ok(body).into_response(),
        Err(e) => e.into_response(),
    }
}

fn token_of(token: Option<String>) -> Option<String> {
    token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Admin bodies are optional; an empty body means "all defaults"
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> GameResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| GameError::Validation(format!("invalid body: {}", e)))
}

#[derive(Serialize)]
struct TargetReply {
    target: TargetView,
}

#[derive(Serialize)]
struct RingReply {
    ring: Option<RingView>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Health {
    mailer: String,
    players: usize,
    round_active: bool,
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    let (players, round_active) = state
        .store
        .read(|t| (t.players.len(), t.active_round().is_some()))
        .await;
    respond(Ok(Health {
        mailer: state.mailer.name().to_string(),
        players,
        round_active,
    }))
}

/// POST /api/signup
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupRequest>,
) -> Response {
    respond(state.signup(&body.name, &body.email).await)
}

/// POST /api/verify
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Response {
    let Some(token) = token_of(body.token) else {
        return missing_token();
    };
    respond(state.verify(&token).await)
}

async fn target(state: &AppState, token: Option<String>) -> Response {
    let Some(token) = token_of(token) else {
        return missing_token();
    };
    respond(
        state
            .view_target(&token)
            .await
            .map(|target| TargetReply { target }),
    )
}

/// GET /api/target?token=...
pub async fn target_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    target(&state, query.token).await
}

/// POST /api/target
pub async fn target_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Response {
    target(&state, body.token).await
}

/// POST /api/report/preview
///
/// Shows who the report would eliminate without spending the token.
pub async fn report_preview(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Response {
    let Some(token) = token_of(body.token) else {
        return missing_token();
    };
    respond(
        state
            .preview_report(&token)
            .await
            .map(|target| TargetReply { target }),
    )
}

/// POST /api/report
pub async fn report(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Response {
    let Some(token) = token_of(body.token) else {
        return missing_token();
    };
    respond(state.submit_report(&token).await)
}

async fn confirm(state: &AppState, token: Option<String>) -> Response {
    let Some(token) = token_of(token) else {
        return missing_token();
    };
    respond(state.confirm_elimination(&token).await)
}

/// GET /api/report/confirm?token=... (the emailed link)
pub async fn confirm_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    confirm(&state, query.token).await
}

/// POST /api/report/confirm
pub async fn confirm_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Response {
    confirm(&state, body.token).await
}

async fn dispute(state: &AppState, token: Option<String>) -> Response {
    let Some(token) = token_of(token) else {
        return missing_token();
    };
    respond(state.dispute_elimination(&token).await)
}

/// GET /api/report/dispute?token=... (the emailed link)
pub async fn dispute_get(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Response {
    dispute(&state, query.token).await
}

/// POST /api/report/dispute
pub async fn dispute_post(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenRequest>,
) -> Response {
    dispute(&state, body.token).await
}

/// GET|POST /api/cron/auto-approve
pub async fn auto_approve(State(state): State<Arc<AppState>>) -> Response {
    let summary = state.auto_approve_due().await;
    respond(Ok(summary))
}

/// POST /api/admin/start-round
pub async fn start_round(State(state): State<Arc<AppState>>) -> Response {
    respond(state.start_round().await)
}

/// POST /api/admin/end-game
///
/// Body (optional): `{ "winnerId": "..." }`
pub async fn end_game(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: EndGameRequest = match optional_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    respond(state.end_round(request.winner_id).await)
}

/// POST /api/admin/clear-game
///
/// Defaults: players are deleted, verify tokens are deleted.
pub async fn clear_game(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ResetRequest = match optional_body(&body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    let opts = ResetOptions {
        keep_players: request.keep_players,
        delete_verify_tokens: request.delete_verify_tokens,
        reset_player_statuses: request.reset_player_statuses,
    };
    respond(state.reset_game(opts).await)
}

/// POST /api/admin/send-update
pub async fn send_update(State(state): State<Arc<AppState>>) -> Response {
    respond(state.send_status_update().await)
}

/// GET /api/admin/ring
pub async fn ring(State(state): State<Arc<AppState>>) -> Response {
    let ring = state.store.read(|t| t.ring_view()).await;
    respond(Ok(RingReply { ring }))
}

/// Export the entire game state as JSON.
///
/// GET /api/admin/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<GameStateExport> {
    Json(state.export_state().await)
}

/// Import a game state snapshot, replacing all current rows.
///
/// POST /api/admin/state/import
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<GameStateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => respond(Ok(serde_json::json!({}))),
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            e.into_response()
        }
    }
}

/// All routes, with admin auth and the sweep secret layered on their groups
pub fn router(
    state: Arc<AppState>,
    admin_auth: Arc<AdminAuthConfig>,
    sweep_secret: Arc<SweepSecret>,
) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/start-round", post(start_round))
        .route("/api/admin/end-game", post(end_game))
        .route("/api/admin/clear-game", post(clear_game))
        .route("/api/admin/send-update", post(send_update))
        .route("/api/admin/ring", get(ring))
        .route("/api/admin/state/export", get(export_state))
        .route("/api/admin/state/import", post(import_state))
        .layer(middleware::from_fn_with_state(
            admin_auth,
            auth::admin_auth_middleware,
        ));

    let cron_routes = Router::new()
        .route("/api/cron/auto-approve", get(auto_approve).post(auto_approve))
        .layer(middleware::from_fn_with_state(
            sweep_secret,
            auth::sweep_secret_middleware,
        ));

    Router::new()
        .route("/api/health", get(health))
        .route("/api/signup", post(signup))
        .route("/api/verify", post(verify))
        .route("/api/target", get(target_get).post(target_post))
        .route("/api/report", post(report))
        .route("/api/report/preview", post(report_preview))
        .route("/api/report/confirm", get(confirm_get).post(confirm_post))
        .route("/api/report/dispute", get(dispute_get).post(dispute_post))
        .merge(cron_routes)
        .merge(admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_body() {
        let empty: ResetRequest = optional_body(&Bytes::from_static(b"  ")).unwrap();
        assert!(empty.delete_verify_tokens);

        let given: EndGameRequest =
            optional_body(&Bytes::from_static(br#"{"winnerId":"p1"}"#)).unwrap();
        assert_eq!(given.winner_id.as_deref(), Some("p1"));

        assert!(matches!(
            optional_body::<EndGameRequest>(&Bytes::from_static(b"{nope")),
            Err(GameError::Validation(_))
        ));
    }

    #[test]
    fn test_token_of_trims_and_rejects_blank() {
        assert_eq!(token_of(Some(" abc ".into())).as_deref(), Some("abc"));
        assert_eq!(token_of(Some("   ".into())), None);
        assert_eq!(token_of(None), None);
    }
}
