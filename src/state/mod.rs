mod elimination;
pub mod export;
mod notify;
mod player;
mod round;

pub use elimination::{Finalized, ReportSubmitted, SweepItem, SweepSummary};
pub use player::{SignupReceipt, StatusUpdate, TargetView, Verified};
pub use round::{ResetOptions, ResetSummary, RoundEnded, RoundStarted};

use crate::config::GameConfig;
use crate::mail::{LogMailer, Mailer};
use crate::store::RingStore;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RingStore>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<GameConfig>,
}

impl AppState {
    /// In-memory state with default config; mail only goes to the log
    pub fn new() -> Self {
        Self::with_parts(RingStore::new(), Arc::new(LogMailer), GameConfig::default())
    }

    pub fn with_parts(store: RingStore, mailer: Arc<dyn Mailer>, config: GameConfig) -> Self {
        Self {
            store: Arc::new(store),
            mailer,
            config: Arc::new(config),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mail::RecordingMailer;
    use crate::types::*;

    /// State with a recording mailer and the default (staged) config
    pub(crate) fn test_state() -> (AppState, RecordingMailer) {
        test_state_with(GameConfig::default())
    }

    pub(crate) fn test_state_with(config: GameConfig) -> (AppState, RecordingMailer) {
        let mailer = RecordingMailer::new();
        let state = AppState::with_parts(RingStore::new(), Arc::new(mailer.clone()), config);
        (state, mailer)
    }

    /// Sign up and verify a player, returning their id
    pub(crate) async fn active_player(state: &AppState, name: &str) -> PlayerId {
        let email = format!("{}@example.com", name.to_lowercase());
        let receipt = state.signup(name, &email).await.unwrap();
        let token = receipt.verify_token.clone();
        state.verify(&token).await.unwrap();
        receipt.player_id
    }

    /// Players named `names` in a ring following the given order
    pub(crate) async fn ring(state: &AppState, names: &[&str]) -> (RoundStarted, Vec<PlayerId>) {
        let mut ids = Vec::new();
        for name in names {
            ids.push(active_player(state, name).await);
        }
        let order = ids.clone();
        let started = state
            .start_round_with(move |players| *players = order)
            .await
            .unwrap();
        (started, ids)
    }

    #[test]
    fn test_default_state_is_empty_staged_game() {
        let state = AppState::default();
        assert_eq!(
            state.config.policy,
            crate::config::EliminationPolicy::Staged
        );
        assert_eq!(state.mailer.name(), "log");
    }
}
