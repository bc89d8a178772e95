use crate::state::AppState;
use std::sync::Arc;
use std::time::Duration;

/// Spawn a background task that auto-approves overdue elimination reports.
///
/// Equivalent to hitting `/api/cron/auto-approve` every `interval`.
pub fn spawn_auto_approve_sweeper(state: Arc<AppState>, interval: Duration) {
    tokio::spawn(async move {
        tracing::info!("Auto-approve sweeper running every {:?}", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let summary = state.auto_approve_due().await;
            let failed = summary.results.iter().filter(|r| !r.ok).count();
            if failed > 0 {
                tracing::warn!(
                    "Sweeper: {} of {} due reports could not be approved",
                    failed,
                    summary.results.len()
                );
            }
        }
    });
}
