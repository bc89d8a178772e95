//! Post-commit notifications.
//!
//! Everything here runs after the transaction committed. Failures are logged
//! and swallowed.

use super::AppState;
use crate::mail::{templates, OutgoingMail};
use crate::types::Player;

impl AppState {
    /// Hand one message to the gateway; returns whether it was accepted
    pub(crate) async fn deliver(&self, mail: OutgoingMail, context: &str) -> bool {
        let to = mail.to.clone();
        match self.mailer.send(mail).await {
            Ok(message_id) => {
                tracing::debug!(%to, %message_id, "Sent {} mail", context);
                true
            }
            Err(e) => {
                tracing::warn!(%to, "sendMail failed ({}): {}", context, e);
                false
            }
        }
    }

    /// Deliver to a player if they have an address
    pub(crate) async fn deliver_to(
        &self,
        player: &Player,
        context: &str,
        build: impl FnOnce(&str) -> OutgoingMail,
    ) -> bool {
        match player.email.as_deref() {
            Some(email) if !email.is_empty() => self.deliver(build(email), context).await,
            _ => {
                tracing::debug!(player_id = %player.id, "No address, skipping {} mail", context);
                false
            }
        }
    }

    /// Tell every player the game is over; returns how many mails went out
    pub(crate) async fn notify_game_over(&self, players: &[Player], winner_id: Option<&str>) -> usize {
        let sends = players.iter().map(|p| {
            let is_winner = winner_id == Some(p.id.as_str());
            self.deliver_to(p, "game over", move |to| {
                templates::game_over(to, &p.name, is_winner)
            })
        });
        futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|sent| *sent)
            .count()
    }
}
