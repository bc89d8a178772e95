use super::elimination::close_round;
use super::AppState;
use crate::error::{GameError, GameResult};
use crate::mail::templates;
use crate::types::*;
use chrono::Utc;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStarted {
    pub round_id: RoundId,
    pub player_count: usize,
    /// Round-start mails the gateway accepted
    pub mailed: usize,
    /// hunter id -> target token
    #[serde(skip)]
    pub target_tokens: HashMap<PlayerId, String>,
    /// hunter id -> report token
    #[serde(skip)]
    pub report_tokens: HashMap<PlayerId, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundEnded {
    pub round_ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round_id: Option<RoundId>,
    /// Active edges switched off
    pub deactivated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetOptions {
    pub keep_players: bool,
    pub delete_verify_tokens: bool,
    /// Only meaningful with `keep_players`
    pub reset_player_statuses: bool,
}

impl Default for ResetOptions {
    fn default() -> Self {
        Self {
            keep_players: false,
            delete_verify_tokens: true,
            reset_player_statuses: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResetSummary {
    pub deleted_reports: usize,
    pub deleted_assignments: usize,
    pub deleted_rounds: usize,
    pub deleted_players: usize,
    pub deleted_tokens: usize,
    pub kept_players: bool,
    pub reset_players: usize,
}

impl AppState {
    /// Start a round over every active player in a random ring order
    pub async fn start_round(&self) -> GameResult<RoundStarted> {
        self.start_round_with(|order| order.shuffle(&mut rand::rng()))
            .await
    }

    /// Start a round, letting `arrange` decide the ring order.
    ///
    /// `arrange` receives the active players and must leave a permutation of
    /// them behind; hunter `order[i]` is assigned `order[i + 1]`.
    pub async fn start_round_with<A>(&self, arrange: A) -> GameResult<RoundStarted>
    where
        A: FnOnce(&mut Vec<PlayerId>) + Send,
    {
        let now = Utc::now();
        let ttl = self.config.play_token_ttl;

        let (mut started, players) = self
            .store
            .transact(|tx| {
                if tx.active_round().is_some() {
                    return Err(GameError::RoundAlreadyActive);
                }
                let active: Vec<PlayerId> = tx
                    .players_sorted()
                    .into_iter()
                    .filter(|p| p.status == PlayerStatus::Active)
                    .map(|p| p.id.clone())
                    .collect();
                if active.len() < 2 {
                    return Err(GameError::InsufficientPlayers {
                        found: active.len(),
                    });
                }

                let mut order = active.clone();
                arrange(&mut order);
                let mut check = order.clone();
                check.sort();
                let mut expected = active;
                expected.sort();
                if check != expected {
                    return Err(GameError::Validation(
                        "ring order must list every active player exactly once".to_string(),
                    ));
                }

                let round_id = tx.create_round(now);
                tx.create_ring(&round_id, &order);

                let mut target_tokens = HashMap::new();
                let mut report_tokens = HashMap::new();
                let mut players = Vec::with_capacity(order.len());
                for hunter_id in &order {
                    target_tokens.insert(
                        hunter_id.clone(),
                        tx.issue_token(hunter_id, TokenPurpose::Target, ttl, None, now),
                    );
                    report_tokens.insert(
                        hunter_id.clone(),
                        tx.issue_token(hunter_id, TokenPurpose::Report, ttl, None, now),
                    );
                    players.push(tx.player(hunter_id)?.clone());
                }
                tx.verify_ring(&round_id)?;

                let started = RoundStarted {
                    round_id,
                    player_count: order.len(),
                    mailed: 0,
                    target_tokens,
                    report_tokens,
                };
                Ok((started, players))
            })
            .await?;

        tracing::info!(
            round_id = %started.round_id,
            players = started.player_count,
            "Round started"
        );

        let sends = players.iter().map(|p| {
            let target_url = self.config.link("/target", &started.target_tokens[&p.id]);
            let report_url = self.config.link("/report", &started.report_tokens[&p.id]);
            async move {
                self.deliver_to(p, "round links", |to| {
                    templates::round_links(to, &p.name, &target_url, &report_url)
                })
                .await
            }
        });
        let mailed = futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|sent| *sent)
            .count();
        started.mailed = mailed;

        Ok(started)
    }

    /// Admin end: close the active round (if any) and switch off every edge.
    ///
    /// Safe to repeat; a second call finds nothing to do.
    pub async fn end_round(&self, winner_id: Option<PlayerId>) -> GameResult<RoundEnded> {
        let now = Utc::now();
        let ended = self
            .store
            .transact(|tx| {
                if let Some(winner) = &winner_id {
                    tx.player(winner)?;
                }
                let round_id = tx.active_round().map(|r| r.id.clone());
                let mut deactivated = 0;
                if let Some(round_id) = &round_id {
                    deactivated = tx.ring_size(round_id);
                    close_round(tx, round_id, winner_id, now)?;
                }
                // Edges left over from earlier rounds
                deactivated += tx.deactivate_edges(None);
                Ok(RoundEnded {
                    round_ended: round_id.is_some(),
                    round_id,
                    deactivated,
                })
            })
            .await?;

        if ended.round_ended {
            tracing::info!(round_id = ?ended.round_id, deactivated = ended.deactivated, "Round ended by admin");
        } else {
            tracing::debug!("End requested with no active round");
        }
        Ok(ended)
    }

    /// Wipe game data. Children go before parents so no row is left dangling.
    pub async fn reset_game(&self, opts: ResetOptions) -> GameResult<ResetSummary> {
        let summary = self
            .store
            .transact(|tx| {
                let mut summary = ResetSummary {
                    kept_players: opts.keep_players,
                    ..ResetSummary::default()
                };

                summary.deleted_tokens = tx
                    .delete_tokens(|t| t.purpose.is_gameplay() || opts.delete_verify_tokens);
                summary.deleted_reports = tx.reports.len();
                tx.reports.clear();
                summary.deleted_assignments = tx.assignments.len();
                tx.assignments.clear();
                summary.deleted_rounds = tx.rounds.len();
                tx.rounds.clear();

                if opts.keep_players {
                    for player in tx.players.values_mut() {
                        let reset = match player.status {
                            PlayerStatus::EliminationInProgress => true,
                            PlayerStatus::Eliminated => opts.reset_player_statuses,
                            _ => false,
                        };
                        if reset {
                            player.status = PlayerStatus::Active;
                            summary.reset_players += 1;
                        }
                    }
                } else {
                    summary.deleted_tokens += tx.delete_tokens(|_| true);
                    summary.deleted_players = tx.players.len();
                    tx.players.clear();
                }
                Ok(summary)
            })
            .await?;

        tracing::info!(?summary, "Game reset");
        Ok(summary)
    }
}
