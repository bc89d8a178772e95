use super::AppState;
use crate::error::{GameError, GameResult};
use crate::mail::templates;
use crate::store::Tables;
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupReceipt {
    pub player_id: PlayerId,
    pub status: PlayerStatus,
    pub mailed: bool,
    #[serde(skip)]
    pub verify_token: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Verified {
    pub player_id: PlayerId,
    /// False when the player was already past `pending`
    pub activated: bool,
}

/// What a hunter is allowed to see about their target
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TargetView {
    pub id: PlayerId,
    pub name: String,
    pub email: Option<String>,
    pub status: PlayerStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub total: usize,
    pub eliminated: usize,
    pub remaining: usize,
    pub sent: usize,
}

/// Loose shape check: something@domain.tld, no whitespace
fn is_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Resolve a target/report token to the hunter's current target
fn current_target(
    tables: &Tables,
    token: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> GameResult<TargetView> {
    let grant = tables.validate_token(token, purpose, now)?;
    let edge = tables
        .hunter_edge(&grant.player_id)
        .ok_or(GameError::NoActiveAssignment)?;
    let target = tables.player(&edge.target_id)?;
    Ok(TargetView {
        id: target.id.clone(),
        name: target.name.clone(),
        email: target.email.clone(),
        status: target.status,
    })
}

impl AppState {
    /// Register a pending player and mail them a verification link
    pub async fn signup(&self, name: &str, email: &str) -> GameResult<SignupReceipt> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GameError::Validation("name required".to_string()));
        }
        let email = email.trim().to_lowercase();
        if !is_email(&email) {
            return Err(GameError::Validation("valid email required".to_string()));
        }

        let now = Utc::now();
        let ttl = self.config.verify_token_ttl;
        let (player, verify_token) = self
            .store
            .transact(|tx| {
                if tx.active_round().is_some() {
                    return Err(GameError::SignupsClosed);
                }
                if tx.player_by_email(&email).is_some() {
                    return Err(GameError::DuplicateEmail);
                }
                let player = Player {
                    id: new_id(),
                    name: name.to_string(),
                    email: Some(email.clone()),
                    status: PlayerStatus::Pending,
                    created_at: now,
                };
                tx.players.insert(player.id.clone(), player.clone());
                let token = tx.issue_token(&player.id, TokenPurpose::Verify, ttl, None, now);
                Ok((player, token))
            })
            .await?;

        tracing::info!(player_id = %player.id, "Player signed up");

        let verify_url = self.config.link("/verify", &verify_token);
        let mailed = self
            .deliver_to(&player, "verification", |to| {
                templates::verify_signup(to, &player.name, &verify_url)
            })
            .await;

        Ok(SignupReceipt {
            player_id: player.id,
            status: player.status,
            mailed,
            verify_token,
        })
    }

    /// Redeem a verification token, moving the player from pending to active
    pub async fn verify(&self, token: &str) -> GameResult<Verified> {
        let now = Utc::now();
        let verified = self
            .store
            .transact(|tx| {
                let grant = tx.validate_token(token, TokenPurpose::Verify, now)?;
                let player = tx.player_mut(&grant.player_id)?;
                let activated = player.status == PlayerStatus::Pending;
                if activated {
                    player.status = PlayerStatus::Active;
                }
                tx.consume_token(token)?;
                Ok(Verified {
                    player_id: grant.player_id,
                    activated,
                })
            })
            .await?;

        tracing::info!(player_id = %verified.player_id, activated = verified.activated, "Player verified");
        Ok(verified)
    }

    /// Show the holder of a target token who they are hunting
    pub async fn view_target(&self, token: &str) -> GameResult<TargetView> {
        let now = Utc::now();
        self.store
            .read(|t| current_target(t, token, TokenPurpose::Target, now))
            .await
    }

    /// Show who a report token would report, without spending it
    pub async fn preview_report(&self, token: &str) -> GameResult<TargetView> {
        let now = Utc::now();
        self.store
            .read(|t| current_target(t, token, TokenPurpose::Report, now))
            .await
    }

    /// Mail every player the elimination tally
    pub async fn send_status_update(&self) -> GameResult<StatusUpdate> {
        let players: Vec<Player> = self
            .store
            .read(|t| t.players_sorted().into_iter().cloned().collect())
            .await;
        let total = players.len();
        let eliminated = players
            .iter()
            .filter(|p| p.status == PlayerStatus::Eliminated)
            .count();
        let remaining = total - eliminated;

        let sends = players.iter().map(|p| {
            self.deliver_to(p, "status update", move |to| {
                templates::status_update(to, &p.name, eliminated, remaining)
            })
        });
        let sent = futures::future::join_all(sends)
            .await
            .into_iter()
            .filter(|sent| *sent)
            .count();

        tracing::info!(total, eliminated, remaining, sent, "Status update sent");
        Ok(StatusUpdate {
            total,
            eliminated,
            remaining,
            sent,
        })
    }
}
