//! Ring Store: the durable rows of the game and their atomic mutation.
//!
//! All rows live in one [`Tables`] value behind a single lock. A transaction
//! runs against a working copy; the copy replaces the committed tables only
//! after the closure succeeded, the unique-edge constraints hold and (when
//! configured) the snapshot file was written. Any failure leaves the committed
//! state untouched.

mod ring;
mod tokens;

pub use ring::RingView;
pub use tokens::{generate_token, hash_token};

use crate::error::{GameError, GameResult};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Every persisted row, keyed by primary key
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tables {
    pub players: HashMap<PlayerId, Player>,
    pub rounds: HashMap<RoundId, Round>,
    pub assignments: HashMap<AssignmentId, Assignment>,
    pub reports: HashMap<ReportId, Report>,
    /// Keyed by token hash
    pub tokens: HashMap<String, EmailToken>,
}

impl Tables {
    pub fn player(&self, id: &str) -> GameResult<&Player> {
        self.players.get(id).ok_or(GameError::NotFound("player"))
    }

    pub fn player_mut(&mut self, id: &str) -> GameResult<&mut Player> {
        self.players.get_mut(id).ok_or(GameError::NotFound("player"))
    }

    pub fn set_player_status(&mut self, id: &str, status: PlayerStatus) -> GameResult<()> {
        self.player_mut(id)?.status = status;
        Ok(())
    }

    pub fn player_by_email(&self, email: &str) -> Option<&Player> {
        self.players
            .values()
            .find(|p| p.email.as_deref() == Some(email))
    }

    /// Players in signup order
    pub fn players_sorted(&self) -> Vec<&Player> {
        let mut players: Vec<_> = self.players.values().collect();
        players.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        players
    }

    pub fn count_players(&self, status: PlayerStatus) -> usize {
        self.players.values().filter(|p| p.status == status).count()
    }

    /// The single active round, if any
    pub fn active_round(&self) -> Option<&Round> {
        self.rounds
            .values()
            .find(|r| r.status == RoundStatus::Active)
    }

    pub fn round_mut(&mut self, id: &str) -> GameResult<&mut Round> {
        self.rounds.get_mut(id).ok_or(GameError::NotFound("round"))
    }

    pub fn report(&self, id: &str) -> GameResult<&Report> {
        self.reports.get(id).ok_or(GameError::NotFound("report"))
    }

    pub fn report_mut(&mut self, id: &str) -> GameResult<&mut Report> {
        self.reports.get_mut(id).ok_or(GameError::NotFound("report"))
    }

    /// Pending reports whose review window elapsed before `now`
    pub fn due_reports(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<ReportId> {
        let mut due: Vec<_> = self
            .reports
            .values()
            .filter(|r| r.status == ReportStatus::Pending && r.pending_until < now)
            .map(|r| r.id.clone())
            .collect();
        due.sort();
        due
    }

    /// Unique constraints: one active edge per (round, hunter) and per (round, target)
    pub fn check_edge_constraints(&self) -> GameResult<()> {
        let mut hunters = HashSet::new();
        let mut targets = HashSet::new();
        for edge in self.assignments.values().filter(|a| a.active) {
            if !hunters.insert((&edge.round_id, &edge.hunter_id)) {
                return Err(GameError::ConstraintViolation(format!(
                    "duplicate active edge for hunter {} in round {}",
                    edge.hunter_id, edge.round_id
                )));
            }
            if !targets.insert((&edge.round_id, &edge.target_id)) {
                return Err(GameError::ConstraintViolation(format!(
                    "duplicate active edge onto target {} in round {}",
                    edge.target_id, edge.round_id
                )));
            }
        }
        Ok(())
    }

    /// Every foreign key points at an existing row
    pub fn check_references(&self) -> GameResult<()> {
        let missing = |what: &str, id: &str| {
            Err(GameError::ConstraintViolation(format!(
                "{} references missing row {}",
                what, id
            )))
        };

        for edge in self.assignments.values() {
            if !self.rounds.contains_key(&edge.round_id) {
                return missing("assignment", &edge.round_id);
            }
            for player_id in [&edge.hunter_id, &edge.target_id] {
                if !self.players.contains_key(player_id) {
                    return missing("assignment", player_id);
                }
            }
        }
        for report in self.reports.values() {
            if !self.rounds.contains_key(&report.round_id) {
                return missing("report", &report.round_id);
            }
            for player_id in [&report.hunter_id, &report.target_id] {
                if !self.players.contains_key(player_id) {
                    return missing("report", player_id);
                }
            }
        }
        for token in self.tokens.values() {
            if !self.players.contains_key(&token.player_id) {
                return missing("token", &token.player_id);
            }
            if let Some(report_id) = &token.report_id {
                if !self.reports.contains_key(report_id) {
                    return missing("token", report_id);
                }
            }
        }
        if self
            .rounds
            .values()
            .filter(|r| r.status == RoundStatus::Active)
            .count()
            > 1
        {
            return Err(GameError::ConstraintViolation(
                "more than one active round".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared handle to the game rows
#[derive(Debug, Default)]
pub struct RingStore {
    tables: RwLock<Tables>,
    snapshot_path: Option<PathBuf>,
}

impl RingStore {
    /// In-memory store without persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Store persisted to `path`; loads the file if it exists
    pub async fn open(path: impl Into<PathBuf>) -> GameResult<Self> {
        let path = path.into();
        let tables = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let tables: Tables = serde_json::from_slice(&bytes).map_err(|e| {
                    GameError::Storage(format!("corrupt state file {}: {}", path.display(), e))
                })?;
                tables.check_references()?;
                tables.check_edge_constraints()?;
                tracing::info!(
                    "Loaded state from {} ({} players, {} rounds)",
                    path.display(),
                    tables.players.len(),
                    tables.rounds.len()
                );
                tables
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting empty", path.display());
                Tables::default()
            }
            Err(e) => {
                return Err(GameError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        Ok(Self {
            tables: RwLock::new(tables),
            snapshot_path: Some(path),
        })
    }

    /// Run a read-only query against the committed tables
    pub async fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.read().await;
        f(&tables)
    }

    /// Run `f` as one atomic unit.
    ///
    /// Writers are serialized by the lock; readers never observe the working
    /// copy, so partial application is impossible.
    pub async fn transact<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> GameResult<T>,
    ) -> GameResult<T> {
        let mut committed = self.tables.write().await;
        let mut working = committed.clone();

        let value = f(&mut working)?;
        working.check_edge_constraints()?;

        if let Some(path) = &self.snapshot_path {
            write_snapshot(path, &working).await?;
        }

        *committed = working;
        Ok(value)
    }

    /// Copy of the committed tables
    pub async fn snapshot(&self) -> Tables {
        self.tables.read().await.clone()
    }
}

async fn write_snapshot(path: &Path, tables: &Tables) -> GameResult<()> {
    let bytes = serde_json::to_vec(tables)
        .map_err(|e| GameError::Storage(format!("failed to serialize state: {}", e)))?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| GameError::Storage(format!("failed to write {}: {}", tmp.display(), e)))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| GameError::Storage(format!("failed to replace {}: {}", path.display(), e)))
}
