//! State export/import for backups and moving a game between hosts.
//!
//! The export is the full table set. Token rows only carry hashes, so an
//! export never contains a usable link.

use super::AppState;
use crate::error::{GameError, GameResult};
use crate::store::Tables;
use crate::types::RoundStatus;
use serde::{Deserialize, Serialize};

/// Schema version for export format compatibility
/// Version 1: players, rounds, assignments, reports, token hashes
/// Version 2: Round.winner_id
pub const EXPORT_SCHEMA_VERSION: u32 = 2;

/// A serializable snapshot of the whole game
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateExport {
    /// Schema version for forward compatibility
    pub schema_version: u32,
    /// Export timestamp (ISO8601)
    pub exported_at: String,
    #[serde(flatten)]
    pub tables: Tables,
}

impl GameStateExport {
    pub fn new(tables: Tables) -> Self {
        Self {
            schema_version: EXPORT_SCHEMA_VERSION,
            exported_at: chrono::Utc::now().to_rfc3339(),
            tables,
        }
    }

    /// Validate the export before import
    pub fn validate(&self) -> GameResult<()> {
        if self.schema_version > EXPORT_SCHEMA_VERSION {
            return Err(GameError::Validation(format!(
                "Export schema version {} is newer than supported version {}. \
                 Please update the server.",
                self.schema_version, EXPORT_SCHEMA_VERSION
            )));
        }

        let tables = &self.tables;
        tables.check_references()?;
        tables.check_edge_constraints()?;

        // Active edges only make sense inside the running round
        for edge in tables.assignments.values().filter(|a| a.active) {
            let live = tables
                .rounds
                .get(&edge.round_id)
                .is_some_and(|r| r.status == RoundStatus::Active);
            if !live {
                return Err(GameError::Validation(format!(
                    "Assignment '{}' is active but round '{}' is not",
                    edge.id, edge.round_id
                )));
            }
        }
        if let Some(round) = tables.active_round() {
            tables.verify_ring(&round.id)?;
        }
        Ok(())
    }
}

impl AppState {
    pub async fn export_state(&self) -> GameStateExport {
        GameStateExport::new(self.store.snapshot().await)
    }

    /// Replace every table with the imported snapshot
    pub async fn import_state(&self, export: GameStateExport) -> GameResult<()> {
        export.validate()?;
        let players = export.tables.players.len();
        self.store
            .transact(move |tx| {
                *tx = export.tables;
                Ok(())
            })
            .await?;
        tracing::info!(players, "State imported");
        Ok(())
    }
}
