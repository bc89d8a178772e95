use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque ID types for type safety
pub type PlayerId = String;
pub type RoundId = String;
pub type AssignmentId = String;
pub type ReportId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PlayerStatus {
    /// Signed up, email not yet verified
    Pending,
    Active,
    /// Targeted by a pending report
    EliminationInProgress,
    Eliminated,
}

impl PlayerStatus {
    /// Still in the game (mid-review players have not been eliminated yet)
    pub fn is_alive(&self) -> bool {
        matches!(
            self,
            PlayerStatus::Active | PlayerStatus::EliminationInProgress
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Active,
    Ended,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Approved,
    Disputed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Verify,
    Target,
    Report,
    ConfirmElim,
    DisputeElim,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Verify => "verify",
            TokenPurpose::Target => "target",
            TokenPurpose::Report => "report",
            TokenPurpose::ConfirmElim => "confirm_elim",
            TokenPurpose::DisputeElim => "dispute_elim",
        }
    }

    /// Gameplay tokens are cleared on every reset, verify tokens only on request
    pub fn is_gameplay(&self) -> bool {
        !matches!(self, TokenPurpose::Verify)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub email: Option<String>,
    pub status: PlayerStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: RoundId,
    pub status: RoundStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub winner_id: Option<PlayerId>,
}

/// One directed hunter -> target edge of the ring
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: AssignmentId,
    pub round_id: RoundId,
    pub hunter_id: PlayerId,
    pub target_id: PlayerId,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: ReportId,
    pub round_id: RoundId,
    pub hunter_id: PlayerId,
    pub target_id: PlayerId,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub pending_until: DateTime<Utc>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
}

/// A stored capability token.
///
/// Only the SHA-256 hash of the secret is kept; the secret itself exists in
/// the outgoing link and nowhere else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailToken {
    pub token_hash: String,
    pub purpose: TokenPurpose,
    pub player_id: PlayerId,
    pub report_id: Option<ReportId>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

impl EmailToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

pub fn new_id() -> String {
    ulid::Ulid::new().to_string()
}
