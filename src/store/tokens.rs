//! Token Service: single-use, purpose-scoped, expiring capability tokens.
//!
//! The primitives live on [`Tables`] so that consuming a token happens in the
//! same transaction as the state change it authorizes. The async helpers on
//! [`RingStore`] wrap each primitive in its own transaction for standalone use.

use super::{RingStore, Tables};
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Fresh opaque secret (64 hex chars)
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes[..]);
    hex::encode(bytes)
}

/// Storage key for a secret
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

impl Tables {
    /// Store a new unconsumed token and return its secret
    pub fn issue_token(
        &mut self,
        player_id: &str,
        purpose: TokenPurpose,
        ttl: Duration,
        report_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> String {
        let token = generate_token();
        let row = EmailToken {
            token_hash: hash_token(&token),
            purpose,
            player_id: player_id.to_string(),
            report_id: report_id.map(str::to_string),
            expires_at: now + ttl,
            consumed: false,
        };
        self.tokens.insert(row.token_hash.clone(), row);
        token
    }

    /// Row for a secret regardless of its state
    pub fn lookup_token(&self, token: &str) -> Option<&EmailToken> {
        if token.is_empty() {
            return None;
        }
        self.tokens.get(&hash_token(token))
    }

    /// Check a token without consuming it.
    ///
    /// Unknown, consumed and expired tokens are all reported the same way so
    /// a consumed token never validates again, whatever purpose is asked for.
    pub fn validate_token(
        &self,
        token: &str,
        expected: TokenPurpose,
        now: DateTime<Utc>,
    ) -> GameResult<EmailToken> {
        let row = self
            .lookup_token(token)
            .ok_or(GameError::InvalidOrExpiredToken)?;
        if row.consumed || row.is_expired(now) {
            return Err(GameError::InvalidOrExpiredToken);
        }
        if row.purpose != expected {
            tracing::debug!(
                expected = expected.as_str(),
                presented = row.purpose.as_str(),
                "Token used for the wrong action"
            );
            return Err(GameError::TokenPurposeMismatch);
        }
        Ok(row.clone())
    }

    /// Mark a token used; consuming twice is a no-op
    pub fn consume_token(&mut self, token: &str) -> GameResult<()> {
        let row = self
            .tokens
            .get_mut(&hash_token(token))
            .ok_or(GameError::InvalidOrExpiredToken)?;
        row.consumed = true;
        Ok(())
    }

    /// Consume every open confirm/dispute token of a report
    pub fn consume_report_action_tokens(&mut self, report_id: &str) -> usize {
        self.consume_where(|t| {
            t.report_id.as_deref() == Some(report_id)
                && matches!(
                    t.purpose,
                    TokenPurpose::ConfirmElim | TokenPurpose::DisputeElim
                )
        })
    }

    /// Consume every open token of one purpose held by a player
    pub fn consume_player_tokens(&mut self, player_id: &str, purpose: TokenPurpose) -> usize {
        self.consume_where(|t| t.player_id == player_id && t.purpose == purpose)
    }

    fn consume_where(&mut self, pred: impl Fn(&EmailToken) -> bool) -> usize {
        let mut count = 0;
        for row in self.tokens.values_mut() {
            if !row.consumed && pred(row) {
                row.consumed = true;
                count += 1;
            }
        }
        count
    }

    /// Delete token rows matching `pred`, returning how many were removed
    pub fn delete_tokens(&mut self, pred: impl Fn(&EmailToken) -> bool) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, t| !pred(t));
        before - self.tokens.len()
    }
}

impl RingStore {
    pub async fn issue_token(
        &self,
        player_id: &str,
        purpose: TokenPurpose,
        ttl: Duration,
        report_id: Option<&str>,
    ) -> GameResult<String> {
        self.transact(|tx| {
            tx.player(player_id)?;
            if let Some(report_id) = report_id {
                tx.report(report_id)?;
            }
            Ok(tx.issue_token(player_id, purpose, ttl, report_id, Utc::now()))
        })
        .await
    }

    pub async fn validate_token(
        &self,
        token: &str,
        expected: TokenPurpose,
    ) -> GameResult<EmailToken> {
        self.read(|t| t.validate_token(token, expected, Utc::now()))
            .await
    }

    pub async fn consume_token(&self, token: &str) -> GameResult<()> {
        self.transact(|tx| tx.consume_token(token)).await
    }
}
