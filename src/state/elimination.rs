//! Elimination workflow: report submission, staged review, confirm/dispute
//! and the auto-approve sweep.
//!
//! A report is `pending` until it is approved (explicit confirm, sweep, or the
//! immediate policy) or disputed. The ring only changes at approval time, and
//! every approval goes through [`approve`], so there is exactly one rewiring
//! path.

use super::AppState;
use crate::config::EliminationPolicy;
use crate::error::{GameError, GameResult};
use crate::mail::templates;
use crate::store::Tables;
use crate::types::*;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Result of a report submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSubmitted {
    pub report_id: ReportId,
    pub pending_until: DateTime<Utc>,
    pub status: ReportStatus,
    /// Set when the immediate policy approved the report on submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalized: Option<Finalized>,
    #[serde(skip)]
    pub confirm_token: Option<String>,
    #[serde(skip)]
    pub dispute_token: Option<String>,
}

/// Result of a confirm, dispute or automatic approval
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finalized {
    pub report_id: ReportId,
    /// The report had already left `pending`; nothing was changed
    pub already_finalized: bool,
    pub round_ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_target_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<PlayerId>,
    #[serde(skip)]
    pub new_report_token: Option<String>,
    #[serde(skip)]
    pub new_target_token: Option<String>,
}

impl Finalized {
    fn already(report_id: &str) -> Self {
        Self {
            report_id: report_id.to_string(),
            already_finalized: true,
            ..Self::default()
        }
    }
}

/// Per-report outcome of one sweep run
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SweepItem {
    pub report_id: ReportId,
    pub ok: bool,
    pub already_finalized: bool,
    pub round_ended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SweepSummary {
    /// Reports approved by this run
    pub processed: usize,
    pub results: Vec<SweepItem>,
}

/// Who approved a report; decides wording of the hunter's mail
#[derive(Debug, Clone, Copy, PartialEq)]
enum Approver {
    Target,
    System,
}

/// Everything the post-commit notifications need
#[derive(Debug)]
struct Approved {
    outcome: Finalized,
    hunter: Player,
    eliminated: Player,
    /// All players, captured only when the round ended
    everyone: Vec<Player>,
}

enum Approval {
    AlreadyFinalized(ReportId),
    Approved(Box<Approved>),
}

/// Approve a pending report inside a transaction.
///
/// Eliminates the target, deletes the target's own edge and points the edge
/// that hunted the target at the target's former target. Ends the round when
/// at most one ring member is left; otherwise the hunter gets fresh
/// report/target tokens.
fn approve(
    tx: &mut Tables,
    report_id: &str,
    now: DateTime<Utc>,
    play_ttl: Duration,
) -> GameResult<Approval> {
    let report = tx.report(report_id)?.clone();
    if report.status != ReportStatus::Pending {
        return Ok(Approval::AlreadyFinalized(report.id));
    }
    let round_id = report.round_id.as_str();

    let row = tx.report_mut(report_id)?;
    row.status = ReportStatus::Approved;
    row.approved_at = Some(now);
    tx.set_player_status(&report.target_id, PlayerStatus::Eliminated)?;

    let target_edge = tx
        .active_edge_from(round_id, &report.target_id)
        .cloned()
        .ok_or_else(|| {
            GameError::RingInconsistent(format!(
                "target {} has no active edge in round {}",
                report.target_id, round_id
            ))
        })?;
    tx.remove_assignment(&target_edge.id);

    let hunter_edge = tx
        .active_edge_to(round_id, &report.target_id)
        .cloned()
        .ok_or_else(|| {
            GameError::RingInconsistent(format!(
                "no active edge points at target {} in round {}",
                report.target_id, round_id
            ))
        })?;
    if hunter_edge.hunter_id != report.hunter_id {
        tracing::warn!(
            report_id,
            reporter = %report.hunter_id,
            holder = %hunter_edge.hunter_id,
            "Target is now hunted by another player; rewiring their edge"
        );
    }
    tx.retarget(&hunter_edge.id, &target_edge.target_id)?;

    tx.consume_report_action_tokens(report_id);
    tx.consume_player_tokens(&report.hunter_id, TokenPurpose::Report);
    tx.consume_player_tokens(&hunter_edge.hunter_id, TokenPurpose::Report);
    tx.consume_player_tokens(&report.target_id, TokenPurpose::Report);

    let mut outcome = Finalized {
        report_id: report.id.clone(),
        ..Finalized::default()
    };
    let mut everyone = Vec::new();

    if tx.ring_size(round_id) <= 1 {
        let winner_id = tx
            .active_edges(round_id)
            .first()
            .map(|edge| edge.hunter_id.clone());
        close_round(tx, round_id, winner_id.clone(), now)?;
        outcome.round_ended = true;
        outcome.winner_id = winner_id;
        everyone = tx.players_sorted().into_iter().cloned().collect();
    } else {
        outcome.next_target_id = Some(target_edge.target_id.clone());
        outcome.new_report_token = Some(tx.issue_token(
            &hunter_edge.hunter_id,
            TokenPurpose::Report,
            play_ttl,
            None,
            now,
        ));
        outcome.new_target_token = Some(tx.issue_token(
            &hunter_edge.hunter_id,
            TokenPurpose::Target,
            play_ttl,
            None,
            now,
        ));
    }

    Ok(Approval::Approved(Box::new(Approved {
        outcome,
        hunter: tx.player(&hunter_edge.hunter_id)?.clone(),
        eliminated: tx.player(&report.target_id)?.clone(),
        everyone,
    })))
}

/// End a round: close its ring and void reports still under review
pub(crate) fn close_round(
    tx: &mut Tables,
    round_id: &str,
    winner_id: Option<PlayerId>,
    now: DateTime<Utc>,
) -> GameResult<()> {
    let open: Vec<Report> = tx
        .reports
        .values()
        .filter(|r| r.round_id == round_id && r.status == ReportStatus::Pending)
        .cloned()
        .collect();
    for report in open {
        let row = tx.report_mut(&report.id)?;
        row.status = ReportStatus::Disputed;
        row.disputed_at = Some(now);
        tx.consume_report_action_tokens(&report.id);
        let target = tx.player_mut(&report.target_id)?;
        if target.status == PlayerStatus::EliminationInProgress {
            target.status = PlayerStatus::Active;
        }
    }
    tx.end_round(round_id, winner_id, now)
}

/// Resolve a confirm/dispute token to its report.
///
/// A token whose report already left `pending` still resolves (even when
/// consumed or expired) so replays can be answered as already finalized.
/// An unconsumed confirm token also resolves once the review window has
/// elapsed, since the sweep would approve that report anyway.
fn resolve_action_token(
    tx: &Tables,
    token: &str,
    purpose: TokenPurpose,
    now: DateTime<Utc>,
) -> GameResult<(EmailToken, Report)> {
    let row = tx
        .lookup_token(token)
        .ok_or(GameError::InvalidOrExpiredToken)?;
    let usable = !row.consumed && !row.is_expired(now);
    if row.purpose != purpose {
        return Err(if usable {
            GameError::TokenPurposeMismatch
        } else {
            GameError::InvalidOrExpiredToken
        });
    }
    let report_id = row
        .report_id
        .as_deref()
        .ok_or(GameError::InvalidOrExpiredToken)?;
    let report = tx.report(report_id)?.clone();
    let late_confirm = purpose == TokenPurpose::ConfirmElim
        && !row.consumed
        && report.pending_until <= now;
    if report.status == ReportStatus::Pending && !usable && !late_confirm {
        return Err(GameError::InvalidOrExpiredToken);
    }
    Ok((row.clone(), report))
}

enum Submission {
    Staged {
        report: Report,
        hunter: Player,
        target: Player,
        confirm_token: String,
        dispute_token: String,
    },
    Immediate {
        report: Report,
        approved: Box<Approved>,
    },
}

enum Disputed {
    AlreadyFinalized(ReportId),
    Applied {
        report_id: ReportId,
        hunter: Player,
        target: Player,
        report_token: String,
    },
}

impl AppState {
    /// Hunter reports eliminating their current target
    pub async fn submit_report(&self, token: &str) -> GameResult<ReportSubmitted> {
        let now = Utc::now();
        let policy = self.config.policy;
        let review_window = self.config.review_window;
        let play_ttl = self.config.play_token_ttl;

        let submission = self
            .store
            .transact(|tx| {
                let grant = tx.validate_token(token, TokenPurpose::Report, now)?;
                let edge = tx
                    .hunter_edge(&grant.player_id)
                    .cloned()
                    .ok_or(GameError::NoActiveAssignment)?;
                let hunter = tx.player(&edge.hunter_id)?.clone();
                let target = tx.player(&edge.target_id)?.clone();

                if hunter.status == PlayerStatus::EliminationInProgress {
                    return Err(GameError::AlreadyUnderReview(
                        "You can't report while your own elimination is under review.".to_string(),
                    ));
                }
                if target.status == PlayerStatus::EliminationInProgress {
                    return Err(GameError::AlreadyUnderReview(
                        "This target is already under elimination review.".to_string(),
                    ));
                }

                let report = Report {
                    id: new_id(),
                    round_id: edge.round_id.clone(),
                    hunter_id: hunter.id.clone(),
                    target_id: target.id.clone(),
                    status: ReportStatus::Pending,
                    created_at: now,
                    pending_until: now + review_window,
                    approved_at: None,
                    disputed_at: None,
                };
                tx.reports.insert(report.id.clone(), report.clone());
                tx.set_player_status(&target.id, PlayerStatus::EliminationInProgress)?;
                tx.consume_token(token)?;

                match policy {
                    EliminationPolicy::Staged => {
                        let confirm_token = tx.issue_token(
                            &target.id,
                            TokenPurpose::ConfirmElim,
                            review_window,
                            Some(&report.id),
                            now,
                        );
                        let dispute_token = tx.issue_token(
                            &target.id,
                            TokenPurpose::DisputeElim,
                            review_window,
                            Some(&report.id),
                            now,
                        );
                        Ok(Submission::Staged {
                            report,
                            hunter,
                            target,
                            confirm_token,
                            dispute_token,
                        })
                    }
                    EliminationPolicy::Immediate => match approve(tx, &report.id, now, play_ttl)? {
                        Approval::Approved(approved) => {
                            let report = tx.report(&report.id)?.clone();
                            Ok(Submission::Immediate { report, approved })
                        }
                        Approval::AlreadyFinalized(_) => Err(GameError::RingInconsistent(
                            "fresh report was already finalized".to_string(),
                        )),
                    },
                }
            })
            .await?;

        match submission {
            Submission::Staged {
                report,
                hunter,
                target,
                confirm_token,
                dispute_token,
            } => {
                tracing::info!(
                    report_id = %report.id,
                    hunter = %hunter.id,
                    target = %target.id,
                    "Elimination staged until {}",
                    report.pending_until
                );
                let confirm_url = self.config.link("/api/report/confirm", &confirm_token);
                let dispute_url = self.config.link("/api/report/dispute", &dispute_token);
                let minutes = review_window.num_minutes();
                self.deliver_to(&target, "pending notice", |to| {
                    templates::elimination_pending(
                        to,
                        &target.name,
                        &hunter.name,
                        &confirm_url,
                        &dispute_url,
                        minutes,
                    )
                })
                .await;

                Ok(ReportSubmitted {
                    report_id: report.id,
                    pending_until: report.pending_until,
                    status: report.status,
                    finalized: None,
                    confirm_token: Some(confirm_token),
                    dispute_token: Some(dispute_token),
                })
            }
            Submission::Immediate { report, approved } => {
                tracing::info!(report_id = %report.id, "Elimination applied immediately");
                let outcome = self.after_approval(*approved, Approver::Target).await;
                Ok(ReportSubmitted {
                    report_id: report.id,
                    pending_until: report.pending_until,
                    status: report.status,
                    finalized: Some(outcome),
                    confirm_token: None,
                    dispute_token: None,
                })
            }
        }
    }

    /// Target accepts a pending report
    pub async fn confirm_elimination(&self, token: &str) -> GameResult<Finalized> {
        let now = Utc::now();
        let play_ttl = self.config.play_token_ttl;

        let approval = self
            .store
            .transact(|tx| {
                let (grant, report) =
                    resolve_action_token(tx, token, TokenPurpose::ConfirmElim, now)?;
                if report.status != ReportStatus::Pending {
                    return Ok(Approval::AlreadyFinalized(report.id));
                }
                if grant.player_id != report.target_id {
                    return Err(GameError::Forbidden);
                }
                approve(tx, &report.id, now, play_ttl)
            })
            .await?;

        Ok(self.finish(approval, Approver::Target).await)
    }

    /// Target contests a pending report. The ring is left untouched.
    pub async fn dispute_elimination(&self, token: &str) -> GameResult<Finalized> {
        let now = Utc::now();
        let play_ttl = self.config.play_token_ttl;

        let disputed = self
            .store
            .transact(|tx| {
                let (grant, report) =
                    resolve_action_token(tx, token, TokenPurpose::DisputeElim, now)?;
                if report.status != ReportStatus::Pending {
                    return Ok(Disputed::AlreadyFinalized(report.id));
                }
                if grant.player_id != report.target_id {
                    return Err(GameError::Forbidden);
                }

                let row = tx.report_mut(&report.id)?;
                row.status = ReportStatus::Disputed;
                row.disputed_at = Some(now);
                tx.set_player_status(&report.target_id, PlayerStatus::Active)?;
                tx.consume_token(token)?;

                // The report token was spent on submission; give the hunter a new one
                let report_token = tx.issue_token(
                    &report.hunter_id,
                    TokenPurpose::Report,
                    play_ttl,
                    None,
                    now,
                );

                Ok(Disputed::Applied {
                    report_id: report.id.clone(),
                    hunter: tx.player(&report.hunter_id)?.clone(),
                    target: tx.player(&report.target_id)?.clone(),
                    report_token,
                })
            })
            .await?;

        match disputed {
            Disputed::AlreadyFinalized(report_id) => Ok(Finalized::already(&report_id)),
            Disputed::Applied {
                report_id,
                hunter,
                target,
                report_token,
            } => {
                tracing::info!(%report_id, hunter = %hunter.id, target = %target.id, "Elimination disputed");

                if let Some(admin) = self.config.admin_email.clone() {
                    self.deliver(
                        templates::dispute_admin(&admin, &hunter.name, &target.name),
                        "dispute notice (admin)",
                    )
                    .await;
                }
                let report_url = self.config.link("/report", &report_token);
                self.deliver_to(&hunter, "dispute notice (hunter)", |to| {
                    templates::dispute_hunter(to, &hunter.name, &target.name, &report_url)
                })
                .await;

                Ok(Finalized {
                    report_id,
                    new_report_token: Some(report_token),
                    ..Finalized::default()
                })
            }
        }
    }

    /// Approve a report as the system, without a token
    pub async fn approve_report(&self, report_id: &str) -> GameResult<Finalized> {
        let now = Utc::now();
        let play_ttl = self.config.play_token_ttl;
        let approval = self
            .store
            .transact(|tx| approve(tx, report_id, now, play_ttl))
            .await?;
        Ok(self.finish(approval, Approver::System).await)
    }

    /// Approve every pending report whose window has elapsed
    pub async fn auto_approve_due(&self) -> SweepSummary {
        self.auto_approve_due_at(Utc::now()).await
    }

    /// Sweep as of `now`. Each report is its own transaction; a failing
    /// report is recorded and the sweep moves on.
    pub async fn auto_approve_due_at(&self, now: DateTime<Utc>) -> SweepSummary {
        let due = self.store.read(|t| t.due_reports(now)).await;
        let play_ttl = self.config.play_token_ttl;
        let mut summary = SweepSummary::default();

        for report_id in due {
            let result = self
                .store
                .transact(|tx| approve(tx, &report_id, now, play_ttl))
                .await;

            let item = match result {
                Ok(approval) => {
                    let outcome = self.finish(approval, Approver::System).await;
                    if !outcome.already_finalized {
                        summary.processed += 1;
                    }
                    SweepItem {
                        report_id: report_id.clone(),
                        ok: true,
                        already_finalized: outcome.already_finalized,
                        round_ended: outcome.round_ended,
                        reason: None,
                    }
                }
                Err(e) => {
                    if e.is_hard_failure() {
                        tracing::error!(%report_id, "Auto-approve failed: {}", e);
                    } else {
                        tracing::warn!(%report_id, "Auto-approve skipped: {}", e);
                    }
                    SweepItem {
                        report_id: report_id.clone(),
                        ok: false,
                        already_finalized: false,
                        round_ended: false,
                        reason: Some(e.to_string()),
                    }
                }
            };
            summary.results.push(item);
        }

        if !summary.results.is_empty() {
            tracing::info!(
                "Auto-approve sweep: {} due, {} approved",
                summary.results.len(),
                summary.processed
            );
        }
        summary
    }

    async fn finish(&self, approval: Approval, approver: Approver) -> Finalized {
        match approval {
            Approval::AlreadyFinalized(report_id) => {
                tracing::debug!(%report_id, "Report already finalized");
                Finalized::already(&report_id)
            }
            Approval::Approved(approved) => self.after_approval(*approved, approver).await,
        }
    }

    async fn after_approval(&self, approved: Approved, approver: Approver) -> Finalized {
        let Approved {
            outcome,
            hunter,
            eliminated,
            everyone,
        } = approved;

        tracing::info!(
            report_id = %outcome.report_id,
            hunter = %hunter.id,
            eliminated = %eliminated.id,
            round_ended = outcome.round_ended,
            "Elimination approved"
        );

        if outcome.round_ended {
            tracing::info!(winner = ?outcome.winner_id, "Round ended");
            self.notify_game_over(&everyone, outcome.winner_id.as_deref())
                .await;
        } else if let (Some(report_token), Some(target_token)) =
            (&outcome.new_report_token, &outcome.new_target_token)
        {
            let target_url = self.config.link("/target", target_token);
            let report_url = self.config.link("/report", report_token);
            let auto = approver == Approver::System;
            self.deliver_to(&hunter, "next target", |to| {
                templates::next_target(
                    to,
                    &hunter.name,
                    &eliminated.name,
                    &target_url,
                    &report_url,
                    auto,
                )
            })
            .await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::state::tests::{ring, test_state, test_state_with};

    async fn edges(state: &AppState) -> Vec<(PlayerId, PlayerId)> {
        state
            .store
            .read(|t| {
                let mut e: Vec<_> = t
                    .assignments
                    .values()
                    .filter(|a| a.active)
                    .map(|a| (a.hunter_id.clone(), a.target_id.clone()))
                    .collect();
                e.sort();
                e
            })
            .await
    }

    async fn status(state: &AppState, id: &str) -> PlayerStatus {
        state.store.read(|t| t.players[id].status).await
    }

    #[tokio::test]
    async fn test_submit_stages_without_touching_ring() {
        let (state, mailer) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;
        let before = edges(&state).await;

        let token = started.report_tokens[&ids[0]].clone();
        let submitted = state.submit_report(&token).await.unwrap();

        assert_eq!(submitted.status, ReportStatus::Pending);
        assert!(submitted.pending_until > Utc::now() + Duration::minutes(9));
        assert_eq!(edges(&state).await, before);
        assert_eq!(status(&state, &ids[1]).await, PlayerStatus::EliminationInProgress);

        let notice = mailer.sent_to("b@example.com");
        let last = notice.last().unwrap();
        assert!(last.subject.contains("Elimination pending"));
        assert!(last.text.contains(submitted.confirm_token.as_deref().unwrap()));

        // Report token is spent
        assert_eq!(
            state.submit_report(&token).await.unwrap_err(),
            GameError::InvalidOrExpiredToken
        );
    }

    #[tokio::test]
    async fn test_second_report_on_target_under_review_conflicts() {
        let (state, _) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;
        state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();

        // B is under review and may not report
        let err = state
            .submit_report(&started.report_tokens[&ids[1]])
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::AlreadyUnderReview(_)));
        // B's token is still usable later
        assert!(state
            .store
            .validate_token(&started.report_tokens[&ids[1]], TokenPurpose::Report)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reporting_a_target_under_review_conflicts() {
        let (state, _) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C", "D"]).await;

        // Force B under review, then A tries to report B
        state
            .store
            .transact(|tx| tx.set_player_status(&ids[1], PlayerStatus::EliminationInProgress))
            .await
            .unwrap();
        let err = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GameError::AlreadyUnderReview("This target is already under elimination review.".into())
        );
    }

    #[tokio::test]
    async fn test_confirm_rewires_ring() {
        let (state, mailer) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C", "D", "E"]).await;
        let (a, b, c, d, e) = (&ids[0], &ids[1], &ids[2], &ids[3], &ids[4]);

        let submitted = state
            .submit_report(&started.report_tokens[d])
            .await
            .unwrap();
        let done = state
            .confirm_elimination(submitted.confirm_token.as_deref().unwrap())
            .await
            .unwrap();

        assert!(!done.already_finalized);
        assert!(!done.round_ended);
        assert_eq!(done.next_target_id.as_deref(), Some(a.as_str()));
        assert_eq!(status(&state, e).await, PlayerStatus::Eliminated);

        let mut expected = vec![
            (a.clone(), b.clone()),
            (b.clone(), c.clone()),
            (c.clone(), d.clone()),
            (d.clone(), a.clone()),
        ];
        expected.sort();
        assert_eq!(edges(&state).await, expected);

        let round_id = started.round_id.clone();
        let order = state.store.read(|t| t.verify_ring(&round_id)).await.unwrap();
        assert_eq!(order.len(), 4);

        // Hunter got fresh links, old report tokens are dead
        assert!(mailer.sent_to("d@example.com").last().unwrap().subject.contains("Next target"));
        let fresh = done.new_report_token.unwrap();
        assert!(state.store.validate_token(&fresh, TokenPurpose::Report).await.is_ok());
        let target = state.view_target(done.new_target_token.as_deref().unwrap()).await.unwrap();
        assert_eq!(target.id, *a);
    }

    #[tokio::test]
    async fn test_confirm_twice_is_idempotent() {
        let (state, _) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;
        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();
        let confirm = submitted.confirm_token.unwrap();

        state.confirm_elimination(&confirm).await.unwrap();
        let snapshot = state.store.snapshot().await;

        let again = state.confirm_elimination(&confirm).await.unwrap();
        assert!(again.already_finalized);
        assert_eq!(state.store.snapshot().await, snapshot);

        let by_id = state.approve_report(&submitted.report_id).await.unwrap();
        assert!(by_id.already_finalized);
    }

    #[tokio::test]
    async fn test_confirm_by_someone_else_is_forbidden() {
        let (state, _) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;
        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();

        // A confirm token addressed to C but scoped to B's report
        let forged = state
            .store
            .issue_token(
                &ids[2],
                TokenPurpose::ConfirmElim,
                Duration::minutes(10),
                Some(&submitted.report_id),
            )
            .await
            .unwrap();
        assert_eq!(
            state.confirm_elimination(&forged).await.unwrap_err(),
            GameError::Forbidden
        );
        assert_eq!(status(&state, &ids[1]).await, PlayerStatus::EliminationInProgress);
    }

    #[tokio::test]
    async fn test_dispute_only_touches_report_and_target() {
        let (state, mailer) = test_state_with(GameConfig {
            admin_email: Some("admin@example.com".to_string()),
            ..GameConfig::default()
        });
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;
        let before = state.store.snapshot().await.assignments;

        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();
        let result = state
            .dispute_elimination(submitted.dispute_token.as_deref().unwrap())
            .await
            .unwrap();
        assert!(!result.already_finalized);

        let after = state.store.snapshot().await;
        assert_eq!(after.assignments, before);
        assert_eq!(after.reports[&submitted.report_id].status, ReportStatus::Disputed);
        assert!(after.reports[&submitted.report_id].disputed_at.is_some());
        assert_eq!(after.players[&ids[1]].status, PlayerStatus::Active);

        assert_eq!(mailer.sent_to("admin@example.com").len(), 1);
        assert!(mailer
            .sent_to("a@example.com")
            .last()
            .unwrap()
            .subject
            .contains("disputed"));

        // Confirm after dispute is a no-op replay
        let replay = state
            .confirm_elimination(submitted.confirm_token.as_deref().unwrap())
            .await
            .unwrap();
        assert!(replay.already_finalized);

        // The hunter can report again with the reissued token
        let again = state
            .submit_report(result.new_report_token.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(again.status, ReportStatus::Pending);
    }

    #[tokio::test]
    async fn test_token_purpose_is_enforced() {
        let (state, _) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;
        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();

        assert_eq!(
            state
                .dispute_elimination(submitted.confirm_token.as_deref().unwrap())
                .await
                .unwrap_err(),
            GameError::TokenPurposeMismatch
        );
        assert_eq!(
            state
                .confirm_elimination(&started.target_tokens[&ids[2]])
                .await
                .unwrap_err(),
            GameError::TokenPurposeMismatch
        );
        assert_eq!(
            state.confirm_elimination("garbage").await.unwrap_err(),
            GameError::InvalidOrExpiredToken
        );
    }

    #[tokio::test]
    async fn test_two_player_round_ends_on_confirm() {
        let (state, mailer) = test_state();
        let (started, ids) = ring(&state, &["A", "B"]).await;
        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();
        mailer.clear();

        let done = state
            .confirm_elimination(submitted.confirm_token.as_deref().unwrap())
            .await
            .unwrap();
        assert!(done.round_ended);
        assert_eq!(done.winner_id.as_deref(), Some(ids[0].as_str()));
        assert!(done.new_report_token.is_none());
        assert!(done.new_target_token.is_none());

        let tables = state.store.snapshot().await;
        assert!(tables.active_round().is_none());
        assert_eq!(tables.rounds[&started.round_id].status, RoundStatus::Ended);
        assert_eq!(tables.count_players(PlayerStatus::Active), 1);
        assert!(tables.assignments.values().all(|a| !a.active));
        assert_eq!(tables.assignments.len(), 1);

        assert!(mailer.sent_to("a@example.com")[0].text.contains("last survivor"));
        assert!(mailer.sent_to("b@example.com")[0].text.contains("Thanks for playing"));
    }

    #[tokio::test]
    async fn test_sweep_approves_only_due_reports() {
        let (state, mailer) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C", "D"]).await;
        let first = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();
        let second = state
            .submit_report(&started.report_tokens[&ids[2]])
            .await
            .unwrap();

        // Nothing is due yet
        let early = state.auto_approve_due().await;
        assert!(early.results.is_empty());
        assert_eq!(
            state.store.read(|t| t.reports[&first.report_id].status).await,
            ReportStatus::Pending
        );

        let later = Utc::now() + Duration::minutes(11);
        let summary = state.auto_approve_due_at(later).await;
        assert_eq!(summary.processed, 2);
        assert!(summary.results.iter().all(|r| r.ok));

        for report_id in [&first.report_id, &second.report_id] {
            assert_eq!(
                state.store.read(|t| t.reports[report_id].status).await,
                ReportStatus::Approved
            );
        }
        assert!(mailer
            .sent_to("a@example.com")
            .last()
            .unwrap()
            .subject
            .contains("auto-approved"));

        // A second run finds nothing
        assert!(state.auto_approve_due_at(later).await.results.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_continues_past_broken_report() {
        let (state, _) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C", "D", "E", "F"]).await;
        let broken = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();
        let healthy = state
            .submit_report(&started.report_tokens[&ids[3]])
            .await
            .unwrap();

        // Corrupt the ring around B: drop B's outgoing edge
        let round_id = started.round_id.clone();
        let b = ids[1].clone();
        state
            .store
            .transact(|tx| {
                let edge = tx.active_edge_from(&round_id, &b).unwrap().id.clone();
                tx.remove_assignment(&edge);
                Ok(())
            })
            .await
            .unwrap();

        let summary = state
            .auto_approve_due_at(Utc::now() + Duration::minutes(11))
            .await;
        assert_eq!(summary.results.len(), 2);
        assert_eq!(summary.processed, 1);

        let failed = summary
            .results
            .iter()
            .find(|r| r.report_id == broken.report_id)
            .unwrap();
        assert!(!failed.ok);
        assert!(failed.reason.as_deref().unwrap().contains("ring inconsistent"));

        // The failed approval rolled back completely
        let tables = state.store.snapshot().await;
        assert_eq!(tables.reports[&broken.report_id].status, ReportStatus::Pending);
        assert_eq!(tables.players[&ids[1]].status, PlayerStatus::EliminationInProgress);
        assert_eq!(tables.reports[&healthy.report_id].status, ReportStatus::Approved);
    }

    #[tokio::test]
    async fn test_immediate_policy_applies_on_submit() {
        let (state, _) = test_state_with(GameConfig {
            policy: EliminationPolicy::Immediate,
            ..GameConfig::default()
        });
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;

        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();
        assert_eq!(submitted.status, ReportStatus::Approved);
        assert!(submitted.confirm_token.is_none());
        let finalized = submitted.finalized.unwrap();
        assert_eq!(finalized.next_target_id.as_deref(), Some(ids[2].as_str()));

        assert_eq!(status(&state, &ids[1]).await, PlayerStatus::Eliminated);
        let mut expected = vec![
            (ids[0].clone(), ids[2].clone()),
            (ids[2].clone(), ids[0].clone()),
        ];
        expected.sort();
        assert_eq!(edges(&state).await, expected);
    }

    #[tokio::test]
    async fn test_rewire_follows_current_hunter_of_target() {
        let (state, _) = test_state();
        // X -> H -> T -> Y -> X
        let (started, ids) = ring(&state, &["X", "H", "T", "Y"]).await;
        let (x, h, t, y) = (&ids[0], &ids[1], &ids[2], &ids[3]);

        let h_report = state.submit_report(&started.report_tokens[h]).await.unwrap();
        let x_report = state.submit_report(&started.report_tokens[x]).await.unwrap();

        // H is eliminated first: X now hunts T
        state
            .confirm_elimination(x_report.confirm_token.as_deref().unwrap())
            .await
            .unwrap();
        // H's earlier report on T still resolves, rewiring X's edge
        let done = state.approve_report(&h_report.report_id).await.unwrap();
        assert!(!done.round_ended);
        assert_eq!(done.next_target_id.as_deref(), Some(y.as_str()));

        let mut expected = vec![(x.clone(), y.clone()), (y.clone(), x.clone())];
        expected.sort();
        assert_eq!(edges(&state).await, expected);
        assert_eq!(status(&state, t).await, PlayerStatus::Eliminated);
        assert_eq!(status(&state, h).await, PlayerStatus::Eliminated);
    }

    #[tokio::test]
    async fn test_workflow_commits_when_mail_fails() {
        let (state, mailer) = test_state();
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;
        mailer.clear();
        mailer.set_failing(true);

        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();
        assert_eq!(submitted.status, ReportStatus::Pending);
        assert_eq!(status(&state, &ids[1]).await, PlayerStatus::EliminationInProgress);
        let report_id = submitted.report_id.clone();
        let staged = state.store.read(|t| t.reports[&report_id].status).await;
        assert_eq!(staged, ReportStatus::Pending);

        let done = state
            .confirm_elimination(submitted.confirm_token.as_deref().unwrap())
            .await
            .unwrap();
        assert!(!done.already_finalized);
        assert!(done.new_report_token.is_some());
        assert_eq!(status(&state, &ids[1]).await, PlayerStatus::Eliminated);
        let mut expected = vec![
            (ids[0].clone(), ids[2].clone()),
            (ids[2].clone(), ids[0].clone()),
        ];
        expected.sort();
        assert_eq!(edges(&state).await, expected);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_after_window_still_approves() {
        let (state, _) = test_state_with(GameConfig {
            review_window: Duration::zero(),
            ..GameConfig::default()
        });
        let (started, ids) = ring(&state, &["A", "B", "C"]).await;

        let submitted = state
            .submit_report(&started.report_tokens[&ids[0]])
            .await
            .unwrap();

        // The window is over, so disputing is no longer possible
        assert_eq!(
            state
                .dispute_elimination(submitted.dispute_token.as_deref().unwrap())
                .await
                .unwrap_err(),
            GameError::InvalidOrExpiredToken
        );

        let done = state
            .confirm_elimination(submitted.confirm_token.as_deref().unwrap())
            .await
            .unwrap();
        assert!(!done.already_finalized);
        assert_eq!(status(&state, &ids[1]).await, PlayerStatus::Eliminated);

        // Nothing left for the sweep
        let summary = state.auto_approve_due_at(Utc::now()).await;
        assert!(summary.results.is_empty());
    }
}
