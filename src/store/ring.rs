//! Edge queries over the flat assignment table.
//!
//! The ring is never held as linked structure; every cycle property is derived
//! by following `hunter -> target` edges.

use super::Tables;
use crate::error::{GameError, GameResult};
use crate::types::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// The active ring of a round, in follow-the-edge order
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RingView {
    pub round_id: RoundId,
    /// Hunters in ring order starting from the lowest id
    pub order: Vec<PlayerId>,
    pub consistent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

impl Tables {
    pub fn create_round(&mut self, now: DateTime<Utc>) -> RoundId {
        let round = Round {
            id: new_id(),
            status: RoundStatus::Active,
            starts_at: now,
            ends_at: None,
            winner_id: None,
        };
        let id = round.id.clone();
        self.rounds.insert(id.clone(), round);
        id
    }

    /// Create the simple cycle `order[i] -> order[(i + 1) % n]`
    pub fn create_ring(&mut self, round_id: &str, order: &[PlayerId]) {
        let n = order.len();
        for (i, hunter) in order.iter().enumerate() {
            let edge = Assignment {
                id: new_id(),
                round_id: round_id.to_string(),
                hunter_id: hunter.clone(),
                target_id: order[(i + 1) % n].clone(),
                active: true,
            };
            self.assignments.insert(edge.id.clone(), edge);
        }
    }

    /// The hunter's outgoing active edge in a round
    pub fn active_edge_from(&self, round_id: &str, hunter_id: &str) -> Option<&Assignment> {
        self.assignments
            .values()
            .find(|a| a.active && a.round_id == round_id && a.hunter_id == hunter_id)
    }

    /// The active edge pointing at `target_id` in a round
    pub fn active_edge_to(&self, round_id: &str, target_id: &str) -> Option<&Assignment> {
        self.assignments
            .values()
            .find(|a| a.active && a.round_id == round_id && a.target_id == target_id)
    }

    /// The hunter's outgoing active edge in whichever round is running
    pub fn hunter_edge(&self, hunter_id: &str) -> Option<&Assignment> {
        self.assignments
            .values()
            .find(|a| a.active && a.hunter_id == hunter_id)
    }

    pub fn active_edges(&self, round_id: &str) -> Vec<&Assignment> {
        self.assignments
            .values()
            .filter(|a| a.active && a.round_id == round_id)
            .collect()
    }

    /// Number of ring members still in play
    pub fn ring_size(&self, round_id: &str) -> usize {
        self.active_edges(round_id).len()
    }

    /// Delete an edge outright so its (round, target) slot is free again
    pub fn remove_assignment(&mut self, id: &str) -> Option<Assignment> {
        self.assignments.remove(id)
    }

    /// Point an edge at a new target
    pub fn retarget(&mut self, id: &str, target_id: &str) -> GameResult<()> {
        let edge = self
            .assignments
            .get_mut(id)
            .ok_or_else(|| GameError::RingInconsistent(format!("edge {} vanished", id)))?;
        edge.target_id = target_id.to_string();
        Ok(())
    }

    /// Deactivate every active edge, optionally limited to one round
    pub fn deactivate_edges(&mut self, round_id: Option<&str>) -> usize {
        let mut count = 0;
        for edge in self.assignments.values_mut() {
            if edge.active && round_id.map_or(true, |r| edge.round_id == r) {
                edge.active = false;
                count += 1;
            }
        }
        count
    }

    /// Mark a round ended and close its ring
    pub fn end_round(
        &mut self,
        round_id: &str,
        winner_id: Option<PlayerId>,
        now: DateTime<Utc>,
    ) -> GameResult<()> {
        self.deactivate_edges(Some(round_id));
        let round = self.round_mut(round_id)?;
        round.status = RoundStatus::Ended;
        round.ends_at = Some(now);
        round.winner_id = winner_id;
        Ok(())
    }

    /// Walk the ring and check it is one cycle over living players.
    ///
    /// Returns the hunters in ring order.
    pub fn verify_ring(&self, round_id: &str) -> GameResult<Vec<PlayerId>> {
        let edges = self.active_edges(round_id);
        if edges.is_empty() {
            return Ok(Vec::new());
        }

        let next: HashMap<&str, &str> = edges
            .iter()
            .map(|e| (e.hunter_id.as_str(), e.target_id.as_str()))
            .collect();
        if next.len() != edges.len() {
            return Err(GameError::RingInconsistent(
                "a hunter holds more than one active edge".to_string(),
            ));
        }

        let start = edges
            .iter()
            .map(|e| e.hunter_id.as_str())
            .min()
            .unwrap_or_default();
        let mut order = Vec::with_capacity(edges.len());
        let mut seen = HashSet::new();
        let mut current = start;
        loop {
            if !seen.insert(current) {
                break;
            }
            match self.players.get(current) {
                Some(p) if p.status.is_alive() => {}
                Some(p) => {
                    return Err(GameError::RingInconsistent(format!(
                        "ring member {} has status {:?}",
                        p.id, p.status
                    )))
                }
                None => {
                    return Err(GameError::RingInconsistent(format!(
                        "ring member {} does not exist",
                        current
                    )))
                }
            }
            order.push(current.to_string());
            current = match next.get(current) {
                Some(target) => *target,
                None => {
                    return Err(GameError::RingInconsistent(format!(
                        "{} is targeted but hunts nobody",
                        current
                    )))
                }
            };
        }

        if current != start || order.len() != edges.len() {
            return Err(GameError::RingInconsistent(format!(
                "ring covers {} of {} edges",
                order.len(),
                edges.len()
            )));
        }
        Ok(order)
    }

    /// Ring of the active round for operator display
    pub fn ring_view(&self) -> Option<RingView> {
        let round = self.active_round()?;
        let view = match self.verify_ring(&round.id) {
            Ok(order) => RingView {
                round_id: round.id.clone(),
                order,
                consistent: true,
                problem: None,
            },
            Err(e) => RingView {
                round_id: round.id.clone(),
                order: Vec::new(),
                consistent: false,
                problem: Some(e.to_string()),
            },
        };
        Some(view)
    }
}
