//! Append-only ball-by-ball log and the audit that replays it.

use std::sync::Arc;

use serde::Serialize;

use crate::errors::Result;
use crate::models::cricket_match::{Extras, Match};
use crate::models::delivery::{Delivery, ExtraType};
use crate::services::retry::{persist_with_retry, RetryPolicy};
use crate::services::score_store::ScoreStore;

#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn ScoreStore>,
    policy: RetryPolicy,
}

impl EventLog {
    pub fn new(store: Arc<dyn ScoreStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// The only way a delivery reaches the store.
    pub async fn append(&self, delivery: &Delivery) -> Result<()> {
        let label = format!("append delivery {} ({})", delivery.label(), delivery.delivery_id);
        persist_with_retry(&label, &self.policy, || self.store.append_delivery(delivery)).await
    }

    pub async fn deliveries(&self, match_id: &str) -> Result<Vec<Delivery>> {
        self.store.deliveries(match_id).await
    }
}

/// Innings totals as counted from one source.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InningsTally {
    pub score: u32,
    pub wickets: u8,
    pub legal_balls: u32,
    pub extras: Extras,
}

impl InningsTally {
    fn add(&mut self, delivery: &Delivery) {
        self.score = self.score.saturating_add(delivery.total_runs());
        if delivery.is_wicket() {
            self.wickets += 1;
        }
        if delivery.is_legal() {
            self.legal_balls += 1;
        }
        match delivery.extra {
            Some(ExtraType::Wide) => self.extras.wides += delivery.extra_runs,
            Some(ExtraType::NoBall) => self.extras.no_balls += delivery.extra_runs,
            Some(ExtraType::Bye) => self.extras.byes += delivery.extra_runs,
            Some(ExtraType::LegBye) => self.extras.leg_byes += delivery.extra_runs,
            None => {}
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InningsAudit {
    pub innings: u8,
    pub stored: InningsTally,
    pub replayed: InningsTally,
    pub mismatches: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub match_id: String,
    pub deliveries_checked: usize,
    pub innings: Vec<InningsAudit>,
    pub mismatches: Vec<String>,
    pub consistent: bool,
}

/// Replays the log innings by innings and compares it with the match
/// document.
pub fn audit(m: &Match, deliveries: &[Delivery]) -> AuditReport {
    let mut mismatches = Vec::new();
    let log: Vec<&Delivery> = deliveries.iter().filter(|d| d.match_id == m.match_id).collect();

    if log.len() != m.deliveries_recorded as usize {
        mismatches.push(format!(
            "log has {} deliveries, match recorded {}",
            log.len(),
            m.deliveries_recorded
        ));
    }

    let mut sequences: Vec<u32> = log.iter().map(|d| d.sequence).collect();
    sequences.sort_unstable();
    if let Some(gap) = sequences.iter().enumerate().find(|(i, s)| **s != *i as u32) {
        mismatches.push(format!("log sequence breaks at position {} (found {})", gap.0, gap.1));
    }

    let innings = m
        .innings
        .iter()
        .map(|stored| {
            let mut replayed = InningsTally::default();
            for delivery in log.iter().filter(|d| d.innings == stored.number) {
                replayed.add(delivery);
            }

            let stored_tally = InningsTally {
                score: stored.score,
                wickets: stored.wickets,
                legal_balls: stored.overs.total_balls(),
                extras: stored.extras,
            };

            let mut found = Vec::new();
            if stored_tally.score != replayed.score {
                found.push(format!("score {} vs {} in log", stored_tally.score, replayed.score));
            }
            if stored_tally.wickets != replayed.wickets {
                found.push(format!("wickets {} vs {} in log", stored_tally.wickets, replayed.wickets));
            }
            if stored_tally.legal_balls != replayed.legal_balls {
                found.push(format!(
                    "legal balls {} vs {} in log",
                    stored_tally.legal_balls, replayed.legal_balls
                ));
            }
            if stored_tally.extras != replayed.extras {
                found.push(format!("extras {:?} vs {:?} in log", stored_tally.extras, replayed.extras));
            }

            InningsAudit {
                innings: stored.number,
                stored: stored_tally,
                replayed,
                mismatches: found,
            }
        })
        .collect::<Vec<_>>();

    if log.iter().any(|d| m.innings_at(d.innings).is_none()) {
        mismatches.push("log has deliveries for an innings the match does not have".to_string());
    }

    let consistent = mismatches.is_empty() && innings.iter().all(|i| i.mismatches.is_empty());
    AuditReport {
        match_id: m.match_id.clone(),
        deliveries_checked: log.len(),
        innings,
        mismatches,
        consistent,
    }
}
