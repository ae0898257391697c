//! Per-player batting, bowling and fielding figures derived from deliveries.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::models::cricket_match::BALLS_PER_OVER;
use crate::models::delivery::{Delivery, DismissalType, ExtraType};
use crate::models::player_innings::{DismissalRecord, PlayerInnings};

// Running tally for the over a bowler is currently in, for maidens.
#[derive(Debug, Clone, Default, PartialEq)]
struct OverTally {
    innings: u8,
    over: u32,
    legal_balls: u8,
    conceded: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InningsAggregator {
    match_id: String,
    tournament_id: String,
    rows: BTreeMap<String, PlayerInnings>,
    overs: HashMap<String, OverTally>,
    applied: HashSet<String>,
}

impl InningsAggregator {
    pub fn new(match_id: &str, tournament_id: &str) -> Self {
        Self {
            match_id: match_id.to_string(),
            tournament_id: tournament_id.to_string(),
            rows: BTreeMap::new(),
            overs: HashMap::new(),
            applied: HashSet::new(),
        }
    }

    /// Rebuilds every row from an empty state. Deliveries are applied in log
    /// order regardless of the order they are passed in.
    pub fn replay(match_id: &str, tournament_id: &str, deliveries: &[Delivery]) -> Self {
        let mut ordered: Vec<&Delivery> = deliveries.iter().collect();
        ordered.sort_by_key(|d| d.sequence);

        let mut aggregator = Self::new(match_id, tournament_id);
        for delivery in ordered {
            aggregator.apply(delivery);
        }
        aggregator
    }

    /// Applies one delivery and returns the rows it touched. A delivery that
    /// was already applied is ignored.
    pub fn apply(&mut self, delivery: &Delivery) -> Vec<PlayerInnings> {
        if !self.applied.insert(delivery.delivery_id.clone()) {
            return Vec::new();
        }

        let mut touched = vec![delivery.striker_id.clone(), delivery.bowler_id.clone()];

        let batting = &mut self
            .row(&delivery.striker_id, &delivery.batting_team_id)
            .batting;
        batting.runs = batting.runs.saturating_add(delivery.runs);
        if delivery.faced_by_striker() {
            batting.balls_faced += 1;
        }
        match delivery.runs {
            4 => batting.fours += 1,
            6 => batting.sixes += 1,
            _ => {}
        }
        self.row(&delivery.striker_id, &delivery.batting_team_id).batted = true;

        let bowling = &mut self
            .row(&delivery.bowler_id, &delivery.bowling_team_id)
            .bowling;
        bowling.runs_conceded = bowling.runs_conceded.saturating_add(delivery.conceded_by_bowler());
        match delivery.extra {
            Some(ExtraType::Wide) => bowling.wides += 1,
            Some(ExtraType::NoBall) => bowling.no_balls += 1,
            _ => {}
        }
        if delivery.is_legal() {
            bowling.legal_balls += 1;
        }
        if delivery.wicket.as_ref().map_or(false, |w| w.dismissal.credited_to_bowler()) {
            bowling.wickets += 1;
        }
        if self.close_over_if_maiden(delivery) {
            self.row(&delivery.bowler_id, &delivery.bowling_team_id)
                .bowling
                .maidens += 1;
        }

        if let Some(wicket) = &delivery.wicket {
            let out = self.row(&wicket.player_out_id, &delivery.batting_team_id);
            out.batted = true;
            out.batting.dismissal = Some(DismissalRecord {
                dismissal: wicket.dismissal,
                bowler_id: wicket
                    .dismissal
                    .credited_to_bowler()
                    .then(|| delivery.bowler_id.clone()),
                fielder_id: wicket.fielder_id.clone(),
            });
            touched.push(wicket.player_out_id.clone());

            // a catch with no fielder named is caught and bowled
            let fielder = match wicket.dismissal {
                DismissalType::Caught => wicket.fielder_id.clone().or_else(|| Some(delivery.bowler_id.clone())),
                DismissalType::RunOut | DismissalType::Stumped => wicket.fielder_id.clone(),
                _ => None,
            };
            if let Some(fielder_id) = fielder {
                let fielding = &mut self.row(&fielder_id, &delivery.bowling_team_id).fielding;
                match wicket.dismissal {
                    DismissalType::Caught => fielding.catches += 1,
                    DismissalType::RunOut => fielding.run_outs += 1,
                    DismissalType::Stumped => fielding.stumpings += 1,
                    _ => {}
                }
                touched.push(fielder_id);
            }
        }

        touched.sort();
        touched.dedup();
        touched
            .iter()
            .filter_map(|id| self.rows.get(id).cloned())
            .collect()
    }

    pub fn rows(&self) -> Vec<PlayerInnings> {
        self.rows.values().cloned().collect()
    }

    pub fn get(&self, player_id: &str) -> Option<&PlayerInnings> {
        self.rows.get(player_id)
    }

    fn row(&mut self, player_id: &str, team_id: &str) -> &mut PlayerInnings {
        let (match_id, tournament_id) = (&self.match_id, &self.tournament_id);
        self.rows
            .entry(player_id.to_string())
            .or_insert_with(|| PlayerInnings::new(match_id, tournament_id, player_id, team_id))
    }

    // True when this delivery completes a six-ball over with nothing conceded.
    fn close_over_if_maiden(&mut self, delivery: &Delivery) -> bool {
        let tally = self.overs.entry(delivery.bowler_id.clone()).or_default();
        if tally.innings != delivery.innings || tally.over != delivery.over {
            *tally = OverTally {
                innings: delivery.innings,
                over: delivery.over,
                ..OverTally::default()
            };
        }

        tally.conceded = tally.conceded.saturating_add(delivery.conceded_by_bowler());
        if delivery.is_legal() {
            tally.legal_balls += 1;
        }
        tally.legal_balls == BALLS_PER_OVER && delivery.is_legal() && tally.conceded == 0
    }
}
