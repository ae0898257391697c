use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::cricket_match::{Overs, BALLS_PER_OVER};
use super::delivery::DismissalType;

/// Runs per 100 balls; zero when no balls were faced.
pub fn strike_rate(runs: u32, balls: u32) -> f64 {
    if balls == 0 {
        0.0
    } else {
        runs as f64 * 100.0 / balls as f64
    }
}

/// Runs per over; zero when no legal balls were bowled.
pub fn economy(runs_conceded: u32, legal_balls: u32) -> f64 {
    if legal_balls == 0 {
        0.0
    } else {
        runs_conceded as f64 * BALLS_PER_OVER as f64 / legal_balls as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DismissalRecord {
    pub dismissal: DismissalType,
    pub bowler_id: Option<String>,
    pub fielder_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattingFigures {
    pub runs: u32,
    pub balls_faced: u32,
    pub fours: u32,
    pub sixes: u32,
    pub dismissal: Option<DismissalRecord>,
}

impl BattingFigures {
    pub fn strike_rate(&self) -> f64 {
        strike_rate(self.runs, self.balls_faced)
    }

    pub fn is_out(&self) -> bool {
        self.dismissal.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowlingFigures {
    pub legal_balls: u32,
    pub maidens: u32,
    pub runs_conceded: u32,
    pub wickets: u32,
    pub wides: u32,
    pub no_balls: u32,
}

impl BowlingFigures {
    pub fn overs(&self) -> Overs {
        Overs::from_balls(self.legal_balls)
    }

    pub fn economy(&self) -> f64 {
        economy(self.runs_conceded, self.legal_balls)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldingFigures {
    pub catches: u32,
    pub run_outs: u32,
    pub stumpings: u32,
}

/// One row per (match, player) in the `player_innings` collection. Only raw
/// counters are stored; rates are derived on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerInnings {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub match_id: String,
    pub tournament_id: String,
    pub player_id: String,
    pub team_id: String,
    /// False for a player who has only bowled or fielded so far.
    pub batted: bool,
    pub batting: BattingFigures,
    pub bowling: BowlingFigures,
    pub fielding: FieldingFigures,
}

impl PlayerInnings {
    pub fn new(match_id: &str, tournament_id: &str, player_id: &str, team_id: &str) -> Self {
        Self {
            id: None,
            match_id: match_id.to_string(),
            tournament_id: tournament_id.to_string(),
            player_id: player_id.to_string(),
            team_id: team_id.to_string(),
            batted: false,
            batting: BattingFigures::default(),
            bowling: BowlingFigures::default(),
            fielding: FieldingFigures::default(),
        }
    }

    pub fn bowled(&self) -> bool {
        self.bowling.legal_balls > 0 || self.bowling.wides > 0 || self.bowling.no_balls > 0
    }
}

/// Scorecard row with the derived rates filled in, for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ScorecardRow {
    pub player_id: String,
    pub team_id: String,
    pub batting: BattingFigures,
    pub strike_rate: f64,
    pub bowling: BowlingFigures,
    pub overs_bowled: String,
    pub economy: f64,
    pub fielding: FieldingFigures,
}

impl From<&PlayerInnings> for ScorecardRow {
    fn from(row: &PlayerInnings) -> Self {
        Self {
            player_id: row.player_id.clone(),
            team_id: row.team_id.clone(),
            batting: row.batting.clone(),
            strike_rate: row.batting.strike_rate(),
            bowling: row.bowling.clone(),
            overs_bowled: row.bowling.overs().to_string(),
            economy: row.bowling.economy(),
            fielding: row.fielding.clone(),
        }
    }
}
