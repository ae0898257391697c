use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cricket_match::Overs;

pub const POINTS_PER_WIN: u32 = 2;
pub const LEADERBOARD_SIZE: usize = 10;

pub const UNKNOWN_TEAM: &str = "Unknown team";
pub const UNKNOWN_PLAYER: &str = "Unknown player";

/// Scoring rate minus conceding rate; zero unless both sides of the ledger
/// have balls. Rounded to three decimal places.
pub fn net_run_rate(runs_scored: u32, balls_faced: u32, runs_conceded: u32, balls_bowled: u32) -> f64 {
    if balls_faced == 0 || balls_bowled == 0 {
        return 0.0;
    }
    let for_rate = runs_scored as f64 / Overs::from_balls(balls_faced).as_fraction();
    let against_rate = runs_conceded as f64 / Overs::from_balls(balls_bowled).as_fraction();
    ((for_rate - against_rate) * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTournamentStanding {
    pub team_id: String,
    pub team_name: String,
    pub matches_played: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub points: u32,
    pub runs_scored: u32,
    pub balls_faced: u32,
    pub runs_conceded: u32,
    pub balls_bowled: u32,
    pub net_run_rate: f64,
}

impl TeamTournamentStanding {
    pub fn new(team_id: &str, team_name: &str) -> Self {
        Self {
            team_id: team_id.to_string(),
            team_name: team_name.to_string(),
            matches_played: 0,
            wins: 0,
            losses: 0,
            ties: 0,
            points: 0,
            runs_scored: 0,
            balls_faced: 0,
            runs_conceded: 0,
            balls_bowled: 0,
            net_run_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattingLeader {
    pub player_id: String,
    pub player_name: String,
    pub team_id: String,
    pub innings: u32,
    pub runs: u32,
    pub balls_faced: u32,
    pub fours: u32,
    pub sixes: u32,
    pub highest_score: u32,
    pub strike_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BowlingLeader {
    pub player_id: String,
    pub player_name: String,
    pub team_id: String,
    pub wickets: u32,
    pub runs_conceded: u32,
    pub legal_balls: u32,
    pub overs: Overs,
    pub economy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattingPerformance {
    pub player_id: String,
    pub player_name: String,
    pub match_id: String,
    pub runs: u32,
    pub balls_faced: u32,
    pub strike_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BowlingPerformance {
    pub player_id: String,
    pub player_name: String,
    pub match_id: String,
    pub wickets: u32,
    pub runs_conceded: u32,
    pub overs: Overs,
}

/// Snapshot in the `tournament_stats` collection, overwritten by every
/// recompute run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentStats {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub tournament_id: String,
    pub standings: Vec<TeamTournamentStanding>,
    pub top_scorers: Vec<BattingLeader>,
    pub top_wicket_takers: Vec<BowlingLeader>,
    pub most_sixes: Vec<BattingLeader>,
    pub best_batting: Option<BattingPerformance>,
    pub best_bowling: Option<BowlingPerformance>,
    pub matches_considered: u32,
    pub run: u64,
    pub generated_at: DateTime<Utc>,
}
