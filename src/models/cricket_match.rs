use std::fmt;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const BALLS_PER_OVER: u8 = 6;

/// Overs as a structured pair. Never stored as a decimal; the `15.3` form
/// only exists through `Display`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overs {
    pub completed: u32,
    pub balls: u8,
}

impl Overs {
    pub fn from_balls(legal_balls: u32) -> Self {
        Self {
            completed: legal_balls / BALLS_PER_OVER as u32,
            balls: (legal_balls % BALLS_PER_OVER as u32) as u8,
        }
    }

    pub fn total_balls(&self) -> u32 {
        self.completed * BALLS_PER_OVER as u32 + self.balls as u32
    }

    /// True fractional overs (15.3 overs is 15.5), for rate calculations.
    pub fn as_fraction(&self) -> f64 {
        self.total_balls() as f64 / BALLS_PER_OVER as f64
    }
}

impl fmt::Display for Overs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.completed, self.balls)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extras {
    pub wides: u32,
    pub no_balls: u32,
    pub byes: u32,
    pub leg_byes: u32,
}

impl Extras {
    pub fn total(&self) -> u32 {
        self.wides + self.no_balls + self.byes + self.leg_byes
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Innings {
    pub number: u8,
    pub batting_team_id: String,
    pub bowling_team_id: String,
    pub score: u32,
    pub wickets: u8,
    pub overs: Overs,
    pub extras: Extras,
    #[serde(default)]
    pub dismissed_player_ids: Vec<String>,
    /// Set once the innings accepts no further deliveries (overs used up,
    /// all out, target reached, or ended explicitly).
    pub closed: bool,
}

impl Innings {
    pub fn new(number: u8, batting_team_id: &str, bowling_team_id: &str) -> Self {
        Self {
            number,
            batting_team_id: batting_team_id.to_string(),
            bowling_team_id: bowling_team_id.to_string(),
            score: 0,
            wickets: 0,
            overs: Overs::default(),
            extras: Extras::default(),
            dismissed_player_ids: Vec::new(),
            closed: false,
        }
    }

    pub fn scoreline(&self) -> String {
        format!("{}/{} ({})", self.score, self.wickets, self.overs)
    }
}

/// Who is at the crease and where the current over stands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveState {
    pub striker_id: Option<String>,
    pub non_striker_id: Option<String>,
    pub bowler_id: Option<String>,
    pub previous_over_bowler_id: Option<String>,
    pub current_over: u32,
    pub balls_in_over: u8,
    pub bowler_change_required: bool,
}

impl LiveState {
    pub fn awaiting_batsman(&self) -> bool {
        self.striker_id.is_none() || self.non_striker_id.is_none()
    }

    pub fn swap_strike(&mut self) {
        std::mem::swap(&mut self.striker_id, &mut self.non_striker_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Upcoming,
    Ongoing,
    Completed,
    Cancelled,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upcoming => write!(f, "upcoming"),
            Self::Ongoing => write!(f, "ongoing"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Scoring state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MatchPhase {
    Scheduled,
    Live { innings: u8 },
    Completed,
    Cancelled,
}

impl MatchPhase {
    pub fn status(&self) -> MatchStatus {
        match self {
            Self::Scheduled => MatchStatus::Upcoming,
            Self::Live { .. } => MatchStatus::Ongoing,
            Self::Completed => MatchStatus::Completed,
            Self::Cancelled => MatchStatus::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Live { innings } => write!(f, "live(innings={})", innings),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TossDecision {
    Bat,
    Bowl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Toss {
    pub winner_team_id: String,
    pub decision: TossDecision,
    pub batting_first_team_id: String,
}

/// Second-innings target state. Absent until innings 2 starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Chase {
    pub target: u32,
    pub required_runs: u32,
    pub remaining_balls: u32,
    /// `None` once no balls remain.
    pub required_run_rate: Option<f64>,
}

impl Chase {
    pub fn ended(&self) -> bool {
        self.remaining_balls == 0 || self.required_runs == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResultMargin {
    Runs(u32),
    Wickets(u8),
    Tie,
    NoResult,
    Awarded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner_team_id: Option<String>,
    pub margin: ResultMargin,
    pub summary: String,
}

// Main Match model - one document per fixture in the `matches` collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub match_id: String,
    pub tournament_id: String,
    pub team_a_id: String,
    pub team_b_id: String,
    pub venue: String,
    pub overs_per_innings: u32,
    pub team_size: u8,
    pub toss: Option<Toss>,
    pub status: MatchStatus,
    pub phase: MatchPhase,
    pub current_innings: u8,
    pub innings: Vec<Innings>,
    pub live: LiveState,
    pub chase: Option<Chase>,
    pub result: Option<MatchResult>,
    pub deliveries_recorded: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Match {
    pub fn new(request: &CreateMatch, overs_per_innings: u32, team_size: u8) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            match_id: uuid::Uuid::new_v4().to_string(),
            tournament_id: request.tournament_id.clone(),
            team_a_id: request.team_a_id.clone(),
            team_b_id: request.team_b_id.clone(),
            venue: request.venue.clone(),
            overs_per_innings,
            team_size,
            toss: None,
            status: MatchStatus::Upcoming,
            phase: MatchPhase::Scheduled,
            current_innings: 1,
            innings: Vec::new(),
            live: LiveState::default(),
            chase: None,
            result: None,
            deliveries_recorded: 0,
            created_at: now,
            last_updated: now,
        }
    }

    pub fn max_wickets(&self) -> u8 {
        self.team_size.saturating_sub(1)
    }

    pub fn balls_per_innings(&self) -> u32 {
        self.overs_per_innings * BALLS_PER_OVER as u32
    }

    pub fn innings_at(&self, number: u8) -> Option<&Innings> {
        self.innings.iter().find(|i| i.number == number)
    }

    pub fn current(&self) -> Option<&Innings> {
        self.innings_at(self.current_innings)
    }

    pub fn has_team(&self, team_id: &str) -> bool {
        self.team_a_id == team_id || self.team_b_id == team_id
    }

    pub fn opponent_of(&self, team_id: &str) -> Option<&str> {
        if self.team_a_id == team_id {
            Some(&self.team_b_id)
        } else if self.team_b_id == team_id {
            Some(&self.team_a_id)
        } else {
            None
        }
    }

    pub fn scoreline(&self) -> String {
        match self.current() {
            Some(innings) => innings.scoreline(),
            None => "yet to bat".to_string(),
        }
    }
}

// For creating new matches
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMatch {
    #[validate(length(min = 1, message = "Tournament ID is required"))]
    pub tournament_id: String,

    #[validate(length(min = 1, message = "Team A is required"))]
    pub team_a_id: String,

    #[validate(length(min = 1, message = "Team B is required"))]
    pub team_b_id: String,

    #[serde(default)]
    pub venue: String,

    #[validate(range(min = 1, max = 50, message = "Overs must be between 1 and 50"))]
    pub overs_per_innings: Option<u32>,

    #[validate(range(min = 2, max = 11, message = "Team size must be between 2 and 11"))]
    pub team_size: Option<u8>,
}

/// Players taking the field at the start of an innings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Openers {
    #[validate(length(min = 1, message = "Striker is required"))]
    pub striker_id: String,

    #[validate(length(min = 1, message = "Non-striker is required"))]
    pub non_striker_id: String,

    #[validate(length(min = 1, message = "Bowler is required"))]
    pub bowler_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StartMatch {
    #[validate(length(min = 1, message = "Toss winner is required"))]
    pub toss_winner_team_id: String,

    pub decision: TossDecision,

    #[validate(nested)]
    pub openers: Openers,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct EndInnings {
    #[validate(nested)]
    pub openers: Option<Openers>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteMatch {
    pub winner_team_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlayerSelection {
    #[validate(length(min = 1, message = "Player ID is required"))]
    pub player_id: String,
}

// For query parameters
#[derive(Debug, Deserialize)]
pub struct MatchQuery {
    pub tournament_id: Option<String>,
    pub status: Option<MatchStatus>,
}
