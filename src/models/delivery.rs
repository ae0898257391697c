use std::fmt;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Penalty run added for a wide or a no-ball before any runs are taken.
pub const EXTRA_PENALTY_RUNS: u32 = 1;

/// Most runs that can be taken off a single ball, overthrows included.
pub const MAX_RUNS_PER_BALL: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraType {
    Wide,
    NoBall,
    Bye,
    LegBye,
}

impl ExtraType {
    /// Wides and no-balls are re-bowled and do not count toward the over.
    pub fn is_legal(&self) -> bool {
        matches!(self, Self::Bye | Self::LegBye)
    }

    /// Extras charged against the bowler's figures.
    pub fn charged_to_bowler(&self) -> bool {
        matches!(self, Self::Wide | Self::NoBall)
    }
}

impl fmt::Display for ExtraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wide => write!(f, "wide"),
            Self::NoBall => write!(f, "no-ball"),
            Self::Bye => write!(f, "bye"),
            Self::LegBye => write!(f, "leg-bye"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DismissalType {
    Bowled,
    Caught,
    LegBeforeWicket,
    RunOut,
    Stumped,
    HitWicket,
}

impl DismissalType {
    pub fn credited_to_bowler(&self) -> bool {
        !matches!(self, Self::RunOut)
    }

    /// Only a run out can dismiss the non-striker.
    pub fn can_dismiss_non_striker(&self) -> bool {
        matches!(self, Self::RunOut)
    }
}

impl fmt::Display for DismissalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bowled => write!(f, "bowled"),
            Self::Caught => write!(f, "caught"),
            Self::LegBeforeWicket => write!(f, "lbw"),
            Self::RunOut => write!(f, "run out"),
            Self::Stumped => write!(f, "stumped"),
            Self::HitWicket => write!(f, "hit wicket"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wicket {
    pub dismissal: DismissalType,
    pub player_out_id: String,
    pub fielder_id: Option<String>,
}

/// One ball-by-ball event. Immutable once appended to the `ball_by_ball`
/// collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub delivery_id: String,
    pub match_id: String,
    pub tournament_id: String,
    pub innings: u8,
    /// Zero-based over the delivery was bowled in.
    pub over: u32,
    /// Ball of the over (1..=6); wides and no-balls repeat the next number.
    pub ball: u8,
    /// Position in the match log, used for replay ordering.
    pub sequence: u32,
    pub batting_team_id: String,
    pub bowling_team_id: String,
    pub striker_id: String,
    pub non_striker_id: String,
    pub bowler_id: String,
    /// Runs off the bat.
    pub runs: u32,
    pub extra: Option<ExtraType>,
    /// Runs added to the extras counter for `extra`, penalty included.
    pub extra_runs: u32,
    pub wicket: Option<Wicket>,
    pub timestamp: DateTime<Utc>,
    pub commentary: String,
}

impl Delivery {
    pub fn is_extra(&self) -> bool {
        self.extra.is_some()
    }

    pub fn is_wicket(&self) -> bool {
        self.wicket.is_some()
    }

    pub fn is_legal(&self) -> bool {
        self.extra.map_or(true, |e| e.is_legal())
    }

    pub fn total_runs(&self) -> u32 {
        self.runs + self.extra_runs
    }

    /// Wides are the only delivery the striker does not face.
    pub fn faced_by_striker(&self) -> bool {
        self.extra != Some(ExtraType::Wide)
    }

    pub fn conceded_by_bowler(&self) -> u32 {
        match self.extra {
            Some(extra) if extra.charged_to_bowler() => self.runs + self.extra_runs,
            Some(_) => self.runs,
            None => self.runs,
        }
    }

    /// Runs physically run between the wickets, which decide strike rotation.
    pub fn runs_taken(&self) -> u32 {
        match self.extra {
            Some(ExtraType::Wide) => self.extra_runs.saturating_sub(EXTRA_PENALTY_RUNS),
            Some(ExtraType::NoBall) | None => self.runs,
            Some(ExtraType::Bye) | Some(ExtraType::LegBye) => self.extra_runs,
        }
    }

    pub fn label(&self) -> String {
        format!("{}.{}", self.over, self.ball)
    }
}

// For recording a delivery. `runs` stays signed so a negative value reaches
// the state machine and is rejected there instead of failing deserialization.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DeliveryInput {
    pub runs: i32,
    pub extra: Option<ExtraType>,
    #[validate(length(min = 1, message = "Bowler ID cannot be empty"))]
    pub bowler_id: Option<String>,
}

impl DeliveryInput {
    pub fn runs(runs: i32) -> Self {
        Self {
            runs,
            ..Default::default()
        }
    }

    pub fn extra(extra: ExtraType, runs: i32) -> Self {
        Self {
            runs,
            extra: Some(extra),
            bowler_id: None,
        }
    }

    pub fn with_bowler(mut self, bowler_id: &str) -> Self {
        self.bowler_id = Some(bowler_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WicketInput {
    pub dismissal: DismissalType,

    #[validate(length(min = 1, message = "Dismissed player is required"))]
    pub player_out_id: String,

    pub fielder_id: Option<String>,

    /// Completed runs before a run out.
    #[serde(default)]
    pub runs: i32,

    #[validate(length(min = 1, message = "Bowler ID cannot be empty"))]
    pub bowler_id: Option<String>,
}

impl WicketInput {
    pub fn new(dismissal: DismissalType, player_out_id: &str) -> Self {
        Self {
            dismissal,
            player_out_id: player_out_id.to_string(),
            fielder_id: None,
            runs: 0,
            bowler_id: None,
        }
    }

    pub fn with_fielder(mut self, fielder_id: &str) -> Self {
        self.fielder_id = Some(fielder_id.to_string());
        self
    }
}
