//! Match scoring state machine.
//!
//! `Scheduled -> Live(1) -> Live(2) -> Completed`, with `Cancelled` reachable
//! from any state before completion. Every command runs against a copy of the
//! match and is committed only if it succeeds, so a rejected command leaves
//! the match exactly as it was.

use chrono::Utc;
use tracing::{debug, warn};

use super::commentary::commentary;
use crate::errors::{AppError, Result};
use crate::models::cricket_match::{
    Chase, Innings, LiveState, Match, MatchPhase, MatchResult, Openers, ResultMargin,
    StartMatch, Toss, TossDecision, BALLS_PER_OVER,
};
use crate::models::delivery::{
    Delivery, DeliveryInput, DismissalType, ExtraType, Wicket, WicketInput, EXTRA_PENALTY_RUNS,
    MAX_RUNS_PER_BALL,
};

/// What a successful delivery did to the match, beyond the delivery itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryOutcome {
    pub delivery: Delivery,
    pub over_completed: bool,
    pub innings_closed: bool,
    pub chase: Option<Chase>,
}

pub struct MatchStateMachine {
    state: Match,
}

impl MatchStateMachine {
    pub fn new(state: Match) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &Match {
        &self.state
    }

    pub fn into_inner(self) -> Match {
        self.state
    }

    fn transact<T>(&mut self, op: &str, f: impl FnOnce(&mut Match) -> Result<T>) -> Result<T> {
        let mut next = self.state.clone();
        let outcome = f(&mut next).and_then(|out| {
            check_invariants(&next)?;
            Ok(out)
        });

        match outcome {
            Ok(out) => {
                next.last_updated = Utc::now();
                self.state = next;
                Ok(out)
            }
            Err(e) => {
                warn!(match_id = %self.state.match_id, op, error = %e, "scoring command rejected");
                Err(e)
            }
        }
    }

    pub fn start(&mut self, request: &StartMatch) -> Result<()> {
        self.transact("start", |m| {
            if m.phase != MatchPhase::Scheduled {
                return Err(AppError::invalid_transition(format!(
                    "match {} is {}, only a scheduled match can start",
                    m.match_id, m.phase
                )));
            }

            let winner = request.toss_winner_team_id.as_str();
            let loser = m
                .opponent_of(winner)
                .map(str::to_string)
                .ok_or_else(|| AppError::invalid_data(format!("team {} is not playing this match", winner)))?;

            let (batting, bowling) = match request.decision {
                TossDecision::Bat => (winner.to_string(), loser),
                TossDecision::Bowl => (loser, winner.to_string()),
            };

            validate_openers(&request.openers)?;

            m.toss = Some(Toss {
                winner_team_id: winner.to_string(),
                decision: request.decision,
                batting_first_team_id: batting.clone(),
            });
            m.innings = vec![Innings::new(1, &batting, &bowling)];
            m.current_innings = 1;
            m.live = live_state_for(Some(&request.openers));
            set_phase(m, MatchPhase::Live { innings: 1 });

            debug!(match_id = %m.match_id, batting_first = %batting, "match started");
            Ok(())
        })
    }

    pub fn record_delivery(&mut self, input: &DeliveryInput) -> Result<DeliveryOutcome> {
        self.transact("record_delivery", |m| {
            ensure_scoring_ready(m)?;
            let runs = runs_for_ball(input.runs)?;
            resolve_bowler(m, input.bowler_id.as_deref())?;

            let (bat_runs, extra_runs) = match input.extra {
                None => (runs, 0),
                Some(ExtraType::Wide) => (0, EXTRA_PENALTY_RUNS + runs),
                Some(ExtraType::NoBall) => (runs, EXTRA_PENALTY_RUNS),
                Some(ExtraType::Bye) | Some(ExtraType::LegBye) => (0, runs),
            };

            let delivery = build_delivery(m, bat_runs, input.extra, extra_runs, None)?;
            apply_delivery(m, delivery)
        })
    }

    pub fn record_wicket(&mut self, input: &WicketInput) -> Result<DeliveryOutcome> {
        self.transact("record_wicket", |m| {
            live_innings(m)?;
            let max_wickets = m.max_wickets();
            let wickets = m.current().map(|i| i.wickets).unwrap_or(0);
            if wickets >= max_wickets {
                return Err(AppError::invariant(format!(
                    "innings {} already has {} wickets, the most a side of {} can lose",
                    m.current_innings, wickets, m.team_size
                )));
            }

            ensure_scoring_ready(m)?;
            let runs = runs_for_ball(input.runs)?;
            if runs > 0 && input.dismissal != DismissalType::RunOut {
                return Err(AppError::invariant("only a run out can carry completed runs"));
            }

            let at_striker = m.live.striker_id.as_deref() == Some(input.player_out_id.as_str());
            let at_non_striker = m.live.non_striker_id.as_deref() == Some(input.player_out_id.as_str());
            if !at_striker && !(at_non_striker && input.dismissal.can_dismiss_non_striker()) {
                return Err(AppError::invariant(format!(
                    "player {} cannot be out {} from their end",
                    input.player_out_id, input.dismissal
                )));
            }

            resolve_bowler(m, input.bowler_id.as_deref())?;

            let wicket = Wicket {
                dismissal: input.dismissal,
                player_out_id: input.player_out_id.clone(),
                fielder_id: input.fielder_id.clone(),
            };
            let delivery = build_delivery(m, runs, None, 0, Some(wicket))?;
            apply_delivery(m, delivery)
        })
    }

    /// Fills the vacancy left by a dismissal.
    pub fn set_new_batsman(&mut self, player_id: &str) -> Result<()> {
        self.transact("set_new_batsman", |m| {
            live_innings(m)?;
            let innings = current_innings(m)?;
            if innings.closed {
                return Err(AppError::invalid_transition(format!(
                    "innings {} is closed",
                    innings.number
                )));
            }
            if innings.dismissed_player_ids.iter().any(|p| p == player_id) {
                return Err(AppError::invariant(format!(
                    "player {} is already out in this innings",
                    player_id
                )));
            }

            let live = &mut m.live;
            if live.striker_id.as_deref() == Some(player_id)
                || live.non_striker_id.as_deref() == Some(player_id)
            {
                return Err(AppError::invariant(format!("player {} is already batting", player_id)));
            }

            if live.striker_id.is_none() {
                live.striker_id = Some(player_id.to_string());
            } else if live.non_striker_id.is_none() {
                live.non_striker_id = Some(player_id.to_string());
            } else {
                return Err(AppError::invalid_transition("both batsmen are already at the crease"));
            }
            Ok(())
        })
    }

    pub fn set_bowler(&mut self, player_id: &str) -> Result<()> {
        self.transact("set_bowler", |m| {
            live_innings(m)?;
            resolve_bowler(m, Some(player_id))
        })
    }

    /// Ends the current innings. Ending innings 1 starts the chase; ending
    /// innings 2 completes the match on the scores.
    pub fn end_innings(&mut self, openers: Option<&Openers>) -> Result<()> {
        self.transact("end_innings", |m| {
            match live_innings(m)? {
                1 => {
                    if let Some(openers) = openers {
                        validate_openers(openers)?;
                    }
                    let first = current_innings_mut(m)?;
                    first.closed = true;
                    let chasing = Innings::new(2, &first.bowling_team_id, &first.batting_team_id);

                    m.innings.push(chasing);
                    m.current_innings = 2;
                    m.live = live_state_for(openers);
                    set_phase(m, MatchPhase::Live { innings: 2 });
                    refresh_chase(m);
                    Ok(())
                }
                _ => finish(m, None),
            }
        })
    }

    pub fn complete_match(&mut self, winner_team_id: Option<&str>) -> Result<()> {
        self.transact("complete_match", |m| {
            live_innings(m)?;
            finish(m, winner_team_id)
        })
    }

    pub fn cancel(&mut self) -> Result<()> {
        self.transact("cancel", |m| {
            if m.phase.is_terminal() {
                return Err(AppError::invalid_transition(format!(
                    "match {} is already {}",
                    m.match_id, m.phase
                )));
            }
            set_phase(m, MatchPhase::Cancelled);
            Ok(())
        })
    }
}

/// Required runs and rate for the side batting second.
pub fn chase_for(
    first_innings_score: u32,
    second_innings_score: u32,
    balls_bowled: u32,
    balls_per_innings: u32,
) -> Chase {
    let target = first_innings_score + 1;
    let required_runs = target.saturating_sub(second_innings_score);
    let remaining_balls = balls_per_innings.saturating_sub(balls_bowled);
    let required_run_rate = if remaining_balls == 0 {
        None
    } else {
        Some(required_runs as f64 * BALLS_PER_OVER as f64 / remaining_balls as f64)
    };

    Chase {
        target,
        required_runs,
        remaining_balls,
        required_run_rate,
    }
}

/// Result on the scores, overridden by an explicitly named winner.
pub fn decide_result(m: &Match, explicit_winner: Option<&str>) -> MatchResult {
    let computed = match (m.innings_at(1), m.innings_at(2)) {
        (Some(first), Some(second)) if second.score > first.score => {
            let margin = m.max_wickets().saturating_sub(second.wickets);
            MatchResult {
                winner_team_id: Some(second.batting_team_id.clone()),
                margin: ResultMargin::Wickets(margin),
                summary: format!("{} won by {} wickets", second.batting_team_id, margin),
            }
        }
        (Some(first), Some(second)) if first.score > second.score => {
            let margin = first.score - second.score;
            MatchResult {
                winner_team_id: Some(first.batting_team_id.clone()),
                margin: ResultMargin::Runs(margin),
                summary: format!("{} won by {} runs", first.batting_team_id, margin),
            }
        }
        (Some(_), Some(_)) => MatchResult {
            winner_team_id: None,
            margin: ResultMargin::Tie,
            summary: "Match tied".to_string(),
        },
        _ => MatchResult {
            winner_team_id: None,
            margin: ResultMargin::NoResult,
            summary: "No result".to_string(),
        },
    };

    match explicit_winner {
        Some(winner) if computed.winner_team_id.as_deref() != Some(winner) => MatchResult {
            winner_team_id: Some(winner.to_string()),
            margin: ResultMargin::Awarded,
            summary: format!("{} awarded the match", winner),
        },
        _ => computed,
    }
}

fn set_phase(m: &mut Match, phase: MatchPhase) {
    m.phase = phase;
    m.status = phase.status();
}

fn live_innings(m: &Match) -> Result<u8> {
    match m.phase {
        MatchPhase::Live { innings } => Ok(innings),
        other => Err(AppError::invalid_transition(format!(
            "match {} is {}, not live",
            m.match_id, other
        ))),
    }
}

fn current_innings(m: &Match) -> Result<&Innings> {
    m.current()
        .ok_or_else(|| AppError::invariant(format!("innings {} is missing", m.current_innings)))
}

fn current_innings_mut(m: &mut Match) -> Result<&mut Innings> {
    let number = m.current_innings;
    m.innings
        .iter_mut()
        .find(|i| i.number == number)
        .ok_or_else(|| AppError::invariant(format!("innings {} is missing", number)))
}

fn ensure_scoring_ready(m: &Match) -> Result<()> {
    live_innings(m)?;
    let innings = current_innings(m)?;
    if innings.closed {
        return Err(AppError::invalid_transition(format!(
            "innings {} is closed, end the innings to continue",
            innings.number
        )));
    }
    if m.live.awaiting_batsman() {
        return Err(AppError::invalid_transition(
            "a batsman must be selected before the next delivery",
        ));
    }
    Ok(())
}

fn runs_for_ball(runs: i32) -> Result<u32> {
    let runs =
        u32::try_from(runs).map_err(|_| AppError::invariant(format!("runs cannot be negative ({})", runs)))?;
    if runs > MAX_RUNS_PER_BALL {
        return Err(AppError::invariant(format!(
            "{} runs off one ball, at most {} can be taken",
            runs, MAX_RUNS_PER_BALL
        )));
    }
    Ok(runs)
}

fn add_runs(total: u32, runs: u32, what: &str) -> Result<u32> {
    total
        .checked_add(runs)
        .ok_or_else(|| AppError::invariant(format!("{} would overflow", what)))
}

fn validate_openers(openers: &Openers) -> Result<()> {
    if openers.striker_id == openers.non_striker_id {
        return Err(AppError::invalid_data("striker and non-striker must be different players"));
    }
    Ok(())
}

fn live_state_for(openers: Option<&Openers>) -> LiveState {
    match openers {
        Some(o) => LiveState {
            striker_id: Some(o.striker_id.clone()),
            non_striker_id: Some(o.non_striker_id.clone()),
            bowler_id: Some(o.bowler_id.clone()),
            ..LiveState::default()
        },
        None => LiveState::default(),
    }
}

fn resolve_bowler(m: &mut Match, requested: Option<&str>) -> Result<()> {
    let live = &mut m.live;
    match requested {
        Some(bowler) => {
            if live.bowler_change_required && live.previous_over_bowler_id.as_deref() == Some(bowler) {
                return Err(AppError::invalid_transition(format!(
                    "bowler {} cannot bowl consecutive overs",
                    bowler
                )));
            }
            live.bowler_id = Some(bowler.to_string());
            live.bowler_change_required = false;
            Ok(())
        }
        None if live.bowler_change_required => Err(AppError::invalid_transition(
            "over complete, a new bowler must be named",
        )),
        None if live.bowler_id.is_none() => Err(AppError::invalid_transition("no bowler selected")),
        None => Ok(()),
    }
}

fn build_delivery(
    m: &Match,
    runs: u32,
    extra: Option<ExtraType>,
    extra_runs: u32,
    wicket: Option<Wicket>,
) -> Result<Delivery> {
    let innings = current_innings(m)?;
    let missing = |slot: &str| AppError::invariant(format!("no {} at the crease", slot));

    let taken = match extra {
        Some(ExtraType::Wide) => extra_runs.saturating_sub(EXTRA_PENALTY_RUNS),
        Some(ExtraType::Bye) | Some(ExtraType::LegBye) => extra_runs,
        Some(ExtraType::NoBall) | None => runs,
    };

    Ok(Delivery {
        id: None,
        delivery_id: uuid::Uuid::new_v4().to_string(),
        match_id: m.match_id.clone(),
        tournament_id: m.tournament_id.clone(),
        innings: innings.number,
        over: m.live.current_over,
        ball: m.live.balls_in_over + 1,
        sequence: m.deliveries_recorded,
        batting_team_id: innings.batting_team_id.clone(),
        bowling_team_id: innings.bowling_team_id.clone(),
        striker_id: m.live.striker_id.clone().ok_or_else(|| missing("striker"))?,
        non_striker_id: m.live.non_striker_id.clone().ok_or_else(|| missing("non-striker"))?,
        bowler_id: m.live.bowler_id.clone().ok_or_else(|| missing("bowler"))?,
        runs,
        extra,
        extra_runs,
        commentary: commentary(taken, extra, wicket.as_ref().map(|w| w.dismissal)),
        wicket,
        timestamp: Utc::now(),
    })
}

fn apply_delivery(m: &mut Match, delivery: Delivery) -> Result<DeliveryOutcome> {
    let max_wickets = m.max_wickets();
    let balls_per_innings = m.balls_per_innings();
    let target = m.chase.map(|c| c.target);

    let innings = current_innings_mut(m)?;
    innings.score = add_runs(innings.score, delivery.total_runs(), "innings score")?;
    let extras = &mut innings.extras;
    let counter = match delivery.extra {
        Some(ExtraType::Wide) => Some(&mut extras.wides),
        Some(ExtraType::NoBall) => Some(&mut extras.no_balls),
        Some(ExtraType::Bye) => Some(&mut extras.byes),
        Some(ExtraType::LegBye) => Some(&mut extras.leg_byes),
        None => None,
    };
    if let Some(counter) = counter {
        *counter = add_runs(*counter, delivery.extra_runs, "extras")?;
    }
    if let Some(wicket) = &delivery.wicket {
        innings.wickets += 1;
        innings.dismissed_player_ids.push(wicket.player_out_id.clone());
    }
    if delivery.is_legal() {
        innings.overs = crate::models::cricket_match::Overs::from_balls(innings.overs.total_balls() + 1);
    }

    let all_out = innings.wickets >= max_wickets;
    let overs_done = innings.overs.total_balls() >= balls_per_innings;
    let target_reached = target.map_or(false, |t| innings.score >= t);
    let innings_closed = all_out || overs_done || target_reached;
    innings.closed = innings_closed;

    m.deliveries_recorded += 1;

    let live = &mut m.live;
    if let Some(wicket) = &delivery.wicket {
        if live.striker_id.as_deref() == Some(wicket.player_out_id.as_str()) {
            live.striker_id = None;
        } else {
            live.non_striker_id = None;
        }
    }
    if delivery.runs_taken() % 2 == 1 {
        live.swap_strike();
    }

    let mut over_completed = false;
    if delivery.is_legal() {
        live.balls_in_over += 1;
        if live.balls_in_over == BALLS_PER_OVER {
            live.balls_in_over = 0;
            live.current_over += 1;
            live.previous_over_bowler_id = live.bowler_id.take();
            live.bowler_change_required = true;
            live.swap_strike();
            over_completed = true;
        }
    }

    refresh_chase(m);

    Ok(DeliveryOutcome {
        delivery,
        over_completed,
        innings_closed,
        chase: m.chase,
    })
}

fn refresh_chase(m: &mut Match) {
    m.chase = match (m.current_innings, m.innings_at(1), m.innings_at(2)) {
        (2, Some(first), Some(second)) => Some(chase_for(
            first.score,
            second.score,
            second.overs.total_balls(),
            m.balls_per_innings(),
        )),
        _ => None,
    };
}

fn finish(m: &mut Match, winner_team_id: Option<&str>) -> Result<()> {
    if let Some(winner) = winner_team_id {
        if !m.has_team(winner) {
            return Err(AppError::invalid_data(format!("team {} is not playing this match", winner)));
        }
    }

    let result = decide_result(m, winner_team_id);
    for innings in m.innings.iter_mut() {
        innings.closed = true;
    }
    m.live.bowler_change_required = false;
    debug!(match_id = %m.match_id, summary = %result.summary, "match completed");
    m.result = Some(result);
    set_phase(m, MatchPhase::Completed);
    Ok(())
}

fn check_invariants(m: &Match) -> Result<()> {
    if m.live.balls_in_over >= BALLS_PER_OVER {
        return Err(AppError::invariant("balls in over must stay below six"));
    }
    for innings in &m.innings {
        if innings.wickets > m.max_wickets() {
            return Err(AppError::invariant(format!(
                "innings {} has {} wickets, more than a side of {} allows",
                innings.number, innings.wickets, m.team_size
            )));
        }
        if innings.extras.total() > innings.score {
            return Err(AppError::invariant("extras exceed the innings score"));
        }
    }
    if let (MatchPhase::Live { .. }, Some(innings)) = (m.phase, m.current()) {
        let live_balls = m.live.current_over * BALLS_PER_OVER as u32 + m.live.balls_in_over as u32;
        if live_balls != innings.overs.total_balls() {
            return Err(AppError::invariant(format!(
                "over counter {}.{} disagrees with innings overs {}",
                m.live.current_over, m.live.balls_in_over, innings.overs
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cricket_match::{CreateMatch, MatchStatus, Overs};
    use pretty_assertions::assert_eq;

    fn openers(striker: &str, non_striker: &str, bowler: &str) -> Openers {
        Openers {
            striker_id: striker.to_string(),
            non_striker_id: non_striker.to_string(),
            bowler_id: bowler.to_string(),
        }
    }

    fn scheduled(overs: u32, team_size: u8) -> MatchStateMachine {
        let request = CreateMatch {
            tournament_id: "t1".to_string(),
            team_a_id: "A".to_string(),
            team_b_id: "B".to_string(),
            venue: "Oval".to_string(),
            overs_per_innings: Some(overs),
            team_size: Some(team_size),
        };
        MatchStateMachine::new(Match::new(&request, overs, team_size))
    }

    fn live(overs: u32, team_size: u8) -> MatchStateMachine {
        let mut machine = scheduled(overs, team_size);
        machine
            .start(&StartMatch {
                toss_winner_team_id: "A".to_string(),
                decision: TossDecision::Bat,
                openers: openers("a1", "a2", "b1"),
            })
            .unwrap();
        machine
    }

    fn bowl_over(machine: &mut MatchStateMachine, bowler: &str, runs: i32) {
        machine
            .record_delivery(&DeliveryInput::runs(runs).with_bowler(bowler))
            .unwrap();
        for _ in 1..6 {
            machine.record_delivery(&DeliveryInput::runs(runs)).unwrap();
        }
    }

    #[test]
    fn test_start_sets_batting_side() {
        let mut machine = scheduled(20, 11);
        machine
            .start(&StartMatch {
                toss_winner_team_id: "A".to_string(),
                decision: TossDecision::Bowl,
                openers: openers("b1", "b2", "a1"),
            })
            .unwrap();

        let state = machine.state();
        assert_eq!(state.status, MatchStatus::Ongoing);
        assert_eq!(state.phase, MatchPhase::Live { innings: 1 });
        assert_eq!(state.current().unwrap().batting_team_id, "B");
        assert_eq!(state.toss.as_ref().unwrap().batting_first_team_id, "B");
        assert!(state.chase.is_none());
    }

    #[test]
    fn test_ball_counter_cycles_through_over() {
        let mut machine = live(20, 11);

        for expected in 1..6u8 {
            machine.record_delivery(&DeliveryInput::runs(0)).unwrap();
            assert_eq!(machine.state().live.balls_in_over, expected);
            assert_eq!(machine.state().live.current_over, 0);
        }

        let outcome = machine.record_delivery(&DeliveryInput::runs(0)).unwrap();
        assert!(outcome.over_completed);
        assert_eq!(machine.state().live.balls_in_over, 0);
        assert_eq!(machine.state().live.current_over, 1);
        assert!(machine.state().live.bowler_change_required);
        assert_eq!(machine.state().current().unwrap().overs, Overs { completed: 1, balls: 0 });
    }

    #[test]
    fn test_over_increments_once_per_six_legal_balls() {
        let mut machine = live(20, 11);
        let bowlers = ["b1", "b2"];

        for n in 0..15u32 {
            let mut input = DeliveryInput::runs(0);
            if n % 6 == 0 {
                input = input.with_bowler(bowlers[(n / 6) as usize % 2]);
            }
            machine.record_delivery(&input).unwrap();
        }

        assert_eq!(machine.state().live.current_over, 2);
        assert_eq!(machine.state().live.balls_in_over, 3);
        assert_eq!(machine.state().current().unwrap().overs.to_string(), "2.3");
    }

    #[test]
    fn test_wides_and_no_balls_do_not_advance_ball() {
        let mut machine = live(20, 11);

        machine.record_delivery(&DeliveryInput::extra(ExtraType::Wide, 0)).unwrap();
        machine.record_delivery(&DeliveryInput::extra(ExtraType::NoBall, 4)).unwrap();
        machine.record_delivery(&DeliveryInput::extra(ExtraType::Wide, 2)).unwrap();

        let state = machine.state();
        assert_eq!(state.live.balls_in_over, 0);
        let innings = state.current().unwrap();
        assert_eq!(innings.overs.total_balls(), 0);
        assert_eq!(innings.score, 1 + 5 + 3);
        assert_eq!(innings.extras.wides, 4);
        assert_eq!(innings.extras.no_balls, 1);
    }

    #[test]
    fn test_byes_advance_ball_and_count_as_extras() {
        let mut machine = live(20, 11);
        let outcome = machine.record_delivery(&DeliveryInput::extra(ExtraType::LegBye, 2)).unwrap();

        assert_eq!(outcome.delivery.runs, 0);
        assert_eq!(outcome.delivery.extra_runs, 2);
        let innings = machine.state().current().unwrap();
        assert_eq!(innings.extras.leg_byes, 2);
        assert_eq!(innings.score, 2);
        assert_eq!(machine.state().live.balls_in_over, 1);
    }

    #[test]
    fn test_bowler_change_enforced_after_over() {
        let mut machine = live(20, 11);
        bowl_over(&mut machine, "b1", 0);

        let before = machine.state().clone();
        let err = machine.record_delivery(&DeliveryInput::runs(1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        assert_eq!(machine.state(), &before);

        let err = machine
            .record_delivery(&DeliveryInput::runs(1).with_bowler("b1"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        assert_eq!(machine.state(), &before);

        let outcome = machine
            .record_delivery(&DeliveryInput::runs(1).with_bowler("b2"))
            .unwrap();
        assert_eq!(outcome.delivery.bowler_id, "b2");
        assert_eq!(outcome.delivery.label(), "1.1");
    }

    #[test]
    fn test_strike_rotation() {
        let mut machine = live(20, 11);

        machine.record_delivery(&DeliveryInput::runs(1)).unwrap();
        assert_eq!(machine.state().live.striker_id.as_deref(), Some("a2"));

        machine.record_delivery(&DeliveryInput::runs(4)).unwrap();
        assert_eq!(machine.state().live.striker_id.as_deref(), Some("a2"));

        // four more dots finish the over; ends change
        for _ in 0..4 {
            machine.record_delivery(&DeliveryInput::runs(0)).unwrap();
        }
        assert_eq!(machine.state().live.striker_id.as_deref(), Some("a1"));
    }

    #[test]
    fn test_rejected_when_not_live() {
        let mut machine = scheduled(20, 11);
        let before = machine.state().clone();

        let err = machine.record_delivery(&DeliveryInput::runs(1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        let err = machine
            .record_wicket(&WicketInput::new(DismissalType::Bowled, "a1"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        assert!(matches!(machine.end_innings(None), Err(AppError::InvalidStateTransition(_))));
        assert!(matches!(machine.complete_match(None), Err(AppError::InvalidStateTransition(_))));
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_negative_runs_rejected_without_change() {
        let mut machine = live(20, 11);
        machine.record_delivery(&DeliveryInput::runs(2)).unwrap();
        let before = machine.state().clone();

        let err = machine.record_delivery(&DeliveryInput::runs(-1)).unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_runs_above_per_ball_limit_rejected_without_change() {
        let mut machine = live(20, 11);
        machine
            .record_delivery(&DeliveryInput::extra(ExtraType::NoBall, 6))
            .unwrap();
        let before = machine.state().clone();

        for input in [
            DeliveryInput::extra(ExtraType::NoBall, i32::MAX),
            DeliveryInput::extra(ExtraType::Wide, 8),
            DeliveryInput::runs(MAX_RUNS_PER_BALL as i32 + 1),
        ] {
            let err = machine.record_delivery(&input).unwrap_err();
            assert!(matches!(err, AppError::InvariantViolation(_)));
            assert_eq!(machine.state(), &before);
        }

        let err = machine
            .record_wicket(&WicketInput {
                runs: 100,
                ..WicketInput::new(DismissalType::RunOut, "a1")
            })
            .unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
        assert_eq!(machine.state(), &before);

        let outcome = machine
            .record_delivery(&DeliveryInput::runs(MAX_RUNS_PER_BALL as i32))
            .unwrap();
        assert_eq!(outcome.delivery.runs, 7);
        assert_eq!(machine.state().current().unwrap().score, 7 + 7);
    }

    #[test]
    fn test_score_overflow_rejected() {
        let mut nearly_full = live(20, 11).into_inner();
        nearly_full.innings[0].score = u32::MAX - 2;
        let mut machine = MatchStateMachine::new(nearly_full);
        let before = machine.state().clone();

        let err = machine.record_delivery(&DeliveryInput::runs(4)).unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_wicket_requires_replacement_batsman() {
        let mut machine = live(20, 11);
        let outcome = machine
            .record_wicket(&WicketInput::new(DismissalType::Caught, "a1").with_fielder("b7"))
            .unwrap();

        assert_eq!(outcome.delivery.commentary, "OUT! Caught");
        assert_eq!(machine.state().current().unwrap().wickets, 1);
        assert_eq!(machine.state().live.balls_in_over, 1);
        assert!(machine.state().live.striker_id.is_none());

        let err = machine.record_delivery(&DeliveryInput::runs(1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));

        let err = machine.set_new_batsman("a1").unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        machine.set_new_batsman("a3").unwrap();
        assert_eq!(machine.state().live.striker_id.as_deref(), Some("a3"));
        machine.record_delivery(&DeliveryInput::runs(1)).unwrap();
    }

    #[test]
    fn test_non_striker_only_out_run_out() {
        let mut machine = live(20, 11);
        let err = machine
            .record_wicket(&WicketInput::new(DismissalType::Bowled, "a2"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));

        machine
            .record_wicket(&WicketInput::new(DismissalType::RunOut, "a2"))
            .unwrap();
        assert!(machine.state().live.non_striker_id.is_none());
    }

    #[test]
    fn test_wickets_cannot_exceed_team_size() {
        // side of three can lose two wickets
        let mut machine = live(20, 3);
        machine
            .record_wicket(&WicketInput::new(DismissalType::Bowled, "a1"))
            .unwrap();
        machine.set_new_batsman("a3").unwrap();
        let outcome = machine
            .record_wicket(&WicketInput::new(DismissalType::LegBeforeWicket, "a3"))
            .unwrap();
        assert!(outcome.innings_closed);

        let before = machine.state().clone();
        let err = machine
            .record_wicket(&WicketInput::new(DismissalType::Bowled, "a2"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvariantViolation(_)));
        assert_eq!(machine.state(), &before);

        let err = machine.record_delivery(&DeliveryInput::runs(1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));
        assert_eq!(machine.state(), &before);
        assert_eq!(machine.state().current().unwrap().wickets, 2);
    }

    #[test]
    fn test_required_run_rate_example() {
        let chase = chase_for(150, 90, 90, 120);
        assert_eq!(chase.target, 151);
        assert_eq!(chase.required_runs, 61);
        assert_eq!(chase.remaining_balls, 30);
        assert!((chase.required_run_rate.unwrap() - 12.2).abs() < 1e-9);
        assert!(!chase.ended());
    }

    #[test]
    fn test_chase_ended_when_no_balls_remain() {
        let chase = chase_for(150, 140, 120, 120);
        assert_eq!(chase.remaining_balls, 0);
        assert_eq!(chase.required_run_rate, None);
        assert!(chase.ended());
    }

    #[test]
    fn test_full_match_chase_won() {
        let mut machine = live(1, 11);
        bowl_over(&mut machine, "b1", 1);
        assert!(machine.state().current().unwrap().closed);
        assert_eq!(machine.state().current().unwrap().score, 6);

        machine.end_innings(Some(&openers("b1", "b2", "a1"))).unwrap();
        let state = machine.state();
        assert_eq!(state.phase, MatchPhase::Live { innings: 2 });
        assert_eq!(state.current().unwrap().batting_team_id, "B");
        let chase = state.chase.unwrap();
        assert_eq!(chase.target, 7);
        assert_eq!(chase.required_runs, 7);
        assert_eq!(chase.remaining_balls, 6);

        machine.record_delivery(&DeliveryInput::runs(6)).unwrap();
        let outcome = machine.record_delivery(&DeliveryInput::runs(1)).unwrap();
        assert!(outcome.innings_closed);
        assert!(outcome.chase.unwrap().ended());

        let err = machine.record_delivery(&DeliveryInput::runs(1)).unwrap_err();
        assert!(matches!(err, AppError::InvalidStateTransition(_)));

        machine.end_innings(None).unwrap();
        let state = machine.state();
        assert_eq!(state.status, MatchStatus::Completed);
        let result = state.result.as_ref().unwrap();
        assert_eq!(result.winner_team_id.as_deref(), Some("B"));
        assert_eq!(result.margin, ResultMargin::Wickets(10));
    }

    #[test]
    fn test_tied_match_has_no_winner() {
        let mut machine = live(1, 11);
        bowl_over(&mut machine, "b1", 1);
        machine.end_innings(Some(&openers("b1", "b2", "a1"))).unwrap();
        bowl_over(&mut machine, "a1", 1);
        machine.end_innings(None).unwrap();

        let result = machine.state().result.clone().unwrap();
        assert_eq!(result.winner_team_id, None);
        assert_eq!(result.margin, ResultMargin::Tie);
    }

    #[test]
    fn test_explicit_winner_overrides_scores() {
        let mut machine = live(20, 11);
        machine.record_delivery(&DeliveryInput::runs(4)).unwrap();
        machine.complete_match(Some("B")).unwrap();

        let result = machine.state().result.clone().unwrap();
        assert_eq!(result.winner_team_id.as_deref(), Some("B"));
        assert_eq!(result.margin, ResultMargin::Awarded);

        let before = machine.state().clone();
        assert!(matches!(
            machine.record_delivery(&DeliveryInput::runs(1)),
            Err(AppError::InvalidStateTransition(_))
        ));
        assert!(matches!(machine.cancel(), Err(AppError::InvalidStateTransition(_))));
        assert_eq!(machine.state(), &before);
    }

    #[test]
    fn test_unknown_winner_rejected() {
        let mut machine = live(20, 11);
        let err = machine.complete_match(Some("Z")).unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
        assert_eq!(machine.state().status, MatchStatus::Ongoing);
    }

    #[test]
    fn test_cancel_from_scheduled() {
        let mut machine = scheduled(20, 11);
        machine.cancel().unwrap();
        assert_eq!(machine.state().status, MatchStatus::Cancelled);
        assert!(matches!(
            machine.start(&StartMatch {
                toss_winner_team_id: "A".to_string(),
                decision: TossDecision::Bat,
                openers: openers("a1", "a2", "b1"),
            }),
            Err(AppError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn test_delivery_sequence_numbers() {
        let mut machine = live(20, 11);
        let first = machine.record_delivery(&DeliveryInput::runs(0)).unwrap();
        let second = machine.record_delivery(&DeliveryInput::extra(ExtraType::Wide, 0)).unwrap();
        let third = machine.record_delivery(&DeliveryInput::runs(0)).unwrap();

        assert_eq!((first.delivery.sequence, second.delivery.sequence, third.delivery.sequence), (0, 1, 2));
        assert_eq!(second.delivery.ball, 2);
        assert_eq!(third.delivery.ball, 2);
        assert_eq!(machine.state().deliveries_recorded, 3);
    }
}

#[cfg(test)]
pub(crate) mod proptests {
    use super::*;
    use crate::models::cricket_match::CreateMatch;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    /// One scoring command, drawn at random. Run values deliberately reach
    /// outside the per-ball limit so rejections get exercised too.
    #[derive(Debug, Clone)]
    pub(crate) enum Ball {
        Runs(i32),
        Extra(ExtraType, i32),
        Wicket(DismissalType),
    }

    pub(crate) fn ball() -> impl Strategy<Value = Ball> {
        let extra = prop_oneof![
            Just(ExtraType::Wide),
            Just(ExtraType::NoBall),
            Just(ExtraType::Bye),
            Just(ExtraType::LegBye),
        ];
        let dismissal = prop_oneof![
            Just(DismissalType::Bowled),
            Just(DismissalType::Caught),
            Just(DismissalType::RunOut),
        ];
        prop_oneof![
            6 => (-1i32..9).prop_map(Ball::Runs),
            2 => (extra, 0i32..5).prop_map(|(e, r)| Ball::Extra(e, r)),
            1 => dismissal.prop_map(Ball::Wicket),
        ]
    }

    fn started(overs: u32, team_size: u8) -> MatchStateMachine {
        let request = CreateMatch {
            tournament_id: "t1".to_string(),
            team_a_id: "A".to_string(),
            team_b_id: "B".to_string(),
            venue: "Oval".to_string(),
            overs_per_innings: Some(overs),
            team_size: Some(team_size),
        };
        let mut machine = MatchStateMachine::new(Match::new(&request, overs, team_size));
        machine
            .start(&StartMatch {
                toss_winner_team_id: "A".to_string(),
                decision: TossDecision::Bat,
                openers: Openers {
                    striker_id: "a1".to_string(),
                    non_striker_id: "a2".to_string(),
                    bowler_id: "b1".to_string(),
                },
            })
            .unwrap();
        machine
    }

    // Names a new bowler or batsman when the match is waiting on one.
    fn fill_vacancies(machine: &mut MatchStateMachine, next_batsman: &mut u32) {
        let live = machine.state().live.clone();
        if live.bowler_change_required {
            let bowler = match live.previous_over_bowler_id.as_deref() {
                Some("x1") => "x2",
                _ => "x1",
            };
            machine.set_bowler(bowler).unwrap();
        }
        if live.awaiting_batsman() {
            *next_batsman += 1;
            machine.set_new_batsman(&format!("n{}", next_batsman)).unwrap();
        }
    }

    /// Plays `balls` through a two-innings match, closing each innings as it
    /// fills up. `check` sees the state before and after every command.
    pub(crate) fn play(
        balls: &[Ball],
        overs: u32,
        team_size: u8,
        mut check: impl FnMut(&Match, &Result<DeliveryOutcome>, &Match) -> std::result::Result<(), TestCaseError>,
    ) -> std::result::Result<(Match, Vec<Delivery>), TestCaseError> {
        let mut machine = started(overs, team_size);
        let mut log = Vec::new();
        let mut next_batsman = 0;

        for ball in balls {
            if machine.state().current().map_or(false, |i| i.closed) {
                if machine.state().current_innings == 1 {
                    let openers = Openers {
                        striker_id: "b1".to_string(),
                        non_striker_id: "b2".to_string(),
                        bowler_id: "a1".to_string(),
                    };
                    machine.end_innings(Some(&openers)).unwrap();
                } else {
                    machine.end_innings(None).unwrap();
                    break;
                }
            }
            fill_vacancies(&mut machine, &mut next_batsman);

            let before = machine.state().clone();
            let result = match ball {
                Ball::Runs(runs) => machine.record_delivery(&DeliveryInput::runs(*runs)),
                Ball::Extra(extra, runs) => machine.record_delivery(&DeliveryInput::extra(*extra, *runs)),
                Ball::Wicket(dismissal) => {
                    let striker = before.live.striker_id.clone().unwrap_or_default();
                    machine.record_wicket(&WicketInput::new(*dismissal, &striker))
                }
            };
            check(&before, &result, machine.state())?;
            if let Ok(outcome) = result {
                log.push(outcome.delivery);
            }
        }
        Ok((machine.into_inner(), log))
    }

    proptest! {
        #[test]
        fn prop_counters_hold_for_any_sequence(
            balls in prop::collection::vec(ball(), 1..120),
            overs in 1u32..4,
            team_size in 2u8..=11,
        ) {
            let (end, log) = play(&balls, overs, team_size, |before, result, after| {
                match result {
                    Err(_) => prop_assert_eq!(after, before),
                    Ok(outcome) => {
                        let was = before.current().unwrap();
                        let now = after.current().unwrap();
                        prop_assert!(now.score >= was.score);
                        prop_assert_eq!(now.score - was.score, outcome.delivery.total_runs());
                        prop_assert!(now.wickets <= after.max_wickets());
                        prop_assert!(after.live.balls_in_over < BALLS_PER_OVER);

                        let legal = outcome.delivery.is_legal() as u32;
                        prop_assert_eq!(now.overs.total_balls(), was.overs.total_balls() + legal);
                        prop_assert_eq!(
                            after.live.current_over * BALLS_PER_OVER as u32 + after.live.balls_in_over as u32,
                            now.overs.total_balls()
                        );
                        prop_assert!(now.overs.total_balls() <= after.balls_per_innings());
                        prop_assert_eq!(outcome.over_completed, legal == 1 && now.overs.total_balls() % BALLS_PER_OVER as u32 == 0);
                        prop_assert_eq!(after.deliveries_recorded, before.deliveries_recorded + 1);
                    }
                }
                Ok(())
            })?;

            let sequences: Vec<u32> = log.iter().map(|d| d.sequence).collect();
            let expected: Vec<u32> = (0..log.len() as u32).collect();
            prop_assert_eq!(sequences, expected);
            prop_assert_eq!(end.deliveries_recorded as usize, log.len());
        }
    }
}
