//! Standings and leaderboards recomputed from completed matches.
//!
//! Everything here is a pure function of its inputs. Totals are integer
//! sums keyed by id and every sort ends on an id, so the output does not
//! depend on the order matches or rows arrive in.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::warn;

use super::state_machine::decide_result;
use crate::errors::AppError;
use crate::models::cricket_match::{Match, MatchStatus, Overs, ResultMargin};
use crate::models::player_innings::{economy, strike_rate, PlayerInnings};
use crate::models::tournament::{
    net_run_rate, BattingLeader, BattingPerformance, BowlingLeader, BowlingPerformance,
    TeamTournamentStanding, TournamentStats, LEADERBOARD_SIZE, POINTS_PER_WIN, UNKNOWN_PLAYER,
    UNKNOWN_TEAM,
};

/// Display names resolved from the roster collections.
#[derive(Debug, Clone, Default)]
pub struct NameBook {
    pub teams: HashMap<String, String>,
    pub players: HashMap<String, String>,
}

impl NameBook {
    pub fn team(&self, team_id: &str) -> String {
        self.teams.get(team_id).cloned().unwrap_or_else(|| {
            let err = AppError::LookupFailure(format!("team {}", team_id));
            warn!(error = %err, "using placeholder name");
            UNKNOWN_TEAM.to_string()
        })
    }

    pub fn player(&self, player_id: &str) -> String {
        self.players.get(player_id).cloned().unwrap_or_else(|| {
            let err = AppError::LookupFailure(format!("player {}", player_id));
            warn!(error = %err, "using placeholder name");
            UNKNOWN_PLAYER.to_string()
        })
    }
}

/// Team and player ids a recompute needs names for.
pub fn referenced_ids(matches: &[Match], rows: &[PlayerInnings]) -> (Vec<String>, Vec<String>) {
    let teams: HashSet<&String> = matches
        .iter()
        .flat_map(|m| [&m.team_a_id, &m.team_b_id])
        .collect();
    let players: HashSet<&String> = rows.iter().map(|r| &r.player_id).collect();

    let mut teams: Vec<String> = teams.into_iter().cloned().collect();
    let mut players: Vec<String> = players.into_iter().cloned().collect();
    teams.sort();
    players.sort();
    (teams, players)
}

pub fn compute_standings(matches: &[Match], names: &NameBook) -> Vec<TeamTournamentStanding> {
    let mut table: BTreeMap<String, TeamTournamentStanding> = BTreeMap::new();

    for m in matches.iter().filter(|m| m.status == MatchStatus::Completed) {
        for team_id in [&m.team_a_id, &m.team_b_id] {
            table
                .entry(team_id.clone())
                .or_insert_with(|| TeamTournamentStanding::new(team_id, &names.team(team_id)))
                .matches_played += 1;
        }

        let result = m.result.clone().unwrap_or_else(|| decide_result(m, None));
        match result.winner_team_id.as_deref() {
            Some(winner) if m.has_team(winner) => {
                if let Some(row) = table.get_mut(winner) {
                    row.wins += 1;
                    row.points += POINTS_PER_WIN;
                }
                if let Some(loser) = m.opponent_of(winner).and_then(|l| table.get_mut(l)) {
                    loser.losses += 1;
                }
            }
            Some(other) => {
                warn!(match_id = %m.match_id, winner = other, "recorded winner is not in the match, ignoring result");
            }
            None if result.margin == ResultMargin::Tie => {
                for team_id in [&m.team_a_id, &m.team_b_id] {
                    if let Some(row) = table.get_mut(team_id) {
                        row.ties += 1;
                    }
                }
            }
            None => {}
        }

        for innings in &m.innings {
            let balls = innings.overs.total_balls();
            if let Some(batting) = table.get_mut(&innings.batting_team_id) {
                batting.runs_scored += innings.score;
                batting.balls_faced += balls;
            }
            if let Some(bowling) = table.get_mut(&innings.bowling_team_id) {
                bowling.runs_conceded += innings.score;
                bowling.balls_bowled += balls;
            }
        }
    }

    let mut standings: Vec<TeamTournamentStanding> = table
        .into_values()
        .map(|mut row| {
            row.net_run_rate =
                net_run_rate(row.runs_scored, row.balls_faced, row.runs_conceded, row.balls_bowled);
            row
        })
        .collect();

    standings.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.net_run_rate.total_cmp(&a.net_run_rate))
            .then_with(|| a.team_id.cmp(&b.team_id))
    });
    standings
}

#[derive(Default)]
struct PlayerTotals {
    team_id: String,
    innings: u32,
    runs: u32,
    balls_faced: u32,
    fours: u32,
    sixes: u32,
    highest_score: u32,
    bowled: bool,
    wickets: u32,
    runs_conceded: u32,
    legal_balls: u32,
}

fn totals_by_player<'a>(rows: impl Iterator<Item = &'a PlayerInnings>) -> BTreeMap<String, PlayerTotals> {
    let mut totals: BTreeMap<String, PlayerTotals> = BTreeMap::new();
    for row in rows {
        let t = totals.entry(row.player_id.clone()).or_default();
        // rows arrive sorted by match id, so the same row sets the team on every run
        t.team_id = row.team_id.clone();
        if row.batted {
            t.innings += 1;
            t.runs += row.batting.runs;
            t.balls_faced += row.batting.balls_faced;
            t.fours += row.batting.fours;
            t.sixes += row.batting.sixes;
            t.highest_score = t.highest_score.max(row.batting.runs);
        }
        if row.bowled() {
            t.bowled = true;
            t.wickets += row.bowling.wickets;
            t.runs_conceded += row.bowling.runs_conceded;
            t.legal_balls += row.bowling.legal_balls;
        }
    }
    totals
}

fn batting_leader(player_id: &str, t: &PlayerTotals, names: &NameBook) -> BattingLeader {
    BattingLeader {
        player_id: player_id.to_string(),
        player_name: names.player(player_id),
        team_id: t.team_id.clone(),
        innings: t.innings,
        runs: t.runs,
        balls_faced: t.balls_faced,
        fours: t.fours,
        sixes: t.sixes,
        highest_score: t.highest_score,
        strike_rate: strike_rate(t.runs, t.balls_faced),
    }
}

fn bowling_leader(player_id: &str, t: &PlayerTotals, names: &NameBook) -> BowlingLeader {
    BowlingLeader {
        player_id: player_id.to_string(),
        player_name: names.player(player_id),
        team_id: t.team_id.clone(),
        wickets: t.wickets,
        runs_conceded: t.runs_conceded,
        legal_balls: t.legal_balls,
        overs: Overs::from_balls(t.legal_balls),
        economy: economy(t.runs_conceded, t.legal_balls),
    }
}

pub fn compute(
    tournament_id: &str,
    matches: &[Match],
    rows: &[PlayerInnings],
    names: &NameBook,
    run: u64,
    generated_at: DateTime<Utc>,
) -> TournamentStats {
    let completed: HashSet<&str> = matches
        .iter()
        .filter(|m| m.status == MatchStatus::Completed && m.tournament_id == tournament_id)
        .map(|m| m.match_id.as_str())
        .collect();
    let considered: Vec<Match> = matches
        .iter()
        .filter(|m| completed.contains(m.match_id.as_str()))
        .cloned()
        .collect();

    let mut rows: Vec<&PlayerInnings> = rows
        .iter()
        .filter(|r| completed.contains(r.match_id.as_str()))
        .collect();
    rows.sort_by(|a, b| (&a.match_id, &a.player_id).cmp(&(&b.match_id, &b.player_id)));

    let totals = totals_by_player(rows.iter().copied());

    let mut top_scorers: Vec<(&String, &PlayerTotals)> = totals.iter().filter(|(_, t)| t.innings > 0).collect();
    top_scorers.sort_by(|a, b| b.1.runs.cmp(&a.1.runs).then_with(|| a.0.cmp(b.0)));

    let mut most_sixes: Vec<(&String, &PlayerTotals)> = totals.iter().filter(|(_, t)| t.sixes > 0).collect();
    most_sixes.sort_by(|a, b| b.1.sixes.cmp(&a.1.sixes).then_with(|| a.0.cmp(b.0)));

    let mut wicket_takers: Vec<(&String, &PlayerTotals)> = totals.iter().filter(|(_, t)| t.bowled).collect();
    wicket_takers.sort_by(|a, b| {
        b.1.wickets
            .cmp(&a.1.wickets)
            .then_with(|| a.1.runs_conceded.cmp(&b.1.runs_conceded))
            .then_with(|| a.0.cmp(b.0))
    });

    let best_batting = rows
        .iter()
        .filter(|r| r.batted)
        .min_by(|a, b| {
            b.batting
                .runs
                .cmp(&a.batting.runs)
                .then_with(|| a.batting.balls_faced.cmp(&b.batting.balls_faced))
                .then_with(|| a.player_id.cmp(&b.player_id))
                .then_with(|| a.match_id.cmp(&b.match_id))
        })
        .map(|r| BattingPerformance {
            player_id: r.player_id.clone(),
            player_name: names.player(&r.player_id),
            match_id: r.match_id.clone(),
            runs: r.batting.runs,
            balls_faced: r.batting.balls_faced,
            strike_rate: r.batting.strike_rate(),
        });

    let best_bowling = rows
        .iter()
        .filter(|r| r.bowled())
        .min_by(|a, b| {
            b.bowling
                .wickets
                .cmp(&a.bowling.wickets)
                .then_with(|| a.bowling.runs_conceded.cmp(&b.bowling.runs_conceded))
                .then_with(|| a.player_id.cmp(&b.player_id))
                .then_with(|| a.match_id.cmp(&b.match_id))
        })
        .map(|r| BowlingPerformance {
            player_id: r.player_id.clone(),
            player_name: names.player(&r.player_id),
            match_id: r.match_id.clone(),
            wickets: r.bowling.wickets,
            runs_conceded: r.bowling.runs_conceded,
            overs: r.bowling.overs(),
        });

    TournamentStats {
        id: None,
        tournament_id: tournament_id.to_string(),
        standings: compute_standings(&considered, names),
        top_scorers: top_scorers
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .map(|(id, t)| batting_leader(id, t, names))
            .collect(),
        top_wicket_takers: wicket_takers
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .map(|(id, t)| bowling_leader(id, t, names))
            .collect(),
        most_sixes: most_sixes
            .into_iter()
            .take(LEADERBOARD_SIZE)
            .map(|(id, t)| batting_leader(id, t, names))
            .collect(),
        best_batting,
        best_bowling,
        matches_considered: considered.len() as u32,
        run,
        generated_at,
    }
}
