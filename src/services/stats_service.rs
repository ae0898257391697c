use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::retry::{persist_with_retry, RetryPolicy};
use super::score_store::{completed_matches, ScoreStore};
use crate::errors::{AppError, Result};
use crate::models::tournament::TournamentStats;
use crate::scoring::tournament_engine::{self, NameBook};

#[derive(Debug, Clone, Serialize)]
pub struct RecomputeOutcome {
    pub run: u64,
    /// False when a newer run started before this one finished.
    pub written: bool,
    pub stats: TournamentStats,
}

/// Recomputes tournament snapshots. Runs for the same tournament may overlap;
/// only the newest one writes.
pub struct StatsService {
    store: Arc<dyn ScoreStore>,
    policy: RetryPolicy,
    latest_runs: Mutex<HashMap<String, u64>>,
}

impl StatsService {
    pub fn new(store: Arc<dyn ScoreStore>, policy: RetryPolicy) -> Self {
        Self {
            store,
            policy,
            latest_runs: Mutex::new(HashMap::new()),
        }
    }

    async fn begin_run(&self, tournament_id: &str) -> Result<u64> {
        let mut runs = self.latest_runs.lock().await;
        let base = match runs.get(tournament_id) {
            Some(run) => *run,
            None => self
                .store
                .tournament_stats(tournament_id)
                .await?
                .map(|s| s.run)
                .unwrap_or(0),
        };
        let run = base + 1;
        runs.insert(tournament_id.to_string(), run);
        Ok(run)
    }

    async fn is_latest(&self, tournament_id: &str, run: u64) -> bool {
        self.latest_runs.lock().await.get(tournament_id) == Some(&run)
    }

    async fn names(&self, team_ids: &[String], player_ids: &[String]) -> NameBook {
        // unresolved names fall back to placeholders inside the engine
        let teams = self.store.team_names(team_ids).await.unwrap_or_else(|e| {
            warn!(error = %e, "team lookup failed");
            HashMap::new()
        });
        let players = self.store.player_names(player_ids).await.unwrap_or_else(|e| {
            warn!(error = %e, "player lookup failed");
            HashMap::new()
        });
        NameBook { teams, players }
    }

    pub async fn recompute(&self, tournament_id: &str) -> Result<RecomputeOutcome> {
        let run = self.begin_run(tournament_id).await?;
        let started = std::time::Instant::now();

        let matches = completed_matches(self.store.as_ref(), tournament_id).await?;
        let match_ids: Vec<String> = matches.iter().map(|m| m.match_id.clone()).collect();
        let rows = self.store.player_innings_for_matches(&match_ids).await?;

        let (team_ids, player_ids) = tournament_engine::referenced_ids(&matches, &rows);
        let names = self.names(&team_ids, &player_ids).await;
        let stats = tournament_engine::compute(tournament_id, &matches, &rows, &names, run, Utc::now());

        if !self.is_latest(tournament_id, run).await {
            info!(tournament_id, run, "recompute superseded by a newer run, not writing");
            return Ok(RecomputeOutcome {
                run,
                written: false,
                stats,
            });
        }

        // a newer run may still finish first; the store keeps the higher run
        let label = format!("save stats for {}", tournament_id);
        let written =
            persist_with_retry(&label, &self.policy, || self.store.save_tournament_stats(&stats)).await?;
        if !written {
            info!(tournament_id, run, "a newer run saved first, not overwriting it");
            return Ok(RecomputeOutcome {
                run,
                written: false,
                stats,
            });
        }

        info!(
            tournament_id,
            run,
            matches = stats.matches_considered,
            elapsed = ?started.elapsed(),
            "tournament stats recomputed"
        );
        Ok(RecomputeOutcome {
            run,
            written: true,
            stats,
        })
    }

    pub async fn get(&self, tournament_id: &str) -> Result<TournamentStats> {
        self.store
            .tournament_stats(tournament_id)
            .await?
            .ok_or_else(|| AppError::LookupFailure(format!("no stats for tournament {}", tournament_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cricket_match::{CreateMatch, Innings, Match, MatchPhase, MatchStatus, Overs};
    use crate::models::player_innings::PlayerInnings;
    use crate::services::memory_store::testing::FlakyStore;
    use crate::services::memory_store::MemoryStore;
    use std::time::Duration;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            backoff: Duration::from_millis(1),
        }
    }

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_team("A", "Lions").await;
        store.add_team("B", "Tigers").await;
        store.add_player("p1", "Sam").await;

        let request = CreateMatch {
            tournament_id: "t1".to_string(),
            team_a_id: "A".to_string(),
            team_b_id: "B".to_string(),
            venue: String::new(),
            overs_per_innings: Some(20),
            team_size: Some(11),
        };
        let mut m = Match::new(&request, 20, 11);
        let mut first = Innings::new(1, "A", "B");
        first.score = 160;
        first.overs = Overs::from_balls(120);
        let mut second = Innings::new(2, "B", "A");
        second.score = 140;
        second.overs = Overs::from_balls(120);
        m.innings = vec![first, second];
        m.phase = MatchPhase::Completed;
        m.status = MatchStatus::Completed;
        store.save_match(&m).await.unwrap();

        let mut row = PlayerInnings::new(&m.match_id, "t1", "p1", "A");
        row.batted = true;
        row.batting.runs = 70;
        row.batting.balls_faced = 50;
        store.upsert_player_innings(&row).await.unwrap();
        let mut unnamed = PlayerInnings::new(&m.match_id, "t1", "p9", "B");
        unnamed.batted = true;
        unnamed.batting.runs = 12;
        store.upsert_player_innings(&unnamed).await.unwrap();

        store
    }

    #[tokio::test]
    async fn test_recompute_writes_snapshot() {
        let store = seeded().await;
        let service = StatsService::new(store.clone(), policy());

        let outcome = service.recompute("t1").await.unwrap();
        assert!(outcome.written);
        assert_eq!(outcome.run, 1);

        let stored = service.get("t1").await.unwrap();
        assert_eq!(stored, outcome.stats);
        assert_eq!(stored.standings[0].team_name, "Lions");
        assert_eq!(stored.standings[0].points, 2);
        assert_eq!(stored.top_scorers[0].player_name, "Sam");
        assert_eq!(stored.top_scorers[1].player_name, crate::models::tournament::UNKNOWN_PLAYER);
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent_apart_from_run() {
        let store = seeded().await;
        let service = StatsService::new(store.clone(), policy());

        let first = service.recompute("t1").await.unwrap().stats;
        let second = service.recompute("t1").await.unwrap().stats;
        assert_eq!(second.run, 2);
        assert_eq!(first.standings, second.standings);
        assert_eq!(first.top_scorers, second.top_scorers);

        // a fresh service continues from the stored run number
        let restarted = StatsService::new(store, policy());
        assert_eq!(restarted.recompute("t1").await.unwrap().run, 3);
    }

    #[tokio::test]
    async fn test_superseded_run_does_not_write() {
        let store = seeded().await;
        let service = StatsService::new(store.clone(), policy());

        let stale = service.begin_run("t1").await.unwrap();
        let newer = service.recompute("t1").await.unwrap();
        assert!(newer.written);
        assert!(!service.is_latest("t1", stale).await);
        assert_eq!(service.get("t1").await.unwrap().run, newer.run);
    }

    #[tokio::test]
    async fn test_slow_older_save_does_not_overwrite_newer_run() {
        let memory = seeded().await;
        let flaky = Arc::new(FlakyStore::new(memory.clone()));
        flaky.delay_next_stats_save(Duration::from_millis(200));
        let service = Arc::new(StatsService::new(flaky, policy()));

        let slow = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.recompute("t1").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let newer = service.recompute("t1").await.unwrap();
        let older = slow.await.unwrap().unwrap();

        assert_eq!((older.run, newer.run), (1, 2));
        assert!(newer.written);
        assert!(!older.written);
        assert_eq!(memory.tournament_stats("t1").await.unwrap().unwrap().run, 2);
        assert_eq!(service.get("t1").await.unwrap().run, 2);
    }

    #[tokio::test]
    async fn test_missing_stats_is_lookup_failure() {
        let service = StatsService::new(Arc::new(MemoryStore::new()), policy());
        assert!(matches!(service.get("t1").await, Err(AppError::LookupFailure(_))));

        let empty = service.recompute("t1").await.unwrap();
        assert_eq!(empty.stats.matches_considered, 0);
        assert!(empty.stats.standings.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_surfaces() {
        let memory = seeded().await;
        let flaky = Arc::new(FlakyStore::new(memory));
        flaky.set_down(true);
        let service = StatsService::new(flaky, policy());

        let err = service.recompute("t1").await.unwrap_err();
        assert!(matches!(err, AppError::PersistenceFailure(_)));
    }
}
