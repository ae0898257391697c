//! In-process store for tests and the `memory` backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::score_store::ScoreStore;
use crate::errors::Result;
use crate::models::cricket_match::{Match, MatchQuery};
use crate::models::delivery::Delivery;
use crate::models::player_innings::PlayerInnings;
use crate::models::tournament::TournamentStats;

#[derive(Default)]
struct Collections {
    matches: HashMap<String, Match>,
    deliveries: HashMap<String, Vec<Delivery>>,
    player_innings: HashMap<(String, String), PlayerInnings>,
    tournament_stats: HashMap<String, TournamentStats>,
    teams: HashMap<String, String>,
    players: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_team(&self, team_id: &str, name: &str) {
        self.inner
            .write()
            .await
            .teams
            .insert(team_id.to_string(), name.to_string());
    }

    pub async fn add_player(&self, player_id: &str, name: &str) {
        self.inner
            .write()
            .await
            .players
            .insert(player_id.to_string(), name.to_string());
    }
}

fn resolve(names: &HashMap<String, String>, ids: &[String]) -> HashMap<String, String> {
    ids.iter()
        .filter_map(|id| names.get(id).map(|name| (id.clone(), name.clone())))
        .collect()
}

#[async_trait]
impl ScoreStore for MemoryStore {
    async fn save_match(&self, m: &Match) -> Result<()> {
        self.inner
            .write()
            .await
            .matches
            .insert(m.match_id.clone(), m.clone());
        Ok(())
    }

    async fn find_match(&self, match_id: &str) -> Result<Option<Match>> {
        Ok(self.inner.read().await.matches.get(match_id).cloned())
    }

    async fn list_matches(&self, query: &MatchQuery) -> Result<Vec<Match>> {
        let inner = self.inner.read().await;
        let mut matches: Vec<Match> = inner
            .matches
            .values()
            .filter(|m| query.tournament_id.as_ref().map_or(true, |t| &m.tournament_id == t))
            .filter(|m| query.status.map_or(true, |s| m.status == s))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.last_updated.cmp(&a.last_updated));
        Ok(matches)
    }

    async fn append_delivery(&self, delivery: &Delivery) -> Result<()> {
        let mut inner = self.inner.write().await;
        let log = inner.deliveries.entry(delivery.match_id.clone()).or_default();
        if !log.iter().any(|d| d.delivery_id == delivery.delivery_id) {
            log.push(delivery.clone());
        }
        Ok(())
    }

    async fn deliveries(&self, match_id: &str) -> Result<Vec<Delivery>> {
        let mut log = self
            .inner
            .read()
            .await
            .deliveries
            .get(match_id)
            .cloned()
            .unwrap_or_default();
        log.sort_by_key(|d| d.sequence);
        Ok(log)
    }

    async fn upsert_player_innings(&self, row: &PlayerInnings) -> Result<()> {
        self.inner
            .write()
            .await
            .player_innings
            .insert((row.match_id.clone(), row.player_id.clone()), row.clone());
        Ok(())
    }

    async fn player_innings_for_match(&self, match_id: &str) -> Result<Vec<PlayerInnings>> {
        self.player_innings_for_matches(&[match_id.to_string()]).await
    }

    async fn player_innings_for_matches(&self, match_ids: &[String]) -> Result<Vec<PlayerInnings>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<PlayerInnings> = inner
            .player_innings
            .values()
            .filter(|row| match_ids.contains(&row.match_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (&a.match_id, &a.player_id).cmp(&(&b.match_id, &b.player_id)));
        Ok(rows)
    }

    async fn save_tournament_stats(&self, stats: &TournamentStats) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if let Some(stored) = inner.tournament_stats.get(&stats.tournament_id) {
            if stored.run >= stats.run {
                return Ok(false);
            }
        }
        inner
            .tournament_stats
            .insert(stats.tournament_id.clone(), stats.clone());
        Ok(true)
    }

    async fn tournament_stats(&self, tournament_id: &str) -> Result<Option<TournamentStats>> {
        Ok(self.inner.read().await.tournament_stats.get(tournament_id).cloned())
    }

    async fn team_names(&self, team_ids: &[String]) -> Result<HashMap<String, String>> {
        Ok(resolve(&self.inner.read().await.teams, team_ids))
    }

    async fn player_names(&self, player_ids: &[String]) -> Result<HashMap<String, String>> {
        Ok(resolve(&self.inner.read().await.players, player_ids))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
