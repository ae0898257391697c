use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;
use crate::models::cricket_match::{Match, MatchQuery, MatchStatus};
use crate::models::delivery::Delivery;
use crate::models::player_innings::PlayerInnings;
use crate::models::tournament::TournamentStats;

/// Document store behind the scoring engine.
///
/// Writes are idempotent: saving a match or a player innings row replaces the
/// document with the same key, and appending a delivery that is already in
/// the log succeeds without writing it twice.
#[async_trait]
pub trait ScoreStore: Send + Sync {
    async fn save_match(&self, m: &Match) -> Result<()>;
    async fn find_match(&self, match_id: &str) -> Result<Option<Match>>;
    async fn list_matches(&self, query: &MatchQuery) -> Result<Vec<Match>>;

    async fn append_delivery(&self, delivery: &Delivery) -> Result<()>;
    /// Deliveries of one match in log order.
    async fn deliveries(&self, match_id: &str) -> Result<Vec<Delivery>>;

    async fn upsert_player_innings(&self, row: &PlayerInnings) -> Result<()>;
    async fn player_innings_for_match(&self, match_id: &str) -> Result<Vec<PlayerInnings>>;
    async fn player_innings_for_matches(&self, match_ids: &[String]) -> Result<Vec<PlayerInnings>>;

    /// Writes the snapshot unless one from the same or a later run is
    /// already stored. Returns false when the stored snapshot was newer.
    async fn save_tournament_stats(&self, stats: &TournamentStats) -> Result<bool>;
    async fn tournament_stats(&self, tournament_id: &str) -> Result<Option<TournamentStats>>;

    /// Display names for the ids that resolve. Missing ids are left out.
    async fn team_names(&self, team_ids: &[String]) -> Result<HashMap<String, String>>;
    async fn player_names(&self, player_ids: &[String]) -> Result<HashMap<String, String>>;

    async fn ping(&self) -> Result<()>;
    fn backend(&self) -> &'static str;
}

/// Completed matches of a tournament, the input to every standings run.
pub async fn completed_matches(store: &dyn ScoreStore, tournament_id: &str) -> Result<Vec<Match>> {
    store
        .list_matches(&MatchQuery {
            tournament_id: Some(tournament_id.to_string()),
            status: Some(MatchStatus::Completed),
        })
        .await
}
