use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};
use tracing::{debug, info};

use super::score_store::ScoreStore;
use crate::errors::Result;
use crate::models::cricket_match::{Match, MatchQuery};
use crate::models::delivery::Delivery;
use crate::models::player_innings::PlayerInnings;
use crate::models::tournament::TournamentStats;

const DUPLICATE_KEY: i32 = 11000;

pub struct MongoStore {
    db: Database,
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn matches(&self) -> Collection<Match> {
        self.db.collection("matches")
    }

    fn ball_by_ball(&self) -> Collection<Delivery> {
        self.db.collection("ball_by_ball")
    }

    fn player_innings(&self) -> Collection<PlayerInnings> {
        self.db.collection("player_innings")
    }

    fn tournament_stats_collection(&self) -> Collection<TournamentStats> {
        self.db.collection("tournament_stats")
    }

    /// Unique keys that make every write safe to repeat.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.matches()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "match_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.ball_by_ball()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "delivery_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.ball_by_ball()
            .create_index(IndexModel::builder().keys(doc! { "match_id": 1, "sequence": 1 }).build())
            .await?;
        self.player_innings()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "match_id": 1, "player_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.tournament_stats_collection()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "tournament_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;

        info!("indexes ensured");
        Ok(())
    }

    async fn names(&self, collection: &str, key: &str, ids: &[String]) -> Result<HashMap<String, String>> {
        let collection: Collection<Document> = self.db.collection(collection);
        let mut filter = Document::new();
        filter.insert(key, doc! { "$in": ids.to_vec() });
        let cursor = collection.find(filter).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;

        Ok(docs
            .iter()
            .filter_map(|d| match (d.get_str(key), d.get_str("name")) {
                (Ok(id), Ok(name)) => Some((id.to_string(), name.to_string())),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl ScoreStore for MongoStore {
    async fn save_match(&self, m: &Match) -> Result<()> {
        self.matches()
            .replace_one(doc! { "match_id": &m.match_id }, m)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn find_match(&self, match_id: &str) -> Result<Option<Match>> {
        Ok(self.matches().find_one(doc! { "match_id": match_id }).await?)
    }

    async fn list_matches(&self, query: &MatchQuery) -> Result<Vec<Match>> {
        let mut filter = doc! {};
        if let Some(tournament_id) = &query.tournament_id {
            filter.insert("tournament_id", tournament_id);
        }
        if let Some(status) = query.status {
            filter.insert("status", status.to_string());
        }
        debug!(?filter, "listing matches");

        let cursor = self
            .matches()
            .find(filter)
            .sort(doc! { "last_updated": -1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn append_delivery(&self, delivery: &Delivery) -> Result<()> {
        match self.ball_by_ball().insert_one(delivery).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                debug!(delivery_id = %delivery.delivery_id, "delivery already in log");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn deliveries(&self, match_id: &str) -> Result<Vec<Delivery>> {
        let cursor = self
            .ball_by_ball()
            .find(doc! { "match_id": match_id })
            .sort(doc! { "sequence": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn upsert_player_innings(&self, row: &PlayerInnings) -> Result<()> {
        self.player_innings()
            .replace_one(
                doc! { "match_id": &row.match_id, "player_id": &row.player_id },
                row,
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn player_innings_for_match(&self, match_id: &str) -> Result<Vec<PlayerInnings>> {
        let cursor = self
            .player_innings()
            .find(doc! { "match_id": match_id })
            .sort(doc! { "player_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn player_innings_for_matches(&self, match_ids: &[String]) -> Result<Vec<PlayerInnings>> {
        let cursor = self
            .player_innings()
            .find(doc! { "match_id": { "$in": match_ids.to_vec() } })
            .sort(doc! { "match_id": 1, "player_id": 1 })
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn save_tournament_stats(&self, stats: &TournamentStats) -> Result<bool> {
        // an existing snapshot from a newer run fails the filter, and the
        // upsert then collides with it on the unique tournament_id
        let filter = doc! {
            "tournament_id": &stats.tournament_id,
            "run": { "$lt": stats.run as i64 },
        };
        match self
            .tournament_stats_collection()
            .replace_one(filter, stats)
            .upsert(true)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => {
                debug!(tournament_id = %stats.tournament_id, run = stats.run, "newer stats already stored");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn tournament_stats(&self, tournament_id: &str) -> Result<Option<TournamentStats>> {
        Ok(self
            .tournament_stats_collection()
            .find_one(doc! { "tournament_id": tournament_id })
            .await?)
    }

    async fn team_names(&self, team_ids: &[String]) -> Result<HashMap<String, String>> {
        self.names("teams", "team_id", team_ids).await
    }

    async fn player_names(&self, player_ids: &[String]) -> Result<HashMap<String, String>> {
        self.names("players", "player_id", player_ids).await
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mongo"
    }
}
