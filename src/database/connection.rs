use mongodb::{Client, Database};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::errors::{AppError, Result};

pub async fn get_db_client(config: &AppConfig) -> Result<Database> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::configuration("DATABASE_URL must be set as an environment variable"))?;

    let client = Client::with_uri_str(database_url).await?;
    let db = client.database(&config.database_name);

    // Verify database exists by listing collections
    match db.list_collection_names().await {
        Ok(collections) => {
            info!(database = %config.database_name, ?collections, "connected to database");

            for expected in ["matches", "ball_by_ball", "player_innings", "teams", "players"] {
                if !collections.iter().any(|c| c == expected) {
                    warn!(collection = expected, "collection not found in database");
                }
            }
        }
        Err(e) => {
            return Err(AppError::ServiceUnavailable(format!(
                "database '{}' is not reachable: {}",
                config.database_name, e
            )));
        }
    }

    Ok(db)
}
