use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::errors::Result;
use crate::models::tournament::TournamentStats;
use crate::services::stats_service::RecomputeOutcome;
use crate::state::AppState;

pub async fn recompute_stats(
    State(state): State<AppState>,
    Path(tournament_id): Path<String>,
) -> Result<Json<RecomputeOutcome>> {
    Ok(Json(state.stats.recompute(&tournament_id).await?))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Path(tournament_id): Path<String>,
) -> Result<Json<TournamentStats>> {
    Ok(Json(state.stats.get(&tournament_id).await?))
}
