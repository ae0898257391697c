use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::{debug, info};
use validator::Validate;

use crate::errors::{AppError, Result};
use crate::models::cricket_match::{
    CompleteMatch, CreateMatch, EndInnings, Match, MatchQuery, PlayerSelection, StartMatch,
};
use crate::models::delivery::{Delivery, DeliveryInput, WicketInput};
use crate::models::player_innings::ScorecardRow;
use crate::scoring::event_log::{audit, AuditReport};
use crate::scoring::live_match::{FlushReport, ScoringUpdate};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct FlushQuery {
    #[serde(default)]
    pub abandon: bool,
}

pub async fn create_match(
    State(state): State<AppState>,
    Json(payload): Json<CreateMatch>,
) -> Result<(StatusCode, Json<Match>)> {
    payload.validate()?;
    if payload.team_a_id == payload.team_b_id {
        return Err(AppError::invalid_data("A team cannot play itself"));
    }

    let overs = payload
        .overs_per_innings
        .unwrap_or(state.config.default_overs_per_innings);
    let team_size = payload.team_size.unwrap_or(state.config.default_team_size);

    let created = state.matches.create(Match::new(&payload, overs, team_size)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_matches(
    State(state): State<AppState>,
    Query(query): Query<MatchQuery>,
) -> Result<Json<Vec<Match>>> {
    debug!(?query, "listing matches");
    let matches = state.store.list_matches(&query).await?;
    Ok(Json(matches))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<Match>> {
    Ok(Json(state.matches.snapshot(&match_id).await?))
}

pub async fn start_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(payload): Json<StartMatch>,
) -> Result<Json<Match>> {
    payload.validate()?;
    Ok(Json(state.matches.start(&match_id, payload).await?))
}

pub async fn record_delivery(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(payload): Json<DeliveryInput>,
) -> Result<Json<ScoringUpdate>> {
    payload.validate()?;
    let update = state.matches.record_delivery(&match_id, payload).await?;
    debug!(
        match_id = %match_id,
        ball = %update.delivery.label(),
        scoreline = %update.scoreline,
        "delivery recorded"
    );
    Ok(Json(update))
}

pub async fn record_wicket(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(payload): Json<WicketInput>,
) -> Result<Json<ScoringUpdate>> {
    payload.validate()?;
    let update = state.matches.record_wicket(&match_id, payload).await?;
    info!(
        match_id = %match_id,
        ball = %update.delivery.label(),
        scoreline = %update.scoreline,
        "wicket recorded"
    );
    Ok(Json(update))
}

pub async fn set_batsman(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(payload): Json<PlayerSelection>,
) -> Result<Json<Match>> {
    payload.validate()?;
    Ok(Json(state.matches.set_new_batsman(&match_id, payload.player_id).await?))
}

pub async fn set_bowler(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(payload): Json<PlayerSelection>,
) -> Result<Json<Match>> {
    payload.validate()?;
    Ok(Json(state.matches.set_bowler(&match_id, payload.player_id).await?))
}

pub async fn end_innings(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(payload): Json<EndInnings>,
) -> Result<Json<Match>> {
    payload.validate()?;
    Ok(Json(state.matches.end_innings(&match_id, payload.openers).await?))
}

pub async fn complete_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Json(payload): Json<CompleteMatch>,
) -> Result<Json<Match>> {
    Ok(Json(state.matches.complete(&match_id, payload.winner_team_id).await?))
}

pub async fn cancel_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<Match>> {
    let cancelled = state.matches.cancel(&match_id).await?;
    info!(match_id = %match_id, "match cancelled");
    Ok(Json(cancelled))
}

pub async fn flush_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
    Query(query): Query<FlushQuery>,
) -> Result<Json<FlushReport>> {
    Ok(Json(state.matches.flush(&match_id, query.abandon).await?))
}

pub async fn get_deliveries(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<Vec<Delivery>>> {
    // 404 for an unknown match rather than an empty log
    state.matches.snapshot(&match_id).await?;
    Ok(Json(state.events.deliveries(&match_id).await?))
}

pub async fn get_player_innings(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<Vec<ScorecardRow>>> {
    let rows = state.matches.scorecard(&match_id).await?;
    Ok(Json(rows.iter().map(ScorecardRow::from).collect()))
}

pub async fn audit_match(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> Result<Json<AuditReport>> {
    let m = state.matches.snapshot(&match_id).await?;
    let deliveries = state.events.deliveries(&match_id).await?;
    let report = audit(&m, &deliveries);
    if !report.consistent {
        tracing::warn!(match_id = %match_id, mismatches = ?report.mismatches, "audit found differences");
    }
    Ok(Json(report))
}
