use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::tournaments;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:tournament_id/stats", get(tournaments::get_stats))
        .route("/:tournament_id/stats/recompute", post(tournaments::recompute_stats))
}
