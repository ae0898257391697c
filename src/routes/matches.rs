use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::matches;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(matches::list_matches).post(matches::create_match))
        .route("/:match_id", get(matches::get_match))
        .route("/:match_id/start", post(matches::start_match))
        .route(
            "/:match_id/deliveries",
            get(matches::get_deliveries).post(matches::record_delivery),
        )
        .route("/:match_id/wickets", post(matches::record_wicket))
        .route("/:match_id/batsman", post(matches::set_batsman))
        .route("/:match_id/bowler", post(matches::set_bowler))
        .route("/:match_id/end-innings", post(matches::end_innings))
        .route("/:match_id/complete", post(matches::complete_match))
        .route("/:match_id/cancel", post(matches::cancel_match))
        .route("/:match_id/flush", post(matches::flush_match))
        .route("/:match_id/player-innings", get(matches::get_player_innings))
        .route("/:match_id/audit", get(matches::audit_match))
}
