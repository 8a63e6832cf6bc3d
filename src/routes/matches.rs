use axum::{routing::get, Router};

use crate::handlers::matches;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/:season_id/rounds/:round/matches", get(matches::get_round_matches))
        .route("/:season_id/matches/:match_id", get(matches::get_match))
}
