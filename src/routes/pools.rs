use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{picks, pools};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(pools::get_user_pools).post(pools::create_pool))
        .route("/code/:code", get(pools::find_pool_by_code))
        .route("/:pool_id", get(pools::get_pool))
        .route(
            "/:pool_id/members",
            get(pools::get_pool_members).post(pools::join_pool),
        )
        .merge(pick_routes())
}

fn pick_routes() -> Router<AppState> {
    Router::new()
        .route("/:pool_id/picks", get(picks::get_own_picks))
        .route(
            "/:pool_id/picks/:match_id",
            get(picks::get_own_pick)
                .put(picks::save_pick)
                .delete(picks::clear_pick),
        )
        .route("/:pool_id/picks/:match_id/draft", post(picks::save_draft))
        .route("/:pool_id/statuses", get(picks::get_statuses))
        .route("/:pool_id/statuses/stream", get(picks::stream_statuses))
}
