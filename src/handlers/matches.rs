use axum::{
    extract::{Path, State},
    response::Json,
};

use crate::errors::{AppError, Result};
use crate::models::fixture::MatchEntry;
use crate::state::AppState;

pub async fn get_round_matches(
    State(state): State<AppState>,
    Path((season_id, round)): Path<(String, u8)>,
) -> Result<Json<Vec<MatchEntry>>> {
    let matches = state.fixtures.matches_for_round(&season_id, round).await?;
    tracing::debug!(season_id = %season_id, round, count = matches.len(), "Round fixtures served");
    Ok(Json(matches))
}

pub async fn get_match(
    State(state): State<AppState>,
    Path((season_id, match_id)): Path<(String, String)>,
) -> Result<Json<MatchEntry>> {
    match state.fixtures.get_match(&season_id, &match_id).await? {
        Some(fixture) => Ok(Json(MatchEntry {
            id: match_id,
            season_id,
            fixture,
        })),
        None => Err(AppError::not_found(format!("match {match_id}"))),
    }
}
