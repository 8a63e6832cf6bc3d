use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    Extension,
};
use futures::{channel::mpsc, stream, Stream, StreamExt};
use serde::Serialize;

use crate::dtos::pick_dtos::{DraftAccepted, MatchIdsQuery, PickDraftRequest, SavePickRequest};
use crate::errors::{AppError, Result};
use crate::handlers::require_member;
use crate::models::pick::{PickDetail, StatusMap};
use crate::models::user::AuthUser;
use crate::services::autosave::PickKey;
use crate::services::pick_store::{validate_margin, StatusUpdate};
use crate::state::AppState;

fn required_match_ids(query: &MatchIdsQuery) -> Result<Vec<String>> {
    let ids = query.ids();
    if ids.is_empty() {
        return Err(AppError::invalid_data("matchIds is required"));
    }
    Ok(ids)
}

pub async fn get_own_picks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pool_id): Path<String>,
    Query(query): Query<MatchIdsQuery>,
) -> Result<Json<BTreeMap<String, PickDetail>>> {
    require_member(&state, &pool_id, &user).await?;
    let match_ids = required_match_ids(&query)?;

    let picks = state
        .picks
        .get_user_picks_for_round(&pool_id, &match_ids, &user.user_id)
        .await?;
    Ok(Json(picks))
}

pub async fn get_own_pick(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((pool_id, match_id)): Path<(String, String)>,
) -> Result<Json<PickDetail>> {
    require_member(&state, &pool_id, &user).await?;

    state
        .picks
        .get_user_pick(&pool_id, &match_id, &user.user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("pick for {match_id}")))
}

pub async fn save_pick(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((pool_id, match_id)): Path<(String, String)>,
    Json(payload): Json<SavePickRequest>,
) -> Result<StatusCode> {
    require_member(&state, &pool_id, &user).await?;

    // An explicit save supersedes any draft still waiting to be written.
    state
        .autosave
        .cancel(&PickKey::new(&pool_id, &match_id, &user.user_id));
    state
        .picks
        .save_pick(
            &pool_id,
            &match_id,
            &user.user_id,
            payload.winner_team_id,
            payload.margin,
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear_pick(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((pool_id, match_id)): Path<(String, String)>,
) -> Result<StatusCode> {
    require_member(&state, &pool_id, &user).await?;

    state
        .autosave
        .cancel(&PickKey::new(&pool_id, &match_id, &user.user_id));
    state
        .picks
        .clear_pick(&pool_id, &match_id, &user.user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Debounced save while the user is still editing. A complete draft is
/// saved; an incomplete one clears the pick.
pub async fn save_draft(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((pool_id, match_id)): Path<(String, String)>,
    Json(draft): Json<PickDraftRequest>,
) -> Result<(StatusCode, Json<DraftAccepted>)> {
    require_member(&state, &pool_id, &user).await?;
    if let Some(margin) = draft.margin {
        validate_margin(margin)?;
    }

    let key = PickKey::new(&pool_id, &match_id, &user.user_id);
    let picks = state.picks.clone();
    state.autosave.schedule(key.clone(), async move {
        let PickKey {
            pool_id,
            match_id,
            user_id,
        } = key;
        let saved = match (draft.winner_team_id, draft.margin) {
            (Some(winner), Some(margin)) => {
                picks
                    .save_pick(&pool_id, &match_id, &user_id, winner, margin)
                    .await
            }
            _ => picks.clear_pick(&pool_id, &match_id, &user_id).await,
        };
        if let Err(err) = saved {
            tracing::error!(
                pool_id = %pool_id,
                match_id = %match_id,
                user_id = %user_id,
                "Autosave failed: {}",
                err
            );
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(DraftAccepted {
            scheduled_in_ms: u64::try_from(state.autosave.delay().as_millis()).unwrap_or(u64::MAX),
            match_id,
        }),
    ))
}

pub async fn get_statuses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pool_id): Path<String>,
    Query(query): Query<MatchIdsQuery>,
) -> Result<Json<BTreeMap<String, StatusMap>>> {
    require_member(&state, &pool_id, &user).await?;
    let match_ids = required_match_ids(&query)?;

    Ok(Json(state.picks.get_matches_statuses(&pool_id, &match_ids).await?))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusEvent<'a> {
    match_id: &'a str,
    statuses: StatusMap,
}

fn status_event(match_id: &str, update: StatusUpdate) -> Event {
    let event = match update {
        Ok(statuses) => Event::default()
            .event("statuses")
            .json_data(StatusEvent { match_id, statuses }),
        Err(err) => {
            tracing::warn!(match_id, "Status feed ended: {}", err);
            Event::default()
                .event("error")
                .json_data(serde_json::json!({ "matchId": match_id, "message": "Status feed ended" }))
        }
    };

    event.unwrap_or_else(|err| {
        tracing::error!(match_id, "Failed to encode status event: {}", err);
        Event::default().event("error").data("encoding failed")
    })
}

/// Server-sent events carrying the status map of each requested match,
/// first as a snapshot and then after every change.
pub async fn stream_statuses(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pool_id): Path<String>,
    Query(query): Query<MatchIdsQuery>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    require_member(&state, &pool_id, &user).await?;
    let match_ids = required_match_ids(&query)?;

    let (tx, rx) = mpsc::unbounded();
    let subscription = state
        .picks
        .subscribe_to_matches_statuses(&pool_id, &match_ids, move |match_id, update| {
            let _ = tx.unbounded_send(status_event(match_id, update));
        })
        .await?;

    tracing::info!(
        pool_id = %pool_id,
        user_id = %user.user_id,
        matches = match_ids.len(),
        "Status stream opened"
    );

    // The subscription lives inside the stream, so a disconnecting client
    // releases every per-match feed.
    let events = stream::unfold((rx, subscription), |(mut rx, subscription)| async move {
        let event = rx.next().await?;
        Some((Ok::<_, Infallible>(event), (rx, subscription)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
