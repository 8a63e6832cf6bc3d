use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use validator::Validate;

use crate::dtos::pool_dtos::{CreatePoolRequest, CreatePoolResponse, JoinPoolResponse};
use crate::errors::{AppError, Result};
use crate::handlers::require_member;
use crate::models::pool::{MemberEntry, PoolEntry, UserPool};
use crate::models::user::AuthUser;
use crate::state::AppState;

pub async fn create_pool(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<CreatePoolRequest>,
) -> Result<(StatusCode, Json<CreatePoolResponse>)> {
    let payload = payload.trimmed();
    payload.validate()?;

    let (pool_id, join_code) = state
        .pools
        .create_pool(
            &user.user_id,
            &user.display_name,
            &payload.name,
            &payload.season_id,
            user.photo_url.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePoolResponse { pool_id, join_code }),
    ))
}

pub async fn get_user_pools(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<UserPool>>> {
    let pools = state.pools.get_user_pools(&user.user_id).await?;
    Ok(Json(pools))
}

pub async fn find_pool_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<PoolEntry>> {
    state
        .pools
        .find_pool_by_join_code(&code)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("join code {code}")))
}

pub async fn get_pool(
    State(state): State<AppState>,
    Path(pool_id): Path<String>,
) -> Result<Json<PoolEntry>> {
    match state.pools.get_pool(&pool_id).await? {
        Some(pool) => Ok(Json(PoolEntry { id: pool_id, pool })),
        None => Err(AppError::not_found(format!("pool {pool_id}"))),
    }
}

pub async fn get_pool_members(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pool_id): Path<String>,
) -> Result<Json<Vec<MemberEntry>>> {
    require_member(&state, &pool_id, &user).await?;
    Ok(Json(state.pools.get_pool_members(&pool_id).await?))
}

pub async fn join_pool(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(pool_id): Path<String>,
) -> Result<(StatusCode, Json<JoinPoolResponse>)> {
    state
        .pools
        .join_pool(
            &pool_id,
            &user.user_id,
            &user.display_name,
            user.photo_url.as_deref(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(JoinPoolResponse {
            pool_id,
            user_id: user.user_id,
        }),
    ))
}
