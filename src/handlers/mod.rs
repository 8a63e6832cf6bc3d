pub(crate) mod health;
pub(crate) mod matches;
pub(crate) mod picks;
pub(crate) mod pools;

use crate::errors::{AppError, Result};
use crate::models::user::AuthUser;
use crate::state::AppState;

/// Pool-scoped reads and writes are for members only.
pub(crate) async fn require_member(state: &AppState, pool_id: &str, user: &AuthUser) -> Result<()> {
    if state.pools.get_pool(pool_id).await?.is_none() {
        return Err(AppError::not_found(format!("pool {pool_id}")));
    }

    if !state.pools.is_member(pool_id, &user.user_id).await? {
        tracing::warn!(pool_id, user_id = %user.user_id, "Non-member denied pool access");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}
