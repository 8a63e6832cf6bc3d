use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub async fn api_health_check(State(state): State<AppState>) -> Json<Value> {
    let store_status = match state.store.ping().await {
        Ok(()) => "connected",
        Err(err) => {
            tracing::warn!("Store ping failed: {}", err);
            "disconnected"
        }
    };

    Json(json!({
        "status": "healthy",
        "database": store_status,
        "pendingAutosaves": state.autosave.pending_count(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
