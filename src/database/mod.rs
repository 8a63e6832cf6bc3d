pub mod collections;
pub mod connection;

use std::sync::Arc;

use crate::config::{AppConfig, StoreBackend};
use crate::errors::{AppError, Result};
use crate::store::{DocumentStore, MemoryStore, MongoStore};

/// Build the store client selected by configuration. The returned handle is
/// shared by every component through `AppState`.
pub async fn connect_store(config: &AppConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.store_backend {
        StoreBackend::Mongo => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| AppError::configuration("DATABASE_URL must be set"))?;
            let (client, db) = connection::get_db_client(url, &config.database_name).await?;
            Ok(Arc::new(MongoStore::new(client, db)))
        }
        StoreBackend::Memory => {
            tracing::warn!("⚠️ Using in-memory store, data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
