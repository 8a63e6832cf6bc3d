use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::autosave::{AutosaveScheduler, PickKey};
use crate::services::fixtures::FixtureService;
use crate::services::pick_store::PickStore;
use crate::services::pool_directory::PoolDirectory;
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub pools: PoolDirectory,
    pub picks: PickStore,
    pub fixtures: FixtureService,
    pub autosave: Arc<AutosaveScheduler<PickKey>>,
    pub jwt_secret: Arc<str>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>, config: &AppConfig) -> Self {
        AppState {
            pools: PoolDirectory::new(Arc::clone(&store)),
            picks: PickStore::new(Arc::clone(&store)),
            fixtures: FixtureService::new(Arc::clone(&store)),
            autosave: Arc::new(AutosaveScheduler::new(config.autosave_delay)),
            jwt_secret: Arc::from(config.jwt_secret.as_str()),
            store,
        }
    }
}
