use std::sync::Arc;
use tokio::sync::Mutex;

use crate::anchor::RootAnchor;
use crate::backend::LedgerBackend;
use crate::config::AppConfig;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: AppConfig,
    pub backend: Arc<dyn LedgerBackend>,
    pub anchor: Arc<dyn RootAnchor>,
    /// Held for a whole commit cycle so the loop and the manual endpoint
    /// never race each other inside one process
    pub commit_lock: Mutex<()>,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Arc<dyn LedgerBackend>, anchor: Arc<dyn RootAnchor>) -> Self {
        Self {
            config,
            backend,
            anchor,
            commit_lock: Mutex::new(()),
        }
    }
}
