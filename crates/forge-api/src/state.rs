//! Application state.

use std::sync::Arc;

use forge_engine::{IngestionService, QueryLayer, Scheduler, WorkerRegistry};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub ingestion: Arc<IngestionService>,
    pub scheduler: Scheduler,
    pub query: QueryLayer,
    pub workers: Arc<WorkerRegistry>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        ingestion: Arc<IngestionService>,
        scheduler: Scheduler,
        query: QueryLayer,
        workers: Arc<WorkerRegistry>,
    ) -> Self {
        Self {
            config,
            ingestion,
            scheduler,
            query,
            workers,
        }
    }
}
