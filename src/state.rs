use std::sync::Arc;
use std::time::Instant;

use crate::{
    config::AppConfig, repository::ActRepository, scheduler::Scheduler, sync::SyncService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Arc<dyn ActRepository>,
    pub scheduler: Arc<Scheduler>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repository: Arc<dyn ActRepository>,
        scheduler: Arc<Scheduler>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            repository,
            scheduler,
            started_at: Instant::now(),
        }
    }

    pub fn sync(&self) -> Arc<SyncService> {
        self.scheduler.sync()
    }
}
