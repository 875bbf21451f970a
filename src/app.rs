use error_stack::{Result, ResultExt};
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::database;
use crate::fanout::FanOut;
use crate::statistics::{Aggregator, StatisticsJob};
use crate::store::PgStore;
use crate::util::SystemClock;

/// Everything an entry point needs, created once and lent out to the
/// components that do the work.
#[derive(Debug, Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub store: PgStore,
}

#[derive(Debug, Error)]
#[error("Failed to initialize App struct")]
pub struct AppError;

impl App {
    #[tracing::instrument(skip_all)]
    pub async fn new(cfg: Config) -> Result<Self, AppError> {
        let pool = database::Pool::new(&cfg.db)
            .await
            .change_context(AppError)?;

        let store = PgStore::new(pool).with_page_size(cfg.db.page_size.get());
        Ok(Self {
            config: Arc::new(cfg),
            store,
        })
    }
}

impl App {
    #[must_use]
    pub fn fanout(&self) -> FanOut<'_, PgStore> {
        FanOut::new(&self.store).with_batch_size(self.config.fanout.batch_size)
    }

    #[must_use]
    pub fn aggregator(&self) -> Aggregator<'_, PgStore> {
        let stats = &self.config.statistics;
        Aggregator::new(&self.store, stats.cohorts.clone())
            .with_active_window(stats.active_window())
    }

    #[must_use]
    pub fn statistics_job(&self) -> StatisticsJob<'_, PgStore, SystemClock> {
        StatisticsJob::new(self.aggregator())
    }

    pub async fn migrate(&self) -> Result<(), database::Error> {
        self.store.pool().migrate().await
    }
}
