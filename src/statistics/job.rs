use error_stack::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::{AggregateError, Aggregator};
use crate::store::{RequirementStore, StatisticsStore, UserStore};
use crate::util::{format_timestamp, Clock};

/// Payload of a scheduled invocation. Only `id` is looked at; the rest
/// is handed back untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ScheduledEvent {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ScheduledEvent {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            extra: Map::new(),
        }
    }
}

/// Runs the aggregator whenever it is scheduled to.
#[derive(Debug)]
pub struct StatisticsJob<'a, S, C> {
    aggregator: Aggregator<'a, S, C>,
}

impl<'a, S, C> StatisticsJob<'a, S, C>
where
    S: UserStore + RequirementStore + StatisticsStore,
    C: Clock,
{
    #[must_use]
    pub fn new(aggregator: Aggregator<'a, S, C>) -> Self {
        Self { aggregator }
    }

    /// Updates the statistics and hands the event back.
    #[tracing::instrument(skip_all, fields(request_id = %event.id))]
    pub async fn handle(&self, event: ScheduledEvent) -> Result<ScheduledEvent, AggregateError> {
        tracing::debug!(?event, "Received scheduled event");
        self.aggregator.run().await?;
        Ok(event)
    }

    /// Runs [`StatisticsJob::handle`] every `period`, starting right away,
    /// until interrupted with Ctrl-C. A failed run is logged and the
    /// next one goes ahead as scheduled.
    pub async fn run_every(&self, period: Duration) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let id = format!("scheduled-{}", format_timestamp(self.aggregator.clock.now()));
                    if let Err(report) = self.handle(ScheduledEvent::new(id)).await {
                        tracing::error!("Failed to update user statistics: {report:?}");
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down statistics job");
                    break;
                }
            }
        }
    }
}
