use clap::Parser;
use error_stack::{Report, Result, ResultExt};
use std::num::NonZeroU64;
use std::time::Duration;
use thiserror::Error;
use tidings::statistics::ScheduledEvent;
use tidings::App;

/// Recompute the per-cohort user statistics
#[derive(Debug, Parser)]
pub struct StatisticsCommand {
    /// Keep running and recompute every SECS seconds.
    #[clap(long, value_name = "SECS")]
    pub every: Option<Option<NonZeroU64>>,
}

#[derive(Debug, Error)]
#[error("Could not update user statistics")]
pub struct StatisticsCommandError;

pub fn run(args: StatisticsCommand) -> Result<(), StatisticsCommandError> {
    let (config, runtime) = super::setup(|| StatisticsCommandError)?;

    runtime.block_on(async move {
        let app = App::new(config).await.change_context(StatisticsCommandError)?;
        let job = app.statistics_job();

        match args.every {
            // `--every` without a value uses the configured interval
            Some(every) => {
                let period = every.map_or_else(
                    || app.config.statistics.interval(),
                    |secs| Duration::from_secs(secs.get()),
                );
                job.run_every(period).await;
            }
            None => {
                job.handle(ScheduledEvent::new("cli"))
                    .await
                    .change_context(StatisticsCommandError)?;
            }
        }

        Ok::<_, Report<StatisticsCommandError>>(())
    })
}
