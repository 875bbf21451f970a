use clap::Parser;
use error_stack::{Result, ResultExt};
use thiserror::Error;
use tidings::App;

/// Apply pending database migrations
#[derive(Debug, Parser)]
pub struct MigrateCommand {}

#[derive(Debug, Error)]
#[error("Could not migrate database")]
pub struct MigrateCommandError;

pub fn run(_args: MigrateCommand) -> Result<(), MigrateCommandError> {
    let (config, runtime) = super::setup(|| MigrateCommandError)?;

    runtime.block_on(async move {
        let app = App::new(config).await.change_context(MigrateCommandError)?;
        app.migrate().await.change_context(MigrateCommandError)
    })
}
