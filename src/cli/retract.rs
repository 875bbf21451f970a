use clap::Parser;
use error_stack::{Result, ResultExt};
use thiserror::Error;
use tidings::App;

/// Delete every newsfeed entry generated by one activity
#[derive(Debug, Parser)]
pub struct RetractCommand {
    /// Username of the poster.
    #[clap(long)]
    pub poster: String,
    /// Id of the activity in the poster's timeline.
    #[clap(long)]
    pub activity: String,
}

#[derive(Debug, Error)]
#[error("Could not retract activity")]
pub struct RetractCommandError;

pub fn run(args: RetractCommand) -> Result<(), RetractCommandError> {
    let (config, runtime) = super::setup(|| RetractCommandError)?;

    let deleted = runtime.block_on(async move {
        let app = App::new(config).await.change_context(RetractCommandError)?;
        app.fanout()
            .delete_entries_for(&args.poster, &args.activity)
            .await
            .into_result()
            .change_context(RetractCommandError)
    })?;

    println!("Deleted {deleted} newsfeed entries");
    Ok(())
}
