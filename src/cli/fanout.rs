use clap::Parser;
use error_stack::{Report, Result, ResultExt};
use std::io::Read;
use std::path::PathBuf;
use thiserror::Error;
use tidings::model::ChangeBatch;
use tidings::App;

/// Fan out the inserted activities of a change batch and print
/// the records that have to be delivered again
#[derive(Debug, Parser)]
pub struct FanOutCommand {
    /// JSON file holding the change batch. Reads stdin if not set.
    #[clap(long)]
    pub input: Option<PathBuf>,
}

#[derive(Debug, Error)]
#[error("Could not fan out change batch")]
pub struct FanOutCommandError;

pub fn run(args: FanOutCommand) -> Result<(), FanOutCommandError> {
    let batch = args.read_batch()?;
    let (config, runtime) = super::setup(|| FanOutCommandError)?;

    let response = runtime.block_on(async move {
        let app = App::new(config).await.change_context(FanOutCommandError)?;
        Ok::<_, Report<FanOutCommandError>>(app.fanout().handle_batch(&batch).await)
    })?;

    let output = serde_json::to_string_pretty(&response).change_context(FanOutCommandError)?;
    println!("{output}");

    Ok(())
}

impl FanOutCommand {
    fn read_batch(&self) -> Result<ChangeBatch, FanOutCommandError> {
        let raw = if let Some(path) = &self.input {
            std::fs::read_to_string(path)
                .change_context(FanOutCommandError)
                .attach_printable_lazy(|| format!("could not read {}", path.display()))?
        } else {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .change_context(FanOutCommandError)
                .attach_printable("could not read stdin")?;
            raw
        };

        serde_json::from_str(&raw)
            .change_context(FanOutCommandError)
            .attach_printable("input is not a valid change batch")
    }
}
