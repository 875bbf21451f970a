use clap::Parser;
use error_stack::{Context, Result, ResultExt};
use thiserror::Error;
use tidings::config::Config;
use tokio::runtime::Runtime;

mod fanout;
mod migrate;
mod retract;
mod statistics;

/// Command line options for tidings.
#[derive(Debug, Parser)]
#[command(
    about = "Newsfeed fan-out and user statistics workers",
    version,
    author,
    long_about
)]
pub struct Cli {
    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Debug, Error)]
#[error("Failed to run `{0}` command")]
pub struct CliError(&'static str);

impl Cli {
    pub fn run(self) -> Result<(), CliError> {
        match self.subcommand {
            Subcommand::Fanout(args) => self::fanout::run(args).change_context(CliError("fanout")),
            Subcommand::Retract(args) => {
                self::retract::run(args).change_context(CliError("retract"))
            }
            Subcommand::Statistics(args) => {
                self::statistics::run(args).change_context(CliError("statistics"))
            }
            Subcommand::Migrate(args) => {
                self::migrate::run(args).change_context(CliError("migrate"))
            }
        }
    }
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    Fanout(self::fanout::FanOutCommand),
    Retract(self::retract::RetractCommand),
    Statistics(self::statistics::StatisticsCommand),
    Migrate(self::migrate::MigrateCommand),
}

/// Loads the configuration and starts logging with it.
fn setup<C: Context>(context: fn() -> C) -> Result<(Config, Runtime), C> {
    let config = Config::load().change_context_lazy(context)?;
    tidings::logging::init(&config.logging).change_context_lazy(context)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .change_context_lazy(context)
        .attach_printable("could not build tokio runtime")?;

    Ok((config, runtime))
}
