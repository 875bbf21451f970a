use error_stack::{Result, ResultExt};
use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

mod database;
mod fanout;
mod logging;
mod statistics;

pub use self::database::Database;
pub use self::fanout::FanOut;
pub use self::logging::{InvalidLoggingStyle, Logging, LoggingStyle};
pub use self::statistics::Statistics;

use crate::util::{figment::FigmentResultExt, validator::IntoValidatorReport};

#[derive(Debug, Error)]
#[error("Failed to load configuration")]
pub struct ConfigError;

#[derive(Debug, Deserialize, Validate)]
pub struct Config {
    #[validate(nested)]
    pub db: Database,
    #[serde(default)]
    #[validate(nested)]
    pub fanout: FanOut,
    #[serde(default)]
    #[validate(nested)]
    pub statistics: Statistics,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self::figment().extract::<Self>().into_report(ConfigError)?;
        config
            .validate()
            .into_validator_report()
            .change_context(ConfigError)?;

        Ok(config)
    }
}

impl Config {
    const DEFAULT_CONFIG_FILE: &'static str = "tidings.toml";
    const CONFIG_FILE_VAR: &'static str = "TIDINGS_CONFIG_FILE";

    /// Creates a default [`Figment`] object to load the configuration
    /// from `tidings.toml` (or the file `TIDINGS_CONFIG_FILE` points to)
    /// and `TIDINGS_` prefixed environment variables.
    ///
    /// [`Figment`]: figment::Figment
    pub(crate) fn figment() -> figment::Figment {
        use figment::{
            providers::{Env, Format, Toml},
            Figment,
        };

        let file = Env::var(Self::CONFIG_FILE_VAR)
            .unwrap_or_else(|| Self::DEFAULT_CONFIG_FILE.to_string());

        Figment::new()
            .merge(Toml::file(file))
            // Field names have underscores in them, so those have to be
            // mapped by hand instead of splitting every `_`.
            .merge(
                Env::prefixed("TIDINGS_")
                    .ignore(&["CONFIG_FILE"])
                    .map(|v| match v.as_str() {
                        "DB_MIN_IDLE" => "db.min_idle".into(),
                        "DB_POOL_SIZE" => "db.pool_size".into(),
                        "DB_TIMEOUT_SECS" => "db.timeout_secs".into(),
                        "DB_ENFORCE_TLS" => "db.enforce_tls".into(),
                        "DB_PAGE_SIZE" => "db.page_size".into(),

                        "FANOUT_BATCH_SIZE" => "fanout.batch_size".into(),

                        "STATISTICS_ACTIVE_WINDOW_DAYS" => "statistics.active_window_days".into(),
                        "STATISTICS_INTERVAL_SECS" => "statistics.interval_secs".into(),

                        _ => v.as_str().replace('_', ".").into(),
                    }),
            )
            // Environment variable aliases
            .merge(Env::raw().only(&["DATABASE_URL"]).map(|_| "db.url".into()))
    }
}
