use serde::Deserialize;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    /// **Environment variables**:
    /// - `TIDINGS_LOGGING_STYLE`
    #[serde(default)]
    pub style: LoggingStyle,
    /// Filter directives in `RUST_LOG` syntax. Falls back to `RUST_LOG`
    /// when empty.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_LOGGING_TARGETS`
    #[serde(default)]
    pub targets: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum LoggingStyle {
    Compact,
    #[default]
    Full,
    Pretty,
    Json,
}

impl Display for LoggingStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compact => f.write_str("compact"),
            Self::Full => f.write_str("full"),
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown {0:?} logging style")]
pub struct InvalidLoggingStyle(String);

impl FromStr for LoggingStyle {
    type Err = InvalidLoggingStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "full" => Ok(Self::Full),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(InvalidLoggingStyle(s.to_string())),
        }
    }
}

impl TryFrom<String> for LoggingStyle {
    type Error = InvalidLoggingStyle;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
