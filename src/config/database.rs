use serde::Deserialize;
use std::num::{NonZeroU32, NonZeroU64, NonZeroUsize};
use std::time::Duration;
use validator::{Validate, ValidationError};

use crate::util::Sensitive;

/// Configuration for connecting to the Postgres database.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "check_min_idle"))]
pub struct Database {
    /// Connection URL connecting to the Postgres database.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_DB_URL` or `DATABASE_URL`
    #[validate(custom(function = "check_postgres_url"))]
    pub url: Sensitive<String>,
    /// Minimum idle database connections kept open.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_DB_MIN_IDLE`
    pub min_idle: Option<NonZeroU32>,
    /// Maximum amount of connections the pool can hold.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_DB_POOL_SIZE`
    #[serde(default = "Database::default_pool_size")]
    pub pool_size: NonZeroU32,
    /// How long to wait for a connection before giving up.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_DB_TIMEOUT_SECS`
    #[serde(default = "Database::default_timeout_secs")]
    pub timeout_secs: NonZeroU64,
    /// Forces all database connections to be encrypted with TLS
    /// (if possible).
    ///
    /// **Environment variables**:
    /// - `TIDINGS_DB_ENFORCE_TLS`
    #[serde(default = "Database::default_enforce_tls")]
    pub enforce_tls: bool,
    /// Rows read per listing query.
    ///
    /// **Environment variables**:
    /// - `TIDINGS_DB_PAGE_SIZE`
    #[serde(default = "Database::default_page_size")]
    pub page_size: NonZeroUsize,
}

impl Database {
    const DEFAULT_POOL_SIZE: u32 = 5;
    const DEFAULT_TIMEOUT_SECS: u64 = 5;
    const DEFAULT_PAGE_SIZE: usize = 100;

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.get())
    }

    // Required by serde
    const fn default_pool_size() -> NonZeroU32 {
        match NonZeroU32::new(Self::DEFAULT_POOL_SIZE) {
            Some(n) => n,
            None => panic!("DEFAULT_POOL_SIZE is accidentally set to 0"),
        }
    }

    const fn default_timeout_secs() -> NonZeroU64 {
        match NonZeroU64::new(Self::DEFAULT_TIMEOUT_SECS) {
            Some(n) => n,
            None => panic!("DEFAULT_TIMEOUT_SECS is accidentally set to 0"),
        }
    }

    const fn default_enforce_tls() -> bool {
        true
    }

    const fn default_page_size() -> NonZeroUsize {
        match NonZeroUsize::new(Self::DEFAULT_PAGE_SIZE) {
            Some(n) => n,
            None => panic!("DEFAULT_PAGE_SIZE is accidentally set to 0"),
        }
    }
}

fn check_postgres_url(url: &Sensitive<String>) -> Result<(), ValidationError> {
    let url = url.as_str();
    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        return Ok(());
    }

    let mut error = ValidationError::new("postgres_url");
    error.message = Some("expected a postgres:// connection URL".into());
    Err(error)
}

fn check_min_idle(db: &Database) -> Result<(), ValidationError> {
    match db.min_idle {
        Some(min_idle) if min_idle > db.pool_size => {
            let mut error = ValidationError::new("min_idle");
            let message = format!("min_idle cannot exceed pool_size ({})", db.pool_size);
            error.message = Some(message.into());
            Err(error)
        }
        _ => Ok(()),
    }
}
