use error_stack::Report;
use thiserror::Error;

/// Database related errors
#[derive(Debug, Error)]
pub enum Error {
    /// The connection url from the configuration cannot be parsed.
    #[error("invalid connection url")]
    InvalidUrl,
    /// An error caused by an [`sqlx`] error.
    #[error("received a pool error: {0}")]
    Internal(sqlx::Error),
    /// The database is in read-only mode (most likely due to
    /// maintenance) and refused a write.
    #[error("database is currently in read mode")]
    Readonly,
    /// The pool does not have a reliable connection to the database.
    #[error("unhealthy database pool")]
    UnhealthyPool,
    #[error("could not apply migrations")]
    Migration,
}

/// Converts from a generic [sqlx] result into a [database compatible error](Error).
pub trait ErrorExt<T> {
    fn into_db_error(self) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, sqlx::Error> {
    fn into_db_error(self) -> Result<T> {
        self.map_err(|e| match &e {
            sqlx::Error::Database(err) if err.message().ends_with("read-only transaction") => {
                Report::new(e).change_context(Error::Readonly)
            }
            _ => Report::new(Error::Internal(e)),
        })
    }
}

/// Lazily typed [`std::result::Result`] but the error generic
/// is filled up with [a database error](Error).
pub type Result<T> = error_stack::Result<T, Error>;

/// Looks into a report for the database error that caused it.
pub trait ReportExt {
    fn is_unhealthy(&self) -> bool;
    fn is_readonly(&self) -> bool;
    /// A row was read but one of its columns could not be decoded.
    fn is_malformed(&self) -> bool;
}

impl ReportExt for Report<Error> {
    fn is_unhealthy(&self) -> bool {
        matches!(self.downcast_ref::<Error>(), Some(Error::UnhealthyPool))
    }

    fn is_readonly(&self) -> bool {
        matches!(self.downcast_ref::<Error>(), Some(Error::Readonly))
    }

    fn is_malformed(&self) -> bool {
        matches!(
            self.downcast_ref::<Error>(),
            Some(Error::Internal(
                sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(..)
            ))
        )
    }
}
