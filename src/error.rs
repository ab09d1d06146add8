use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeedError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {message}")]
    Store { message: String, transient: bool },
}

pub type Result<T> = std::result::Result<T, SeedError>;

impl SeedError {
    pub fn store(message: impl Into<String>) -> Self {
        SeedError::Store {
            message: message.into(),
            transient: false,
        }
    }

    /// Transient store errors (dropped connections, lock contention) are
    /// worth retrying; everything else fails the batch immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, SeedError::Store { transient: true, .. })
    }
}

impl From<rusqlite::Error> for SeedError {
    fn from(e: rusqlite::Error) -> Self {
        let transient = matches!(
            &e,
            rusqlite::Error::SqliteFailure(inner, _)
                if matches!(
                    inner.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
        );
        SeedError::Store {
            message: e.to_string(),
            transient,
        }
    }
}

impl From<sqlx::Error> for SeedError {
    fn from(e: sqlx::Error) -> Self {
        let transient = matches!(
            e,
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
        );
        SeedError::Store {
            message: e.to_string(),
            transient,
        }
    }
}
