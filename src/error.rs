use rusqlite::ErrorCode;
use thiserror::Error;

/// SQLSTATE reported when nothing more specific applies.
pub const GENERAL_ERROR: &str = "HY000";

/// Errors produced by [`crate::SqliteSupport`] operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// Missing or unusable connection settings; no connection was attempted.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to open database '{database}': {source}")]
    Connect {
        database: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to prepare statement '{statement}': {source}")]
    Prepare {
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to execute statement: {source}")]
    Execute {
        #[source]
        source: rusqlite::Error,
    },
}

impl DbError {
    fn driver_error(&self) -> Option<&rusqlite::Error> {
        match self {
            DbError::Config(_) => None,
            DbError::Connect { source, .. }
            | DbError::Prepare { source, .. }
            | DbError::Execute { source } => Some(source),
        }
    }

    /// SQLSTATE for this error, following the PDO SQLite driver's mapping.
    pub fn sqlstate(&self) -> &'static str {
        match self.driver_error() {
            Some(rusqlite::Error::SqliteFailure(err, _)) => match err.code {
                ErrorCode::ConstraintViolation => "23000",
                ErrorCode::NotFound => "42S02",
                ErrorCode::OperationInterrupted => "01002",
                ErrorCode::TooBig => "22001",
                ErrorCode::NoLargeFileSupport => "HYC00",
                _ => GENERAL_ERROR,
            },
            _ => GENERAL_ERROR,
        }
    }

    /// Extended SQLite result code, when the driver supplied one.
    pub fn driver_code(&self) -> Option<i32> {
        match self.driver_error() {
            Some(rusqlite::Error::SqliteFailure(err, _)) => Some(err.extended_code),
            _ => None,
        }
    }

    /// Driver-level message without the variant prefix.
    pub fn driver_message(&self) -> String {
        match self {
            DbError::Config(msg) => msg.clone(),
            DbError::Connect { source, .. }
            | DbError::Prepare { source, .. }
            | DbError::Execute { source } => match source {
                rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
                rusqlite::Error::SqliteFailure(err, None) => err.to_string(),
                other => other.to_string(),
            },
        }
    }

    pub fn error_state(&self) -> ErrorState {
        ErrorState::from(self)
    }
}

/// Last failure recorded on a helper: a SQLSTATE code plus a
/// `sqlstate|driver_code|message` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    pub code: String,
    pub message: String,
}

impl From<&DbError> for ErrorState {
    fn from(err: &DbError) -> Self {
        let code = err.sqlstate().to_string();
        let driver_code = err
            .driver_code()
            .map(|c| c.to_string())
            .unwrap_or_default();
        let message = format!("{}|{}|{}", code, driver_code, err.driver_message());
        Self { code, message }
    }
}
