use std::io;

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("{0}")]
    Parse(String),
    #[error("{source_name}: required column '{column}' not found")]
    MissingColumn {
        source_name: &'static str,
        column: String,
    },
    #[error("column '{column}' holds a malformed list literal {value:?}: {reason}")]
    ListLiteral {
        column: &'static str,
        value: String,
        reason: String,
    },
    #[error("{0}")]
    Config(String),
}

impl AppError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            AppError::Database(rusqlite::Error::SqliteFailure(code, _))
                if code.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
