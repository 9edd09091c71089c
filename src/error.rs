use thiserror::Error;

pub use anyhow::Context;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error("unexpected table format: {0}")]
    TableFormat(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn message<T: Into<String>>(msg: T) -> Self {
        AppError::Message(msg.into())
    }

    pub fn table_format<T: Into<String>>(msg: T) -> Self {
        AppError::TableFormat(msg.into())
    }
}

/// Failures while aligning a batch response with the symbols that were requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("response has no entry for symbol `{symbol}`")]
    MissingSymbol { symbol: String },
    #[error("response entry for `{expected}` identifies as `{found}`")]
    IdentityMismatch { expected: String, found: String },
    #[error("response entry for `{symbol}` lacks field `{group}.{field}`")]
    MissingField {
        symbol: String,
        group: String,
        field: String,
    },
}
