use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("transaction already finished")]
    TransactionClosed,

    #[error("storage error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum CalcError {
    #[error("Exam scheme not found.")]
    SchemeNotFound(i64),

    #[error("No marks found to process.")]
    NoMarksFound(i64),

    #[error("{0}")]
    Storage(#[from] StoreError),
}

/// Administrator-entered rule or band payload that could not be read.
///
/// Never fatal: callers fall back to scheme defaults or the default scale.
#[derive(Debug, Error)]
pub enum RuleDataError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("expected a list of entries, found {0}")]
    NotAList(&'static str),
}
