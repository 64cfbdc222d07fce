use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("unknown recurrence interval: {0}")]
    InvalidInterval(String),

    #[error("store operation failed: {0}")]
    Persistence(String),

    #[error("transaction not found")]
    NotFound,

    #[error("conditional update lost to a concurrent writer")]
    Conflict,
}
