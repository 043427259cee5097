use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid transaction id '{0}'")]
    InvalidTxId(String),

    #[error("invalid node address '{value}': {reason}")]
    InvalidNodeAddress { value: String, reason: &'static str },

    #[error("unknown table state '{0}'")]
    UnknownTableState(String),

    #[error("invalid table id '{0}'")]
    InvalidTableId(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
