use shardex_storage::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("{0}")]
    Custom(String),
}
