use ethereum_types::H256;
use shardex_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error("Inconsistent internal tree structure: node with hash {0:?} not found")]
    InconsistentTree(H256),
    #[error("Lock error: panicked when trying to acquire a lock")]
    LockError,
}
