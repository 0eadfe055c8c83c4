use shardex_common::InvalidBlockError;
use shardex_rlp::error::RLPDecodeError;
use shardex_storage::StateError;
use shardex_trie::TrieError;
use shardex_vm::VmError;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Invalid Block: {0}")]
    InvalidBlock(#[from] InvalidBlockError),
    #[error("State error: {0}")]
    State(#[from] StateError),
    #[error("Trie error: {0}")]
    Trie(#[from] TrieError),
    #[error("RLP decode error: {0}")]
    RLPDecode(#[from] RLPDecodeError),
    #[error("VM error: {0}")]
    Vm(#[from] VmError),
    #[error("{0}")]
    Custom(String),
}
