use shardex_trie::TrieError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Trie error: {0}")]
    Trie(#[from] TrieError),
    #[error("account code hash has invalid length")]
    InvalidCodeHash,
}
