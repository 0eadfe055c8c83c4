//! Content-addressed code storage.
//!
//! Code stays out of the tries: the backing store maps
//! `UNHASH_MAGIC_BYTES ++ keccak(code)` to the blob, and an account points at
//! its code through the hash stored at the empty storage key. Identical code
//! deduplicates automatically.

use ethereum_types::H256;
use keccak_hash::keccak;
use shardex_common::Address;
use shardex_common::constants::UNHASH_MAGIC_BYTES;
use shardex_trie::TrieDB;

use crate::error::StateError;
use crate::state::State;

fn unhash_key(hash: &H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(UNHASH_MAGIC_BYTES.len() + 32);
    key.extend_from_slice(UNHASH_MAGIC_BYTES);
    key.extend_from_slice(hash.as_bytes());
    key
}

/// Stores a blob under its hash and returns the hash.
pub fn put_hash_data(db: &dyn TrieDB, blob: &[u8]) -> Result<H256, StateError> {
    let hash = keccak(blob);
    db.put(unhash_key(&hash), blob.to_vec())?;
    Ok(hash)
}

/// Fetches a blob by its hash.
pub fn unhash(db: &dyn TrieDB, hash: &H256) -> Result<Option<Vec<u8>>, StateError> {
    Ok(db.get(unhash_key(hash))?)
}

/// Stores `code` content-addressed and points the account's code-hash slot
/// (the empty key) at it. The blob write bypasses the journal: orphaned blobs
/// after a revert are unreachable garbage, the journaled hash slot is what
/// decides visibility.
pub fn put_code(state: &mut State, addr: Address, code: &[u8]) -> Result<H256, StateError> {
    let codehash = put_hash_data(state.db().as_ref(), code)?;
    state.set_storage(addr, Vec::new(), codehash)?;
    Ok(codehash)
}

/// The code currently bound to an account, empty if none was deployed.
pub fn get_code(state: &mut State, addr: Address) -> Result<Vec<u8>, StateError> {
    let codehash = state.get_storage(addr, Vec::new())?;
    if codehash.is_empty() {
        return Ok(Vec::new());
    }
    if codehash.len() != 32 {
        return Err(StateError::InvalidCodeHash);
    }
    Ok(unhash(state.db().as_ref(), &H256::from_slice(&codehash))?.unwrap_or_default())
}
