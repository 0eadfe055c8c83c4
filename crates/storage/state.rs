use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::{H256, U256};
use shardex_common::Address;
use shardex_common::constants::ADDR_BYTES;
use shardex_trie::{EMPTY_TRIE_HASH, Trie, TrieDB};

use crate::error::StateError;
use crate::store::OverlayStore;

/// A storage key or value in canonical byte form: integers become fixed-width
/// 32-byte big-endian strings, everything else is kept as raw bytes.
pub struct StorageWord(pub Vec<u8>);

impl From<u64> for StorageWord {
    fn from(value: u64) -> Self {
        Self(U256::from(value).to_big_endian().to_vec())
    }
}

impl From<U256> for StorageWord {
    fn from(value: U256) -> Self {
        Self(value.to_big_endian().to_vec())
    }
}

impl From<H256> for StorageWord {
    fn from(value: H256) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Address> for StorageWord {
    fn from(value: Address) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<Vec<u8>> for StorageWord {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl From<&[u8]> for StorageWord {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl From<Bytes> for StorageWord {
    fn from(value: Bytes) -> Self {
        Self(value.to_vec())
    }
}

/// Undo records backing snapshot/revert. Point updates restore a single
/// cached value; commit markers rewind the account trie's root hash and swap
/// back the pre-commit cache and modified sets.
enum JournalEntry {
    Storage {
        addr: Address,
        key: Vec<u8>,
        prior: Vec<u8>,
    },
    Commit {
        cache: BTreeMap<Address, BTreeMap<Vec<u8>, Vec<u8>>>,
        modified: BTreeMap<Address, BTreeSet<Vec<u8>>>,
        prior_root: H256,
    },
}

/// The chain state: one account trie whose leaves are per-account storage
/// trie roots, behind a journaling write-back cache.
///
/// The cache makes repeated reads O(1) and lets commits happen at any time;
/// commits can be reverted too. Committing happens automatically whenever a
/// root is requested, so use [`State::root`] rather than reaching for the
/// trie's hash directly.
pub struct State {
    trie: Trie,
    db: Arc<dyn TrieDB>,
    journal: Vec<JournalEntry>,
    cache: BTreeMap<Address, BTreeMap<Vec<u8>, Vec<u8>>>,
    modified: BTreeMap<Address, BTreeSet<Vec<u8>>>,
}

impl State {
    /// An empty state over a fresh store.
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self::open(*EMPTY_TRIE_HASH, db)
    }

    /// A state rooted at a previously committed root hash.
    pub fn open(root: H256, db: Arc<dyn TrieDB>) -> Self {
        Self {
            trie: Trie::open(db.clone(), root),
            db,
            journal: Vec::new(),
            cache: BTreeMap::new(),
            modified: BTreeMap::new(),
        }
    }

    /// The backing store, shared with the tries and the code blobs.
    pub fn db(&self) -> Arc<dyn TrieDB> {
        self.db.clone()
    }

    /// Reads a storage slot. Checks the write cache first, then the
    /// account's storage trie; absent values read as empty. The result is
    /// memoized so subsequent reads skip the trie walk.
    pub fn get_storage(
        &mut self,
        addr: Address,
        key: impl Into<StorageWord>,
    ) -> Result<Vec<u8>, StateError> {
        let key = key.into().0;
        if let Some(value) = self.cache.get(&addr).and_then(|slots| slots.get(&key)) {
            return Ok(value.clone());
        }
        let root = self.account_storage_root(addr)?;
        let storage = Trie::open(self.db.clone(), root);
        let value = storage.get(&key)?.unwrap_or_default();
        self.cache
            .entry(addr)
            .or_default()
            .insert(key, value.clone());
        Ok(value)
    }

    /// Writes a storage slot into the cache, recording the prior value on
    /// the journal and marking the slot dirty for the next commit.
    pub fn set_storage(
        &mut self,
        addr: Address,
        key: impl Into<StorageWord>,
        value: impl Into<StorageWord>,
    ) -> Result<(), StateError> {
        let key = key.into().0;
        let value = value.into().0;
        let prior = self.get_storage(addr, key.clone())?;
        self.journal.push(JournalEntry::Storage {
            addr,
            key: key.clone(),
            prior,
        });
        self.cache
            .entry(addr)
            .or_default()
            .insert(key.clone(), value);
        self.modified.entry(addr).or_default().insert(key);
        Ok(())
    }

    /// Returns a token that [`State::revert`] accepts to rewind to this
    /// point. Tokens are passive; they need no release.
    pub fn snapshot(&self) -> usize {
        self.journal.len()
    }

    /// Rewinds the journal back to a snapshot, undoing cached writes and any
    /// commits made since.
    pub fn revert(&mut self, snapshot: usize) {
        while self.journal.len() > snapshot {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry {
                JournalEntry::Storage { addr, key, prior } => {
                    self.cache.entry(addr).or_default().insert(key, prior);
                }
                JournalEntry::Commit {
                    cache,
                    modified,
                    prior_root,
                } => {
                    self.trie.set_root(prior_root);
                    self.cache = cache;
                    self.modified = modified;
                }
            }
        }
    }

    /// Folds every dirty cached slot whose value actually changed into its
    /// account storage trie and writes the new sub-roots into the account
    /// trie. Pushes a commit marker so the whole step can be reverted, then
    /// starts a fresh cache. A commit with no pending modifications leaves
    /// the root untouched.
    pub fn commit(&mut self) -> Result<(), StateError> {
        let prior_root = self.trie.hash();
        let cache = std::mem::take(&mut self.cache);
        let modified = std::mem::take(&mut self.modified);
        for (addr, slots) in &cache {
            let Some(dirty) = modified.get(addr) else {
                continue;
            };
            let root = self.account_storage_root(*addr)?;
            let mut storage = Trie::open(self.db.clone(), root);
            let mut changed = false;
            for (key, value) in slots {
                if dirty.contains(key) && storage.get(key)?.unwrap_or_default() != *value {
                    storage.insert(key.clone(), value.clone())?;
                    changed = true;
                }
            }
            if changed {
                self.trie
                    .insert(addr.as_bytes().to_vec(), storage.hash().as_bytes().to_vec())?;
            }
        }
        self.journal.push(JournalEntry::Commit {
            cache,
            modified,
            prior_root,
        });
        Ok(())
    }

    /// Commits and returns the canonical account-trie root hash.
    pub fn root(&mut self) -> Result<H256, StateError> {
        self.commit()?;
        Ok(self.trie.hash())
    }

    /// Creates a new state over an overlay of this one's store. Updates to
    /// the forked state never reach the parent.
    pub fn fork(&mut self) -> Result<State, StateError> {
        let root = self.root()?;
        let overlay: Arc<dyn TrieDB> = Arc::new(OverlayStore::new(self.db.clone()));
        Ok(State::open(root, overlay))
    }

    /// Materializes the state as nested maps, folding committed trie
    /// contents with the uncommitted cache. Diagnostic only.
    pub fn dump(&self) -> Result<BTreeMap<Address, BTreeMap<Vec<u8>, Vec<u8>>>, StateError> {
        let mut out = BTreeMap::new();
        for (addr_bytes, root_bytes) in self.trie.to_map()? {
            if addr_bytes.len() != ADDR_BYTES || root_bytes.len() != 32 {
                continue;
            }
            let addr = Address::from_slice(&addr_bytes);
            let storage = Trie::open(self.db.clone(), H256::from_slice(&root_bytes));
            out.insert(addr, storage.to_map()?);
        }
        for (addr, slots) in &self.cache {
            let account = out.entry(*addr).or_default();
            for (key, value) in slots {
                if value.is_empty() {
                    account.remove(key);
                } else {
                    account.insert(key.clone(), value.clone());
                }
            }
            if out.get(addr).is_some_and(BTreeMap::is_empty) {
                out.remove(addr);
            }
        }
        Ok(out)
    }

    /// Like [`State::dump`] but for a single account.
    pub fn dump_account(&self, addr: Address) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StateError> {
        let root = self.account_storage_root(addr)?;
        let storage = Trie::open(self.db.clone(), root);
        let mut out = storage.to_map()?;
        if let Some(slots) = self.cache.get(&addr) {
            for (key, value) in slots {
                if value.is_empty() {
                    out.remove(key);
                } else {
                    out.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(out)
    }

    fn account_storage_root(&self, addr: Address) -> Result<H256, StateError> {
        let root = match self.trie.get(&addr.as_bytes().to_vec())? {
            Some(bytes) if bytes.len() == 32 => H256::from_slice(&bytes),
            _ => *EMPTY_TRIE_HASH,
        };
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn new_state() -> State {
        State::new(Arc::new(InMemoryStore::new()))
    }

    fn addr(tag: u8, shard: u64) -> Address {
        Address::system(tag).shardify(shard)
    }

    #[test]
    fn reads_default_to_empty() {
        let mut state = new_state();
        assert!(state.get_storage(addr(1, 0), 0u64).unwrap().is_empty());
    }

    #[test]
    fn writes_are_visible_before_and_after_commit() {
        let mut state = new_state();
        let account = addr(1, 3);
        state.set_storage(account, 5u64, 42u64).unwrap();
        assert_eq!(
            state.get_storage(account, 5u64).unwrap(),
            StorageWord::from(42u64).0
        );
        state.commit().unwrap();
        assert_eq!(
            state.get_storage(account, 5u64).unwrap(),
            StorageWord::from(42u64).0
        );
    }

    #[test]
    fn integer_keys_and_values_are_canonical_32_bytes() {
        let mut state = new_state();
        let account = addr(2, 0);
        state.set_storage(account, 1u64, 7u64).unwrap();
        let value = state.get_storage(account, 1u64).unwrap();
        assert_eq!(value.len(), 32);
        assert_eq!(value[31], 7);
        // the same slot via an explicit 32-byte key
        let key = U256::from(1u64).to_big_endian().to_vec();
        assert_eq!(state.get_storage(account, key).unwrap(), value);
    }

    #[test]
    fn snapshot_revert_round_trip_across_accounts() {
        let mut state = new_state();
        // 50 keys across 5 accounts
        for account_tag in 0u8..5 {
            for slot in 0u64..10 {
                state
                    .set_storage(addr(account_tag, 0), slot, slot + 100)
                    .unwrap();
            }
        }
        let root_before = state.root().unwrap();
        let token = state.snapshot();

        for account_tag in 0u8..5 {
            for slot in 0u64..10 {
                state
                    .set_storage(addr(account_tag, 0), slot, slot + 999)
                    .unwrap();
            }
        }
        state.commit().unwrap();
        assert_ne!(state.root().unwrap(), root_before);

        state.revert(token);
        assert_eq!(state.root().unwrap(), root_before);
        for account_tag in 0u8..5 {
            for slot in 0u64..10 {
                assert_eq!(
                    state.get_storage(addr(account_tag, 0), slot).unwrap(),
                    StorageWord::from(slot + 100).0
                );
            }
        }
    }

    #[test]
    fn revert_restores_uncommitted_values() {
        let mut state = new_state();
        let account = addr(9, 1);
        state.set_storage(account, 0u64, 1u64).unwrap();
        let token = state.snapshot();
        state.set_storage(account, 0u64, 2u64).unwrap();
        state.revert(token);
        assert_eq!(
            state.get_storage(account, 0u64).unwrap(),
            StorageWord::from(1u64).0
        );
    }

    #[test]
    fn root_is_idempotent() {
        let mut state = new_state();
        state.set_storage(addr(3, 2), 0u64, 11u64).unwrap();
        let first = state.root().unwrap();
        let second = state.root().unwrap();
        assert_eq!(first, second);
        assert!(state.cache.is_empty());
        assert!(state.modified.is_empty());
    }

    #[test]
    fn rewriting_the_stored_value_is_a_commit_no_op() {
        let mut state = new_state();
        let account = addr(4, 0);
        state.set_storage(account, 0u64, 5u64).unwrap();
        let root = state.root().unwrap();
        // same value again: marked modified but equal to the stored one
        state.set_storage(account, 0u64, 5u64).unwrap();
        assert_eq!(state.root().unwrap(), root);
    }

    #[test]
    fn fork_isolates_the_parent() {
        let mut state = new_state();
        let account = addr(5, 7);
        state.set_storage(account, 0u64, 1u64).unwrap();
        let parent_root = state.root().unwrap();

        let mut forked = state.fork().unwrap();
        assert_eq!(
            forked.get_storage(account, 0u64).unwrap(),
            StorageWord::from(1u64).0
        );
        forked.set_storage(account, 0u64, 2u64).unwrap();
        forked.set_storage(account, 1u64, 3u64).unwrap();
        assert_ne!(forked.root().unwrap(), parent_root);

        // the parent still sees its own values and root
        assert_eq!(
            state.get_storage(account, 0u64).unwrap(),
            StorageWord::from(1u64).0
        );
        assert!(state.get_storage(account, 1u64).unwrap().is_empty());
        assert_eq!(state.root().unwrap(), parent_root);
    }

    #[test]
    fn dump_folds_cache_over_committed_values() {
        let mut state = new_state();
        let account = addr(6, 0);
        state.set_storage(account, 0u64, 1u64).unwrap();
        state.commit().unwrap();
        state.set_storage(account, 1u64, 2u64).unwrap();

        let dump = state.dump().unwrap();
        let slots = dump.get(&account).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(
            state.dump_account(account).unwrap().len(),
            slots.len()
        );
    }

    #[test]
    fn reopening_at_root_sees_committed_data() {
        let db: Arc<dyn TrieDB> = Arc::new(InMemoryStore::new());
        let mut state = State::new(db.clone());
        let account = addr(7, 4);
        state.set_storage(account, 0u64, 77u64).unwrap();
        let root = state.root().unwrap();

        let mut reopened = State::open(root, db);
        assert_eq!(
            reopened.get_storage(account, 0u64).unwrap(),
            StorageWord::from(77u64).0
        );
    }
}
