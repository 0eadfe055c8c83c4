//! Genesis state construction from a declarative allocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use ethereum_types::U256;
use serde::{Deserialize, Serialize};
use shardex_common::Address;
use shardex_common::constants::ETHER;
use shardex_storage::{State, put_code};
use shardex_trie::TrieDB;

use crate::error::ChainError;

/// The initial state of a chain: per-account balances, code and storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genesis {
    pub alloc: BTreeMap<Address, GenesisAccount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisAccount {
    pub balance: U256,
    #[serde(with = "shardex_common::serde_utils::bytes")]
    pub code: Bytes,
    pub storage: BTreeMap<U256, U256>,
}

impl Genesis {
    /// Builds the allocation over the given store and commits it: balances
    /// are credited in the ETHER contract of each account's shard, code is
    /// stored content-addressed, and storage slots are written verbatim.
    pub fn build_state(&self, db: Arc<dyn TrieDB>) -> Result<State, ChainError> {
        let mut state = State::new(db);
        for (addr, account) in &self.alloc {
            if !account.balance.is_zero() {
                let ether = ETHER.match_shard(addr);
                state.set_storage(ether, *addr, account.balance)?;
            }
            if !account.code.is_empty() {
                put_code(&mut state, *addr, &account.code)?;
            }
            for (key, value) in &account.storage {
                state.set_storage(*addr, *key, *value)?;
            }
        }
        state.commit()?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keccak_hash::keccak;
    use shardex_common::util::big_endian_to_u256;
    use shardex_storage::InMemoryStore;

    #[test]
    fn builds_balances_code_and_storage() {
        let account = Address::system(0x77).shardify(9);
        let json = format!(
            r#"{{
                "alloc": {{
                    "{account}": {{
                        "balance": "0x64",
                        "code": "0x6001",
                        "storage": {{ "0x1": "0x2a" }}
                    }}
                }}
            }}"#
        );
        let genesis: Genesis = serde_json::from_str(&json).unwrap();
        let mut state = genesis
            .build_state(Arc::new(InMemoryStore::new()))
            .unwrap();

        let ether = ETHER.match_shard(&account);
        let balance = big_endian_to_u256(&state.get_storage(ether, account).unwrap());
        assert_eq!(balance, U256::from(100));

        let codehash = state.get_storage(account, Vec::new()).unwrap();
        assert_eq!(codehash, keccak([0x60u8, 0x01]).as_bytes().to_vec());

        let slot = big_endian_to_u256(&state.get_storage(account, U256::from(1)).unwrap());
        assert_eq!(slot, U256::from(42));
    }

    #[test]
    fn empty_alloc_yields_an_empty_root() {
        let genesis = Genesis::default();
        let mut state = genesis
            .build_state(Arc::new(InMemoryStore::new()))
            .unwrap();
        assert_eq!(state.root().unwrap(), *shardex_trie::EMPTY_TRIE_HASH);
    }
}
