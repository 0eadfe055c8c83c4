//! The deterministic state-transition function: applies a block (or the
//! block-less tick of an empty slot) on top of a [`State`] to reach the next
//! state.
//!
//! All intermediate execution metadata (gas remaining, transaction index,
//! per-transaction logs, block hashes, state roots, the RNG seed) lives in
//! contracts at well-known addresses, so the only durable artifact is the
//! account-trie root plus the backing store.

pub mod error;
pub mod genesis;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ethereum_types::{H256, U256};
use keccak_hash::keccak;
use shardex_common::constants::{
    BLKNUMBER, BLOCKHASHES, CASPER, EXECUTION_STATE, GAS_REMAINING, LOG, NULL_SENDER, PROPOSER,
    RNGSEEDS, STATEROOTS, TXGAS, TXINDEX,
};
use shardex_common::types::{Block, Transaction};
use shardex_common::util::{big_endian_to_u256, big_endian_to_u64};
use shardex_common::ShardRange;
use shardex_rlp::constants::RLP_EMPTY_LIST;
use shardex_rlp::decode::decode_rlp_item;
use shardex_rlp::encode::{RLPEncode, encode_length};
use shardex_storage::{State, get_code, put_code};
use shardex_vm::{CallData, Dispatcher, Message, SpecialsRegistry, Vm, VmExt};
use tracing::{info, warn};

use crate::error::ChainError;

/// The execution driver. Owns the message dispatcher (interpreter seam plus
/// specials) and the determinism memo; one `Chain` value per running chain.
pub struct Chain {
    dispatcher: Dispatcher,
    /// `(pre_root, block hash or None)` -> observed post-root. A divergence
    /// between runs is a correctness bug and aborts the process.
    transition_cache: Mutex<HashMap<(H256, Option<H256>), H256>>,
}

impl Chain {
    pub fn new(vm: Arc<dyn Vm>) -> Self {
        Self::with_specials(vm, SpecialsRegistry::with_defaults())
    }

    pub fn with_specials(vm: Arc<dyn Vm>, specials: SpecialsRegistry) -> Self {
        Self {
            dispatcher: Dispatcher::with_specials(vm, specials),
            transition_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Processes a block on top of a state to reach a new state, returning
    /// the post-state root. `None` processes an empty slot: the block-level
    /// metadata still advances, no transactions run.
    ///
    /// The block, if present, has already passed structural validation at
    /// construction. Panics on tier-3 invariant violations (block number out
    /// of step with the chain head, or a non-deterministic replay).
    pub fn block_state_transition(
        &self,
        state: &mut State,
        block: Option<&Block>,
    ) -> Result<H256, ChainError> {
        let pre = state.root()?;
        let blknumber = big_endian_to_u64(&state.get_storage(BLKNUMBER, 0u64)?);
        let blkproposer = block.map(Block::proposer).unwrap_or_default();
        let blkhash = block.map(Block::hash);

        // Record the previous block's post-state root.
        if blknumber > 0 {
            let root = state.root()?;
            state.set_storage(STATEROOTS, blknumber - 1, root)?;
        }
        state.set_storage(PROPOSER, 0u64, blkproposer)?;

        if let Some(block) = block {
            assert_eq!(
                block.number(),
                blknumber,
                "block number {} does not match the chain head {}",
                block.number(),
                blknumber
            );
            info!(
                number = blknumber,
                transactions = block.transaction_count(),
                intrinsic_gas = block
                    .summaries()
                    .iter()
                    .map(|s| s.intrinsic_gas())
                    .sum::<u64>(),
                "applying block"
            );
            for (summary, group) in block.summaries().iter().zip(block.transaction_groups()) {
                let exstate = EXECUTION_STATE.shardify(summary.left_bound());
                let log_addr = LOG.shardify(summary.left_bound());
                // Start the group with a zero transaction index and a gas
                // budget net of the group's intrinsic gas (data cost only,
                // not computation).
                state.set_storage(exstate, TXINDEX, 0u64)?;
                initialize_with_gas_limit(
                    state,
                    summary.gas_limit.saturating_sub(summary.intrinsic_gas()),
                    summary.left_bound(),
                )?;
                for tx in group {
                    self.tx_state_transition(state, tx, summary.range)?;
                }
                let txindex = big_endian_to_u64(&state.get_storage(exstate, TXINDEX)?);
                assert_eq!(
                    txindex as usize,
                    group.len(),
                    "transaction index out of step after group"
                );
                for i in 0..group.len() {
                    assert!(
                        !state.get_storage(log_addr, i as u64)?.is_empty(),
                        "transaction {i} left no log entry"
                    );
                }
            }
        }

        state.set_storage(BLOCKHASHES, blknumber, blkhash.unwrap_or_default())?;
        state.set_storage(BLKNUMBER, 0u64, blknumber + 1)?;

        // Update the RNG seed: the lower 64 bits carry the validator count,
        // the upper 192 bits are pseudorandom.
        let prevseed = if blknumber > 0 {
            state.get_storage(RNGSEEDS, blknumber - 1)?
        } else {
            vec![0u8; 32]
        };
        let mut preimage = prevseed;
        preimage.extend_from_slice(blkproposer.as_bytes());
        let mix = U256::from_big_endian(keccak(&preimage).as_bytes());
        let validators = big_endian_to_u256(&state.get_storage(CASPER, 0u64)?);
        let low64 = U256::from(u64::MAX);
        let newseed = ((mix >> 64usize) << 64usize) | (validators & low64);
        state.set_storage(RNGSEEDS, blknumber, newseed)?;

        let post = state.root()?;
        let mut cache = self
            .transition_cache
            .lock()
            .map_err(|_| ChainError::Custom("transition memo lock poisoned".to_string()))?;
        match cache.entry((pre, blkhash)) {
            Entry::Occupied(entry) => assert_eq!(
                *entry.get(),
                post,
                "non-deterministic state transition from root {pre:?}"
            ),
            Entry::Vacant(entry) => {
                entry.insert(post);
            }
        }
        Ok(post)
    }

    /// Applies one transaction inside its group's shard range. Returns the
    /// execution output, or `None` when the transaction was skipped (gas or
    /// range pre-check) or its deployment failed.
    pub fn tx_state_transition(
        &self,
        state: &mut State,
        tx: &Transaction,
        range: ShardRange,
    ) -> Result<Option<Bytes>, ChainError> {
        self.tx_state_transition_with_gas(state, tx, range, u64::MAX)
    }

    /// Like [`Chain::tx_state_transition`] with an extra cap on execution
    /// gas, for speculative runs on a forked state.
    pub fn tx_state_transition_with_gas(
        &self,
        state: &mut State,
        tx: &Transaction,
        range: ShardRange,
        override_gas: u64,
    ) -> Result<Option<Bytes>, ChainError> {
        let exstate = EXECUTION_STATE.shardify(range.left());
        let log_addr = LOG.shardify(range.left());
        let txindex = big_endian_to_u64(&state.get_storage(exstate, TXINDEX)?);
        let gas_remaining = big_endian_to_u64(&state.get_storage(exstate, GAS_REMAINING)?);

        // Skipped transactions are observable no-ops: they write a bare `[0]`
        // log and advance the index, but consume nothing from the budget.
        if gas_remaining < tx.exec_gas() {
            warn!(
                have = gas_remaining,
                required = tx.exec_gas(),
                "unable to execute transaction: group gas exhausted"
            );
            state.set_storage(log_addr, txindex, status_log(0))?;
            state.set_storage(exstate, TXINDEX, txindex + 1)?;
            return Ok(None);
        }
        if !range.contains_shard(tx.addr.get_shard()) {
            warn!(
                shard = tx.addr.get_shard(),
                left = range.left(),
                right = range.right(),
                "unable to execute transaction: recipient out of range"
            );
            state.set_storage(log_addr, txindex, status_log(0))?;
            state.set_storage(exstate, TXINDEX, txindex + 1)?;
            return Ok(None);
        }

        state.set_storage(exstate, TXGAS, tx.gas)?;
        // Empty the log store for this transaction.
        state.set_storage(log_addr, txindex, vec![RLP_EMPTY_LIST])?;

        // Create the account if it does not yet exist: the supplied code
        // runs as an init message and its output becomes the stored code.
        let execution_start_gas = if !tx.code.is_empty()
            && state.get_storage(tx.addr, Vec::new())?.is_empty()
        {
            let message = Message::new(
                NULL_SENDER,
                tx.addr,
                U256::zero(),
                tx.exec_gas().min(override_gas),
                CallData::default(),
            )
            .with_range(range);
            let mut ext = VmExt::new(state, &self.dispatcher);
            let outcome = self.dispatcher.apply_msg(&mut ext, &message, &tx.code)?;
            if outcome.status.is_revert() {
                state.set_storage(log_addr, txindex, status_log(1))?;
                state.set_storage(exstate, TXINDEX, txindex + 1)?;
                return Ok(None);
            }
            put_code(state, tx.addr, &outcome.output)?;
            outcome.gas_left
        } else {
            tx.exec_gas().min(override_gas)
        };

        let code = get_code(state, tx.addr)?;
        debug_assert_eq!(state.get_storage(log_addr, txindex)?, vec![RLP_EMPTY_LIST]);
        let message = Message::new(
            NULL_SENDER,
            tx.addr,
            U256::zero(),
            execution_start_gas,
            CallData::new(tx.data.clone()),
        );
        let mut ext = VmExt::new(state, &self.dispatcher);
        let outcome = self.dispatcher.apply_msg(&mut ext, &message, &code)?;
        let msg_gas_remained = outcome.gas_left;
        assert!(
            msg_gas_remained <= execution_start_gas && execution_start_gas <= tx.exec_gas(),
            "message gas out of bounds: {msg_gas_remained} remained of {execution_start_gas} \
             started, {} available",
            tx.exec_gas()
        );
        state.set_storage(
            exstate,
            GAS_REMAINING,
            gas_remaining - tx.exec_gas() + msg_gas_remained,
        )?;

        // Prepend the status tag to whatever log entries execution left.
        let log = state.get_storage(log_addr, txindex)?;
        let status: u8 = if outcome.status.is_revert() { 1 } else { 2 };
        state.set_storage(log_addr, txindex, rlp_list_prepend(&log, &[status])?)?;
        state.set_storage(exstate, TXINDEX, txindex + 1)?;
        Ok(Some(outcome.output))
    }
}

/// Seeds the gas budget of a shard's execution-state contract; the block
/// driver does this per group, and speculative execution does it by hand.
pub fn initialize_with_gas_limit(
    state: &mut State,
    gas_limit: u64,
    left_bound: u64,
) -> Result<(), ChainError> {
    state.set_storage(
        EXECUTION_STATE.shardify(left_bound),
        GAS_REMAINING,
        gas_limit,
    )?;
    Ok(())
}

/// An RLP list holding only the minimal big-endian encoding of `status`
/// (zero encodes as the empty string). This exact shape is what skip and
/// failed-deploy paths store.
fn status_log(status: u8) -> Vec<u8> {
    let item = if status == 0 { Vec::new() } else { vec![status] };
    let mut payload = Vec::new();
    item.as_slice().encode(&mut payload);
    let mut out = Vec::new();
    encode_length(payload.len(), &mut out);
    out.extend_from_slice(&payload);
    out
}

/// Inserts `item` (a raw byte string) at the front of an RLP-encoded list.
fn rlp_list_prepend(encoded: &[u8], item: &[u8]) -> Result<Vec<u8>, ChainError> {
    let (is_list, old_payload, _) = decode_rlp_item(encoded)?;
    if !is_list {
        return Err(ChainError::Custom(
            "log slot does not hold an RLP list".to_string(),
        ));
    }
    let mut payload = Vec::new();
    item.encode(&mut payload);
    payload.extend_from_slice(old_payload);
    let mut out = Vec::new();
    encode_length(payload.len(), &mut out);
    out.extend_from_slice(&payload);
    Ok(out)
}
