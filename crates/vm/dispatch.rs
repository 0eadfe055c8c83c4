use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ethereum_types::H256;
use keccak_hash::keccak;
use shardex_common::constants::ETHER;
use shardex_common::util::big_endian_to_u256;
use shardex_rlp::structs::Encoder;
use tracing::debug;

use crate::errors::VmError;
use crate::ext::VmExt;
use crate::message::Message;
use crate::specials::SpecialsRegistry;
use crate::{MsgOutcome, Vm};

/// Routes messages to built-in specials or the virtual machine, with value
/// transfer and revert-on-failure around the call.
///
/// The pure-call memo lives here, scoped to the dispatcher value rather than
/// the process, and is only consulted for empty-façade calls.
pub struct Dispatcher {
    vm: Arc<dyn Vm>,
    specials: SpecialsRegistry,
    pure_call_cache: Mutex<HashMap<H256, MsgOutcome>>,
}

impl Dispatcher {
    pub fn new(vm: Arc<dyn Vm>) -> Self {
        Self::with_specials(vm, SpecialsRegistry::with_defaults())
    }

    pub fn with_specials(vm: Arc<dyn Vm>, specials: SpecialsRegistry) -> Self {
        Self {
            vm,
            specials,
            pure_call_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn specials(&self) -> &SpecialsRegistry {
        &self.specials
    }

    /// Applies a message: transfers value, then runs the special bound to
    /// the recipient or executes `code` in the VM, rolling every state
    /// change back if execution reverts.
    ///
    /// Calls through the empty façade cannot touch state, so their outcomes
    /// are memoized by message content and replayed on repetition.
    pub fn apply_msg(
        &self,
        ext: &mut VmExt<'_>,
        msg: &Message,
        code: &[u8],
    ) -> Result<MsgOutcome, VmError> {
        let cache_key = ext.is_pure().then(|| pure_call_key(msg, code));
        if let Some(key) = &cache_key {
            let cache = self
                .pure_call_cache
                .lock()
                .map_err(|_| VmError::Custom("pure-call cache lock poisoned".to_string()))?;
            if let Some(outcome) = cache.get(key) {
                return Ok(outcome.clone());
            }
        }

        let snapshot = ext.snapshot();

        // Transfer value, instaquit if the sender cannot fund it. Balances
        // live in the ETHER contract of the account's own shard, keyed by
        // the full address.
        if msg.transfers_value {
            let sender_ether = ETHER.match_shard(&msg.sender);
            let sender_balance = big_endian_to_u256(&ext.get_storage(sender_ether, msg.sender)?);
            if sender_balance < msg.value {
                debug!(
                    sender = %msg.sender,
                    balance = %sender_balance,
                    value = %msg.value,
                    "message transfer failed"
                );
                return Ok(MsgOutcome::soft_fail(msg.gas));
            }
            if !msg.value.is_zero() {
                let recipient_ether = ETHER.match_shard(&msg.to);
                ext.set_storage(sender_ether, msg.sender, sender_balance - msg.value)?;
                let recipient_balance =
                    big_endian_to_u256(&ext.get_storage(recipient_ether, msg.to)?);
                ext.set_storage(
                    recipient_ether,
                    msg.to,
                    recipient_balance.saturating_add(msg.value),
                )?;
            }
        }

        let outcome = match self.specials.get(&msg.to) {
            Some(handler) => handler(ext, msg)?,
            None => self.vm.execute(ext, msg, code)?,
        };

        if outcome.status.is_revert() {
            debug!(
                gas = msg.gas,
                sender = %msg.sender,
                to = %msg.to,
                "reverting message"
            );
            ext.revert(snapshot);
            return Ok(MsgOutcome::revert(outcome.output));
        }

        if let (Some(key), true) = (cache_key, outcome.status.is_success()) {
            let mut cache = self
                .pure_call_cache
                .lock()
                .map_err(|_| VmError::Custom("pure-call cache lock poisoned".to_string()))?;
            cache.insert(key, outcome.clone());
        }
        Ok(outcome)
    }
}

/// Cache key for pure calls: the hash of the serialized
/// (sender, to, value, data, code) tuple.
fn pure_call_key(msg: &Message, code: &[u8]) -> H256 {
    let mut buf = Vec::new();
    Encoder::new(&mut buf)
        .encode_bytes(msg.sender.as_bytes())
        .encode_bytes(msg.to.as_bytes())
        .encode_field(&msg.value)
        .encode_bytes(&msg.data.extract_all())
        .encode_bytes(code)
        .finish();
    keccak(buf)
}
