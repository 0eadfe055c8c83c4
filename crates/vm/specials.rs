use std::collections::HashMap;

use bytes::Bytes;
use ethereum_types::U256;
use keccak_hash::keccak;
use shardex_common::Address;

use crate::errors::VmError;
use crate::ext::VmExt;
use crate::message::Message;
use crate::MsgOutcome;

/// A built-in bound to an address and invoked instead of VM execution when
/// the recipient matches.
pub type SpecialHandler = fn(&mut VmExt<'_>, &Message) -> Result<MsgOutcome, VmError>;

/// Copies its call data to the output.
pub const IDENTITY_ADDRESS: Address = Address::system(0x04);
/// Returns the keccak-256 digest of its call data.
pub const KECCAK256_ADDRESS: Address = Address::system(0x20);

const IDENTITY_STATIC_COST: u64 = 15;
const IDENTITY_WORD_COST: u64 = 3;
const KECCAK256_STATIC_COST: u64 = 30;
const KECCAK256_WORD_COST: u64 = 6;

/// Dispatch table keyed by the integer value of the full address, so a
/// special registered in one shard is not implicitly present in others.
#[derive(Default)]
pub struct SpecialsRegistry {
    handlers: HashMap<U256, SpecialHandler>,
}

impl SpecialsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default table: identity and keccak-256 in shard 0. Chains add
    /// their own entries (validator management and the like) on top.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(IDENTITY_ADDRESS, identity);
        registry.register(KECCAK256_ADDRESS, keccak256);
        registry
    }

    pub fn register(&mut self, addr: Address, handler: SpecialHandler) {
        self.handlers.insert(addr.to_u256(), handler);
    }

    pub fn get(&self, addr: &Address) -> Option<SpecialHandler> {
        self.handlers.get(&addr.to_u256()).copied()
    }

    pub fn contains(&self, addr: &Address) -> bool {
        self.handlers.contains_key(&addr.to_u256())
    }
}

fn data_word_count(len: usize) -> u64 {
    len.div_ceil(32) as u64
}

fn identity(_ext: &mut VmExt<'_>, msg: &Message) -> Result<MsgOutcome, VmError> {
    let data = msg.data.extract_all();
    let cost = IDENTITY_STATIC_COST + IDENTITY_WORD_COST * data_word_count(data.len());
    if msg.gas < cost {
        return Ok(MsgOutcome::revert(Bytes::new()));
    }
    Ok(MsgOutcome::success(msg.gas - cost, data))
}

fn keccak256(_ext: &mut VmExt<'_>, msg: &Message) -> Result<MsgOutcome, VmError> {
    let data = msg.data.extract_all();
    let cost = KECCAK256_STATIC_COST + KECCAK256_WORD_COST * data_word_count(data.len());
    if msg.gas < cost {
        return Ok(MsgOutcome::revert(Bytes::new()));
    }
    let digest = keccak(&data);
    Ok(MsgOutcome::success(
        msg.gas - cost,
        Bytes::copy_from_slice(digest.as_bytes()),
    ))
}
