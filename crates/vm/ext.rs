use std::collections::BTreeMap;

use ethereum_types::H256;
use keccak_hash::keccak;
use shardex_common::Address;
use shardex_storage::{State, StorageWord, code};

use crate::dispatch::Dispatcher;
use crate::errors::VmError;
use crate::message::Message;
use crate::MsgOutcome;

/// What a façade is bound to: live chain state, or nothing.
enum ExtBackend<'a> {
    State(&'a mut State),
    /// Reads return zero values and writes are discarded; used to run code
    /// "purely", without touching state (notably validator signature
    /// checks).
    Empty,
}

/// External calls that can be made from inside the VM. Everything an
/// interpreter or special may do to the world goes through here, so swapping
/// the backend is enough to embed the execution core elsewhere or to run
/// code side-effect free.
pub struct VmExt<'a> {
    backend: ExtBackend<'a>,
    dispatcher: &'a Dispatcher,
}

impl<'a> VmExt<'a> {
    pub fn new(state: &'a mut State, dispatcher: &'a Dispatcher) -> Self {
        Self {
            backend: ExtBackend::State(state),
            dispatcher,
        }
    }

    /// The empty façade; see [`Dispatcher::apply_msg`] for the pure-call
    /// memoization it enables.
    pub fn empty(dispatcher: &'a Dispatcher) -> Self {
        Self {
            backend: ExtBackend::Empty,
            dispatcher,
        }
    }

    pub fn is_pure(&self) -> bool {
        matches!(self.backend, ExtBackend::Empty)
    }

    pub fn get_storage(
        &mut self,
        addr: Address,
        key: impl Into<StorageWord>,
    ) -> Result<Vec<u8>, VmError> {
        match &mut self.backend {
            ExtBackend::State(state) => Ok(state.get_storage(addr, key)?),
            ExtBackend::Empty => Ok(Vec::new()),
        }
    }

    pub fn set_storage(
        &mut self,
        addr: Address,
        key: impl Into<StorageWord>,
        value: impl Into<StorageWord>,
    ) -> Result<(), VmError> {
        match &mut self.backend {
            ExtBackend::State(state) => Ok(state.set_storage(addr, key, value)?),
            ExtBackend::Empty => Ok(()),
        }
    }

    /// Diagnostic dump of an account's storage.
    pub fn log_storage(&self, addr: Address) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, VmError> {
        match &self.backend {
            ExtBackend::State(state) => Ok(state.dump_account(addr)?),
            ExtBackend::Empty => Ok(BTreeMap::new()),
        }
    }

    /// Fetches a content-addressed blob.
    pub fn unhash(&self, hash: &H256) -> Result<Vec<u8>, VmError> {
        match &self.backend {
            ExtBackend::State(state) => {
                Ok(code::unhash(state.db().as_ref(), hash)?.unwrap_or_default())
            }
            ExtBackend::Empty => Ok(Vec::new()),
        }
    }

    /// Stores a blob under its hash and returns the hash.
    pub fn put_hash_data(&mut self, blob: &[u8]) -> Result<H256, VmError> {
        match &self.backend {
            ExtBackend::State(state) => Ok(code::put_hash_data(state.db().as_ref(), blob)?),
            ExtBackend::Empty => Ok(keccak(blob)),
        }
    }

    /// Sends a nested message against the same backend.
    pub fn msg(&mut self, msg: &Message, bytecode: &[u8]) -> Result<MsgOutcome, VmError> {
        let dispatcher = self.dispatcher;
        dispatcher.apply_msg(self, msg, bytecode)
    }

    /// Sends a nested message against the empty façade, i.e. runs the code
    /// purely regardless of this façade's backend.
    pub fn static_msg(&self, msg: &Message, bytecode: &[u8]) -> Result<MsgOutcome, VmError> {
        let dispatcher = self.dispatcher;
        let mut pure = VmExt::empty(dispatcher);
        dispatcher.apply_msg(&mut pure, msg, bytecode)
    }

    pub(crate) fn snapshot(&self) -> usize {
        match &self.backend {
            ExtBackend::State(state) => state.snapshot(),
            ExtBackend::Empty => 0,
        }
    }

    pub(crate) fn revert(&mut self, token: usize) {
        if let ExtBackend::State(state) = &mut self.backend {
            state.revert(token);
        }
    }
}
