//! The execution seam of the chain: message types, the read/write façade
//! handed to interpreters and built-ins, and the dispatch routine that moves
//! value and routes a message to a special address or the virtual machine.
//!
//! The virtual machine itself is external; anything implementing [`Vm`] can
//! be plugged into a [`Dispatcher`].

pub mod dispatch;
pub mod errors;
pub mod ext;
pub mod message;
pub mod specials;

use bytes::Bytes;

pub use dispatch::Dispatcher;
pub use errors::VmError;
pub use ext::VmExt;
pub use message::{CallData, Message};
pub use specials::{SpecialHandler, SpecialsRegistry};

/// Tagged outcome of applying a message. The caller always unwinds its
/// snapshot on `Revert` before returning, which is why this is a value and
/// not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgStatus {
    /// Execution failed; all state changes were rolled back.
    Revert,
    /// The transfer could not be funded; nothing happened and gas is kept.
    SoftFail,
    /// Execution completed.
    Success,
}

impl MsgStatus {
    /// Wire/log tag: 0 revert, 1 soft failure, 2 success.
    pub fn code(&self) -> u8 {
        match self {
            MsgStatus::Revert => 0,
            MsgStatus::SoftFail => 1,
            MsgStatus::Success => 2,
        }
    }

    pub fn is_revert(&self) -> bool {
        matches!(self, MsgStatus::Revert)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MsgStatus::Success)
    }
}

/// What a message application returns: its status, the gas it did not
/// consume (zero on revert) and the output bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgOutcome {
    pub status: MsgStatus,
    pub gas_left: u64,
    pub output: Bytes,
}

impl MsgOutcome {
    pub fn success(gas_left: u64, output: Bytes) -> Self {
        Self {
            status: MsgStatus::Success,
            gas_left,
            output,
        }
    }

    pub fn revert(output: Bytes) -> Self {
        Self {
            status: MsgStatus::Revert,
            gas_left: 0,
            output,
        }
    }

    pub fn soft_fail(gas_left: u64) -> Self {
        Self {
            status: MsgStatus::SoftFail,
            gas_left,
            output: Bytes::new(),
        }
    }
}

/// A bytecode interpreter. Reads and writes go through the [`VmExt`] façade,
/// which also lets the interpreter send further messages reentrantly.
pub trait Vm: Send + Sync {
    fn execute(
        &self,
        ext: &mut VmExt<'_>,
        msg: &Message,
        code: &[u8],
    ) -> Result<MsgOutcome, VmError>;
}
