//! Shared chain primitives: protocol constants, the sharded address type and
//! its arithmetic, and the canonical block structures.

pub mod address;
pub mod constants;
pub mod serde_utils;
pub mod shard;
pub mod types;
pub mod util;

pub use address::Address;
pub use ethereum_types::{H256, U256};
pub use shard::{InvalidShardRange, ShardRange};
pub use types::block::InvalidBlockError;
