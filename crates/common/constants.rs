use crate::address::Address;

/// Width of a full address in bytes. The leading bytes carry the shard id,
/// the rest is the base address.
pub const ADDR_BYTES: usize = 22;
/// Width of the base (per-shard) part of an address.
pub const ADDR_BASE_BYTES: usize = 20;
/// Width of the shard-id prefix.
pub const SHARD_BYTES: usize = ADDR_BYTES - ADDR_BASE_BYTES;

/// Total number of shards. Must be a power of two so that shard ranges can be
/// binary-tree aligned.
pub const MAXSHARDS: u64 = 1 << 16;

/// Gas budget of a block, bounding the total intrinsic gas of its
/// transaction groups and the default auto-pack summary.
pub const GASLIMIT: u64 = 10_000_000;

/// Prefix under which content-addressed code blobs live in the backing store:
/// `UNHASH_MAGIC_BYTES ++ keccak(code) -> code`.
pub const UNHASH_MAGIC_BYTES: &[u8] = b"unhash:";

/// Distinguished sender for transaction-level messages; its integer value is
/// zero and no key can spend from it.
pub const NULL_SENDER: Address = Address::zero();

// Well-known system contracts. Per-shard ones (EXECUTION_STATE, LOG, ETHER)
// are addressed through `Address::shardify` with the shard of interest.

/// Block counter, slot 0.
pub const BLKNUMBER: Address = Address::system(0x10);
/// Block hashes, indexed by block number.
pub const BLOCKHASHES: Address = Address::system(0x20);
/// Pre-state roots, indexed by block number.
pub const STATEROOTS: Address = Address::system(0x30);
/// Most recent block proposer, slot 0.
pub const PROPOSER: Address = Address::system(0x40);
/// RNG seeds, indexed by block number.
pub const RNGSEEDS: Address = Address::system(0x50);
/// Validator manager; exposes the validator count at slot 0.
pub const CASPER: Address = Address::system(0x60);
/// Per-shard execution metadata (GAS_REMAINING, TXINDEX, TXGAS slots).
pub const EXECUTION_STATE: Address = Address::system(0x70);
/// Per-shard transaction logs, indexed by transaction index.
pub const LOG: Address = Address::system(0x80);
/// Per-shard ether balances, keyed by account address.
pub const ETHER: Address = Address::system(0x90);

// Storage slots inside EXECUTION_STATE.
pub const GAS_REMAINING: u64 = 0;
pub const TXINDEX: u64 = 1;
pub const TXGAS: u64 = 2;

// Intrinsic gas schedule: flat inclusion cost plus a per-byte charge on the
// transaction payload (call data and deployment code).
pub const TX_INTRINSIC_BASE_GAS: u64 = 1_000;
pub const TX_INTRINSIC_BYTE_GAS: u64 = 5;
