use bytes::{BufMut, Bytes};
use ethereum_types::H256;
use keccak_hash::keccak;
use shardex_rlp::{
    decode::RLPDecode,
    encode::{RLPEncode, encode_slice},
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};
use thiserror::Error;

use crate::address::Address;
use crate::constants::GASLIMIT;
use crate::shard::{InvalidShardRange, ShardRange};
use crate::types::transaction::Transaction;

/// Structural invariant violations; a block that fails one of these is
/// rejected at construction, before any state is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidBlockError {
    #[error("summary count does not match transaction group count")]
    GroupCountMismatch,
    #[error("transaction group hash does not match its summary")]
    TransactionHashMismatch,
    #[error(transparent)]
    InvalidRange(#[from] InvalidShardRange),
    #[error("summaries are not disjoint and sorted")]
    UnsortedSummaries,
    #[error("transaction shard bounds escape the group summary")]
    TransactionOutOfBounds,
    #[error("total intrinsic gas {0} reaches the block gas limit")]
    IntrinsicGasOverLimit(u64),
    #[error("header transaction root does not match the summaries")]
    TxRootMismatch,
}

/// Block header (~100 bytes); light clients download only these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    /// `keccak(rlp(summaries))`.
    pub txroot: H256,
    pub proposer: Address,
    pub sig: Bytes,
}

impl BlockHeader {
    pub fn hash(&self) -> H256 {
        keccak(self.encode_to_vec())
    }
}

impl RLPEncode for BlockHeader {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.number)
            .encode_field(&self.txroot)
            .encode_field(&self.proposer)
            .encode_field(&self.sig)
            .finish();
    }
}

impl RLPDecode for BlockHeader {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (number, decoder) = decoder.decode_field("number")?;
        let (txroot, decoder) = decoder.decode_field("txroot")?;
        let (proposer, decoder) = decoder.decode_field("proposer")?;
        let (sig, decoder) = decoder.decode_field("sig")?;
        let remaining = decoder.finish()?;
        Ok((
            Self {
                number,
                txroot,
                proposer,
                sig,
            },
            remaining,
        ))
    }
}

/// Metadata for one transaction group: its gas budget, the shard range it
/// covers and the hash of its transaction list. The intrinsic gas total is
/// derived during block construction and is not part of the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionGroupSummary {
    pub gas_limit: u64,
    pub range: ShardRange,
    pub transaction_hash: H256,
    intrinsic_gas: u64,
}

impl TransactionGroupSummary {
    pub fn new(gas_limit: u64, range: ShardRange, txgroup: &[Transaction]) -> Self {
        Self {
            gas_limit,
            range,
            transaction_hash: group_hash(txgroup),
            intrinsic_gas: txgroup.iter().map(Transaction::intrinsic_gas).sum(),
        }
    }

    /// A summary with an externally supplied hash (decoded from the wire);
    /// the intrinsic gas is filled in when the block is validated.
    pub fn from_parts(gas_limit: u64, range: ShardRange, transaction_hash: H256) -> Self {
        Self {
            gas_limit,
            range,
            transaction_hash,
            intrinsic_gas: 0,
        }
    }

    pub fn intrinsic_gas(&self) -> u64 {
        self.intrinsic_gas
    }

    pub fn left_bound(&self) -> u64 {
        self.range.left()
    }

    pub fn right_bound(&self) -> u64 {
        self.range.right()
    }
}

impl RLPEncode for TransactionGroupSummary {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.gas_limit)
            .encode_field(&self.range.left())
            .encode_field(&self.range.right())
            .encode_field(&self.transaction_hash)
            .finish();
    }
}

impl RLPDecode for TransactionGroupSummary {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (gas_limit, decoder) = decoder.decode_field("gas_limit")?;
        let (left_bound, decoder) = decoder.decode_field("left_bound")?;
        let (right_bound, decoder) = decoder.decode_field("right_bound")?;
        let (transaction_hash, decoder) = decoder.decode_field("transaction_hash")?;
        let remaining = decoder.finish()?;
        let range = ShardRange::new(left_bound, right_bound)
            .map_err(|err| RLPDecodeError::Custom(err.to_string()))?;
        Ok((Self::from_parts(gas_limit, range, transaction_hash), remaining))
    }
}

/// The entire block, including the transactions. There is no extra-data
/// concept; a proposer wanting extra data makes the first transaction a dummy
/// carrying it.
///
/// A block is immutable once constructed; both constructors enforce the
/// structural invariants, so a held `Block` is always well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    summaries: Vec<TransactionGroupSummary>,
    transaction_groups: Vec<Vec<Transaction>>,
}

impl Block {
    /// Auto-pack construction: wraps all transactions into a single
    /// super-group covering the global shard range with the block gas budget.
    pub fn from_transactions(
        number: u64,
        proposer: Address,
        sig: Bytes,
        transactions: Vec<Transaction>,
    ) -> Result<Self, InvalidBlockError> {
        let summary = TransactionGroupSummary::new(GASLIMIT, ShardRange::full(), &transactions);
        if summary.intrinsic_gas >= GASLIMIT {
            return Err(InvalidBlockError::IntrinsicGasOverLimit(
                summary.intrinsic_gas,
            ));
        }
        let summaries = vec![summary];
        let header = BlockHeader {
            number,
            txroot: keccak(encode_slice(&summaries)),
            proposer,
            sig,
        };
        Ok(Self {
            header,
            summaries,
            transaction_groups: vec![transactions],
        })
    }

    /// Explicit construction from a header, summaries and transaction groups;
    /// verifies every structural invariant and derives the per-summary
    /// intrinsic gas totals.
    pub fn new(
        header: BlockHeader,
        mut summaries: Vec<TransactionGroupSummary>,
        transaction_groups: Vec<Vec<Transaction>>,
    ) -> Result<Self, InvalidBlockError> {
        if summaries.len() != transaction_groups.len() {
            return Err(InvalidBlockError::GroupCountMismatch);
        }
        let mut prev_right = 0u64;
        for (summary, group) in summaries.iter_mut().zip(&transaction_groups) {
            if summary.transaction_hash != group_hash(group) {
                return Err(InvalidBlockError::TransactionHashMismatch);
            }
            // Ranges are tree-aligned by construction; groups must be
            // disjoint, sorted, and enclose every transaction's own range.
            if summary.range.left() < prev_right {
                return Err(InvalidBlockError::UnsortedSummaries);
            }
            for tx in group {
                if !summary.range.encloses(&tx.range) {
                    return Err(InvalidBlockError::TransactionOutOfBounds);
                }
            }
            summary.intrinsic_gas = group.iter().map(Transaction::intrinsic_gas).sum();
            prev_right = summary.range.right();
        }
        let total_intrinsic: u64 = summaries.iter().map(|s| s.intrinsic_gas).sum();
        if total_intrinsic >= GASLIMIT {
            return Err(InvalidBlockError::IntrinsicGasOverLimit(total_intrinsic));
        }
        if header.txroot != keccak(encode_slice(&summaries)) {
            return Err(InvalidBlockError::TxRootMismatch);
        }
        Ok(Self {
            header,
            summaries,
            transaction_groups,
        })
    }

    pub fn hash(&self) -> H256 {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    pub fn proposer(&self) -> Address {
        self.header.proposer
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn summaries(&self) -> &[TransactionGroupSummary] {
        &self.summaries
    }

    pub fn transaction_groups(&self) -> &[Vec<Transaction>] {
        &self.transaction_groups
    }

    pub fn transaction_count(&self) -> usize {
        self.transaction_groups.iter().map(Vec::len).sum()
    }
}

impl RLPEncode for Block {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.header)
            .encode_field(&self.summaries)
            .encode_field(&self.transaction_groups)
            .finish();
    }
}

impl RLPDecode for Block {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (header, decoder) = decoder.decode_field("header")?;
        let (summaries, decoder) = decoder.decode_field("summaries")?;
        let (transaction_groups, decoder) = decoder.decode_field("transaction_groups")?;
        let remaining = decoder.finish()?;
        let block = Block::new(header, summaries, transaction_groups)
            .map_err(|err| RLPDecodeError::Custom(err.to_string()))?;
        Ok((block, remaining))
    }
}

/// The serialized hash of a transaction group's list.
pub fn group_hash(txgroup: &[Transaction]) -> H256 {
    keccak(encode_slice(txgroup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAXSHARDS;

    fn tx(shard: u64, gas: u64) -> Transaction {
        Transaction::new(
            Address::system(0xaa).shardify(shard),
            gas,
            ShardRange::full(),
        )
    }

    fn scoped_tx(shard: u64, left: u64, right: u64) -> Transaction {
        Transaction::new(
            Address::system(0xaa).shardify(shard),
            30_000,
            ShardRange::new(left, right).unwrap(),
        )
    }

    #[test]
    fn auto_pack_builds_single_global_summary() {
        let block =
            Block::from_transactions(0, Address::zero(), Bytes::new(), vec![tx(0, 30_000)])
                .unwrap();
        assert_eq!(block.summaries().len(), 1);
        let summary = &block.summaries()[0];
        assert_eq!(summary.left_bound(), 0);
        assert_eq!(summary.right_bound(), MAXSHARDS);
        assert_eq!(summary.gas_limit, GASLIMIT);
        assert_eq!(summary.intrinsic_gas(), 1_000);
        assert_eq!(
            block.header().txroot,
            keccak(encode_slice(block.summaries()))
        );
    }

    #[test]
    fn explicit_construction_verifies_group_hashes() {
        let group = vec![scoped_tx(1, 0, 8)];
        let summaries = vec![TransactionGroupSummary::new(
            100_000,
            ShardRange::new(0, 8).unwrap(),
            &group,
        )];
        let header = BlockHeader {
            number: 0,
            txroot: keccak(encode_slice(&summaries)),
            proposer: Address::zero(),
            sig: Bytes::new(),
        };
        let block = Block::new(header.clone(), summaries.clone(), vec![group.clone()]).unwrap();
        assert_eq!(block.summaries()[0].intrinsic_gas(), 1_000);

        // swapping the group without updating the summary hash must fail
        let other_group = vec![scoped_tx(2, 0, 8)];
        assert_eq!(
            Block::new(header, summaries, vec![other_group]),
            Err(InvalidBlockError::TransactionHashMismatch)
        );
    }

    #[test]
    fn summaries_must_be_disjoint_and_sorted() {
        let group_a = vec![scoped_tx(1, 0, 8)];
        let group_b = vec![scoped_tx(5, 4, 8)];
        let summaries = vec![
            TransactionGroupSummary::new(100_000, ShardRange::new(0, 8).unwrap(), &group_a),
            TransactionGroupSummary::new(100_000, ShardRange::new(4, 8).unwrap(), &group_b),
        ];
        let header = BlockHeader {
            number: 0,
            txroot: keccak(encode_slice(&summaries)),
            proposer: Address::zero(),
            sig: Bytes::new(),
        };
        assert_eq!(
            Block::new(header, summaries, vec![group_a, group_b]),
            Err(InvalidBlockError::UnsortedSummaries)
        );
    }

    #[test]
    fn transactions_must_fit_their_summary_range() {
        let group = vec![scoped_tx(1, 0, 16)];
        let summaries = vec![TransactionGroupSummary::new(
            100_000,
            ShardRange::new(0, 8).unwrap(),
            &group,
        )];
        let header = BlockHeader {
            number: 0,
            txroot: keccak(encode_slice(&summaries)),
            proposer: Address::zero(),
            sig: Bytes::new(),
        };
        assert_eq!(
            Block::new(header, summaries, vec![group]),
            Err(InvalidBlockError::TransactionOutOfBounds)
        );
    }

    #[test]
    fn txroot_must_commit_to_summaries() {
        let group = vec![scoped_tx(1, 0, 8)];
        let summaries = vec![TransactionGroupSummary::new(
            100_000,
            ShardRange::new(0, 8).unwrap(),
            &group,
        )];
        let header = BlockHeader {
            number: 0,
            txroot: H256::repeat_byte(0xab),
            proposer: Address::zero(),
            sig: Bytes::new(),
        };
        assert_eq!(
            Block::new(header, summaries, vec![group]),
            Err(InvalidBlockError::TxRootMismatch)
        );
    }

    #[test]
    fn group_count_must_match_summary_count() {
        let group = vec![scoped_tx(1, 0, 8)];
        let summaries = vec![TransactionGroupSummary::new(
            100_000,
            ShardRange::new(0, 8).unwrap(),
            &group,
        )];
        let header = BlockHeader {
            number: 0,
            txroot: keccak(encode_slice(&summaries)),
            proposer: Address::zero(),
            sig: Bytes::new(),
        };
        assert_eq!(
            Block::new(header, summaries, vec![]),
            Err(InvalidBlockError::GroupCountMismatch)
        );
    }

    #[test]
    fn intrinsic_gas_is_bounded_by_the_block_limit() {
        // enough payload bytes to push intrinsic gas past the block budget
        let heavy = Transaction::new(Address::system(1), u64::MAX, ShardRange::full())
            .with_data(Bytes::from(vec![0u8; (GASLIMIT / 5) as usize]));
        assert!(matches!(
            Block::from_transactions(0, Address::zero(), Bytes::new(), vec![heavy]),
            Err(InvalidBlockError::IntrinsicGasOverLimit(_))
        ));
    }

    #[test]
    fn block_rlp_round_trip() {
        let block = Block::from_transactions(
            7,
            Address::system(0x01),
            Bytes::from_static(b"sig"),
            vec![tx(3, 40_000).with_data(Bytes::from_static(b"hello"))],
        )
        .unwrap();
        let encoded = block.encode_to_vec();
        let decoded = Block::decode(&encoded).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.hash(), block.hash());
    }

    #[test]
    fn header_hash_commits_to_all_fields() {
        let base = BlockHeader {
            number: 1,
            txroot: H256::zero(),
            proposer: Address::zero(),
            sig: Bytes::new(),
        };
        let mut other = base.clone();
        other.number = 2;
        assert_ne!(base.hash(), other.hash());
    }
}
