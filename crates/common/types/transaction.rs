use bytes::{BufMut, Bytes};
use ethereum_types::H256;
use keccak_hash::keccak;
use shardex_rlp::{
    decode::RLPDecode,
    encode::RLPEncode,
    error::RLPDecodeError,
    structs::{Decoder, Encoder},
};

use crate::address::Address;
use crate::constants::{TX_INTRINSIC_BASE_GAS, TX_INTRINSIC_BYTE_GAS};
use crate::shard::ShardRange;

/// A transaction targeting an account in some shard. There is no sender:
/// value and authorization live entirely inside contracts, so the only
/// transaction-level fields are the target, the payload and the gas budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Target account; its shard prefix decides where the transaction runs.
    pub addr: Address,
    /// Deployment bytecode; runs as an init message when the target has no
    /// stored code yet.
    pub code: Bytes,
    /// Call payload.
    pub data: Bytes,
    /// Nominal gas bought by the transaction.
    pub gas: u64,
    /// Shard range the transaction is scoped to; must be enclosed by its
    /// group summary's range.
    pub range: ShardRange,
}

impl Transaction {
    pub fn new(addr: Address, gas: u64, range: ShardRange) -> Self {
        Self {
            addr,
            code: Bytes::new(),
            data: Bytes::new(),
            gas,
            range,
        }
    }

    pub fn with_code(mut self, code: Bytes) -> Self {
        self.code = code;
        self
    }

    pub fn with_data(mut self, data: Bytes) -> Self {
        self.data = data;
        self
    }

    /// Gas charged for inclusion (payload cost), debited from the group
    /// budget when the block starts.
    pub fn intrinsic_gas(&self) -> u64 {
        TX_INTRINSIC_BASE_GAS
            + TX_INTRINSIC_BYTE_GAS * (self.code.len() + self.data.len()) as u64
    }

    /// Gas available to execution, the part of `gas` not consumed by
    /// inclusion.
    pub fn exec_gas(&self) -> u64 {
        self.gas.saturating_sub(self.intrinsic_gas())
    }

    pub fn left_bound(&self) -> u64 {
        self.range.left()
    }

    pub fn right_bound(&self) -> u64 {
        self.range.right()
    }

    pub fn hash(&self) -> H256 {
        keccak(self.encode_to_vec())
    }
}

impl RLPEncode for Transaction {
    fn encode(&self, buf: &mut dyn BufMut) {
        Encoder::new(buf)
            .encode_field(&self.addr)
            .encode_field(&self.code)
            .encode_field(&self.data)
            .encode_field(&self.gas)
            .encode_field(&self.range.left())
            .encode_field(&self.range.right())
            .finish();
    }
}

impl RLPDecode for Transaction {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let decoder = Decoder::new(rlp)?;
        let (addr, decoder) = decoder.decode_field("addr")?;
        let (code, decoder) = decoder.decode_field("code")?;
        let (data, decoder) = decoder.decode_field("data")?;
        let (gas, decoder) = decoder.decode_field("gas")?;
        let (left_bound, decoder) = decoder.decode_field("left_bound")?;
        let (right_bound, decoder) = decoder.decode_field("right_bound")?;
        let remaining = decoder.finish()?;
        let range = ShardRange::new(left_bound, right_bound)
            .map_err(|err| RLPDecodeError::Custom(err.to_string()))?;
        Ok((
            Self {
                addr,
                code,
                data,
                gas,
                range,
            },
            remaining,
        ))
    }
}
