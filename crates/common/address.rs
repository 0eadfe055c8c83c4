use std::fmt;
use std::str::FromStr;

use bytes::BufMut;
use ethereum_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use shardex_rlp::{
    decode::{RLPDecode, decode_bytes},
    encode::RLPEncode,
    error::RLPDecodeError,
};

use crate::constants::{ADDR_BYTES, MAXSHARDS, SHARD_BYTES};

/// A full account address: `SHARD_BYTES` of big-endian shard id followed by
/// the base address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDR_BYTES]);

impl Address {
    pub const fn zero() -> Self {
        Self([0u8; ADDR_BYTES])
    }

    /// A well-known address: shard 0, base address ending in `tag`.
    pub const fn system(tag: u8) -> Self {
        let mut bytes = [0u8; ADDR_BYTES];
        bytes[ADDR_BYTES - 1] = tag;
        Self(bytes)
    }

    /// Builds an address from a slice.
    ///
    /// Panics if the slice is not exactly `ADDR_BYTES` long.
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; ADDR_BYTES];
        out.copy_from_slice(bytes);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDR_BYTES]
    }

    /// The shard this address lives in.
    pub fn get_shard(&self) -> u64 {
        self.0[..SHARD_BYTES]
            .iter()
            .fold(0u64, |acc, byte| acc << 8 | *byte as u64)
    }

    /// This address's base relocated into the given shard.
    pub fn shardify(&self, shard: u64) -> Address {
        debug_assert!(shard < MAXSHARDS, "shard {shard} out of range");
        let mut out = self.0;
        let mut value = shard;
        for slot in out[..SHARD_BYTES].iter_mut().rev() {
            *slot = (value & 0xff) as u8;
            value >>= 8;
        }
        Address(out)
    }

    /// This address's base combined with `other`'s shard.
    pub fn match_shard(&self, other: &Address) -> Address {
        let mut out = self.0;
        out[..SHARD_BYTES].copy_from_slice(&other.0[..SHARD_BYTES]);
        Address(out)
    }

    /// The address interpreted as a big-endian integer, the key the specials
    /// registry dispatches on.
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        if bytes.len() != ADDR_BYTES {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(Self::from_slice(&bytes))
    }
}

impl RLPEncode for Address {
    fn encode(&self, buf: &mut dyn BufMut) {
        self.0.as_ref().encode(buf)
    }
}

impl RLPDecode for Address {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (bytes, rest) = decode_bytes(rlp)?;
        if bytes.len() != ADDR_BYTES {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok((Self::from_slice(bytes), rest))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
