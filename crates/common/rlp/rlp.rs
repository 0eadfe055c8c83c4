//! Recursive Length Prefix encoding and decoding.
//!
//! This is the canonical serializer of the chain: every hash (block headers,
//! summary roots, transaction group hashes, trie nodes) is computed over the
//! output of [`encode::RLPEncode`], so encodings must be byte-identical across
//! implementations.
//!
//! - [`encode::RLPEncode`] / [`decode::RLPDecode`]: traits for scalar and
//!   composite values
//! - [`structs::Encoder`] / [`structs::Decoder`]: field-by-field builders for
//!   struct types

pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod structs;
