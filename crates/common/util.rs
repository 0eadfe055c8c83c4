use ethereum_types::U256;

/// Interprets a byte string as a big-endian integer. Values longer than 32
/// bytes keep their low-order bytes, mirroring modular storage semantics.
pub fn big_endian_to_u256(bytes: &[u8]) -> U256 {
    if bytes.len() <= 32 {
        U256::from_big_endian(bytes)
    } else {
        U256::from_big_endian(&bytes[bytes.len() - 32..])
    }
}

/// Big-endian integer read truncated to 64 bits, for counters and indexes.
pub fn big_endian_to_u64(bytes: &[u8]) -> u64 {
    big_endian_to_u256(bytes).low_u64()
}

#[cfg(test)]
mod tests {
    use super::{big_endian_to_u64, big_endian_to_u256};
    use ethereum_types::U256;

    #[test]
    fn reads_short_and_empty_values() {
        assert_eq!(big_endian_to_u256(&[]), U256::zero());
        assert_eq!(big_endian_to_u256(&[0x01, 0x00]), U256::from(256));
        assert_eq!(big_endian_to_u64(&[0x2a]), 42);
    }

    #[test]
    fn reads_canonical_32_byte_values() {
        let mut word = [0u8; 32];
        word[31] = 7;
        assert_eq!(big_endian_to_u64(&word), 7);
    }
}
