/// A sequence of half-bytes, the unit a path is consumed in while traversing
/// the trie.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nibbles {
    data: Vec<u8>,
}

impl Nibbles {
    /// Splits a byte path into nibbles, high half-byte first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = Vec::with_capacity(bytes.len() * 2);
        for byte in bytes {
            data.push(byte >> 4);
            data.push(byte & 0x0f);
        }
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of leading nibbles shared with `other`.
    pub fn count_prefix(&self, other: &Nibbles) -> usize {
        self.data
            .iter()
            .zip(other.data.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    pub fn starts_with(&self, prefix: &Nibbles) -> bool {
        self.data.starts_with(&prefix.data)
    }

    /// The suffix starting at `offset`.
    pub fn offset(&self, offset: usize) -> Nibbles {
        self.slice(offset, self.data.len())
    }

    pub fn slice(&self, start: usize, end: usize) -> Nibbles {
        Nibbles {
            data: self.data[start..end].to_vec(),
        }
    }

    /// Splits off the first nibble, returning it alongside the remainder.
    pub fn split_first(&self) -> Option<(u8, Nibbles)> {
        self.data
            .split_first()
            .map(|(nibble, rest)| (*nibble, Nibbles { data: rest.to_vec() }))
    }

    pub fn concat(&self, other: &Nibbles) -> Nibbles {
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Nibbles { data }
    }

    pub fn append(&self, nibble: u8) -> Nibbles {
        let mut data = self.data.clone();
        data.push(nibble);
        Nibbles { data }
    }

    /// Packs the nibbles back into bytes. Only meaningful for even-length
    /// paths, which is all the trie ever materializes for full keys.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or_default())
            .collect()
    }

    /// Hex-prefix encoding: packs the path with a flag nibble carrying the
    /// leaf marker and the parity of the length.
    pub fn encode_compact(&self, is_leaf: bool) -> Vec<u8> {
        let mut flag = if is_leaf { 0x02u8 } else { 0x00 };
        let odd = self.data.len() % 2 == 1;
        let mut out = Vec::with_capacity(self.data.len() / 2 + 1);
        let rest = if odd {
            flag += 1;
            out.push((flag << 4) | self.data[0]);
            &self.data[1..]
        } else {
            out.push(flag << 4);
            &self.data[..]
        };
        for pair in rest.chunks(2) {
            out.push((pair[0] << 4) | pair[1]);
        }
        out
    }

    /// Inverse of [`encode_compact`](Nibbles::encode_compact); returns the
    /// path and whether the node is a leaf.
    pub fn decode_compact(bytes: &[u8]) -> (Nibbles, bool) {
        let Some((first, rest)) = bytes.split_first() else {
            return (Nibbles::default(), false);
        };
        let flag = first >> 4;
        let is_leaf = flag & 0x02 != 0;
        let odd = flag & 0x01 != 0;
        let mut data = Vec::with_capacity(rest.len() * 2 + 1);
        if odd {
            data.push(first & 0x0f);
        }
        for byte in rest {
            data.push(byte >> 4);
            data.push(byte & 0x0f);
        }
        (Nibbles { data }, is_leaf)
    }
}

#[cfg(test)]
mod tests {
    use super::Nibbles;

    #[test]
    fn splits_bytes_into_nibbles() {
        let nibbles = Nibbles::from_bytes(&[0xab, 0x04]);
        assert_eq!(nibbles.len(), 4);
        assert_eq!(nibbles.to_bytes(), vec![0xab, 0x04]);
    }

    #[test]
    fn common_prefix() {
        let a = Nibbles::from_bytes(&[0x12, 0x34]);
        let b = Nibbles::from_bytes(&[0x12, 0x56]);
        assert_eq!(a.count_prefix(&b), 2);
        assert!(a.starts_with(&a.slice(0, 2)));
        assert!(!a.starts_with(&b));
    }

    #[test]
    fn compact_round_trip() {
        for (bytes, drop) in [(vec![0x12u8, 0x34], 0), (vec![0x12, 0x34], 1), (vec![], 0)] {
            let nibbles = Nibbles::from_bytes(&bytes).offset(drop);
            for is_leaf in [false, true] {
                let encoded = nibbles.encode_compact(is_leaf);
                let (decoded, leaf) = Nibbles::decode_compact(&encoded);
                assert_eq!(decoded, nibbles);
                assert_eq!(leaf, is_leaf);
            }
        }
    }

    #[test]
    fn split_first() {
        let nibbles = Nibbles::from_bytes(&[0x5a]);
        let (first, rest) = nibbles.split_first().unwrap();
        assert_eq!(first, 0x05);
        assert_eq!(rest.len(), 1);
        assert!(Nibbles::default().split_first().is_none());
    }
}
