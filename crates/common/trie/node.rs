use ethereum_types::H256;
use sha3::{Digest, Keccak256};
use shardex_rlp::{
    decode::{decode_bytes, decode_rlp_item},
    error::RLPDecodeError,
    structs::Encoder,
};

use crate::nibbles::Nibbles;

/// A node in the Merkle Patricia Trie. Children are referenced by the keccak
/// hash of their encoding, which is also the database key they live under.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Branch(Box<BranchNode>),
    Extension(ExtensionNode),
    Leaf(LeafNode),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BranchNode {
    pub choices: [Option<H256>; 16],
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtensionNode {
    pub prefix: Nibbles,
    pub child: H256,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub partial: Nibbles,
    pub value: Vec<u8>,
}

impl From<BranchNode> for Node {
    fn from(node: BranchNode) -> Self {
        Node::Branch(Box::new(node))
    }
}

impl From<ExtensionNode> for Node {
    fn from(node: ExtensionNode) -> Self {
        Node::Extension(node)
    }
}

impl From<LeafNode> for Node {
    fn from(node: LeafNode) -> Self {
        Node::Leaf(node)
    }
}

impl Node {
    /// Encodes the node as an RLP list: `[path, value]` for leaves,
    /// `[path, child]` for extensions and the 17-element child/value list for
    /// branches. Leaf and extension are told apart by the hex-prefix flag.
    pub fn encode_raw(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            Node::Leaf(node) => {
                Encoder::new(&mut buf)
                    .encode_bytes(&node.partial.encode_compact(true))
                    .encode_bytes(&node.value)
                    .finish();
            }
            Node::Extension(node) => {
                Encoder::new(&mut buf)
                    .encode_bytes(&node.prefix.encode_compact(false))
                    .encode_bytes(node.child.as_bytes())
                    .finish();
            }
            Node::Branch(node) => {
                let mut encoder = Encoder::new(&mut buf);
                for choice in &node.choices {
                    encoder = match choice {
                        Some(hash) => encoder.encode_bytes(hash.as_bytes()),
                        None => encoder.encode_bytes(&[]),
                    };
                }
                encoder.encode_bytes(&node.value).finish();
            }
        }
        buf
    }

    /// Decodes the node from its RLP encoding.
    pub fn decode_raw(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (is_list, payload, _) = decode_rlp_item(rlp)?;
        if !is_list {
            return Err(RLPDecodeError::UnexpectedString);
        }
        let mut items: Vec<&[u8]> = Vec::new();
        let mut rest = payload;
        while !rest.is_empty() && items.len() <= 17 {
            let (item, remaining) = decode_bytes(rest)?;
            items.push(item);
            rest = remaining;
        }
        match items.len() {
            2 => {
                let (path, is_leaf) = Nibbles::decode_compact(items[0]);
                if is_leaf {
                    Ok(LeafNode {
                        partial: path,
                        value: items[1].to_vec(),
                    }
                    .into())
                } else {
                    Ok(ExtensionNode {
                        prefix: path,
                        child: decode_child(items[1])?,
                    }
                    .into())
                }
            }
            17 => {
                let mut choices: [Option<H256>; 16] = Default::default();
                for (choice, item) in choices.iter_mut().zip(&items[..16]) {
                    if !item.is_empty() {
                        *choice = Some(decode_child(item)?);
                    }
                }
                Ok(BranchNode {
                    choices,
                    value: items[16].to_vec(),
                }
                .into())
            }
            n => Err(RLPDecodeError::Custom(format!(
                "Invalid arg count for Node, expected 2 or 17, got {n}"
            ))),
        }
    }

    /// The keccak hash of the node's encoding.
    pub fn compute_hash(&self) -> H256 {
        hash_node_rlp(&self.encode_raw())
    }
}

fn decode_child(bytes: &[u8]) -> Result<H256, RLPDecodeError> {
    if bytes.len() != 32 {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok(H256::from_slice(bytes))
}

/// Hashes an already-encoded node.
pub fn hash_node_rlp(rlp: &[u8]) -> H256 {
    H256::from_slice(Keccak256::new().chain_update(rlp).finalize().as_slice())
}
