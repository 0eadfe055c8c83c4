pub mod db;
pub mod error;
mod nibbles;
mod node;

use std::collections::BTreeMap;
use std::sync::Arc;

use ethereum_types::H256;
use lazy_static::lazy_static;
use sha3::{Digest, Keccak256};
use shardex_rlp::constants::RLP_NULL;

pub use self::db::{InMemoryTrieDB, TrieDB};
pub use self::error::TrieError;
pub use self::nibbles::Nibbles;
pub use self::node::{BranchNode, ExtensionNode, LeafNode, Node};

lazy_static! {
    // Hash value for an empty trie, equal to keccak(RLP_NULL)
    pub static ref EMPTY_TRIE_HASH: H256 = H256::from_slice(
        Keccak256::new()
            .chain_update([RLP_NULL])
            .finalize()
            .as_slice(),
    );
}

/// Raw trie path
pub type PathRLP = Vec<u8>;
/// Raw trie value
pub type ValueRLP = Vec<u8>;

/// Merkle Patricia Trie over a [`TrieDB`] backend.
///
/// Nodes are written through to the backend as they are created, keyed by the
/// keccak hash of their encoding, so the root hash is always current and a
/// former root can be restored with [`set_root`](Trie::set_root) as long as
/// the backing store still holds the old nodes (it is append-only).
pub struct Trie {
    db: Arc<dyn TrieDB>,
    root: Option<H256>,
}

impl Trie {
    /// Creates a new Trie from a clean DB
    pub fn new(db: Arc<dyn TrieDB>) -> Self {
        Self { db, root: None }
    }

    /// Creates a trie from an already-initialized DB with `root` as the root
    /// node of the trie
    pub fn open(db: Arc<dyn TrieDB>, root: H256) -> Self {
        let mut trie = Self::new(db);
        trie.set_root(root);
        trie
    }

    /// Return the hash of the trie's root node.
    /// Returns keccak(RLP_NULL) if the trie is empty
    pub fn hash(&self) -> H256 {
        self.root.unwrap_or(*EMPTY_TRIE_HASH)
    }

    /// Rewinds (or forwards) the trie to a previously observed root hash.
    pub fn set_root(&mut self, root: H256) {
        self.root = (root != *EMPTY_TRIE_HASH && !root.is_zero()).then_some(root);
    }

    /// Retrieve a value from the trie given its path.
    pub fn get(&self, path: &PathRLP) -> Result<Option<ValueRLP>, TrieError> {
        match self.root {
            Some(hash) => {
                let root_node = self.get_node(hash)?;
                self.get_at(&root_node, Nibbles::from_bytes(path))
            }
            None => Ok(None),
        }
    }

    /// Insert a value into the trie. Overwrites any prior value at the path.
    pub fn insert(&mut self, path: PathRLP, value: ValueRLP) -> Result<(), TrieError> {
        let path = Nibbles::from_bytes(&path);
        let new_root = match self.root {
            Some(hash) => {
                let root_node = self.get_node(hash)?;
                self.insert_at(root_node, path, value)?
            }
            None => LeafNode {
                partial: path,
                value,
            }
            .into(),
        };
        self.root = Some(self.put_node(&new_root)?);
        Ok(())
    }

    /// Materializes the whole trie as a path -> value map. Diagnostic only;
    /// walks every node reachable from the root.
    pub fn to_map(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, TrieError> {
        let mut out = BTreeMap::new();
        if let Some(hash) = self.root {
            let root_node = self.get_node(hash)?;
            self.collect_into(&root_node, Nibbles::default(), &mut out)?;
        }
        Ok(out)
    }

    fn get_node(&self, hash: H256) -> Result<Node, TrieError> {
        let rlp = self
            .db
            .get(hash.as_bytes().to_vec())?
            .ok_or(TrieError::InconsistentTree(hash))?;
        Ok(Node::decode_raw(&rlp)?)
    }

    fn put_node(&self, node: &Node) -> Result<H256, TrieError> {
        let rlp = node.encode_raw();
        let hash = node::hash_node_rlp(&rlp);
        self.db.put(hash.as_bytes().to_vec(), rlp)?;
        Ok(hash)
    }

    fn get_at(&self, node: &Node, path: Nibbles) -> Result<Option<ValueRLP>, TrieError> {
        match node {
            Node::Leaf(leaf) => Ok((leaf.partial == path).then(|| leaf.value.clone())),
            Node::Extension(ext) => {
                if path.starts_with(&ext.prefix) {
                    let child = self.get_node(ext.child)?;
                    self.get_at(&child, path.offset(ext.prefix.len()))
                } else {
                    Ok(None)
                }
            }
            Node::Branch(branch) => match path.split_first() {
                None => Ok((!branch.value.is_empty()).then(|| branch.value.clone())),
                Some((nibble, rest)) => match branch.choices[nibble as usize] {
                    Some(hash) => {
                        let child = self.get_node(hash)?;
                        self.get_at(&child, rest)
                    }
                    None => Ok(None),
                },
            },
        }
    }

    fn insert_at(&self, node: Node, path: Nibbles, value: ValueRLP) -> Result<Node, TrieError> {
        match node {
            Node::Leaf(leaf) => self.insert_into_leaf(leaf, path, value),
            Node::Extension(ext) => self.insert_into_extension(ext, path, value),
            Node::Branch(branch) => self.insert_into_branch(*branch, path, value),
        }
    }

    fn insert_into_leaf(
        &self,
        leaf: LeafNode,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        if leaf.partial == path {
            return Ok(LeafNode {
                partial: path,
                value,
            }
            .into());
        }
        // The paths diverge: the leaf is replaced by a branch at the point of
        // divergence, reached through an extension if they share a prefix.
        let common = leaf.partial.count_prefix(&path);
        let mut branch = BranchNode::default();
        match leaf.partial.offset(common).split_first() {
            Some((nibble, rest)) => {
                let child: Node = LeafNode {
                    partial: rest,
                    value: leaf.value,
                }
                .into();
                branch.choices[nibble as usize] = Some(self.put_node(&child)?);
            }
            None => branch.value = leaf.value,
        }
        match path.offset(common).split_first() {
            Some((nibble, rest)) => {
                let child: Node = LeafNode {
                    partial: rest,
                    value,
                }
                .into();
                branch.choices[nibble as usize] = Some(self.put_node(&child)?);
            }
            None => branch.value = value,
        }
        self.wrap_with_prefix(path.slice(0, common), branch.into())
    }

    fn insert_into_extension(
        &self,
        ext: ExtensionNode,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        let common = ext.prefix.count_prefix(&path);
        if common == ext.prefix.len() {
            let child = self.get_node(ext.child)?;
            let new_child = self.insert_at(child, path.offset(common), value)?;
            return Ok(ExtensionNode {
                prefix: ext.prefix,
                child: self.put_node(&new_child)?,
            }
            .into());
        }
        // Split the extension at the divergence point.
        let mut branch = BranchNode::default();
        if let Some((nibble, rest)) = ext.prefix.offset(common).split_first() {
            let child_hash = if rest.is_empty() {
                ext.child
            } else {
                self.put_node(
                    &ExtensionNode {
                        prefix: rest,
                        child: ext.child,
                    }
                    .into(),
                )?
            };
            branch.choices[nibble as usize] = Some(child_hash);
        }
        match path.offset(common).split_first() {
            Some((nibble, rest)) => {
                let child: Node = LeafNode {
                    partial: rest,
                    value,
                }
                .into();
                branch.choices[nibble as usize] = Some(self.put_node(&child)?);
            }
            None => branch.value = value,
        }
        self.wrap_with_prefix(path.slice(0, common), branch.into())
    }

    fn insert_into_branch(
        &self,
        mut branch: BranchNode,
        path: Nibbles,
        value: ValueRLP,
    ) -> Result<Node, TrieError> {
        match path.split_first() {
            None => branch.value = value,
            Some((nibble, rest)) => {
                let new_child = match branch.choices[nibble as usize] {
                    Some(hash) => {
                        let child = self.get_node(hash)?;
                        self.insert_at(child, rest, value)?
                    }
                    None => LeafNode {
                        partial: rest,
                        value,
                    }
                    .into(),
                };
                branch.choices[nibble as usize] = Some(self.put_node(&new_child)?);
            }
        }
        Ok(branch.into())
    }

    fn wrap_with_prefix(&self, prefix: Nibbles, node: Node) -> Result<Node, TrieError> {
        if prefix.is_empty() {
            Ok(node)
        } else {
            let child = self.put_node(&node)?;
            Ok(ExtensionNode { prefix, child }.into())
        }
    }

    fn collect_into(
        &self,
        node: &Node,
        prefix: Nibbles,
        out: &mut BTreeMap<Vec<u8>, Vec<u8>>,
    ) -> Result<(), TrieError> {
        match node {
            Node::Leaf(leaf) => {
                if !leaf.value.is_empty() {
                    out.insert(prefix.concat(&leaf.partial).to_bytes(), leaf.value.clone());
                }
            }
            Node::Extension(ext) => {
                let child = self.get_node(ext.child)?;
                self.collect_into(&child, prefix.concat(&ext.prefix), out)?;
            }
            Node::Branch(branch) => {
                if !branch.value.is_empty() {
                    out.insert(prefix.to_bytes(), branch.value.clone());
                }
                for (nibble, choice) in branch.choices.iter().enumerate() {
                    if let Some(hash) = choice {
                        let child = self.get_node(*hash)?;
                        self.collect_into(&child, prefix.append(nibble as u8), out)?;
                    }
                }
            }
        }
        Ok(())
    }
}
