//! A Merkle tree over a transaction list using a *commutative* combiner:
//! `combine(a, b) = hash(decimal_string(int(a,16) + int(b,16)))`.
//!
//! The tree is stored as a flat arena addressed by index, with each node
//! carrying a parent index and (if it was actually paired) a sibling index.
//! A lone node at an odd level promotes unchanged rather than being
//! duplicated; its promoted copy has no sibling, so proof generation emits
//! no entry for that level. This avoids the shared-ownership back-pointer
//! cycle a naive tree-of-`Rc<RefCell<_>>` would need for parent links.

use shared::Hash256;

struct Node {
    hash: Hash256,
    parent: Option<usize>,
    sibling: Option<usize>,
}

/// A built Merkle commitment over an ordered transaction-hash list.
pub struct MerkleTree {
    nodes: Vec<Node>,
    leaf_count: usize,
    root: Option<Hash256>,
}

impl MerkleTree {
    /// Builds the tree over the given leaf hashes (typically transaction hashes).
    #[must_use]
    pub fn build(leaves: Vec<Hash256>) -> Self {
        let leaf_count = leaves.len();
        if leaves.is_empty() {
            return Self {
                nodes: Vec::new(),
                leaf_count: 0,
                root: None,
            };
        }

        let mut nodes: Vec<Node> = leaves
            .into_iter()
            .map(|hash| Node {
                hash,
                parent: None,
                sibling: None,
            })
            .collect();

        let mut level_start = 0;
        let mut level_len = nodes.len();

        while level_len > 1 {
            let next_level_start = nodes.len();
            let mut i = level_start;
            let end = level_start + level_len;

            while i < end {
                if i + 1 < end {
                    let combined = combine(&nodes[i].hash, &nodes[i + 1].hash);
                    let parent_index = nodes.len();
                    nodes[i].parent = Some(parent_index);
                    nodes[i].sibling = Some(i + 1);
                    nodes[i + 1].parent = Some(parent_index);
                    nodes[i + 1].sibling = Some(i);
                    nodes.push(Node {
                        hash: combined,
                        parent: None,
                        sibling: None,
                    });
                    i += 2;
                } else {
                    // lone odd node: promote unchanged, no sibling at this level
                    let parent_index = nodes.len();
                    nodes[i].parent = Some(parent_index);
                    nodes[i].sibling = None;
                    let hash = nodes[i].hash;
                    nodes.push(Node {
                        hash,
                        parent: None,
                        sibling: None,
                    });
                    i += 1;
                }
            }

            level_len = nodes.len() - next_level_start;
            level_start = next_level_start;
        }

        let root = nodes[level_start].hash;
        Self {
            nodes,
            leaf_count,
            root: Some(root),
        }
    }

    /// The Merkle root, or `None` for an empty transaction list.
    #[must_use]
    pub const fn root(&self) -> Option<Hash256> {
        self.root
    }

    /// Produces an inclusion proof for `tx_hash`: the sequence of sibling
    /// hashes encountered walking from the matching leaf to the root.
    /// Returns `None` if no leaf has that hash.
    #[must_use]
    pub fn get_proof(&self, tx_hash: &Hash256) -> Option<Vec<Hash256>> {
        let mut current = (0..self.leaf_count).find(|&i| self.nodes[i].hash == *tx_hash)?;

        let mut proof = Vec::new();
        while let Some(parent) = self.nodes[current].parent {
            if let Some(sibling) = self.nodes[current].sibling {
                proof.push(self.nodes[sibling].hash);
            }
            current = parent;
        }
        Some(proof)
    }
}

/// Verifies an inclusion proof by folding the combiner from the leaf to a
/// candidate root and comparing against `root`.
#[must_use]
pub fn verify_proof(tx_hash: Hash256, proof: &[Hash256], root: Hash256) -> bool {
    let acc = proof.iter().fold(tx_hash, |acc, next| combine(&acc, next));
    acc == root
}

/// `hash(decimal_string(int(a,16) + int(b,16)))` — commutative by construction.
#[must_use]
pub fn combine(a: &Hash256, b: &Hash256) -> Hash256 {
    let sum = add_big_endian(a.as_bytes(), b.as_bytes());
    let decimal = bytes_to_decimal(&sum);
    Hash256::keccak256(decimal.as_bytes())
}

/// Adds two big-endian byte arrays of equal or differing length, producing
/// the big-endian result (one byte longer than the longer input on overflow).
fn add_big_endian(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut result = Vec::with_capacity(len + 1);
    let mut carry: u16 = 0;

    for i in 0..len {
        let av = a.len().checked_sub(1 + i).map_or(0, |idx| a[idx]);
        let bv = b.len().checked_sub(1 + i).map_or(0, |idx| b[idx]);
        let sum = u16::from(av) + u16::from(bv) + carry;
        result.push((sum & 0xff) as u8);
        carry = sum >> 8;
    }
    if carry > 0 {
        result.push(carry as u8);
    }
    result.reverse();
    result
}

/// Converts a big-endian byte array into its base-10 string representation
/// via repeated long division by 10.
fn bytes_to_decimal(bytes: &[u8]) -> String {
    let mut digits = bytes.to_vec();
    // strip leading zero bytes but keep at least one
    while digits.len() > 1 && digits[0] == 0 {
        digits.remove(0);
    }
    if digits == [0] {
        return "0".to_string();
    }

    let mut output = Vec::new();
    while !(digits.len() == 1 && digits[0] == 0) {
        let mut remainder: u32 = 0;
        let mut quotient = Vec::with_capacity(digits.len());
        for &byte in &digits {
            let acc = (remainder << 8) | u32::from(byte);
            quotient.push((acc / 10) as u8);
            remainder = acc % 10;
        }
        // strip leading zeros from the quotient for the next iteration
        let first_nonzero = quotient.iter().position(|&b| b != 0).unwrap_or(quotient.len() - 1);
        digits = quotient[first_nonzero..].to_vec();
        output.push(char::from(b'0' + remainder as u8));
    }
    output.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_commutative() {
        let a = Hash256::keccak256(b"a");
        let b = Hash256::keccak256(b"b");
        assert_eq!(combine(&a, &b), combine(&b, &a));
    }

    #[test]
    fn empty_tree_has_no_root() {
        let tree = MerkleTree::build(vec![]);
        assert!(tree.root().is_none());
    }

    #[test]
    fn single_leaf_tree_root_is_the_leaf_hash() {
        let leaf = Hash256::keccak256(b"solo");
        let tree = MerkleTree::build(vec![leaf]);
        assert_eq!(tree.root(), Some(leaf));
    }

    #[test]
    fn odd_leaf_count_promotes_lone_node_unchanged() {
        let a = Hash256::keccak256(b"a");
        let b = Hash256::keccak256(b"b");
        let c = Hash256::keccak256(b"c");
        let tree = MerkleTree::build(vec![a, b, c]);

        let ab = combine(&a, &b);
        let expected_root = combine(&ab, &c);
        assert_eq!(tree.root(), Some(expected_root));
    }

    #[test]
    fn proof_round_trips_for_every_leaf() {
        let leaves: Vec<Hash256> = (0..5u8)
            .map(|i| Hash256::keccak256(&[i]))
            .collect();
        let tree = MerkleTree::build(leaves.clone());
        let root = tree.root().unwrap();

        for leaf in &leaves {
            let proof = tree.get_proof(leaf).expect("leaf must have a proof");
            assert!(verify_proof(*leaf, &proof, root));
        }
    }

    #[test]
    fn proof_is_none_for_a_hash_not_in_the_tree() {
        let leaves = vec![Hash256::keccak256(b"x"), Hash256::keccak256(b"y")];
        let tree = MerkleTree::build(leaves);
        let absent = Hash256::keccak256(b"not present");
        assert!(tree.get_proof(&absent).is_none());
    }

    #[test]
    fn big_integer_addition_matches_known_sum() {
        // 0xff + 0x01 = 0x100 -> decimal "256"
        let result = add_big_endian(&[0xff], &[0x01]);
        assert_eq!(bytes_to_decimal(&result), "256");
    }

    #[test]
    fn decimal_conversion_of_zero_is_zero() {
        assert_eq!(bytes_to_decimal(&[0, 0, 0]), "0");
    }
}
