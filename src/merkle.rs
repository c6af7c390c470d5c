use derive_more::Display;
use web3::{
    signing::keccak256,
    types::H256,
};

use crate::constants::EMPTY_MERKLE_ROOT;

pub type Result<T> = std::result::Result<T, MerkleError>;

#[derive(Display, Debug, PartialEq)]
pub enum MerkleError {
    #[display(fmt = "Leaf must be exactly 32 bytes, got {}", _0)]
    InvalidLeafLength(usize),
    #[display(fmt = "Duplicated leaf: {}", _0)]
    DuplicateLeaf(H256),
    #[display(fmt = "Element is not part of the tree")]
    LeafNotFound,
    #[display(fmt = "Tree has no layers")]
    EmptyTree,
}

/// Commitment tree over a set of 32-byte hashes. Leaves are sorted before
/// construction and every pair is hashed in canonical order, so the root
/// only depends on the set, not on insertion order.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    layers: Vec<Vec<H256>>,
}

fn hash_pair(first: H256, second: H256) -> H256 {
    let mut data = [0u8; 64];
    if first.as_bytes() <= second.as_bytes() {
        data[..32].copy_from_slice(first.as_bytes());
        data[32..].copy_from_slice(second.as_bytes());
    } else {
        data[..32].copy_from_slice(second.as_bytes());
        data[32..].copy_from_slice(first.as_bytes());
    }
    H256::from(keccak256(&data))
}

pub fn compute_merkle_tree(elements: &[Vec<u8>]) -> Result<MerkleTree> {
    let mut leaves = Vec::with_capacity(elements.len());
    for element in elements {
        if element.len() != 32 {
            return Err(MerkleError::InvalidLeafLength(element.len()));
        }
        leaves.push(H256::from_slice(element));
    }
    leaves.sort_unstable();
    for window in leaves.windows(2) {
        if window[0] == window[1] {
            return Err(MerkleError::DuplicateLeaf(window[0]));
        }
    }

    if leaves.is_empty() {
        return Ok(MerkleTree {
            layers: vec![vec![EMPTY_MERKLE_ROOT]],
        });
    }

    let mut layers = vec![leaves];
    while layers.last().map(|layer| layer.len()).unwrap_or(0) > 1 {
        let current = layers.last().cloned().unwrap_or_default();
        let mut next = Vec::with_capacity((current.len() + 1) / 2);
        for pair in current.chunks(2) {
            match pair {
                [first, second] => next.push(hash_pair(*first, *second)),
                // Odd leftover is carried up unpaired.
                [single] => next.push(*single),
                _ => unreachable!("chunks(2) yields one or two elements"),
            }
        }
        layers.push(next);
    }

    Ok(MerkleTree { layers })
}

pub fn get_merkle_root(tree: &MerkleTree) -> Result<H256> {
    let last_layer = tree.layers.last().ok_or(MerkleError::EmptyTree)?;
    debug_assert_eq!(last_layer.len(), 1, "top layer must hold exactly the root");
    last_layer.first().copied().ok_or(MerkleError::EmptyTree)
}

/// Sibling hashes needed to recompute the root from `element`, ordered
/// leaf to root. Layers where the element is the odd leftover contribute
/// no sibling.
pub fn compute_merkle_proof(tree: &MerkleTree, element: H256) -> Result<Vec<H256>> {
    let leaves = tree.layers.first().ok_or(MerkleError::EmptyTree)?;
    let mut index = leaves
        .iter()
        .position(|leaf| *leaf == element)
        .ok_or(MerkleError::LeafNotFound)?;

    let mut proof = vec![];
    for layer in &tree.layers[..tree.layers.len() - 1] {
        let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };
        if let Some(sibling) = layer.get(sibling_index) {
            proof.push(*sibling);
        }
        index /= 2;
    }
    Ok(proof)
}

pub fn validate_merkle_proof(proof: &[H256], root: H256, leaf: H256) -> bool {
    let computed = proof.iter().fold(leaf, |current, sibling| hash_pair(current, *sibling));
    computed == root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::EMPTY_MERKLE_ROOT;

    fn leaves(count: u8) -> Vec<Vec<u8>> {
        (1..=count)
            .map(|value| {
                let mut leaf = vec![0u8; 32];
                leaf[31] = value;
                leaf
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_sentinel_root() {
        let tree = compute_merkle_tree(&[]).expect("empty set is valid");
        assert_eq!(get_merkle_root(&tree).unwrap(), EMPTY_MERKLE_ROOT);
    }

    #[test]
    fn rejects_duplicates() {
        let mut elements = leaves(3);
        elements.push(elements[0].clone());
        assert!(matches!(
            compute_merkle_tree(&elements),
            Err(MerkleError::DuplicateLeaf(_))
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        let elements = vec![vec![1u8; 31]];
        assert!(matches!(
            compute_merkle_tree(&elements),
            Err(MerkleError::InvalidLeafLength(31))
        ));
    }

    #[test]
    fn root_is_order_independent() {
        let forward = leaves(7);
        let mut reversed = forward.clone();
        reversed.reverse();

        let root_forward = get_merkle_root(&compute_merkle_tree(&forward).unwrap()).unwrap();
        let root_reversed = get_merkle_root(&compute_merkle_tree(&reversed).unwrap()).unwrap();
        assert_eq!(root_forward, root_reversed);
    }

    #[test]
    fn proof_round_trip_all_sizes() {
        for count in 1..=8u8 {
            let elements = leaves(count);
            let tree = compute_merkle_tree(&elements).unwrap();
            let root = get_merkle_root(&tree).unwrap();
            for element in &elements {
                let leaf = H256::from_slice(element);
                let proof = compute_merkle_proof(&tree, leaf).expect("leaf is in tree");
                assert!(validate_merkle_proof(&proof, root, leaf), "count={}", count);
            }
        }
    }

    #[test]
    fn proof_for_unknown_leaf_fails() {
        let tree = compute_merkle_tree(&leaves(4)).unwrap();
        let mut unknown = [0u8; 32];
        unknown[0] = 0xff;
        assert!(matches!(
            compute_merkle_proof(&tree, H256::from(unknown)),
            Err(MerkleError::LeafNotFound)
        ));
    }

    #[test]
    fn tampered_proof_fails_validation() {
        let elements = leaves(5);
        let tree = compute_merkle_tree(&elements).unwrap();
        let root = get_merkle_root(&tree).unwrap();
        let leaf = H256::from_slice(&elements[0]);
        let mut proof = compute_merkle_proof(&tree, leaf).unwrap();
        if let Some(first) = proof.first_mut() {
            *first = H256::repeat_byte(0xab);
        }
        assert!(!validate_merkle_proof(&proof, root, leaf));
    }
}
