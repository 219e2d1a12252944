//! Merkle root calculation
//!
//! Reduces an ordered sequence of 32-byte leaf hashes to a single root by
//! repeated pairwise hashing. Used both for transaction identities (over
//! input/output hashes) and for the block header digest (over transaction
//! hashes).

use super::hash::{sha256, sha256_concat};

/// Calculate the Merkle root of an ordered sequence of leaf hashes.
///
/// Adjacent elements are paired and hashed, halving the sequence each
/// round until one hash remains. A round with an odd number of elements
/// duplicates its last element before pairing. An empty sequence reduces
/// to the hash of no data rather than an error.
pub fn merkle_root(leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return sha256(&[]);
    }

    let mut level = leaves;
    while level.len() > 1 {
        if level.len() % 2 != 0 {
            let last = level[level.len() - 1];
            level.push(last);
        }

        let mut next = Vec::with_capacity(level.len() / 2);
        for pair in level.chunks(2) {
            next.push(sha256_concat(&[&pair[0], &pair[1]]));
        }
        level = next;
    }

    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u8) -> [u8; 32] {
        sha256(&[n])
    }

    #[test]
    fn root_is_deterministic() {
        let leaves = vec![leaf(1), leaf(2), leaf(3), leaf(4), leaf(5)];
        assert_eq!(merkle_root(leaves.clone()), merkle_root(leaves));
    }

    #[test]
    fn empty_input_hashes_no_data() {
        assert_eq!(merkle_root(vec![]), sha256(&[]));
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        assert_eq!(merkle_root(vec![leaf(7)]), leaf(7));
    }

    #[test]
    fn pair_is_hash_of_concatenation() {
        let expected = sha256_concat(&[&leaf(1), &leaf(2)]);
        assert_eq!(merkle_root(vec![leaf(1), leaf(2)]), expected);
    }

    #[test]
    fn odd_round_duplicates_its_last_element() {
        let odd = merkle_root(vec![leaf(1), leaf(2), leaf(3)]);
        let padded = merkle_root(vec![leaf(1), leaf(2), leaf(3), leaf(3)]);
        assert_eq!(odd, padded);
    }

    #[test]
    fn order_matters() {
        let a = merkle_root(vec![leaf(1), leaf(2)]);
        let b = merkle_root(vec![leaf(2), leaf(1)]);
        assert_ne!(a, b);
    }
}
