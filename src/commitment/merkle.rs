//! Binary Merkle tree over link strings
//!
//! # Convention
//! - Leaves are the UTF-8 bytes of each link, hashed once with SHA-256
//! - A parent is `sha256(left || right)`
//! - On a level with an odd node count the last node is paired with itself
//! - A single leaf's root is its leaf hash; an empty list has no root
//!
//! Any other implementation that must agree on roots has to follow exactly
//! this construction, including leaf order.

use sha2::{Digest, Sha256};

fn hash_leaf(leaf: &[u8]) -> [u8; 32] {
    Sha256::digest(leaf).into()
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Compute the Merkle root over `leaves` in the given order
pub fn merkle_root<L: AsRef<[u8]>>(leaves: &[L]) -> Option<[u8; 32]> {
    if leaves.is_empty() {
        return None;
    }

    let mut level: Vec<[u8; 32]> = leaves.iter().map(|l| hash_leaf(l.as_ref())).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                [last] => hash_pair(last, last),
                _ => unreachable!("chunks(2) yields one or two nodes"),
            })
            .collect();
    }

    level.first().copied()
}

/// Hex-encoded root over link strings
pub fn merkle_root_hex<S: AsRef<str>>(links: &[S]) -> Option<String> {
    let leaves: Vec<&[u8]> = links.iter().map(|l| l.as_ref().as_bytes()).collect();
    merkle_root(&leaves).map(hex::encode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sha(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    #[test]
    fn test_empty_has_no_root() {
        let leaves: Vec<&str> = vec![];
        assert_eq!(merkle_root_hex(&leaves), None);
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        assert_eq!(merkle_root_hex(&["aa"]), Some(hex::encode(sha(b"aa"))));
    }

    #[test]
    fn test_three_leaves_duplicate_last() {
        let (a, b, c) = (sha(b"bb"), sha(b"aa"), sha(b"cc"));
        let left = hash_pair(&a, &b);
        let right = hash_pair(&c, &c);
        let expected = hash_pair(&left, &right);

        assert_eq!(merkle_root_hex(&["bb", "aa", "cc"]), Some(hex::encode(expected)));
    }

    #[test]
    fn test_root_is_order_sensitive() {
        assert_ne!(merkle_root_hex(&["a", "b"]), merkle_root_hex(&["b", "a"]));
    }
}
