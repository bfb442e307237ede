//! Hash primitives for the exit tree and the leaf codec
//!
//! Keccak-256 is the default node hash. The tree, the codec and the
//! aggregator are generic over [`NodeHasher`] so a deployment can swap in a
//! different 32-byte hash without touching the tree algorithm.

use alloy_primitives::B256;
use tiny_keccak::{Hasher, Keccak};

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// A 32-byte hash function used for leaves, tree nodes and registry keys.
pub trait NodeHasher: Send + Sync + 'static {
    fn hash(data: &[u8]) -> B256;

    /// Hash of `left ‖ right`.
    fn hash_pair(left: &B256, right: &B256) -> B256 {
        let mut data = [0u8; 64];
        data[0..32].copy_from_slice(left.as_slice());
        data[32..64].copy_from_slice(right.as_slice());
        Self::hash(&data)
    }
}

/// Keccak-256, the hash every EVM-compatible peer expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Keccak256;

impl NodeHasher for Keccak256 {
    fn hash(data: &[u8]) -> B256 {
        B256::from(keccak256(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256() {
        let hash = keccak256(b"hello");
        assert_eq!(
            hex::encode(hash),
            "1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_keccak256_empty() {
        let hash = keccak256(&[]);
        assert_eq!(
            hex::encode(hash),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_hash_pair_is_concatenation() {
        let left = B256::repeat_byte(0x11);
        let right = B256::repeat_byte(0x22);

        let mut data = Vec::with_capacity(64);
        data.extend_from_slice(left.as_slice());
        data.extend_from_slice(right.as_slice());

        assert_eq!(Keccak256::hash_pair(&left, &right), Keccak256::hash(&data));
    }

    #[test]
    fn test_hash_pair_is_ordered() {
        let left = B256::repeat_byte(0x11);
        let right = B256::repeat_byte(0x22);
        assert_ne!(
            Keccak256::hash_pair(&left, &right),
            Keccak256::hash_pair(&right, &left)
        );
    }
}
