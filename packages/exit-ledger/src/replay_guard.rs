//! Claimed-leaf bitmap
//!
//! Every claim is identified by a scope key packing the mainnet flag, the
//! source network and the leaf index:
//!
//! ```text
//! key = mainnetFlag << 64 | sourceNetwork << 32 | leafIndex
//! ```
//!
//! Keys are grouped 256 to a word (`word = key >> 8`, `bit = key & 0xff`).
//! Bits are only ever set.

use std::collections::HashMap;

use alloy_primitives::U256;

use crate::error::{LedgerError, Result};

/// Packed claim identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeKey(u128);

impl ScopeKey {
    pub fn new(mainnet_flag: bool, source_network: u32, leaf_index: u32) -> Self {
        Self(
            (u128::from(mainnet_flag) << 64)
                | (u128::from(source_network) << 32)
                | u128::from(leaf_index),
        )
    }

    pub fn value(&self) -> u128 {
        self.0
    }

    pub fn word_position(&self) -> u128 {
        self.0 >> 8
    }

    pub fn bit_position(&self) -> usize {
        (self.0 & 0xff) as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReplayGuard {
    words: HashMap<u128, U256>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self, key: ScopeKey) -> bool {
        self.words
            .get(&key.word_position())
            .is_some_and(|word| word.bit(key.bit_position()))
    }

    /// Set the bit for `key`, failing if it is already set.
    pub fn mark_claimed(&mut self, key: ScopeKey) -> Result<()> {
        let word = self.words.entry(key.word_position()).or_insert(U256::ZERO);
        if word.bit(key.bit_position()) {
            return Err(LedgerError::AlreadyClaimed);
        }
        word.set_bit(key.bit_position(), true);
        Ok(())
    }

    /// Number of bitmap words in use.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_key_packing() {
        let key = ScopeKey::new(true, 3, 7);
        assert_eq!(key.value(), (1u128 << 64) | (3u128 << 32) | 7);

        let key = ScopeKey::new(false, 0, 513);
        assert_eq!(key.word_position(), 2);
        assert_eq!(key.bit_position(), 1);
    }

    #[test]
    fn test_mainnet_flag_separates_scopes() {
        assert_ne!(ScopeKey::new(true, 1, 0), ScopeKey::new(false, 1, 0));
    }

    #[test]
    fn test_mark_then_reject() {
        let mut guard = ReplayGuard::new();
        let key = ScopeKey::new(false, 1, 42);

        assert!(!guard.is_claimed(key));
        guard.mark_claimed(key).unwrap();
        assert!(guard.is_claimed(key));
        assert_eq!(guard.mark_claimed(key), Err(LedgerError::AlreadyClaimed));
        assert!(guard.is_claimed(key));
    }

    #[test]
    fn test_neighbouring_bits_independent() {
        let mut guard = ReplayGuard::new();
        for index in (0..512u32).step_by(2) {
            guard.mark_claimed(ScopeKey::new(false, 1, index)).unwrap();
        }
        for index in 0..512u32 {
            assert_eq!(
                guard.is_claimed(ScopeKey::new(false, 1, index)),
                index % 2 == 0
            );
        }
        assert_eq!(guard.word_count(), 2);
    }

    #[test]
    fn test_highest_bit_of_word() {
        let mut guard = ReplayGuard::new();
        let key = ScopeKey::new(true, u32::MAX, u32::MAX);
        assert_eq!(key.bit_position(), 255);
        guard.mark_claimed(key).unwrap();
        assert!(guard.is_claimed(key));
        assert!(!guard.is_claimed(ScopeKey::new(true, u32::MAX, u32::MAX - 1)));
    }
}
