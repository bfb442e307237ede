//! Block context source for a node without a host chain
//!
//! Each call produces a new pseudo block: wall-clock seconds (never going
//! backwards) and a hash chained from the previous block.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::B256;
use exit_ledger::{keccak256, BlockContext};

#[derive(Debug)]
pub struct BlockClock {
    state: Mutex<ClockState>,
}

#[derive(Debug)]
struct ClockState {
    height: u64,
    timestamp: u64,
    block_hash: B256,
}

impl Default for BlockClock {
    fn default() -> Self {
        Self::new(B256::ZERO)
    }
}

impl BlockClock {
    pub fn new(genesis: B256) -> Self {
        Self {
            state: Mutex::new(ClockState {
                height: 0,
                timestamp: 0,
                block_hash: genesis,
            }),
        }
    }

    /// Context for the next pseudo block.
    pub fn next(&self) -> BlockContext {
        self.next_at(unix_now())
    }

    pub fn next_at(&self, now: u64) -> BlockContext {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let parent = state.block_hash;
        state.height += 1;
        state.timestamp = state.timestamp.max(now);

        let mut preimage = [0u8; 48];
        preimage[..32].copy_from_slice(parent.as_slice());
        preimage[32..40].copy_from_slice(&state.height.to_be_bytes());
        preimage[40..].copy_from_slice(&state.timestamp.to_be_bytes());
        state.block_hash = B256::from(keccak256(&preimage));

        // The L1-info leaf commits to the parent block hash
        BlockContext::new(state.timestamp, parent)
    }

    pub fn height(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .height
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashes_chain() {
        let clock = BlockClock::default();
        let first = clock.next_at(100);
        let second = clock.next_at(100);
        assert_eq!(first.block_hash, B256::ZERO);
        assert_ne!(second.block_hash, first.block_hash);
        assert_eq!(clock.height(), 2);
    }

    #[test]
    fn test_timestamp_is_monotonic() {
        let clock = BlockClock::default();
        assert_eq!(clock.next_at(100).timestamp, 100);
        assert_eq!(clock.next_at(50).timestamp, 100);
        assert_eq!(clock.next_at(150).timestamp, 150);
    }
}
