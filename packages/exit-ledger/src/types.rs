//! Shared types for the bridge ledger

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LedgerError;

/// Depth of every exit tree.
pub const TREE_DEPTH: usize = 32;

/// Sibling path from a leaf to the root, lowest level first.
pub type SmtProof = [B256; TREE_DEPTH];

/// Network id that ether originates from unless configured otherwise.
pub const MAINNET_NETWORK_ID: u32 = 0;

// ============================================================================
// Leaf Type
// ============================================================================

/// Kind of deposit recorded in a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafType {
    Asset = 0,
    Message = 1,
}

impl LeafType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for LeafType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(LeafType::Asset),
            1 => Ok(LeafType::Message),
            other => Err(other),
        }
    }
}

impl fmt::Display for LeafType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeafType::Asset => write!(f, "asset"),
            LeafType::Message => write!(f, "message"),
        }
    }
}

// ============================================================================
// Token Identity
// ============================================================================

/// Where a token natively lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenInfo {
    pub origin_network: u32,
    pub origin_token_address: Address,
}

impl TokenInfo {
    pub fn new(origin_network: u32, origin_token_address: Address) -> Self {
        Self {
            origin_network,
            origin_token_address,
        }
    }
}

// ============================================================================
// Global Index
// ============================================================================

/// Locates a deposit leaf across every network feeding a global exit root.
///
/// Packed as a u256: bit 64 is the mainnet flag, bits 32..63 the rollup
/// index, bits 0..31 the leaf index. A mainnet leaf carries rollup index 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalIndex {
    pub mainnet_flag: bool,
    pub rollup_index: u32,
    pub leaf_index: u32,
}

impl GlobalIndex {
    pub fn mainnet(leaf_index: u32) -> Self {
        Self {
            mainnet_flag: true,
            rollup_index: 0,
            leaf_index,
        }
    }

    pub fn rollup(rollup_index: u32, leaf_index: u32) -> Self {
        Self {
            mainnet_flag: false,
            rollup_index,
            leaf_index,
        }
    }

    pub fn to_u256(&self) -> U256 {
        let mut value = U256::from(self.leaf_index) | (U256::from(self.rollup_index) << 32usize);
        if self.mainnet_flag {
            value |= U256::from(1u8) << 64usize;
        }
        value
    }

    /// Decode a packed global index, rejecting non-canonical encodings.
    pub fn from_u256(value: U256) -> Result<Self, LedgerError> {
        if !(value >> 65usize).is_zero() {
            return Err(LedgerError::GlobalIndexInvalid);
        }
        let mainnet_flag = value.bit(64);
        let low = value.as_limbs()[0];
        let index = Self {
            mainnet_flag,
            rollup_index: (low >> 32) as u32,
            leaf_index: low as u32,
        };
        if mainnet_flag && index.rollup_index != 0 {
            return Err(LedgerError::GlobalIndexInvalid);
        }
        Ok(index)
    }
}

impl From<GlobalIndex> for U256 {
    fn from(index: GlobalIndex) -> Self {
        index.to_u256()
    }
}

impl fmt::Display for GlobalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u256())
    }
}

// ============================================================================
// Caller-supplied Context
// ============================================================================

/// Block context supplied by the host environment.
///
/// The engine has no clock; every operation that may publish a global exit
/// root receives the timestamp and parent block hash from its caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub timestamp: u64,
    pub block_hash: B256,
}

impl BlockContext {
    pub fn new(timestamp: u64, block_hash: B256) -> Self {
        Self {
            timestamp,
            block_hash,
        }
    }
}

/// Signed allowance attached to a local-token deposit.
///
/// The signature is opaque to the ledger; only the execution environment
/// checks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permit {
    pub owner: Address,
    pub spender: Address,
    pub value: U256,
    pub deadline: u64,
    pub signature: Bytes,
}
