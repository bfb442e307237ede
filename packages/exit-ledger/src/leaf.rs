//! Leaf codec
//!
//! A deposit leaf is the hash of a fixed 113-byte packed preimage:
//!
//! ```text
//! leafType(1) ‖ originNetwork(4) ‖ originAddress(20) ‖ destinationNetwork(4)
//!   ‖ destinationAddress(20) ‖ amount(32) ‖ metadataHash(32)
//! ```
//!
//! Integers are big-endian, matching `abi.encodePacked` on EVM peers. The
//! layout is a wire format shared with every peer network and must never change.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::hash::NodeHasher;
use crate::types::LeafType;

/// Length of the packed leaf preimage.
pub const LEAF_PREIMAGE_LEN: usize = 113;

/// A deposit record as committed into an exit tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeLeaf {
    pub leaf_type: LeafType,
    pub origin_network: u32,
    pub origin_address: Address,
    pub destination_network: u32,
    pub destination_address: Address,
    pub amount: U256,
    pub metadata_hash: B256,
}

impl BridgeLeaf {
    /// Packed preimage of the leaf.
    pub fn encode(&self) -> [u8; LEAF_PREIMAGE_LEN] {
        let mut data = [0u8; LEAF_PREIMAGE_LEN];

        data[0] = self.leaf_type.as_u8();
        data[1..5].copy_from_slice(&self.origin_network.to_be_bytes());
        data[5..25].copy_from_slice(self.origin_address.as_slice());
        data[25..29].copy_from_slice(&self.destination_network.to_be_bytes());
        data[29..49].copy_from_slice(self.destination_address.as_slice());
        data[49..81].copy_from_slice(&self.amount.to_be_bytes::<32>());
        data[81..113].copy_from_slice(self.metadata_hash.as_slice());

        data
    }

    pub fn hash<H: NodeHasher>(&self) -> B256 {
        H::hash(&self.encode())
    }
}

/// Leaf value from its individual fields.
#[allow(clippy::too_many_arguments)]
pub fn get_leaf_value<H: NodeHasher>(
    leaf_type: LeafType,
    origin_network: u32,
    origin_address: Address,
    destination_network: u32,
    destination_address: Address,
    amount: U256,
    metadata_hash: B256,
) -> B256 {
    BridgeLeaf {
        leaf_type,
        origin_network,
        origin_address,
        destination_network,
        destination_address,
        amount,
        metadata_hash,
    }
    .hash::<H>()
}

/// Hash of the opaque metadata bytes carried by a deposit.
pub fn metadata_hash<H: NodeHasher>(metadata: &[u8]) -> B256 {
    H::hash(metadata)
}
