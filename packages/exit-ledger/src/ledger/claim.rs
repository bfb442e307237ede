//! Claim handlers (claimAsset, claimMessage).
//!
//! A claim proves that a leaf exists under a known global exit root and
//! applies it here exactly once. Checks run in a fixed order: destination
//! network, global exit root known, Merkle proof, not yet claimed. Side
//! effects are applied as one unit before the replay bit is set, so a failed
//! transfer or message leaves the claim retryable.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{lock, read, write, BridgeLedger};
use crate::error::{LedgerError, Result};
use crate::events::{ClaimEvent, LedgerEvent, NewWrappedToken};
use crate::execution::{Effect, ExecutionEnvironment};
use crate::exit_tree::{calculate_root, verify_merkle_proof};
use crate::global_exit_root::GlobalExitRoot;
use crate::hash::NodeHasher;
use crate::leaf::{metadata_hash, BridgeLeaf};
use crate::replay_guard::ScopeKey;
use crate::types::{GlobalIndex, LeafType, SmtProof, TREE_DEPTH};

/// Everything needed to prove and apply one deposit from another network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// Leaf to local exit root (for mainnet leaves, straight to the mainnet exit root).
    pub smt_proof_local_exit_root: SmtProof,
    /// Local exit root to rollup exit root. Ignored for mainnet leaves.
    pub smt_proof_rollup_exit_root: SmtProof,
    pub global_index: GlobalIndex,
    pub mainnet_exit_root: B256,
    pub rollup_exit_root: B256,
    pub origin_network: u32,
    /// Origin token for assets, sender for messages.
    pub origin_address: Address,
    pub destination_network: u32,
    pub destination_address: Address,
    pub amount: U256,
    pub metadata: Bytes,
}

impl Claim {
    /// Claim of a leaf committed directly under the mainnet exit root.
    #[allow(clippy::too_many_arguments)]
    pub fn mainnet(
        proof: SmtProof,
        leaf_index: u32,
        mainnet_exit_root: B256,
        rollup_exit_root: B256,
        origin_network: u32,
        origin_address: Address,
        destination_network: u32,
        destination_address: Address,
        amount: U256,
        metadata: Bytes,
    ) -> Self {
        Self {
            smt_proof_local_exit_root: proof,
            smt_proof_rollup_exit_root: [B256::ZERO; TREE_DEPTH],
            global_index: GlobalIndex::mainnet(leaf_index),
            mainnet_exit_root,
            rollup_exit_root,
            origin_network,
            origin_address,
            destination_network,
            destination_address,
            amount,
            metadata,
        }
    }

    pub fn leaf<H: NodeHasher>(&self, leaf_type: LeafType) -> BridgeLeaf {
        BridgeLeaf {
            leaf_type,
            origin_network: self.origin_network,
            origin_address: self.origin_address,
            destination_network: self.destination_network,
            destination_address: self.destination_address,
            amount: self.amount,
            metadata_hash: metadata_hash::<H>(&self.metadata),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub global_index: U256,
    /// Token credited to the receiver; zero for the native asset and messages.
    pub credited_token: Address,
    /// Set when this claim created the wrapped token.
    pub new_wrapped_token: Option<Address>,
}

impl<E: ExecutionEnvironment, H: NodeHasher> BridgeLedger<E, H> {
    pub fn claim_asset(&self, claim: &Claim) -> Result<ClaimReceipt> {
        let _gate = self.operational()?;
        let key = self.verify_claim(claim, LeafType::Asset)?;

        let _slot = lock(self.stripe(key));
        self.ensure_unclaimed(key)?;

        let to = claim.destination_address;
        let amount = claim.amount;
        let gas_token = self.config.effective_gas_token();

        // Hold the registry across deploy and register when this claim creates the wrapped token
        let mut registry = None;
        let mut new_wrapped = None;

        let (credited_token, effects) = if claim.origin_address == Address::ZERO {
            match self.weth_token {
                None => (Address::ZERO, vec![Effect::ReleaseNative { to, amount }]),
                Some(weth) => (weth, vec![Effect::MintWrapped { token: weth, to, amount }]),
            }
        } else if gas_token.is_some_and(|gas_token| {
            gas_token.network == claim.origin_network && gas_token.address == claim.origin_address
        }) {
            (Address::ZERO, vec![Effect::ReleaseNative { to, amount }])
        } else if claim.origin_network == self.config.network_id {
            let token = claim.origin_address;
            (token, vec![Effect::ReleaseTokens { token, to, amount }])
        } else {
            let existing = read(&self.wrapped).resolve(claim.origin_network, &claim.origin_address);
            match existing {
                Some(token) => (token, vec![Effect::MintWrapped { token, to, amount }]),
                None => {
                    let guard = write(&self.wrapped);
                    match guard.resolve(claim.origin_network, &claim.origin_address) {
                        Some(token) => (token, vec![Effect::MintWrapped { token, to, amount }]),
                        None => {
                            let token = guard.compute_wrapped_address_from_metadata(
                                claim.origin_network,
                                &claim.origin_address,
                                &claim.metadata,
                            );
                            registry = Some(guard);
                            new_wrapped = Some(token);
                            (
                                token,
                                vec![
                                    Effect::DeployWrapped {
                                        token,
                                        metadata: claim.metadata.clone(),
                                    },
                                    Effect::MintWrapped { token, to, amount },
                                ],
                            )
                        }
                    }
                }
            }
        };

        self.executor
            .apply(&effects)
            .map_err(|e| LedgerError::TransferFailed {
                reason: e.to_string(),
            })?;

        if let (Some(mut registry), Some(token)) = (registry, new_wrapped) {
            registry.register(claim.origin_network, claim.origin_address, token)?;
            info!(
                origin_network = claim.origin_network,
                origin_token = %claim.origin_address,
                wrapped_token = %token,
                "Deployed wrapped token"
            );
            self.emit(LedgerEvent::NewWrappedToken(NewWrappedToken {
                origin_network: claim.origin_network,
                origin_token_address: claim.origin_address,
                wrapped_token_address: token,
                metadata: claim.metadata.clone(),
            }));
        }

        self.finish_claim(key, claim)?;
        Ok(ClaimReceipt {
            global_index: claim.global_index.to_u256(),
            credited_token,
            new_wrapped_token: new_wrapped,
        })
    }

    pub fn claim_message(&self, claim: &Claim) -> Result<ClaimReceipt> {
        let _gate = self.operational()?;
        let key = self.verify_claim(claim, LeafType::Message)?;

        let _slot = lock(self.stripe(key));
        self.ensure_unclaimed(key)?;

        let to = claim.destination_address;
        let delivery = |value: U256| Effect::DeliverMessage {
            to,
            origin_address: claim.origin_address,
            origin_network: claim.origin_network,
            value,
            payload: claim.metadata.clone(),
        };

        // On gas token networks the message value arrives as wrapped ether
        let (credited_token, effects) = match self.weth_token {
            None => (Address::ZERO, vec![delivery(claim.amount)]),
            Some(weth) => (
                weth,
                vec![
                    Effect::MintWrapped {
                        token: weth,
                        to,
                        amount: claim.amount,
                    },
                    delivery(U256::ZERO),
                ],
            ),
        };

        self.executor
            .apply(&effects)
            .map_err(|e| LedgerError::MessageFailed {
                reason: e.to_string(),
            })?;

        self.finish_claim(key, claim)?;
        Ok(ClaimReceipt {
            global_index: claim.global_index.to_u256(),
            credited_token,
            new_wrapped_token: None,
        })
    }

    /// Destination, root and proof checks. Returns the claim's scope key.
    fn verify_claim(&self, claim: &Claim, leaf_type: LeafType) -> Result<ScopeKey> {
        if claim.destination_network != self.config.network_id {
            return Err(LedgerError::DestinationNetworkInvalid {
                network: claim.destination_network,
                own_network: self.config.network_id,
            });
        }

        let global_exit_root =
            GlobalExitRoot::new(claim.mainnet_exit_root, claim.rollup_exit_root).hash::<H>();
        if !read(&self.roots).is_known(&global_exit_root) {
            return Err(LedgerError::GlobalExitRootInvalid);
        }

        let leaf_hash = claim.leaf::<H>(leaf_type).hash::<H>();
        let index = claim.global_index;

        if index.mainnet_flag {
            if !verify_merkle_proof::<H>(
                leaf_hash,
                &claim.smt_proof_local_exit_root,
                index.leaf_index,
                claim.mainnet_exit_root,
            ) {
                return Err(LedgerError::InvalidSmtProof);
            }
            return Ok(ScopeKey::new(
                true,
                self.config.mainnet_network_id,
                index.leaf_index,
            ));
        }

        let local_exit_root =
            calculate_root::<H>(leaf_hash, &claim.smt_proof_local_exit_root, index.leaf_index);
        if !verify_merkle_proof::<H>(
            local_exit_root,
            &claim.smt_proof_rollup_exit_root,
            index.rollup_index,
            claim.rollup_exit_root,
        ) {
            return Err(LedgerError::InvalidSmtProof);
        }
        let source_network = rollup_network_id(index.rollup_index)?;
        Ok(ScopeKey::new(false, source_network, index.leaf_index))
    }

    fn ensure_unclaimed(&self, key: ScopeKey) -> Result<()> {
        if lock(&self.claimed).is_claimed(key) {
            return Err(LedgerError::AlreadyClaimed);
        }
        Ok(())
    }

    fn finish_claim(&self, key: ScopeKey, claim: &Claim) -> Result<()> {
        lock(&self.claimed).mark_claimed(key)?;

        debug!(
            global_index = %claim.global_index,
            origin_network = claim.origin_network,
            destination = %claim.destination_address,
            amount = %claim.amount,
            "Claim applied"
        );

        self.emit(LedgerEvent::Claim(ClaimEvent {
            global_index: claim.global_index.to_u256(),
            origin_network: claim.origin_network,
            origin_address: claim.origin_address,
            destination_address: claim.destination_address,
            amount: claim.amount,
        }));
        Ok(())
    }
}

/// Network id of the rollup at `rollup_index`.
pub fn rollup_network_id(rollup_index: u32) -> Result<u32> {
    rollup_index
        .checked_add(1)
        .ok_or(LedgerError::GlobalIndexInvalid)
}

/// Rollup index of a non-mainnet network.
pub fn rollup_index_of(network_id: u32) -> Option<u32> {
    network_id.checked_sub(1)
}
