//! Global exit root management
//!
//! A global exit root is `H(mainnetExitRoot ‖ rollupExitRoot)`. The
//! aggregator authority computes it, records when it was first seen and
//! commits each new one into an L1-info tree. Consumer networks run a
//! [`GlobalExitRootReplica`] that only learns roots from an external feed.

use std::collections::HashMap;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{LedgerError, Result};
use crate::exit_tree::ExitTree;
use crate::hash::{Keccak256, NodeHasher};
use crate::types::{BlockContext, SmtProof};

/// Upper bound on rollup indexes tracked by the aggregator.
pub const MAX_TRACKED_ROLLUPS: u32 = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalExitRoot {
    pub mainnet_exit_root: B256,
    pub rollup_exit_root: B256,
}

impl GlobalExitRoot {
    pub fn new(mainnet_exit_root: B256, rollup_exit_root: B256) -> Self {
        Self {
            mainnet_exit_root,
            rollup_exit_root,
        }
    }

    pub fn hash<H: NodeHasher>(&self) -> B256 {
        H::hash_pair(&self.mainnet_exit_root, &self.rollup_exit_root)
    }
}

/// Leaf of the L1-info tree: `H(globalExitRoot ‖ blockHash ‖ be64(timestamp))`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct L1InfoLeaf {
    pub global_exit_root: B256,
    pub block_hash: B256,
    pub timestamp: u64,
}

impl L1InfoLeaf {
    pub fn encode(&self) -> [u8; 72] {
        let mut data = [0u8; 72];
        data[0..32].copy_from_slice(self.global_exit_root.as_slice());
        data[32..64].copy_from_slice(self.block_hash.as_slice());
        data[64..72].copy_from_slice(&self.timestamp.to_be_bytes());
        data
    }

    pub fn hash<H: NodeHasher>(&self) -> B256 {
        H::hash(&self.encode())
    }
}

/// First-seen metadata of a published global exit root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalExitRootRecord {
    pub roots: GlobalExitRoot,
    pub timestamp: u64,
    pub l1_info_index: u32,
}

/// Result of a publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub global_exit_root: B256,
    pub roots: GlobalExitRoot,
    /// Set when the root was new and a leaf was added to the L1-info tree.
    pub l1_info: Option<L1InfoUpdate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L1InfoUpdate {
    pub leaf_index: u32,
    pub l1_info_root: B256,
}

// ============================================================================
// Rollup Exit Roots
// ============================================================================

/// Latest local exit root of each peer network, indexed by rollup index.
///
/// The rollup exit root is the depth-32 Merkle root over these values; peers
/// that never reported contribute a zero leaf.
#[derive(Debug, Clone, Default)]
pub struct RollupExitRoots {
    local_roots: Vec<B256>,
}

impl RollupExitRoots {
    pub fn set(&mut self, rollup_index: u32, local_exit_root: B256) -> Result<()> {
        if rollup_index >= MAX_TRACKED_ROLLUPS {
            return Err(LedgerError::InvalidConfig {
                reason: format!("rollup index {rollup_index} exceeds {MAX_TRACKED_ROLLUPS}"),
            });
        }
        let index = rollup_index as usize;
        if index >= self.local_roots.len() {
            self.local_roots.resize(index + 1, B256::ZERO);
        }
        self.local_roots[index] = local_exit_root;
        Ok(())
    }

    pub fn get(&self, rollup_index: u32) -> Option<B256> {
        self.local_roots.get(rollup_index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.local_roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_roots.is_empty()
    }

    /// Zero while no peer has reported.
    pub fn root<H: NodeHasher>(&self) -> Result<B256> {
        if self.local_roots.is_empty() {
            return Ok(B256::ZERO);
        }
        Ok(self.tree::<H>()?.root())
    }

    pub fn proof<H: NodeHasher>(&self, rollup_index: u32) -> Result<SmtProof> {
        self.tree::<H>()?.proof(rollup_index)
    }

    fn tree<H: NodeHasher>(&self) -> Result<ExitTree<H>> {
        ExitTree::from_leaves(self.local_roots.iter().copied())
    }
}

// ============================================================================
// Aggregator (authority mode)
// ============================================================================

#[derive(Debug, Clone)]
pub struct GlobalExitRootAggregator<H: NodeHasher = Keccak256> {
    mainnet_exit_root: B256,
    rollup_exit_root: B256,
    rollup_roots: RollupExitRoots,
    last_global_exit_root: Option<B256>,
    registry: HashMap<B256, GlobalExitRootRecord>,
    l1_info_tree: ExitTree<H>,
}

impl<H: NodeHasher> Default for GlobalExitRootAggregator<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: NodeHasher> GlobalExitRootAggregator<H> {
    pub fn new() -> Self {
        Self {
            mainnet_exit_root: B256::ZERO,
            rollup_exit_root: B256::ZERO,
            rollup_roots: RollupExitRoots::default(),
            last_global_exit_root: None,
            registry: HashMap::new(),
            l1_info_tree: ExitTree::new(),
        }
    }

    /// Record `H(mainnet ‖ rollup)` as the latest global exit root.
    ///
    /// The first publish of a given root stores its timestamp and appends one
    /// L1-info leaf. Publishing an already known root only moves the latest
    /// pointer.
    pub fn publish(
        &mut self,
        mainnet_exit_root: B256,
        rollup_exit_root: B256,
        ctx: &BlockContext,
    ) -> Result<PublishOutcome> {
        let roots = GlobalExitRoot::new(mainnet_exit_root, rollup_exit_root);
        let global_exit_root = roots.hash::<H>();

        let l1_info = if self.registry.contains_key(&global_exit_root) {
            debug!(%global_exit_root, "Global exit root already known");
            None
        } else {
            let leaf = L1InfoLeaf {
                global_exit_root,
                block_hash: ctx.block_hash,
                timestamp: ctx.timestamp,
            };
            let leaf_index = self.l1_info_tree.append(leaf.hash::<H>())?;
            self.registry.insert(
                global_exit_root,
                GlobalExitRootRecord {
                    roots,
                    timestamp: ctx.timestamp,
                    l1_info_index: leaf_index,
                },
            );
            info!(
                %global_exit_root,
                %mainnet_exit_root,
                %rollup_exit_root,
                leaf_index,
                "Published new global exit root"
            );
            Some(L1InfoUpdate {
                leaf_index,
                l1_info_root: self.l1_info_tree.root(),
            })
        };

        self.mainnet_exit_root = mainnet_exit_root;
        self.rollup_exit_root = rollup_exit_root;
        self.last_global_exit_root = Some(global_exit_root);

        Ok(PublishOutcome {
            global_exit_root,
            roots,
            l1_info,
        })
    }

    /// Publish with a new mainnet exit root and the current rollup exit root.
    pub fn update_mainnet_exit_root(
        &mut self,
        mainnet_exit_root: B256,
        ctx: &BlockContext,
    ) -> Result<PublishOutcome> {
        self.publish(mainnet_exit_root, self.rollup_exit_root, ctx)
    }

    /// Record a peer's local exit root and publish the resulting rollup exit root.
    pub fn update_rollup_exit_root(
        &mut self,
        rollup_index: u32,
        local_exit_root: B256,
        ctx: &BlockContext,
    ) -> Result<PublishOutcome> {
        let mut rollup_roots = self.rollup_roots.clone();
        rollup_roots.set(rollup_index, local_exit_root)?;
        let rollup_exit_root = rollup_roots.root::<H>()?;

        let outcome = self.publish(self.mainnet_exit_root, rollup_exit_root, ctx)?;
        self.rollup_roots = rollup_roots;
        Ok(outcome)
    }

    pub fn is_known(&self, global_exit_root: &B256) -> bool {
        self.registry.contains_key(global_exit_root)
    }

    pub fn record(&self, global_exit_root: &B256) -> Option<&GlobalExitRootRecord> {
        self.registry.get(global_exit_root)
    }

    pub fn known_count(&self) -> usize {
        self.registry.len()
    }

    pub fn mainnet_exit_root(&self) -> B256 {
        self.mainnet_exit_root
    }

    pub fn rollup_exit_root(&self) -> B256 {
        self.rollup_exit_root
    }

    pub fn last_global_exit_root(&self) -> Option<B256> {
        self.last_global_exit_root
    }

    pub fn rollup_roots(&self) -> &RollupExitRoots {
        &self.rollup_roots
    }

    pub fn rollup_proof(&self, rollup_index: u32) -> Result<SmtProof> {
        self.rollup_roots.proof::<H>(rollup_index)
    }

    pub fn l1_info_root(&self) -> B256 {
        self.l1_info_tree.root()
    }

    pub fn l1_info_count(&self) -> u64 {
        self.l1_info_tree.deposit_count()
    }

    pub fn is_l1_info_full(&self) -> bool {
        self.l1_info_tree.is_full()
    }

    pub fn l1_info_proof(&self, leaf_index: u32) -> Result<SmtProof> {
        self.l1_info_tree.proof(leaf_index)
    }
}

// ============================================================================
// Replica (consumer mode)
// ============================================================================

/// Global exit roots learned from the authority, plus this network's own
/// latest local exit root.
#[derive(Debug, Clone, Default)]
pub struct GlobalExitRootReplica {
    registry: HashMap<B256, u64>,
    last_local_exit_root: B256,
}

impl GlobalExitRootReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the root was not known before.
    pub fn import(&mut self, global_exit_root: B256, timestamp: u64) -> bool {
        if self.registry.contains_key(&global_exit_root) {
            return false;
        }
        self.registry.insert(global_exit_root, timestamp);
        debug!(%global_exit_root, timestamp, "Imported global exit root");
        true
    }

    pub fn is_known(&self, global_exit_root: &B256) -> bool {
        self.registry.contains_key(global_exit_root)
    }

    pub fn timestamp(&self, global_exit_root: &B256) -> Option<u64> {
        self.registry.get(global_exit_root).copied()
    }

    pub fn known_count(&self) -> usize {
        self.registry.len()
    }

    pub fn last_local_exit_root(&self) -> B256 {
        self.last_local_exit_root
    }

    /// Only the owning ledger moves this slot.
    pub(crate) fn set_last_local_exit_root(&mut self, root: B256) {
        self.last_local_exit_root = root;
    }
}

// ============================================================================
// Role dispatch
// ============================================================================

/// The global exit root store a ledger owns, chosen by its capabilities.
#[derive(Debug, Clone)]
pub enum ExitRootManager<H: NodeHasher = Keccak256> {
    Authority(GlobalExitRootAggregator<H>),
    Replica(GlobalExitRootReplica),
}

impl<H: NodeHasher> ExitRootManager<H> {
    pub fn for_role(is_aggregator_authority: bool) -> Self {
        if is_aggregator_authority {
            Self::Authority(GlobalExitRootAggregator::new())
        } else {
            Self::Replica(GlobalExitRootReplica::new())
        }
    }

    pub fn is_authority(&self) -> bool {
        matches!(self, Self::Authority(_))
    }

    pub fn is_known(&self, global_exit_root: &B256) -> bool {
        match self {
            Self::Authority(aggregator) => aggregator.is_known(global_exit_root),
            Self::Replica(replica) => replica.is_known(global_exit_root),
        }
    }

    /// First-seen timestamp of a known global exit root.
    pub fn timestamp(&self, global_exit_root: &B256) -> Option<u64> {
        match self {
            Self::Authority(aggregator) => aggregator.record(global_exit_root).map(|r| r.timestamp),
            Self::Replica(replica) => replica.timestamp(global_exit_root),
        }
    }

    pub fn known_count(&self) -> usize {
        match self {
            Self::Authority(aggregator) => aggregator.known_count(),
            Self::Replica(replica) => replica.known_count(),
        }
    }

    /// Fails when a new global exit root could not be committed.
    pub(crate) fn ensure_can_publish(&self) -> Result<()> {
        match self {
            Self::Authority(aggregator) if aggregator.is_l1_info_full() => {
                Err(LedgerError::MerkleTreeFull)
            }
            _ => Ok(()),
        }
    }

    /// Hand the ledger's new local exit root to the store.
    ///
    /// The authority publishes it as the mainnet exit root; a replica just
    /// remembers it for the authority to pick up.
    pub(crate) fn record_local_exit_root(
        &mut self,
        local_exit_root: B256,
        ctx: &BlockContext,
    ) -> Result<Option<PublishOutcome>> {
        match self {
            Self::Authority(aggregator) => aggregator
                .update_mainnet_exit_root(local_exit_root, ctx)
                .map(Some),
            Self::Replica(replica) => {
                replica.set_last_local_exit_root(local_exit_root);
                Ok(None)
            }
        }
    }
}
