//! Incremental sparse Merkle tree of fixed depth 32
//!
//! The tree keeps a frontier of one cached node per level, so appending and
//! computing the root are both O(depth) regardless of how many leaves exist.
//! Empty subtrees hash to the zero-hash ladder `Z[0] = 0x00..00`,
//! `Z[i] = H(Z[i-1] ‖ Z[i-1])`.
//!
//! Proof generation needs more than the frontier. A tree created with
//! [`ExitTree::new`] also retains every node it has computed (about two
//! hashes per leaf) and can answer proofs against the current state or any
//! past deposit count. A tree restored from a [`TreeSnapshot`] only has the
//! frontier and reports [`LedgerError::ProofHistoryUnavailable`].

use std::marker::PhantomData;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::hash::{Keccak256, NodeHasher};
use crate::types::{SmtProof, TREE_DEPTH};

/// Number of leaves a depth-32 tree can hold.
pub const MAX_DEPOSIT_COUNT: u64 = 1 << TREE_DEPTH;

/// `Z[0..=32]`, the roots of empty subtrees of every height.
pub fn zero_hashes<H: NodeHasher>() -> [B256; TREE_DEPTH + 1] {
    let mut zeros = [B256::ZERO; TREE_DEPTH + 1];
    for height in 1..=TREE_DEPTH {
        zeros[height] = H::hash_pair(&zeros[height - 1], &zeros[height - 1]);
    }
    zeros
}

/// Fold a leaf up its sibling path. Bit `i` of `index` selects whether the
/// sibling at height `i` sits on the left (1) or the right (0).
pub fn calculate_root<H: NodeHasher>(leaf: B256, proof: &SmtProof, index: u32) -> B256 {
    let mut node = leaf;
    for (height, sibling) in proof.iter().enumerate() {
        node = if (index >> height) & 1 == 1 {
            H::hash_pair(sibling, &node)
        } else {
            H::hash_pair(&node, sibling)
        };
    }
    node
}

pub fn verify_merkle_proof<H: NodeHasher>(
    leaf: B256,
    proof: &SmtProof,
    index: u32,
    root: B256,
) -> bool {
    calculate_root::<H>(leaf, proof, index) == root
}

/// The O(depth) state of a tree, enough to keep appending after a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub frontier: [B256; TREE_DEPTH],
    pub deposit_count: u64,
    /// Root of the completed tree once all 2^32 leaves are present.
    pub full_root: Option<B256>,
}

#[derive(Debug, Clone)]
pub struct ExitTree<H: NodeHasher = Keccak256> {
    frontier: [B256; TREE_DEPTH],
    full_root: Option<B256>,
    deposit_count: u64,
    zero_hashes: [B256; TREE_DEPTH + 1],
    history: Option<NodeHistory>,
    _hasher: PhantomData<fn() -> H>,
}

impl<H: NodeHasher> Default for ExitTree<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: NodeHasher> ExitTree<H> {
    /// Empty tree that retains history for proofs.
    pub fn new() -> Self {
        Self {
            history: Some(NodeHistory::new()),
            ..Self::without_history()
        }
    }

    /// Empty tree holding only the frontier.
    pub fn without_history() -> Self {
        Self {
            frontier: [B256::ZERO; TREE_DEPTH],
            full_root: None,
            deposit_count: 0,
            zero_hashes: zero_hashes::<H>(),
            history: None,
            _hasher: PhantomData,
        }
    }

    /// Build a history-retaining tree from leaves in order.
    pub fn from_leaves<I: IntoIterator<Item = B256>>(leaves: I) -> Result<Self> {
        let mut tree = Self::new();
        for leaf in leaves {
            tree.append(leaf)?;
        }
        Ok(tree)
    }

    /// Restore a frontier-only tree.
    pub fn from_snapshot(snapshot: TreeSnapshot) -> Result<Self> {
        if snapshot.deposit_count > MAX_DEPOSIT_COUNT {
            return Err(LedgerError::InvalidConfig {
                reason: format!("deposit count {} exceeds 2^32", snapshot.deposit_count),
            });
        }
        if snapshot.full_root.is_some() != (snapshot.deposit_count == MAX_DEPOSIT_COUNT) {
            return Err(LedgerError::InvalidConfig {
                reason: "full root must be present exactly when the tree is full".to_string(),
            });
        }

        Ok(Self {
            frontier: snapshot.frontier,
            full_root: snapshot.full_root,
            deposit_count: snapshot.deposit_count,
            ..Self::without_history()
        })
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            frontier: self.frontier,
            deposit_count: self.deposit_count,
            full_root: self.full_root,
        }
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposit_count
    }

    pub fn is_full(&self) -> bool {
        self.deposit_count >= MAX_DEPOSIT_COUNT
    }

    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    pub fn zero_hash(&self, height: usize) -> B256 {
        self.zero_hashes[height]
    }

    /// Append a leaf hash and return its index.
    ///
    /// A full tree rejects the append and is left untouched.
    pub fn append(&mut self, leaf: B256) -> Result<u32> {
        if self.is_full() {
            return Err(LedgerError::MerkleTreeFull);
        }

        let index = self.deposit_count;
        let size = index + 1;

        let mut node = leaf;
        let mut placed = false;
        for height in 0..TREE_DEPTH {
            if (size >> height) & 1 == 1 {
                self.frontier[height] = node;
                placed = true;
                break;
            }
            node = H::hash_pair(&self.frontier[height], &node);
        }
        if !placed {
            // Only the 2^32-th leaf completes every level.
            self.full_root = Some(node);
        }

        self.deposit_count = size;
        if let Some(history) = self.history.as_mut() {
            history.push::<H>(leaf, &self.zero_hashes);
        }

        Ok(index as u32)
    }

    /// Current root, folded from the frontier.
    pub fn root(&self) -> B256 {
        if let Some(root) = self.full_root {
            return root;
        }

        let mut node = self.zero_hashes[0];
        for height in 0..TREE_DEPTH {
            node = if (self.deposit_count >> height) & 1 == 1 {
                H::hash_pair(&self.frontier[height], &node)
            } else {
                H::hash_pair(&node, &self.zero_hashes[height])
            };
        }
        node
    }

    /// Proof of `index` against the current root.
    pub fn proof(&self, index: u32) -> Result<SmtProof> {
        self.proof_at(index, self.deposit_count)
    }

    /// Proof of `index` against the root the tree had at `deposit_count`.
    pub fn proof_at(&self, index: u32, deposit_count: u64) -> Result<SmtProof> {
        if deposit_count > self.deposit_count || u64::from(index) >= deposit_count {
            return Err(LedgerError::LeafIndexOutOfRange {
                index: u64::from(index),
                deposit_count,
            });
        }
        let history = self
            .history
            .as_ref()
            .ok_or(LedgerError::ProofHistoryUnavailable)?;

        let mut proof = [B256::ZERO; TREE_DEPTH];
        for (height, sibling) in proof.iter_mut().enumerate() {
            let position = (u64::from(index) >> height) ^ 1;
            *sibling = history.subtree_root::<H>(height, position, deposit_count, &self.zero_hashes);
        }
        Ok(proof)
    }

    /// Root the tree had when it held `deposit_count` leaves.
    pub fn root_at(&self, deposit_count: u64) -> Result<B256> {
        if deposit_count > self.deposit_count {
            return Err(LedgerError::LeafIndexOutOfRange {
                index: deposit_count,
                deposit_count: self.deposit_count,
            });
        }
        if deposit_count == self.deposit_count {
            return Ok(self.root());
        }
        let history = self
            .history
            .as_ref()
            .ok_or(LedgerError::ProofHistoryUnavailable)?;
        Ok(history.subtree_root::<H>(TREE_DEPTH, 0, deposit_count, &self.zero_hashes))
    }

    /// Leaf hash stored at `index`, when history is retained.
    pub fn leaf(&self, index: u32) -> Option<B256> {
        self.history
            .as_ref()
            .and_then(|history| history.levels[0].get(index as usize).copied())
    }
}

/// Every node computed so far, level by level. `levels[h][p]` is the root of
/// the subtree of height `h` at position `p`, with missing leaves treated as
/// empty at the time of the last write.
#[derive(Debug, Clone)]
struct NodeHistory {
    levels: Vec<Vec<B256>>,
}

impl NodeHistory {
    fn new() -> Self {
        Self {
            levels: vec![Vec::new(); TREE_DEPTH + 1],
        }
    }

    fn push<H: NodeHasher>(&mut self, leaf: B256, zeros: &[B256; TREE_DEPTH + 1]) {
        let mut position = self.levels[0].len();
        self.levels[0].push(leaf);

        for height in 1..=TREE_DEPTH {
            let parent = position >> 1;
            let below = &self.levels[height - 1];
            let left = below[parent * 2];
            let right = below
                .get(parent * 2 + 1)
                .copied()
                .unwrap_or(zeros[height - 1]);
            let node = H::hash_pair(&left, &right);

            let level = &mut self.levels[height];
            if parent < level.len() {
                level[parent] = node;
            } else {
                level.push(node);
            }
            position = parent;
        }
    }

    /// Root of subtree (`height`, `position`) counting only the first `count` leaves.
    fn subtree_root<H: NodeHasher>(
        &self,
        height: usize,
        position: u64,
        count: u64,
        zeros: &[B256; TREE_DEPTH + 1],
    ) -> B256 {
        let start = position << height;
        let end = start + (1u64 << height);

        if start >= count {
            return zeros[height];
        }
        if end <= count {
            return self.levels[height][position as usize];
        }

        // Partially filled at `count`; a single leaf is never partial.
        let left = self.subtree_root::<H>(height - 1, position * 2, count, zeros);
        let right = self.subtree_root::<H>(height - 1, position * 2 + 1, count, zeros);
        H::hash_pair(&left, &right)
    }
}
