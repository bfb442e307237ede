//! Read-only views of ledger state.

use alloy_primitives::{Address, B256};

use super::claim::rollup_network_id;
use super::{lock, read, BridgeLedger};
use crate::config::{Capabilities, LedgerConfig};
use crate::error::{LedgerError, Result};
use crate::events::{EventBatch, EventSource, SourceError};
use crate::execution::ExecutionEnvironment;
use crate::global_exit_root::ExitRootManager;
use crate::hash::NodeHasher;
use crate::replay_guard::ScopeKey;
use crate::types::{GlobalIndex, SmtProof, TokenInfo};

impl<E: ExecutionEnvironment, H: NodeHasher> BridgeLedger<E, H> {
    pub fn network_id(&self) -> u32 {
        self.config.network_id
    }

    pub fn bridge_address(&self) -> Address {
        self.config.bridge_address
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Capabilities {
        self.config.capabilities()
    }

    /// Wrapped ether on gas token networks.
    pub fn weth_token(&self) -> Option<Address> {
        self.weth_token
    }

    pub fn is_emergency_state(&self) -> bool {
        *read(&self.emergency)
    }

    // ========================================================================
    // Exit Tree
    // ========================================================================

    /// Root of the local exit tree.
    pub fn get_root(&self) -> B256 {
        lock(&self.deposits).tree.root()
    }

    pub fn deposit_count(&self) -> u64 {
        lock(&self.deposits).tree.deposit_count()
    }

    /// Deposit count at the last local root publication.
    pub fn last_updated_deposit_count(&self) -> u64 {
        lock(&self.deposits).last_updated_deposit_count
    }

    /// Proof of leaf `index` against the current root.
    pub fn proof(&self, index: u32) -> Result<SmtProof> {
        lock(&self.deposits).tree.proof(index)
    }

    /// Proof of leaf `index` against the root the tree had at `deposit_count`.
    pub fn proof_at(&self, index: u32, deposit_count: u64) -> Result<SmtProof> {
        lock(&self.deposits).tree.proof_at(index, deposit_count)
    }

    pub fn root_at(&self, deposit_count: u64) -> Result<B256> {
        lock(&self.deposits).tree.root_at(deposit_count)
    }

    // ========================================================================
    // Claims
    // ========================================================================

    /// Whether leaf `leaf_index` of `source_network` has been claimed here.
    ///
    /// Leaves of the mainnet network are keyed under the mainnet flag, every
    /// other network under its own id.
    pub fn is_claimed(&self, leaf_index: u32, source_network: u32) -> bool {
        let mainnet_flag = source_network == self.config.mainnet_network_id;
        lock(&self.claimed).is_claimed(ScopeKey::new(mainnet_flag, source_network, leaf_index))
    }

    pub fn is_claimed_global(&self, global_index: GlobalIndex) -> Result<bool> {
        let key = if global_index.mainnet_flag {
            ScopeKey::new(true, self.config.mainnet_network_id, global_index.leaf_index)
        } else {
            ScopeKey::new(
                false,
                rollup_network_id(global_index.rollup_index)?,
                global_index.leaf_index,
            )
        };
        Ok(lock(&self.claimed).is_claimed(key))
    }

    // ========================================================================
    // Wrapped Tokens
    // ========================================================================

    pub fn get_token_wrapped_address(
        &self,
        origin_network: u32,
        origin_token: &Address,
    ) -> Option<Address> {
        read(&self.wrapped).resolve(origin_network, origin_token)
    }

    pub fn wrapped_token_info(&self, wrapped: &Address) -> Option<TokenInfo> {
        read(&self.wrapped).token_info(wrapped)
    }

    pub fn precalculated_wrapper_address(
        &self,
        origin_network: u32,
        origin_token: &Address,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Address {
        read(&self.wrapped).compute_wrapped_address(
            origin_network,
            origin_token,
            name,
            symbol,
            decimals,
        )
    }

    pub fn wrapped_token_count(&self) -> usize {
        read(&self.wrapped).len()
    }

    // ========================================================================
    // Global Exit Roots
    // ========================================================================

    pub fn is_global_exit_root_known(&self, global_exit_root: &B256) -> bool {
        read(&self.roots).is_known(global_exit_root)
    }

    pub fn global_exit_root_timestamp(&self, global_exit_root: &B256) -> Option<u64> {
        read(&self.roots).timestamp(global_exit_root)
    }

    pub fn known_global_exit_root_count(&self) -> usize {
        read(&self.roots).known_count()
    }

    /// Latest published mainnet exit root. `None` on replicas.
    pub fn mainnet_exit_root(&self) -> Option<B256> {
        match &*read(&self.roots) {
            ExitRootManager::Authority(aggregator) => Some(aggregator.mainnet_exit_root()),
            ExitRootManager::Replica(_) => None,
        }
    }

    /// Latest published rollup exit root. `None` on replicas.
    pub fn rollup_exit_root(&self) -> Option<B256> {
        match &*read(&self.roots) {
            ExitRootManager::Authority(aggregator) => Some(aggregator.rollup_exit_root()),
            ExitRootManager::Replica(_) => None,
        }
    }

    /// Proof of a rollup's local exit root against the rollup exit root.
    pub fn rollup_proof(&self, rollup_index: u32) -> Result<SmtProof> {
        match &*read(&self.roots) {
            ExitRootManager::Authority(aggregator) => aggregator.rollup_proof(rollup_index),
            ExitRootManager::Replica(_) => Err(LedgerError::OnlyAggregatorAuthority),
        }
    }

    pub fn l1_info_root(&self) -> Option<B256> {
        match &*read(&self.roots) {
            ExitRootManager::Authority(aggregator) => Some(aggregator.l1_info_root()),
            ExitRootManager::Replica(_) => None,
        }
    }

    pub fn last_global_exit_root(&self) -> Option<B256> {
        match &*read(&self.roots) {
            ExitRootManager::Authority(aggregator) => aggregator.last_global_exit_root(),
            ExitRootManager::Replica(_) => None,
        }
    }

    /// Local exit root last handed to the authority. `None` on the authority,
    /// whose local root is the mainnet exit root.
    pub fn last_local_exit_root(&self) -> Option<B256> {
        match &*read(&self.roots) {
            ExitRootManager::Authority(_) => None,
            ExitRootManager::Replica(replica) => Some(replica.last_local_exit_root()),
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    pub fn events_since(
        &self,
        from: u64,
        limit: usize,
    ) -> std::result::Result<EventBatch, SourceError> {
        lock(&self.journal).since(from, limit)
    }

    /// Cursor the next event will get.
    pub fn event_head(&self) -> u64 {
        lock(&self.journal).head()
    }
}

impl<E: ExecutionEnvironment, H: NodeHasher> EventSource for &BridgeLedger<E, H> {
    fn fetch(&mut self, from: u64, limit: usize) -> std::result::Result<EventBatch, SourceError> {
        self.events_since(from, limit)
    }
}
