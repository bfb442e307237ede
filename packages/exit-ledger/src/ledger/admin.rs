//! Administrative handlers: emergency state and global exit root feeds.

use alloy_primitives::B256;
use tracing::{info, warn};

use super::{lock, write, BridgeLedger};
use crate::error::{LedgerError, Result};
use crate::events::{EventBatch, LedgerEvent, UpdateL1InfoTree};
use crate::execution::ExecutionEnvironment;
use crate::global_exit_root::{ExitRootManager, GlobalExitRoot, L1InfoUpdate, PublishOutcome};
use crate::hash::NodeHasher;
use crate::types::BlockContext;

pub(super) fn l1_info_event(
    outcome: &PublishOutcome,
    update: L1InfoUpdate,
    timestamp: u64,
) -> LedgerEvent {
    LedgerEvent::UpdateL1InfoTree(UpdateL1InfoTree {
        mainnet_exit_root: outcome.roots.mainnet_exit_root,
        rollup_exit_root: outcome.roots.rollup_exit_root,
        global_exit_root: outcome.global_exit_root,
        l1_info_index: update.leaf_index,
        l1_info_root: update.l1_info_root,
        timestamp,
    })
}

impl<E: ExecutionEnvironment, H: NodeHasher> BridgeLedger<E, H> {
    // ========================================================================
    // Emergency State
    // ========================================================================

    /// Stop deposits and claims. Waits for in-flight operations to finish.
    pub fn activate_emergency_state(&self) -> Result<()> {
        let mut emergency = write(&self.emergency);
        if *emergency {
            return Err(LedgerError::OnlyNotEmergencyState);
        }
        *emergency = true;
        self.emit(LedgerEvent::EmergencyStateActivated);

        warn!(network_id = self.config.network_id, "Emergency state activated");
        Ok(())
    }

    pub fn deactivate_emergency_state(&self) -> Result<()> {
        let mut emergency = write(&self.emergency);
        if !*emergency {
            return Err(LedgerError::OnlyEmergencyState);
        }
        *emergency = false;
        self.emit(LedgerEvent::EmergencyStateDeactivated);

        info!(network_id = self.config.network_id, "Emergency state deactivated");
        Ok(())
    }

    // ========================================================================
    // Global Exit Root Updates
    // ========================================================================

    /// Publish the current local exit root.
    ///
    /// On the authority this commits a global exit root; on a replica it only
    /// refreshes the local root the authority reads. Returns the global exit
    /// root when one was published.
    pub fn update_global_exit_root(&self, ctx: &BlockContext) -> Result<Option<B256>> {
        let mut state = lock(&self.deposits);
        self.publish_local_root(&mut state, ctx)
    }

    /// Record a peer network's local exit root (authority only).
    pub fn update_rollup_exit_root(
        &self,
        rollup_index: u32,
        local_exit_root: B256,
        ctx: &BlockContext,
    ) -> Result<B256> {
        let mut roots = write(&self.roots);
        let ExitRootManager::Authority(aggregator) = &mut *roots else {
            return Err(LedgerError::OnlyAggregatorAuthority);
        };

        let outcome = aggregator.update_rollup_exit_root(rollup_index, local_exit_root, ctx)?;
        if let Some(update) = outcome.l1_info {
            self.emit(l1_info_event(&outcome, update, ctx.timestamp));
        }
        Ok(outcome.global_exit_root)
    }

    /// Learn a global exit root published by the authority (replica only).
    ///
    /// Returns false when the root was already known; the first timestamp wins.
    pub fn import_global_exit_root(
        &self,
        mainnet_exit_root: B256,
        rollup_exit_root: B256,
        timestamp: u64,
    ) -> Result<bool> {
        let global_exit_root =
            GlobalExitRoot::new(mainnet_exit_root, rollup_exit_root).hash::<H>();

        let mut roots = write(&self.roots);
        let ExitRootManager::Replica(replica) = &mut *roots else {
            return Err(LedgerError::OnlyReplica);
        };
        Ok(replica.import(global_exit_root, timestamp))
    }

    /// Import every global exit root announced in an authority event batch.
    ///
    /// Returns how many roots were new.
    pub fn ingest_peer_events(&self, batch: &EventBatch) -> Result<usize> {
        let mut imported = 0;
        for entry in &batch.entries {
            if let LedgerEvent::UpdateL1InfoTree(update) = &entry.event {
                if self.import_global_exit_root(
                    update.mainnet_exit_root,
                    update.rollup_exit_root,
                    update.timestamp,
                )? {
                    imported += 1;
                }
            }
        }
        if imported > 0 {
            info!(imported, next_cursor = batch.next_cursor, "Imported global exit roots");
        }
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::LedgerConfig;
    use crate::events::SourceError;
    use crate::execution::InMemoryExecutor;
    use crate::ledger::AssetDeposit;
    use alloy_primitives::{Address, U256};
    use std::sync::Arc;

    fn deposit(amount: u64) -> AssetDeposit {
        AssetDeposit {
            destination_network: 1,
            destination_address: BOB,
            amount: U256::from(amount),
            token: Address::ZERO,
            value: U256::from(amount),
            force_update_global_exit_root: false,
            permit: None,
        }
    }

    #[test]
    fn test_emergency_state_blocks_deposits() {
        let (ledger, executor) = authority();
        executor.mint(Address::ZERO, ALICE, U256::from(10u64));

        ledger.activate_emergency_state().unwrap();
        assert!(ledger.is_emergency_state());
        assert_eq!(
            ledger.bridge_asset(ALICE, deposit(1), &ctx(1)),
            Err(LedgerError::OnlyNotEmergencyState)
        );
        assert_eq!(
            ledger.activate_emergency_state(),
            Err(LedgerError::OnlyNotEmergencyState)
        );

        ledger.deactivate_emergency_state().unwrap();
        assert!(ledger.bridge_asset(ALICE, deposit(1), &ctx(1)).is_ok());
        assert_eq!(
            ledger.deactivate_emergency_state(),
            Err(LedgerError::OnlyEmergencyState)
        );
    }

    #[test]
    fn test_emergency_events_journaled() {
        let (ledger, _) = authority();
        ledger.activate_emergency_state().unwrap();
        ledger.deactivate_emergency_state().unwrap();

        let names: Vec<_> = ledger
            .events_since(0, 10)
            .unwrap()
            .entries
            .iter()
            .map(|entry| entry.event.name())
            .collect();
        assert_eq!(
            names,
            vec!["EmergencyStateActivated", "EmergencyStateDeactivated"]
        );
    }

    #[test]
    fn test_journal_retention_from_config() {
        let executor = Arc::new(InMemoryExecutor::new(BRIDGE_A));
        let config = LedgerConfig::authority(0, BRIDGE_A).with_journal_retention(1);
        let ledger: TestLedger = BridgeLedger::new(config, executor).unwrap();
        ledger.activate_emergency_state().unwrap();
        ledger.deactivate_emergency_state().unwrap();

        assert_eq!(ledger.event_head(), 2);
        assert_eq!(
            ledger.events_since(0, 10),
            Err(SourceError::CursorPruned { cursor: 0, oldest: 1 })
        );
        let batch = ledger.events_since(1, 10).unwrap();
        assert_eq!(batch.entries[0].event.name(), "EmergencyStateDeactivated");

        let config = LedgerConfig::authority(0, BRIDGE_A).with_journal_retention(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_root_feeds_work_during_emergency() {
        let (ledger, _) = authority();
        ledger.activate_emergency_state().unwrap();
        assert!(ledger.update_global_exit_root(&ctx(5)).unwrap().is_some());
    }

    #[test]
    fn test_update_global_exit_root_idempotent() {
        let (ledger, executor) = authority();
        executor.mint(Address::ZERO, ALICE, U256::from(10u64));
        ledger.bridge_asset(ALICE, deposit(1), &ctx(1)).unwrap();

        let first = ledger.update_global_exit_root(&ctx(2)).unwrap().unwrap();
        let second = ledger.update_global_exit_root(&ctx(3)).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(ledger.global_exit_root_timestamp(&first), Some(2));
        assert_eq!(ledger.last_updated_deposit_count(), 1);
        assert_eq!(ledger.known_global_exit_root_count(), 1);
    }

    #[test]
    fn test_replica_update_tracks_local_root() {
        let (ledger, executor) = replica();
        executor.mint(Address::ZERO, ALICE, U256::from(10u64));
        ledger
            .bridge_asset(
                ALICE,
                AssetDeposit {
                    destination_network: 0,
                    ..deposit(1)
                },
                &ctx(1),
            )
            .unwrap();

        assert_eq!(ledger.update_global_exit_root(&ctx(2)), Ok(None));
        assert_eq!(ledger.last_local_exit_root(), Some(ledger.get_root()));
        assert_eq!(ledger.known_global_exit_root_count(), 0);
    }

    #[test]
    fn test_role_restricted_feeds() {
        let (authority, _) = authority();
        let (replica, _) = replica();

        assert_eq!(
            authority.import_global_exit_root(B256::ZERO, B256::ZERO, 1),
            Err(LedgerError::OnlyReplica)
        );
        assert_eq!(
            replica.update_rollup_exit_root(0, B256::repeat_byte(1), &ctx(1)),
            Err(LedgerError::OnlyAggregatorAuthority)
        );
    }

    #[test]
    fn test_rollup_update_publishes() {
        let (ledger, _) = authority();
        let ger = ledger
            .update_rollup_exit_root(0, B256::repeat_byte(1), &ctx(4))
            .unwrap();
        assert!(ledger.is_global_exit_root_known(&ger));
        assert_eq!(ledger.last_global_exit_root(), Some(ger));
        assert_ne!(ledger.rollup_exit_root(), Some(B256::ZERO));
    }

    #[test]
    fn test_ingest_peer_events() {
        let (authority, _) = authority();
        let (replica, _) = replica();

        authority.update_global_exit_root(&ctx(1)).unwrap();
        authority
            .update_rollup_exit_root(0, B256::repeat_byte(1), &ctx(2))
            .unwrap();

        let batch = authority.events_since(0, 100).unwrap();
        assert_eq!(replica.ingest_peer_events(&batch), Ok(2));
        assert_eq!(replica.ingest_peer_events(&batch), Ok(0));

        let latest = authority.last_global_exit_root().unwrap();
        assert!(replica.is_global_exit_root_known(&latest));
        assert_eq!(replica.global_exit_root_timestamp(&latest), Some(2));
    }
}
