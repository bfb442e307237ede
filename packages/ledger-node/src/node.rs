//! Ledger hosted by the node, with metrics and sync status attached

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use eyre::{eyre, Result};
use exit_ledger::{
    AssetDeposit, BridgeLedger, Claim, ClaimReceipt, DepositReceipt, EventBatch, InMemoryExecutor,
    LeafType, LedgerError, MessageDeposit,
};
use tracing::{info, warn};

use crate::clock::BlockClock;
use crate::config::Config;
use crate::metrics::Metrics;

pub type Ledger = BridgeLedger<Arc<InMemoryExecutor>>;

pub struct Node {
    pub config: Config,
    pub ledger: Ledger,
    pub executor: Arc<InMemoryExecutor>,
    pub clock: BlockClock,
    pub metrics: Metrics,
    sync_cursor: AtomicU64,
    last_sync_ok: AtomicBool,
}

pub type SharedNode = Arc<Node>;

impl Node {
    pub fn new(config: Config) -> Result<Self> {
        let executor = Arc::new(InMemoryExecutor::new(config.bridge_address));
        let ledger = BridgeLedger::new(config.ledger_config(), executor.clone())
            .map_err(|e| eyre!("Failed to create ledger: {}", e))?;

        Ok(Self {
            config,
            ledger,
            executor,
            clock: BlockClock::default(),
            metrics: Metrics::new(),
            sync_cursor: AtomicU64::new(0),
            last_sync_ok: AtomicBool::new(false),
        })
    }

    pub fn bridge_asset(
        &self,
        sender: Address,
        deposit: AssetDeposit,
    ) -> Result<DepositReceipt, LedgerError> {
        let result = self.ledger.bridge_asset(sender, deposit, &self.clock.next());
        self.record_deposit(LeafType::Asset, &result);
        result
    }

    pub fn bridge_message(
        &self,
        sender: Address,
        deposit: MessageDeposit,
    ) -> Result<DepositReceipt, LedgerError> {
        let result = self.ledger.bridge_message(sender, deposit, &self.clock.next());
        self.record_deposit(LeafType::Message, &result);
        result
    }

    pub fn claim(&self, leaf_type: LeafType, claim: &Claim) -> Result<ClaimReceipt, LedgerError> {
        let result = match leaf_type {
            LeafType::Asset => self.ledger.claim_asset(claim),
            LeafType::Message => self.ledger.claim_message(claim),
        };
        match &result {
            Ok(_) => {
                self.metrics
                    .claims_total
                    .with_label_values(&[leaf_type_label(leaf_type)])
                    .inc();
            }
            Err(e) => {
                warn!(
                    global_index = %claim.global_index,
                    origin_network = claim.origin_network,
                    code = e.code(),
                    error = %e,
                    "Claim rejected"
                );
                self.metrics
                    .rejections_total
                    .with_label_values(&["claim", e.code()])
                    .inc();
            }
        }
        result
    }

    /// Publish the local exit root if deposits arrived since the last update.
    pub fn update_global_exit_root(&self, force: bool) -> Result<Option<B256>, LedgerError> {
        if !force && self.ledger.deposit_count() == self.ledger.last_updated_deposit_count() {
            return Ok(None);
        }
        let before = self.ledger.known_global_exit_root_count();
        let published = self.ledger.update_global_exit_root(&self.clock.next())?;
        self.refresh_gauges();
        if self.ledger.known_global_exit_root_count() > before {
            self.metrics.global_exit_roots_published_total.inc();
        }
        Ok(published)
    }

    pub fn update_rollup_exit_root(
        &self,
        rollup_index: u32,
        local_exit_root: B256,
    ) -> Result<B256, LedgerError> {
        let before = self.ledger.known_global_exit_root_count();
        let root =
            self.ledger
                .update_rollup_exit_root(rollup_index, local_exit_root, &self.clock.next())?;
        self.refresh_gauges();
        if self.ledger.known_global_exit_root_count() > before {
            self.metrics.global_exit_roots_published_total.inc();
        }
        Ok(root)
    }

    /// Import the roots announced in an authority event batch and advance the cursor.
    pub fn ingest(&self, batch: &EventBatch) -> Result<usize, LedgerError> {
        let imported = self.ledger.ingest_peer_events(batch)?;
        self.metrics
            .global_exit_roots_imported_total
            .inc_by(imported as u64);
        self.sync_cursor.store(batch.next_cursor, Ordering::SeqCst);
        self.metrics.sync_cursor.set(batch.next_cursor as i64);
        self.refresh_gauges();
        Ok(imported)
    }

    pub fn set_emergency_state(&self, active: bool) -> Result<(), LedgerError> {
        if active {
            self.ledger.activate_emergency_state()?;
        } else {
            self.ledger.deactivate_emergency_state()?;
        }
        info!(active, "Emergency state changed via API");
        self.refresh_gauges();
        Ok(())
    }

    pub fn sync_cursor(&self) -> u64 {
        self.sync_cursor.load(Ordering::SeqCst)
    }

    pub fn set_sync_status(&self, ok: bool) {
        self.last_sync_ok.store(ok, Ordering::SeqCst);
    }

    pub fn last_sync_ok(&self) -> bool {
        self.last_sync_ok.load(Ordering::SeqCst)
    }

    /// The authority is ready at once; a replica once it reached its peer.
    pub fn is_ready(&self) -> bool {
        self.config.aggregator_authority || self.config.peer_url.is_none() || self.last_sync_ok()
    }

    pub fn refresh_gauges(&self) {
        self.metrics
            .deposit_count
            .set(self.ledger.deposit_count() as i64);
        self.metrics
            .known_global_exit_roots
            .set(self.ledger.known_global_exit_root_count() as i64);
        self.metrics
            .emergency_state
            .set(i64::from(self.ledger.is_emergency_state()));
    }

    fn record_deposit(&self, leaf_type: LeafType, result: &Result<DepositReceipt, LedgerError>) {
        match result {
            Ok(receipt) => {
                self.metrics
                    .deposits_total
                    .with_label_values(&[leaf_type_label(leaf_type)])
                    .inc();
                if receipt.global_exit_root.is_some() {
                    self.metrics.global_exit_roots_published_total.inc();
                }
                self.refresh_gauges();
            }
            Err(e) => {
                warn!(code = e.code(), error = %e, "Deposit rejected");
                self.metrics
                    .rejections_total
                    .with_label_values(&["deposit", e.code()])
                    .inc();
            }
        }
    }
}

fn leaf_type_label(leaf_type: LeafType) -> &'static str {
    match leaf_type {
        LeafType::Asset => "asset",
        LeafType::Message => "message",
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn authority_config() -> Config {
        Config {
            network_id: 1,
            mainnet_network_id: 1,
            aggregator_authority: true,
            bridge_address: Address::repeat_byte(0x11),
            gas_token: None,
            api_bind_address: "127.0.0.1".to_string(),
            api_port: 0,
            admin_token: Some("test-admin".to_string()),
            enable_dev_faucet: true,
            journal_retention: None,
            peer_url: None,
            rollup_peers: Vec::new(),
            sync_interval_ms: 50,
            root_update_interval_ms: 0,
        }
    }

    pub fn replica_config(peer_url: Option<String>) -> Config {
        Config {
            network_id: 2,
            mainnet_network_id: 1,
            aggregator_authority: false,
            bridge_address: Address::repeat_byte(0x22),
            peer_url,
            ..authority_config()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use alloy_primitives::U256;

    fn deposit() -> AssetDeposit {
        AssetDeposit {
            destination_network: 2,
            destination_address: Address::repeat_byte(0xb1),
            amount: U256::from(5u64),
            token: Address::ZERO,
            value: U256::from(5u64),
            force_update_global_exit_root: false,
            permit: None,
        }
    }

    #[test]
    fn test_batched_root_update() {
        let node = Node::new(authority_config()).unwrap();
        let alice = Address::repeat_byte(0xa1);
        node.executor.mint(Address::ZERO, alice, U256::from(100u64));

        assert_eq!(node.update_global_exit_root(false), Ok(None));

        node.bridge_asset(alice, deposit()).unwrap();
        node.bridge_asset(alice, deposit()).unwrap();
        assert!(node.update_global_exit_root(false).unwrap().is_some());
        assert_eq!(node.ledger.last_updated_deposit_count(), 2);
        assert_eq!(node.update_global_exit_root(false), Ok(None));

        assert_eq!(node.metrics.deposit_count.get(), 2);
        assert_eq!(
            node.metrics.deposits_total.with_label_values(&["asset"]).get(),
            2
        );
    }

    #[test]
    fn test_rejections_counted_by_code() {
        let node = Node::new(authority_config()).unwrap();
        let mut bad = deposit();
        bad.value = U256::ZERO;
        assert_eq!(
            node.bridge_asset(Address::repeat_byte(0xa1), bad),
            Err(LedgerError::AmountDoesNotMatchMsgValue)
        );
        assert_eq!(
            node.metrics
                .rejections_total
                .with_label_values(&["deposit", "AmountDoesNotMatchMsgValue"])
                .get(),
            1
        );
    }

    #[test]
    fn test_readiness() {
        let authority = Node::new(authority_config()).unwrap();
        assert!(authority.is_ready());

        let replica = Node::new(replica_config(Some("http://127.0.0.1:1".to_string()))).unwrap();
        assert!(!replica.is_ready());
        replica.set_sync_status(true);
        assert!(replica.is_ready());
    }
}
