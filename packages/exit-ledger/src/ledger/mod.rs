//! Bridge ledger: deposit and claim orchestration.
//!
//! Handlers are organized by category:
//! - `outgoing` - bridgeAsset / bridgeMessage deposits into the local exit tree
//! - `claim` - claimAsset / claimMessage against a known global exit root
//! - `admin` - emergency state, global exit root updates and peer feeds
//! - `query` - read-only views
//!
//! ## Locking
//!
//! | Lock | Guards | Held by |
//! |------|--------|---------|
//! | `emergency` (read) | pause flag | every deposit and claim, for its whole duration |
//! | `deposits` | exit tree | deposits and local root publication |
//! | `claim_stripes[k]` | claims whose scope key maps to stripe `k` | one claim |
//! | `roots`, `wrapped`, `claimed`, `journal` | their stores | short sections |
//!
//! Acquisition order is `emergency → deposits → claim stripe → roots →
//! wrapped → claimed → journal`; no path takes them in another order.

mod admin;
mod claim;
mod outgoing;
mod query;

pub use claim::{rollup_index_of, rollup_network_id, Claim, ClaimReceipt};
pub use outgoing::{AssetDeposit, DepositReceipt, MessageDeposit};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use alloy_primitives::{Address, Bytes, B256};
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, Result};
use crate::events::{EventJournal, LedgerEvent};
use crate::execution::{Effect, ExecutionEnvironment, ExecutionError};
use crate::exit_tree::ExitTree;
use crate::global_exit_root::ExitRootManager;
use crate::hash::{Keccak256, NodeHasher};
use crate::metadata::TokenMetadata;
use crate::replay_guard::{ReplayGuard, ScopeKey};
use crate::types::BlockContext;
use crate::wrapped_assets::{AddressDerivation, WrappedAssetRegistry};

/// Number of locks claims are striped over.
pub const CLAIM_LOCK_STRIPES: usize = 64;

struct DepositState<H: NodeHasher> {
    tree: ExitTree<H>,
    last_updated_deposit_count: u64,
}

pub struct BridgeLedger<E: ExecutionEnvironment, H: NodeHasher = Keccak256> {
    config: LedgerConfig,
    executor: E,
    weth_token: Option<Address>,
    emergency: RwLock<bool>,
    deposits: Mutex<DepositState<H>>,
    roots: RwLock<ExitRootManager<H>>,
    wrapped: RwLock<WrappedAssetRegistry<H>>,
    claimed: Mutex<ReplayGuard>,
    claim_stripes: Vec<Mutex<()>>,
    journal: Mutex<EventJournal>,
}

impl<E: ExecutionEnvironment, H: NodeHasher> BridgeLedger<E, H> {
    /// Create a ledger with CREATE2 wrapped-token addressing.
    pub fn new(config: LedgerConfig, executor: E) -> Result<Self> {
        let registry = WrappedAssetRegistry::new(
            config.bridge_address,
            config.wrapped_token_template.to_vec(),
        );
        Self::with_registry(config, executor, registry)
    }

    pub fn with_derivation(
        config: LedgerConfig,
        executor: E,
        derivation: Box<dyn AddressDerivation>,
    ) -> Result<Self> {
        let registry = WrappedAssetRegistry::with_derivation(
            config.bridge_address,
            config.wrapped_token_template.to_vec(),
            derivation,
        );
        Self::with_registry(config, executor, registry)
    }

    fn with_registry(
        config: LedgerConfig,
        executor: E,
        registry: WrappedAssetRegistry<H>,
    ) -> Result<Self> {
        config.validate()?;

        // Gas token networks represent ether as a wrapped token deployed with a zero salt
        let weth_token = if config.effective_gas_token().is_some() {
            let metadata = TokenMetadata::new("Wrapped Ether", "WETH", 18).encode();
            let weth = registry.derive_with_salt(&B256::ZERO, &metadata);
            match executor.apply(&[Effect::DeployWrapped {
                token: weth,
                metadata: Bytes::from(metadata),
            }]) {
                Ok(_) | Err(ExecutionError::AlreadyDeployed(_)) => {}
                Err(e) => {
                    return Err(LedgerError::TransferFailed {
                        reason: e.to_string(),
                    })
                }
            }
            Some(weth)
        } else {
            None
        };

        info!(
            network_id = config.network_id,
            bridge = %config.bridge_address,
            authority = config.is_aggregator_authority,
            gas_token = config.effective_gas_token().is_some(),
            "Bridge ledger initialized"
        );

        let journal = match config.journal_retention {
            Some(retention) => EventJournal::with_retention(retention),
            None => EventJournal::new(),
        };

        Ok(Self {
            roots: RwLock::new(ExitRootManager::for_role(config.is_aggregator_authority)),
            config,
            executor,
            weth_token,
            emergency: RwLock::new(false),
            deposits: Mutex::new(DepositState {
                tree: ExitTree::new(),
                last_updated_deposit_count: 0,
            }),
            wrapped: RwLock::new(registry),
            claimed: Mutex::new(ReplayGuard::new()),
            claim_stripes: (0..CLAIM_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            journal: Mutex::new(journal),
        })
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Read guard on the emergency flag, refused while the flag is set.
    fn operational(&self) -> Result<RwLockReadGuard<'_, bool>> {
        let guard = read(&self.emergency);
        if *guard {
            return Err(LedgerError::OnlyNotEmergencyState);
        }
        Ok(guard)
    }

    fn stripe(&self, key: ScopeKey) -> &Mutex<()> {
        &self.claim_stripes[(key.value() % CLAIM_LOCK_STRIPES as u128) as usize]
    }

    fn emit(&self, event: LedgerEvent) {
        lock(&self.journal).push(event);
    }

    /// Publish the current deposit root through the exit root store.
    fn publish_local_root(
        &self,
        state: &mut DepositState<H>,
        ctx: &BlockContext,
    ) -> Result<Option<B256>> {
        let local_exit_root = state.tree.root();
        let mut roots = write(&self.roots);
        let outcome = roots.record_local_exit_root(local_exit_root, ctx)?;
        state.last_updated_deposit_count = state.tree.deposit_count();

        let Some(outcome) = outcome else {
            return Ok(None);
        };
        if let Some(update) = outcome.l1_info {
            self.emit(admin::l1_info_event(&outcome, update, ctx.timestamp));
        }
        Ok(Some(outcome.global_exit_root))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::execution::InMemoryExecutor;
    use std::sync::Arc;

    pub const BRIDGE_A: Address = Address::repeat_byte(0xa0);
    pub const BRIDGE_B: Address = Address::repeat_byte(0xb0);
    pub const ALICE: Address = Address::repeat_byte(0xa1);
    pub const BOB: Address = Address::repeat_byte(0xb1);

    pub type TestLedger = BridgeLedger<Arc<InMemoryExecutor>>;

    pub fn ctx(timestamp: u64) -> BlockContext {
        BlockContext::new(timestamp, B256::repeat_byte(timestamp as u8))
    }

    /// Mainnet authority on network 0.
    pub fn authority() -> (TestLedger, Arc<InMemoryExecutor>) {
        let executor = Arc::new(InMemoryExecutor::new(BRIDGE_A));
        let ledger = BridgeLedger::new(LedgerConfig::authority(0, BRIDGE_A), executor.clone())
            .expect("valid config");
        (ledger, executor)
    }

    /// Replica on network 1 fed by network 0.
    pub fn replica() -> (TestLedger, Arc<InMemoryExecutor>) {
        let executor = Arc::new(InMemoryExecutor::new(BRIDGE_B));
        let ledger = BridgeLedger::new(LedgerConfig::replica(1, 0, BRIDGE_B), executor.clone())
            .expect("valid config");
        (ledger, executor)
    }
}
