//! Exit-Ledger: Chain-Agnostic Bridge Ledger Engine
//!
//! Each participating network runs one [`BridgeLedger`]. Deposits are appended
//! to a local exit tree; the aggregator authority combines local exit roots
//! into global exit roots; claims on another network prove a leaf against a
//! known global exit root and are applied at most once.
//!
//! - **Leaf codec** - 113-byte leaf preimage and its hash
//! - **Exit tree** - append-only depth-32 Merkle tree with proofs
//! - **Global exit roots** - aggregator (authority) and replica stores
//! - **Replay guard** - claimed-bit bitmap keyed by `(flag, network, leaf)`
//! - **Wrapped assets** - deterministic wrapped-token addresses and registry
//! - **Ledger** - bridgeAsset / bridgeMessage / claimAsset / claimMessage
//!
//! Value movement is delegated to an [`ExecutionEnvironment`]; the engine never
//! talks to a chain. [`InMemoryExecutor`] is a balance book for tests and demos.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! exit-ledger = { path = "../exit-ledger" }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod execution;
pub mod exit_tree;
pub mod global_exit_root;
pub mod hash;
pub mod leaf;
pub mod ledger;
pub mod metadata;
pub mod replay_guard;
pub mod types;
pub mod wrapped_assets;

// Re-export commonly used items at the crate root
pub use config::{Capabilities, GasTokenConfig, LedgerConfig};
pub use error::{LedgerError, Result};
pub use events::{EventBatch, EventJournal, EventSource, JournalEntry, LedgerEvent, SourceError};
pub use execution::{Effect, ExecutionEnvironment, ExecutionError, InMemoryExecutor};
pub use exit_tree::{calculate_root, verify_merkle_proof, ExitTree, TreeSnapshot};
pub use global_exit_root::{
    ExitRootManager, GlobalExitRoot, GlobalExitRootAggregator, GlobalExitRootReplica,
};
pub use hash::{keccak256, Keccak256, NodeHasher};
pub use leaf::{get_leaf_value, BridgeLeaf};
pub use ledger::{
    rollup_index_of, rollup_network_id, AssetDeposit, BridgeLedger, Claim, ClaimReceipt,
    DepositReceipt, MessageDeposit,
};
pub use metadata::TokenMetadata;
pub use replay_guard::{ReplayGuard, ScopeKey};
pub use types::{BlockContext, GlobalIndex, LeafType, Permit, SmtProof, TokenInfo, TREE_DEPTH};
pub use wrapped_assets::{AddressDerivation, Create2, WrappedAssetRegistry};
