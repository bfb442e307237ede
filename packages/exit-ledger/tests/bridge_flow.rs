//! End-to-end flows between an aggregator authority and a replica network
//!
//! Run with: cargo test --test bridge_flow -- --nocapture
//!
//! Network 1 is the mainnet (aggregator authority), network 2 a replica fed
//! from the authority's event journal.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use exit_ledger::{
    rollup_index_of, AssetDeposit, BlockContext, BridgeLedger, Claim, GlobalIndex,
    InMemoryExecutor, LedgerConfig, LedgerError, LedgerEvent, MessageDeposit, TokenMetadata,
    TREE_DEPTH,
};

mod helpers {
    use super::*;

    pub const MAINNET: u32 = 1;
    pub const REPLICA: u32 = 2;
    pub const BRIDGE_MAINNET: Address = Address::repeat_byte(0x11);
    pub const BRIDGE_REPLICA: Address = Address::repeat_byte(0x22);
    pub const ALICE: Address = Address::repeat_byte(0xa1);
    pub const BOB: Address = Address::repeat_byte(0xb1);

    pub type Ledger = BridgeLedger<Arc<InMemoryExecutor>>;

    pub struct Pair {
        pub mainnet: Ledger,
        pub mainnet_book: Arc<InMemoryExecutor>,
        pub replica: Ledger,
        pub replica_book: Arc<InMemoryExecutor>,
        pub cursor: u64,
    }

    impl Pair {
        pub fn new() -> Self {
            init_logging();
            let mainnet_book = Arc::new(InMemoryExecutor::new(BRIDGE_MAINNET));
            let replica_book = Arc::new(InMemoryExecutor::new(BRIDGE_REPLICA));
            let mainnet = BridgeLedger::new(
                LedgerConfig::authority(MAINNET, BRIDGE_MAINNET),
                mainnet_book.clone(),
            )
            .unwrap();
            let replica = BridgeLedger::new(
                LedgerConfig::replica(REPLICA, MAINNET, BRIDGE_REPLICA),
                replica_book.clone(),
            )
            .unwrap();
            Self {
                mainnet,
                mainnet_book,
                replica,
                replica_book,
                cursor: 0,
            }
        }

        /// Forward every global exit root the authority published so far.
        pub fn sync(&mut self) -> usize {
            let batch = self.mainnet.events_since(self.cursor, 1_000).unwrap();
            self.cursor = batch.next_cursor;
            self.replica.ingest_peer_events(&batch).unwrap()
        }

        pub fn current_roots(&self) -> (B256, B256) {
            (
                self.mainnet.mainnet_exit_root().unwrap(),
                self.mainnet.rollup_exit_root().unwrap(),
            )
        }
    }

    pub fn ctx(timestamp: u64) -> BlockContext {
        BlockContext::new(timestamp, B256::with_last_byte(timestamp as u8))
    }

    pub fn native_deposit(destination_network: u32, amount: u64, force: bool) -> AssetDeposit {
        AssetDeposit {
            destination_network,
            destination_address: BOB,
            amount: U256::from(amount),
            token: Address::ZERO,
            value: U256::from(amount),
            force_update_global_exit_root: force,
            permit: None,
        }
    }

    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("exit_ledger=debug")
            .with_test_writer()
            .try_init();
    }
}

use helpers::*;

#[test]
fn test_deposit_then_claim_on_replica() {
    let mut pair = Pair::new();
    pair.mainnet_book.mint(Address::ZERO, ALICE, U256::from(100u64));
    pair.replica_book
        .mint(Address::ZERO, BRIDGE_REPLICA, U256::from(100u64));

    let receipt = pair
        .mainnet
        .bridge_asset(ALICE, native_deposit(REPLICA, 100, true), &ctx(1))
        .unwrap();
    assert_eq!(receipt.deposit_count, 0);
    assert!(receipt.global_exit_root.is_some());
    assert_eq!(pair.sync(), 1);

    let (mainnet_root, rollup_root) = pair.current_roots();
    let claim = Claim::mainnet(
        pair.mainnet.proof(0).unwrap(),
        0,
        mainnet_root,
        rollup_root,
        MAINNET,
        Address::ZERO,
        REPLICA,
        BOB,
        U256::from(100u64),
        Bytes::new(),
    );

    pair.replica.claim_asset(&claim).unwrap();
    assert_eq!(
        pair.replica_book.balance_of(Address::ZERO, BOB),
        U256::from(100u64)
    );
    assert!(pair.replica.is_claimed(0, MAINNET));
    assert_eq!(pair.replica.is_claimed_global(GlobalIndex::mainnet(0)), Ok(true));

    assert_eq!(
        pair.replica.claim_asset(&claim),
        Err(LedgerError::AlreadyClaimed)
    );
}

#[test]
fn test_forged_root_is_rejected() {
    let mut pair = Pair::new();
    pair.mainnet_book.mint(Address::ZERO, ALICE, U256::from(10u64));
    pair.mainnet
        .bridge_asset(ALICE, native_deposit(REPLICA, 10, true), &ctx(1))
        .unwrap();
    pair.sync();

    // Proof is valid for the forged mainnet root, but that root was never published
    let forged = pair.mainnet.get_root();
    let mut claim = Claim::mainnet(
        pair.mainnet.proof(0).unwrap(),
        0,
        forged,
        B256::repeat_byte(0xee),
        MAINNET,
        Address::ZERO,
        REPLICA,
        BOB,
        U256::from(10u64),
        Bytes::new(),
    );
    assert_eq!(
        pair.replica.claim_asset(&claim),
        Err(LedgerError::GlobalExitRootInvalid)
    );

    claim.rollup_exit_root = pair.current_roots().1;
    claim.smt_proof_local_exit_root[0] = B256::repeat_byte(1);
    assert_eq!(
        pair.replica.claim_asset(&claim),
        Err(LedgerError::InvalidSmtProof)
    );
}

#[test]
fn test_unpublished_deposit_waits_for_root() {
    let mut pair = Pair::new();
    pair.mainnet_book.mint(Address::ZERO, ALICE, U256::from(10u64));
    pair.replica_book
        .mint(Address::ZERO, BRIDGE_REPLICA, U256::from(10u64));

    pair.mainnet
        .bridge_asset(ALICE, native_deposit(REPLICA, 10, false), &ctx(1))
        .unwrap();
    assert_eq!(pair.mainnet.last_updated_deposit_count(), 0);

    let local_root = pair.mainnet.get_root();
    let claim = Claim::mainnet(
        pair.mainnet.proof(0).unwrap(),
        0,
        local_root,
        B256::ZERO,
        MAINNET,
        Address::ZERO,
        REPLICA,
        BOB,
        U256::from(10u64),
        Bytes::new(),
    );
    assert_eq!(
        pair.replica.claim_asset(&claim),
        Err(LedgerError::GlobalExitRootInvalid)
    );

    pair.mainnet.update_global_exit_root(&ctx(2)).unwrap();
    pair.sync();
    assert!(pair.replica.claim_asset(&claim).is_ok());
}

#[test]
fn test_message_failure_keeps_claim_open() {
    let mut pair = Pair::new();
    pair.mainnet
        .bridge_message(
            ALICE,
            MessageDeposit {
                destination_network: REPLICA,
                destination_address: BOB,
                value: U256::ZERO,
                force_update_global_exit_root: true,
                metadata: Bytes::from_static(b"ping"),
            },
            &ctx(1),
        )
        .unwrap();
    pair.sync();

    let (mainnet_root, rollup_root) = pair.current_roots();
    let claim = Claim::mainnet(
        pair.mainnet.proof(0).unwrap(),
        0,
        mainnet_root,
        rollup_root,
        MAINNET,
        ALICE,
        REPLICA,
        BOB,
        U256::ZERO,
        Bytes::from_static(b"ping"),
    );

    pair.replica_book.set_message_hook(
        BOB,
        Arc::new(|_: &exit_ledger::execution::MessageDelivery| -> Result<(), String> {
            Err("out of gas".to_string())
        }),
    );
    assert!(matches!(
        pair.replica.claim_message(&claim),
        Err(LedgerError::MessageFailed { .. })
    ));
    assert!(!pair.replica.is_claimed(0, MAINNET));

    pair.replica_book.set_message_hook(
        BOB,
        Arc::new(|_: &exit_ledger::execution::MessageDelivery| -> Result<(), String> { Ok(()) }),
    );
    pair.replica.claim_message(&claim).unwrap();
    assert!(pair.replica.is_claimed(0, MAINNET));
}

#[test]
fn test_rollup_deposit_claimed_on_mainnet() {
    let mut pair = Pair::new();
    pair.replica_book.mint(Address::ZERO, ALICE, U256::from(7u64));
    pair.mainnet_book
        .mint(Address::ZERO, BRIDGE_MAINNET, U256::from(7u64));

    pair.replica
        .bridge_asset(ALICE, native_deposit(MAINNET, 7, true), &ctx(1))
        .unwrap();
    let local_root = pair.replica.last_local_exit_root().unwrap();
    assert_eq!(local_root, pair.replica.get_root());

    let rollup_index = rollup_index_of(REPLICA).unwrap();
    pair.mainnet
        .update_rollup_exit_root(rollup_index, local_root, &ctx(2))
        .unwrap();
    pair.sync();

    let (mainnet_root, rollup_root) = pair.current_roots();
    let claim = Claim {
        smt_proof_local_exit_root: pair.replica.proof(0).unwrap(),
        smt_proof_rollup_exit_root: pair.mainnet.rollup_proof(rollup_index).unwrap(),
        global_index: GlobalIndex::rollup(rollup_index, 0),
        mainnet_exit_root: mainnet_root,
        rollup_exit_root: rollup_root,
        origin_network: MAINNET,
        origin_address: Address::ZERO,
        destination_network: MAINNET,
        destination_address: BOB,
        amount: U256::from(7u64),
        metadata: Bytes::new(),
    };

    let receipt = pair.mainnet.claim_asset(&claim).unwrap();
    assert_eq!(receipt.global_index, GlobalIndex::rollup(rollup_index, 0).to_u256());
    assert!(pair.mainnet.is_claimed(0, REPLICA));
    assert!(!pair.mainnet.is_claimed(0, MAINNET));

    // Proofs are checked before the replay bitmap
    let mut wrong_proof = claim.clone();
    wrong_proof.smt_proof_rollup_exit_root = [B256::ZERO; TREE_DEPTH];
    assert_eq!(
        pair.mainnet.claim_asset(&wrong_proof),
        Err(LedgerError::InvalidSmtProof)
    );
}

#[test]
fn test_concurrent_claims_apply_once() {
    let mut pair = Pair::new();
    pair.mainnet_book.mint(Address::ZERO, ALICE, U256::from(5u64));
    pair.replica_book
        .mint(Address::ZERO, BRIDGE_REPLICA, U256::from(1_000u64));

    pair.mainnet
        .bridge_asset(ALICE, native_deposit(REPLICA, 5, true), &ctx(1))
        .unwrap();
    pair.sync();

    let (mainnet_root, rollup_root) = pair.current_roots();
    let claim = Claim::mainnet(
        pair.mainnet.proof(0).unwrap(),
        0,
        mainnet_root,
        rollup_root,
        MAINNET,
        Address::ZERO,
        REPLICA,
        BOB,
        U256::from(5u64),
        Bytes::new(),
    );

    let replica = &pair.replica;
    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| replica.claim_asset(&claim)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter(|r| r.is_err())
        .all(|r| r == &Err(LedgerError::AlreadyClaimed)));
    assert_eq!(
        pair.replica_book.balance_of(Address::ZERO, BOB),
        U256::from(5u64)
    );
}

#[test]
fn test_concurrent_deposits_are_dense() {
    let pair = Pair::new();
    pair.mainnet_book
        .mint(Address::ZERO, ALICE, U256::from(1_000u64));

    std::thread::scope(|scope| {
        for i in 0..4u64 {
            let mainnet = &pair.mainnet;
            scope.spawn(move || {
                for _ in 0..10 {
                    mainnet
                        .bridge_asset(ALICE, native_deposit(REPLICA, 1, i % 2 == 0), &ctx(i))
                        .unwrap();
                }
            });
        }
    });

    assert_eq!(pair.mainnet.deposit_count(), 40);
    let counts: Vec<u32> = pair
        .mainnet
        .events_since(0, 1_000)
        .unwrap()
        .entries
        .into_iter()
        .filter_map(|entry| match entry.event {
            LedgerEvent::Bridge(event) => Some(event.deposit_count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, (0..40).collect::<Vec<u32>>());
}

#[test]
fn test_wrapped_token_round_trip() {
    let mut pair = Pair::new();
    let token = Address::repeat_byte(0x70);
    pair.mainnet_book.mint(token, ALICE, U256::from(40u64));
    pair.mainnet_book
        .register_token(token, TokenMetadata::new("Token", "TKN", 6));

    pair.mainnet
        .bridge_asset(
            ALICE,
            AssetDeposit {
                destination_network: REPLICA,
                destination_address: BOB,
                amount: U256::from(40u64),
                token,
                value: U256::ZERO,
                force_update_global_exit_root: true,
                permit: None,
            },
            &ctx(1),
        )
        .unwrap();
    pair.sync();

    let (mainnet_root, rollup_root) = pair.current_roots();
    let metadata = Bytes::from(TokenMetadata::new("Token", "TKN", 6).encode());
    let receipt = pair
        .replica
        .claim_asset(&Claim::mainnet(
            pair.mainnet.proof(0).unwrap(),
            0,
            mainnet_root,
            rollup_root,
            MAINNET,
            token,
            REPLICA,
            BOB,
            U256::from(40u64),
            metadata,
        ))
        .unwrap();
    let wrapped = receipt.new_wrapped_token.unwrap();
    assert_eq!(
        wrapped,
        pair.replica
            .precalculated_wrapper_address(MAINNET, &token, "Token", "TKN", 6)
    );

    // Bob sends the wrapped token back; the deposit names the origin token
    let back = pair
        .replica
        .bridge_asset(
            BOB,
            AssetDeposit {
                destination_network: MAINNET,
                destination_address: ALICE,
                amount: U256::from(15u64),
                token: wrapped,
                value: U256::ZERO,
                force_update_global_exit_root: true,
                permit: None,
            },
            &ctx(3),
        )
        .unwrap();
    assert_eq!(back.deposit_count, 0);
    assert_eq!(pair.replica_book.balance_of(wrapped, BOB), U256::from(25u64));

    let bridge = pair
        .replica
        .events_since(0, 100)
        .unwrap()
        .entries
        .into_iter()
        .find_map(|entry| match entry.event {
            LedgerEvent::Bridge(event) => Some(event),
            _ => None,
        })
        .unwrap();
    assert_eq!(bridge.origin_network, MAINNET);
    assert_eq!(bridge.origin_address, token);

    // Releasing on mainnet goes back to the original token
    let rollup_index = rollup_index_of(REPLICA).unwrap();
    let local_root = pair.replica.last_local_exit_root().unwrap();
    pair.mainnet
        .update_rollup_exit_root(rollup_index, local_root, &ctx(4))
        .unwrap();
    let (mainnet_root, rollup_root) = pair.current_roots();
    pair.mainnet
        .claim_asset(&Claim {
            smt_proof_local_exit_root: pair.replica.proof(0).unwrap(),
            smt_proof_rollup_exit_root: pair.mainnet.rollup_proof(rollup_index).unwrap(),
            global_index: GlobalIndex::rollup(rollup_index, 0),
            mainnet_exit_root: mainnet_root,
            rollup_exit_root: rollup_root,
            origin_network: MAINNET,
            origin_address: token,
            destination_network: MAINNET,
            destination_address: ALICE,
            amount: U256::from(15u64),
            metadata: bridge.metadata,
        })
        .unwrap();
    assert_eq!(pair.mainnet_book.balance_of(token, ALICE), U256::from(15u64));
}
