//! Execution environment seam
//!
//! The ledger decides *what* must happen to balances and contracts; the host
//! environment does it. Each deposit or claim hands its side effects to
//! [`ExecutionEnvironment::apply`] as one list, and the environment applies
//! all of them or none.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metadata::TokenMetadata;
use crate::types::Permit;

/// A single side effect requested by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Hold native value attached to a deposit.
    LockNative { from: Address, amount: U256 },
    /// Move a local token from the depositor into escrow.
    PullTokens {
        token: Address,
        from: Address,
        amount: U256,
        permit: Option<Permit>,
    },
    BurnWrapped {
        token: Address,
        from: Address,
        amount: U256,
    },
    ReleaseNative { to: Address, amount: U256 },
    ReleaseTokens {
        token: Address,
        to: Address,
        amount: U256,
    },
    /// Create a wrapped token at its precomputed address.
    DeployWrapped { token: Address, metadata: Bytes },
    MintWrapped {
        token: Address,
        to: Address,
        amount: U256,
    },
    /// Invoke the receiver's message hook, forwarding `value` native units.
    DeliverMessage {
        to: Address,
        origin_address: Address,
        origin_network: u32,
        value: U256,
        payload: Bytes,
    },
}

/// What the environment observed while applying effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// Amount that actually reached escrow through `PullTokens`.
    pub pulled: U256,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Insufficient balance of {token} for {holder}: have {available}, need {required}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        available: U256,
        required: U256,
    },

    #[error("Unknown wrapped token {0}")]
    UnknownWrappedToken(Address),

    #[error("Wrapped token {0} already deployed")]
    AlreadyDeployed(Address),

    #[error("Message to {to} rejected: {reason}")]
    MessageRejected { to: Address, reason: String },

    #[error("Execution environment unavailable: {0}")]
    Unavailable(String),
}

pub trait ExecutionEnvironment: Send + Sync {
    /// Apply every effect or none of them.
    fn apply(&self, effects: &[Effect]) -> Result<ExecutionReceipt, ExecutionError>;

    /// Name, symbol and decimals of a token, with fallbacks for tokens that
    /// do not expose them.
    fn token_metadata(&self, token: Address) -> TokenMetadata;
}

impl<T: ExecutionEnvironment + ?Sized> ExecutionEnvironment for Arc<T> {
    fn apply(&self, effects: &[Effect]) -> Result<ExecutionReceipt, ExecutionError> {
        (**self).apply(effects)
    }

    fn token_metadata(&self, token: Address) -> TokenMetadata {
        (**self).token_metadata(token)
    }
}

// ============================================================================
// In-memory environment
// ============================================================================

/// Message hook invocation recorded by [`InMemoryExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelivery {
    pub to: Address,
    pub origin_address: Address,
    pub origin_network: u32,
    pub value: U256,
    pub payload: Bytes,
}

pub type MessageHook = Arc<dyn Fn(&MessageDelivery) -> Result<(), String> + Send + Sync>;

pub const FALLBACK_NAME: &str = "NO_NAME";
pub const FALLBACK_SYMBOL: &str = "NO_SYMBOL";
pub const FALLBACK_DECIMALS: u8 = 18;

/// Most recent message deliveries kept by [`InMemoryExecutor`].
pub const MAX_RECORDED_DELIVERIES: usize = 1024;

#[derive(Debug, Default)]
struct LedgerBook {
    /// (token, holder) -> balance; the zero token is the native asset.
    balances: HashMap<(Address, Address), U256>,
    wrapped: HashMap<Address, TokenMetadata>,
    tokens: HashMap<Address, TokenMetadata>,
    transfer_fee_bps: HashMap<Address, u16>,
    deliveries: VecDeque<MessageDelivery>,
}

impl LedgerBook {
    fn balance(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        let entry = self.balances.entry((token, holder)).or_insert(U256::ZERO);
        *entry = entry.saturating_add(amount);
    }

    fn record_delivery(&mut self, delivery: MessageDelivery) {
        if self.deliveries.len() == MAX_RECORDED_DELIVERIES {
            self.deliveries.pop_front();
        }
        self.deliveries.push_back(delivery);
    }
}

/// Writes of one `apply` call, layered over the locked book.
///
/// Only the entries an effect touches are staged, so a failed call drops
/// the overlay and the book is never modified.
struct Overlay<'a> {
    book: &'a LedgerBook,
    balances: HashMap<(Address, Address), U256>,
    deployed: HashMap<Address, TokenMetadata>,
    deliveries: Vec<MessageDelivery>,
}

impl<'a> Overlay<'a> {
    fn new(book: &'a LedgerBook) -> Self {
        Self {
            book,
            balances: HashMap::new(),
            deployed: HashMap::new(),
            deliveries: Vec::new(),
        }
    }

    fn balance(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_else(|| self.book.balance(token, holder))
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        let balance = self.balance(token, holder).saturating_add(amount);
        self.balances.insert((token, holder), balance);
    }

    fn debit(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), ExecutionError> {
        let available = self.balance(token, holder);
        if available < amount {
            return Err(ExecutionError::InsufficientBalance {
                token,
                holder,
                available,
                required: amount,
            });
        }
        self.balances.insert((token, holder), available - amount);
        Ok(())
    }

    fn is_wrapped(&self, token: Address) -> bool {
        self.deployed.contains_key(&token) || self.book.wrapped.contains_key(&token)
    }

    fn require_wrapped(&self, token: Address) -> Result<(), ExecutionError> {
        if self.is_wrapped(token) {
            Ok(())
        } else {
            Err(ExecutionError::UnknownWrappedToken(token))
        }
    }

    fn transfer_fee_bps(&self, token: Address) -> u16 {
        self.book.transfer_fee_bps.get(&token).copied().unwrap_or(0)
    }

    fn into_writes(self) -> Writes {
        Writes {
            balances: self.balances,
            deployed: self.deployed,
            deliveries: self.deliveries,
        }
    }
}

/// Staged writes detached from the book borrow, ready to commit.
struct Writes {
    balances: HashMap<(Address, Address), U256>,
    deployed: HashMap<Address, TokenMetadata>,
    deliveries: Vec<MessageDelivery>,
}

impl Writes {
    fn commit(self, book: &mut LedgerBook) {
        book.balances.extend(self.balances);
        book.wrapped.extend(self.deployed);
        for delivery in self.deliveries {
            book.record_delivery(delivery);
        }
    }
}

/// Balance book simulating a host chain, used by tests and the demo node.
///
/// Effects are staged in an overlay of the entries they touch and written to
/// the book only when every effect succeeded. Message hooks run while the
/// book is locked and must not call back into the executor. Only the last
/// [`MAX_RECORDED_DELIVERIES`] message deliveries are kept.
pub struct InMemoryExecutor {
    escrow: Address,
    book: Mutex<LedgerBook>,
    hooks: RwLock<HashMap<Address, MessageHook>>,
}

impl std::fmt::Debug for InMemoryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryExecutor")
            .field("escrow", &self.escrow)
            .finish_non_exhaustive()
    }
}

impl InMemoryExecutor {
    /// `escrow` is the account holding locked native value and local tokens,
    /// normally the bridge address.
    pub fn new(escrow: Address) -> Self {
        Self {
            escrow,
            book: Mutex::new(LedgerBook::default()),
            hooks: RwLock::new(HashMap::new()),
        }
    }

    pub fn escrow(&self) -> Address {
        self.escrow
    }

    pub fn mint(&self, token: Address, holder: Address, amount: U256) {
        self.book().credit(token, holder, amount);
    }

    pub fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.book().balance(token, holder)
    }

    pub fn register_token(&self, token: Address, metadata: TokenMetadata) {
        self.book().tokens.insert(token, metadata);
    }

    /// Make transfers of `token` lose `bps` basis points in transit.
    pub fn set_transfer_fee(&self, token: Address, bps: u16) {
        self.book().transfer_fee_bps.insert(token, bps.min(10_000));
    }

    pub fn is_deployed(&self, token: Address) -> bool {
        self.book().wrapped.contains_key(&token)
    }

    pub fn deliveries(&self) -> Vec<MessageDelivery> {
        self.book().deliveries.iter().cloned().collect()
    }

    /// Drain the recorded deliveries.
    pub fn take_deliveries(&self) -> Vec<MessageDelivery> {
        self.book().deliveries.drain(..).collect()
    }

    pub fn set_message_hook(&self, receiver: Address, hook: MessageHook) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(receiver, hook);
    }

    fn book(&self) -> std::sync::MutexGuard<'_, LedgerBook> {
        self.book.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply_one(
        &self,
        book: &mut Overlay<'_>,
        effect: &Effect,
        receipt: &mut ExecutionReceipt,
    ) -> Result<(), ExecutionError> {
        match effect {
            Effect::LockNative { from, amount } => {
                book.debit(Address::ZERO, *from, *amount)?;
                book.credit(Address::ZERO, self.escrow, *amount);
            }
            Effect::PullTokens {
                token,
                from,
                amount,
                permit: _,
            } => {
                book.debit(*token, *from, *amount)?;
                let bps = book.transfer_fee_bps(*token);
                let fee = *amount * U256::from(bps) / U256::from(10_000u64);
                let received = *amount - fee;
                book.credit(*token, self.escrow, received);
                receipt.pulled += received;
            }
            Effect::BurnWrapped {
                token,
                from,
                amount,
            } => {
                book.require_wrapped(*token)?;
                book.debit(*token, *from, *amount)?;
            }
            Effect::ReleaseNative { to, amount } => {
                book.debit(Address::ZERO, self.escrow, *amount)?;
                book.credit(Address::ZERO, *to, *amount);
            }
            Effect::ReleaseTokens { token, to, amount } => {
                book.debit(*token, self.escrow, *amount)?;
                book.credit(*token, *to, *amount);
            }
            Effect::DeployWrapped { token, metadata } => {
                if book.is_wrapped(*token) {
                    return Err(ExecutionError::AlreadyDeployed(*token));
                }
                let decoded = TokenMetadata::decode(metadata).unwrap_or_else(|| {
                    TokenMetadata::new(FALLBACK_NAME, FALLBACK_SYMBOL, FALLBACK_DECIMALS)
                });
                book.deployed.insert(*token, decoded);
            }
            Effect::MintWrapped { token, to, amount } => {
                book.require_wrapped(*token)?;
                book.credit(*token, *to, *amount);
            }
            Effect::DeliverMessage {
                to,
                origin_address,
                origin_network,
                value,
                payload,
            } => {
                if !value.is_zero() {
                    book.debit(Address::ZERO, self.escrow, *value)?;
                    book.credit(Address::ZERO, *to, *value);
                }
                let delivery = MessageDelivery {
                    to: *to,
                    origin_address: *origin_address,
                    origin_network: *origin_network,
                    value: *value,
                    payload: payload.clone(),
                };
                let hook = self
                    .hooks
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(to)
                    .cloned();
                if let Some(hook) = hook {
                    hook(&delivery).map_err(|reason| ExecutionError::MessageRejected {
                        to: *to,
                        reason,
                    })?;
                }
                book.deliveries.push(delivery);
            }
        }
        Ok(())
    }
}

impl ExecutionEnvironment for InMemoryExecutor {
    fn apply(&self, effects: &[Effect]) -> Result<ExecutionReceipt, ExecutionError> {
        let mut book = self.book();
        let mut receipt = ExecutionReceipt::default();

        let mut overlay = Overlay::new(&book);
        for effect in effects {
            self.apply_one(&mut overlay, effect, &mut receipt)?;
        }
        let writes = overlay.into_writes();

        writes.commit(&mut book);
        Ok(receipt)
    }

    fn token_metadata(&self, token: Address) -> TokenMetadata {
        let book = self.book();
        book.tokens
            .get(&token)
            .or_else(|| book.wrapped.get(&token))
            .cloned()
            .unwrap_or_else(|| TokenMetadata::new(FALLBACK_NAME, FALLBACK_SYMBOL, FALLBACK_DECIMALS))
    }
}
