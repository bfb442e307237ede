//! Outgoing deposit handlers (bridgeAsset, bridgeMessage, bridgeMessageWETH).
//!
//! A deposit resolves where the asset originates, moves value through the
//! execution environment, appends one leaf and emits one `BridgeEvent`. All of
//! it happens under the deposit lock, so leaf indices are dense and events are
//! journaled in index order.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{lock, read, BridgeLedger, DepositState};
use crate::error::{LedgerError, Result};
use crate::events::{BridgeEvent, LedgerEvent};
use crate::execution::{Effect, ExecutionEnvironment};
use crate::hash::NodeHasher;
use crate::leaf::{metadata_hash, BridgeLeaf};
use crate::types::{BlockContext, LeafType, Permit};

/// Asset deposit request. A zero `token` means the network's native asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDeposit {
    pub destination_network: u32,
    pub destination_address: Address,
    pub amount: U256,
    pub token: Address,
    /// Native value attached to the call.
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub force_update_global_exit_root: bool,
    #[serde(default)]
    pub permit: Option<Permit>,
}

/// Message deposit request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeposit {
    pub destination_network: u32,
    pub destination_address: Address,
    /// Native value attached to the call, forwarded with the message.
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub force_update_global_exit_root: bool,
    #[serde(default)]
    pub metadata: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositReceipt {
    pub deposit_count: u32,
    pub leaf_hash: B256,
    /// Amount committed to the leaf.
    pub amount: U256,
    /// Global exit root published by this deposit, if any.
    pub global_exit_root: Option<B256>,
}

/// Where a deposited asset comes from and what moving it requires.
struct ResolvedAsset {
    origin_network: u32,
    origin_address: Address,
    metadata: Vec<u8>,
    effect: Effect,
    /// Leaf amount is what actually reached escrow.
    amount_from_receipt: bool,
}

impl<E: ExecutionEnvironment, H: NodeHasher> BridgeLedger<E, H> {
    /// Deposit an asset for `destination_address` on another network.
    pub fn bridge_asset(
        &self,
        sender: Address,
        deposit: AssetDeposit,
        ctx: &BlockContext,
    ) -> Result<DepositReceipt> {
        let _gate = self.operational()?;
        self.check_outgoing_destination(deposit.destination_network)?;

        let mut state = lock(&self.deposits);
        self.check_capacity(&state, deposit.force_update_global_exit_root)?;

        let resolved = self.resolve_deposit_asset(sender, &deposit)?;
        let receipt = self
            .executor
            .apply(std::slice::from_ref(&resolved.effect))
            .map_err(|e| LedgerError::TransferFailed {
                reason: e.to_string(),
            })?;
        let amount = if resolved.amount_from_receipt {
            receipt.pulled
        } else {
            deposit.amount
        };

        let leaf = BridgeLeaf {
            leaf_type: LeafType::Asset,
            origin_network: resolved.origin_network,
            origin_address: resolved.origin_address,
            destination_network: deposit.destination_network,
            destination_address: deposit.destination_address,
            amount,
            metadata_hash: metadata_hash::<H>(&resolved.metadata),
        };
        self.commit_deposit(
            &mut state,
            leaf,
            Bytes::from(resolved.metadata),
            deposit.force_update_global_exit_root,
            ctx,
        )
    }

    /// Deposit a message, optionally carrying native value.
    pub fn bridge_message(
        &self,
        sender: Address,
        deposit: MessageDeposit,
        ctx: &BlockContext,
    ) -> Result<DepositReceipt> {
        let _gate = self.operational()?;
        self.check_outgoing_destination(deposit.destination_network)?;

        if self.weth_token.is_some() && !deposit.value.is_zero() {
            return Err(LedgerError::NoValueInMessagesOnGasTokenNetworks);
        }

        let mut state = lock(&self.deposits);
        self.check_capacity(&state, deposit.force_update_global_exit_root)?;

        if !deposit.value.is_zero() {
            self.executor
                .apply(&[Effect::LockNative {
                    from: sender,
                    amount: deposit.value,
                }])
                .map_err(|e| LedgerError::TransferFailed {
                    reason: e.to_string(),
                })?;
        }

        self.commit_message(&mut state, sender, deposit.value, deposit, ctx)
    }

    /// Deposit a message carrying wrapped ether, on gas token networks.
    pub fn bridge_message_weth(
        &self,
        sender: Address,
        deposit: MessageDeposit,
        amount_weth: U256,
        ctx: &BlockContext,
    ) -> Result<DepositReceipt> {
        let _gate = self.operational()?;
        let weth = self.weth_token.ok_or(LedgerError::NativeTokenIsEther)?;
        self.check_outgoing_destination(deposit.destination_network)?;

        if !deposit.value.is_zero() {
            return Err(LedgerError::MsgValueNotZero);
        }

        let mut state = lock(&self.deposits);
        self.check_capacity(&state, deposit.force_update_global_exit_root)?;

        self.executor
            .apply(&[Effect::BurnWrapped {
                token: weth,
                from: sender,
                amount: amount_weth,
            }])
            .map_err(|e| LedgerError::TransferFailed {
                reason: e.to_string(),
            })?;

        self.commit_message(&mut state, sender, amount_weth, deposit, ctx)
    }

    fn check_outgoing_destination(&self, destination_network: u32) -> Result<()> {
        if destination_network == self.config.network_id {
            return Err(LedgerError::DestinationNetworkInvalid {
                network: destination_network,
                own_network: self.config.network_id,
            });
        }
        Ok(())
    }

    /// Refuse before any value moves if the leaf or its root could not be committed.
    fn check_capacity(&self, state: &DepositState<H>, force_update: bool) -> Result<()> {
        if state.tree.is_full() {
            return Err(LedgerError::MerkleTreeFull);
        }
        if force_update {
            read(&self.roots).ensure_can_publish()?;
        }
        Ok(())
    }

    fn resolve_deposit_asset(&self, sender: Address, deposit: &AssetDeposit) -> Result<ResolvedAsset> {
        // Native asset: ether, or the gas token on gas token networks
        if deposit.token == Address::ZERO {
            if deposit.value != deposit.amount {
                return Err(LedgerError::AmountDoesNotMatchMsgValue);
            }
            let (origin_network, origin_address, metadata) = match self.config.effective_gas_token() {
                Some(gas_token) => (gas_token.network, gas_token.address, gas_token.metadata.encode()),
                None => (self.config.mainnet_network_id, Address::ZERO, Vec::new()),
            };
            return Ok(ResolvedAsset {
                origin_network,
                origin_address,
                metadata,
                effect: Effect::LockNative {
                    from: sender,
                    amount: deposit.amount,
                },
                amount_from_receipt: false,
            });
        }

        if !deposit.value.is_zero() {
            return Err(LedgerError::MsgValueNotZero);
        }

        // Wrapped ether goes back out as ether
        if Some(deposit.token) == self.weth_token {
            return Ok(ResolvedAsset {
                origin_network: self.config.mainnet_network_id,
                origin_address: Address::ZERO,
                metadata: Vec::new(),
                effect: Effect::BurnWrapped {
                    token: deposit.token,
                    from: sender,
                    amount: deposit.amount,
                },
                amount_from_receipt: false,
            });
        }

        let metadata = self.executor.token_metadata(deposit.token).encode();

        // Previously wrapped foreign asset: burn and report its origin
        if let Some(info) = read(&self.wrapped).token_info(&deposit.token) {
            return Ok(ResolvedAsset {
                origin_network: info.origin_network,
                origin_address: info.origin_token_address,
                metadata,
                effect: Effect::BurnWrapped {
                    token: deposit.token,
                    from: sender,
                    amount: deposit.amount,
                },
                amount_from_receipt: false,
            });
        }

        // Local asset: escrow it
        if let Some(permit) = &deposit.permit {
            self.check_permit(sender, deposit.amount, permit)?;
        }
        Ok(ResolvedAsset {
            origin_network: self.config.network_id,
            origin_address: deposit.token,
            metadata,
            effect: Effect::PullTokens {
                token: deposit.token,
                from: sender,
                amount: deposit.amount,
                permit: deposit.permit.clone(),
            },
            amount_from_receipt: true,
        })
    }

    fn check_permit(&self, sender: Address, amount: U256, permit: &Permit) -> Result<()> {
        if permit.owner != sender {
            return Err(LedgerError::NotValidOwner);
        }
        if permit.spender != self.config.bridge_address {
            return Err(LedgerError::NotValidSpender);
        }
        if permit.value != amount {
            return Err(LedgerError::NotValidAmount);
        }
        Ok(())
    }

    fn commit_message(
        &self,
        state: &mut DepositState<H>,
        sender: Address,
        amount: U256,
        deposit: MessageDeposit,
        ctx: &BlockContext,
    ) -> Result<DepositReceipt> {
        let leaf = BridgeLeaf {
            leaf_type: LeafType::Message,
            origin_network: self.config.network_id,
            origin_address: sender,
            destination_network: deposit.destination_network,
            destination_address: deposit.destination_address,
            amount,
            metadata_hash: metadata_hash::<H>(&deposit.metadata),
        };
        self.commit_deposit(
            state,
            leaf,
            deposit.metadata,
            deposit.force_update_global_exit_root,
            ctx,
        )
    }

    fn commit_deposit(
        &self,
        state: &mut DepositState<H>,
        leaf: BridgeLeaf,
        metadata: Bytes,
        force_update: bool,
        ctx: &BlockContext,
    ) -> Result<DepositReceipt> {
        let leaf_hash = leaf.hash::<H>();
        let deposit_count = state.tree.append(leaf_hash)?;

        debug!(
            deposit_count,
            leaf_type = %leaf.leaf_type,
            origin_network = leaf.origin_network,
            destination_network = leaf.destination_network,
            amount = %leaf.amount,
            "Recorded deposit"
        );

        self.emit(LedgerEvent::Bridge(BridgeEvent {
            leaf_type: leaf.leaf_type,
            origin_network: leaf.origin_network,
            origin_address: leaf.origin_address,
            destination_network: leaf.destination_network,
            destination_address: leaf.destination_address,
            amount: leaf.amount,
            metadata,
            deposit_count,
        }));

        let global_exit_root = if force_update {
            self.publish_local_root(state, ctx)?
        } else {
            None
        };

        Ok(DepositReceipt {
            deposit_count,
            leaf_hash,
            amount: leaf.amount,
            global_exit_root,
        })
    }
}
