//! Ledger configuration and the capabilities derived from it

use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::metadata::TokenMetadata;
use crate::types::MAINNET_NETWORK_ID;

/// Init-code prefix of wrapped tokens when none is configured. Hosts that
/// deploy real contracts replace it with their token creation bytecode.
pub const DEFAULT_WRAPPED_TOKEN_TEMPLATE: &[u8] = b"exit-ledger/wrapped-token/v1";

/// Native token of a network whose gas is not ether.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasTokenConfig {
    pub address: Address,
    pub network: u32,
    pub metadata: TokenMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub network_id: u32,
    /// Network ether originates from; also the network whose exit root is
    /// the mainnet half of every global exit root.
    pub mainnet_network_id: u32,
    /// Address of this bridge. Escrow holder, permit spender and deployer of
    /// wrapped tokens.
    pub bridge_address: Address,
    pub is_aggregator_authority: bool,
    pub gas_token: Option<GasTokenConfig>,
    pub wrapped_token_template: Bytes,
    /// Newest journal events kept for observers; `None` keeps all of them.
    #[serde(default)]
    pub journal_retention: Option<usize>,
}

/// Feature switches a ledger instance runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_gas_token: bool,
    pub is_aggregator_authority: bool,
}

impl LedgerConfig {
    /// Aggregator authority on the mainnet network.
    pub fn authority(network_id: u32, bridge_address: Address) -> Self {
        Self {
            network_id,
            mainnet_network_id: network_id,
            bridge_address,
            is_aggregator_authority: true,
            gas_token: None,
            wrapped_token_template: Bytes::from_static(DEFAULT_WRAPPED_TOKEN_TEMPLATE),
            journal_retention: None,
        }
    }

    /// Consumer network whose global exit roots come from `mainnet_network_id`.
    pub fn replica(network_id: u32, mainnet_network_id: u32, bridge_address: Address) -> Self {
        Self {
            network_id,
            mainnet_network_id,
            bridge_address,
            is_aggregator_authority: false,
            gas_token: None,
            wrapped_token_template: Bytes::from_static(DEFAULT_WRAPPED_TOKEN_TEMPLATE),
            journal_retention: None,
        }
    }

    pub fn with_gas_token(mut self, gas_token: GasTokenConfig) -> Self {
        self.gas_token = Some(gas_token);
        self
    }

    pub fn with_journal_retention(mut self, retention: usize) -> Self {
        self.journal_retention = Some(retention);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.bridge_address == Address::ZERO {
            return Err(LedgerError::InvalidConfig {
                reason: "bridge address must not be zero".to_string(),
            });
        }
        if self.wrapped_token_template.is_empty() {
            return Err(LedgerError::InvalidConfig {
                reason: "wrapped token template must not be empty".to_string(),
            });
        }
        if self.is_aggregator_authority != (self.network_id == self.mainnet_network_id) {
            return Err(LedgerError::InvalidConfig {
                reason: format!(
                    "network {} must be the aggregator authority exactly when it is the mainnet network {}",
                    self.network_id, self.mainnet_network_id
                ),
            });
        }
        if self.journal_retention == Some(0) {
            return Err(LedgerError::InvalidConfig {
                reason: "journal retention must be at least one event".to_string(),
            });
        }
        if let Some(gas_token) = &self.gas_token {
            if gas_token.address == Address::ZERO && gas_token.network != self.mainnet_network_id {
                return Err(LedgerError::GasTokenNetworkMustBeZeroOnEther);
            }
        }
        Ok(())
    }

    /// Gas token, ignoring a configured zero address (which means ether).
    pub fn effective_gas_token(&self) -> Option<&GasTokenConfig> {
        self.gas_token
            .as_ref()
            .filter(|gas_token| gas_token.address != Address::ZERO)
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            supports_gas_token: self.effective_gas_token().is_some(),
            is_aggregator_authority: self.is_aggregator_authority,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::authority(MAINNET_NETWORK_ID, Address::repeat_byte(0xb0))
    }
}
