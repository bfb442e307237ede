//! Request and response bodies of the node API
//!
//! Addresses and hashes are 0x-prefixed hex strings, amounts are hex `U256`
//! strings as serialized by alloy.

use alloy_primitives::{Address, Bytes, B256, U256};
use exit_ledger::{AssetDeposit, Claim, GlobalIndex, LedgerError, MessageDeposit, SmtProof};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeAssetRequest {
    pub sender: Address,
    #[serde(flatten)]
    pub deposit: AssetDeposit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeMessageRequest {
    pub sender: Address,
    #[serde(flatten)]
    pub deposit: MessageDeposit,
}

/// Claim as submitted over HTTP, with the packed global index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub smt_proof_local_exit_root: SmtProof,
    pub smt_proof_rollup_exit_root: SmtProof,
    pub global_index: U256,
    pub mainnet_exit_root: B256,
    pub rollup_exit_root: B256,
    pub origin_network: u32,
    pub origin_address: Address,
    pub destination_network: u32,
    pub destination_address: Address,
    pub amount: U256,
    #[serde(default)]
    pub metadata: Bytes,
}

impl TryFrom<ClaimRequest> for Claim {
    type Error = LedgerError;

    fn try_from(request: ClaimRequest) -> Result<Self, Self::Error> {
        Ok(Claim {
            smt_proof_local_exit_root: request.smt_proof_local_exit_root,
            smt_proof_rollup_exit_root: request.smt_proof_rollup_exit_root,
            global_index: GlobalIndex::from_u256(request.global_index)?,
            mainnet_exit_root: request.mainnet_exit_root,
            rollup_exit_root: request.rollup_exit_root,
            origin_network: request.origin_network,
            origin_address: request.origin_address,
            destination_network: request.destination_network,
            destination_address: request.destination_address,
            amount: request.amount,
            metadata: request.metadata,
        })
    }
}

impl From<Claim> for ClaimRequest {
    fn from(claim: Claim) -> Self {
        Self {
            smt_proof_local_exit_root: claim.smt_proof_local_exit_root,
            smt_proof_rollup_exit_root: claim.smt_proof_rollup_exit_root,
            global_index: claim.global_index.to_u256(),
            mainnet_exit_root: claim.mainnet_exit_root,
            rollup_exit_root: claim.rollup_exit_root,
            origin_network: claim.origin_network,
            origin_address: claim.origin_address,
            destination_network: claim.destination_network,
            destination_address: claim.destination_address,
            amount: claim.amount,
            metadata: claim.metadata,
        }
    }
}

/// Exit tree and global exit root state of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootResponse {
    pub network_id: u32,
    pub local_exit_root: B256,
    pub deposit_count: u64,
    pub last_updated_deposit_count: u64,
    pub mainnet_exit_root: Option<B256>,
    pub rollup_exit_root: Option<B256>,
    pub last_global_exit_root: Option<B256>,
    pub l1_info_root: Option<B256>,
    /// Replicas: the local exit root last published for the authority.
    pub last_local_exit_root: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositCountResponse {
    pub deposit_count: u64,
    pub last_updated_deposit_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResponse {
    pub index: u32,
    pub deposit_count: u64,
    pub root: B256,
    pub proof: SmtProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimedResponse {
    pub source_network: u32,
    pub leaf_index: u32,
    pub claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedResponse {
    pub origin_network: u32,
    pub origin_token_address: Address,
    pub wrapped_token_address: Option<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalExitRootResponse {
    pub global_exit_root: B256,
    pub known: bool,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalExitRootUpdateResponse {
    /// Set on the authority; replicas only refresh their local root.
    pub global_exit_root: Option<B256>,
    pub last_updated_deposit_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyResponse {
    pub emergency_state: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub from: u64,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintRequest {
    pub token: Address,
    pub holder: Address,
    pub amount: U256,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub token: Address,
    pub holder: Address,
    pub balance: U256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub network_id: u32,
    pub aggregator_authority: bool,
    pub emergency_state: bool,
    pub deposit_count: u64,
    pub known_global_exit_roots: usize,
    pub sync_cursor: u64,
    pub last_sync_ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use exit_ledger::TREE_DEPTH;

    fn request(global_index: U256) -> ClaimRequest {
        ClaimRequest {
            smt_proof_local_exit_root: [B256::ZERO; TREE_DEPTH],
            smt_proof_rollup_exit_root: [B256::ZERO; TREE_DEPTH],
            global_index,
            mainnet_exit_root: B256::ZERO,
            rollup_exit_root: B256::ZERO,
            origin_network: 0,
            origin_address: Address::ZERO,
            destination_network: 1,
            destination_address: Address::repeat_byte(1),
            amount: U256::from(1u64),
            metadata: Bytes::new(),
        }
    }

    #[test]
    fn test_claim_request_decodes_global_index() {
        let packed = GlobalIndex::rollup(3, 7).to_u256();
        let claim = Claim::try_from(request(packed)).unwrap();
        assert_eq!(claim.global_index, GlobalIndex::rollup(3, 7));
        assert_eq!(ClaimRequest::from(claim).global_index, packed);
    }

    #[test]
    fn test_claim_request_rejects_bad_index() {
        let bad = U256::from(1u8) << 70usize;
        assert_eq!(
            Claim::try_from(request(bad)).unwrap_err(),
            LedgerError::GlobalIndexInvalid
        );
    }

    #[test]
    fn test_bridge_asset_request_is_flat() {
        let json = serde_json::json!({
            "sender": "0x1111111111111111111111111111111111111111",
            "destination_network": 2,
            "destination_address": "0x2222222222222222222222222222222222222222",
            "amount": "0x64",
            "token": "0x0000000000000000000000000000000000000000",
            "value": "0x64"
        });
        let request: BridgeAssetRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.deposit.amount, U256::from(100u64));
        assert!(!request.deposit.force_update_global_exit_root);
        assert!(request.deposit.permit.is_none());
    }
}
