use thiserror::Error;

/// Errors raised by the exit tree, the global exit root manager and the bridge ledger.
///
/// Every variant is synchronous and final: the operation that returned it left
/// no partial state behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    // ========================================================================
    // Structural Errors
    // ========================================================================
    #[error("Merkle tree is full")]
    MerkleTreeFull,

    #[error("Destination network {network} is invalid for network {own_network}")]
    DestinationNetworkInvalid { network: u32, own_network: u32 },

    // ========================================================================
    // Proof Errors
    // ========================================================================
    #[error("Global exit root is not known")]
    GlobalExitRootInvalid,

    #[error("Invalid SMT proof")]
    InvalidSmtProof,

    #[error("Global index has bits set outside the mainnet flag, rollup index and leaf index")]
    GlobalIndexInvalid,

    #[error("Leaf index {index} out of range for deposit count {deposit_count}")]
    LeafIndexOutOfRange { index: u64, deposit_count: u64 },

    #[error("Proof history is not retained by this tree")]
    ProofHistoryUnavailable,

    // ========================================================================
    // Replay Errors
    // ========================================================================
    #[error("Already claimed")]
    AlreadyClaimed,

    // ========================================================================
    // Value Errors
    // ========================================================================
    #[error("Amount does not match the attached native value")]
    AmountDoesNotMatchMsgValue,

    #[error("Attached native value must be zero")]
    MsgValueNotZero,

    #[error("Permit amount does not match the deposit amount")]
    NotValidAmount,

    #[error("Permit owner does not match the sender")]
    NotValidOwner,

    #[error("Permit spender is not the bridge")]
    NotValidSpender,

    #[error("Gas token network must be zero when the gas token is ether")]
    GasTokenNetworkMustBeZeroOnEther,

    #[error("Native token is ether")]
    NativeTokenIsEther,

    #[error("Messages cannot carry native value on gas token networks")]
    NoValueInMessagesOnGasTokenNetworks,

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    #[error("Message failed: {reason}")]
    MessageFailed { reason: String },

    #[error("Transfer failed: {reason}")]
    TransferFailed { reason: String },

    // ========================================================================
    // Availability Errors
    // ========================================================================
    #[error("Only allowed in emergency state")]
    OnlyEmergencyState,

    #[error("Not allowed in emergency state")]
    OnlyNotEmergencyState,

    // ========================================================================
    // Role Errors
    // ========================================================================
    #[error("Only the aggregator authority can do this")]
    OnlyAggregatorAuthority,

    #[error("Only a replica can do this")]
    OnlyReplica,

    // ========================================================================
    // Registry Errors
    // ========================================================================
    #[error("Wrapped token already registered for origin network {origin_network}")]
    WrappedTokenAlreadyRegistered { origin_network: u32 },
}

impl LedgerError {
    /// Stable variant name used by API responses and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MerkleTreeFull => "MerkleTreeFull",
            Self::DestinationNetworkInvalid { .. } => "DestinationNetworkInvalid",
            Self::GlobalExitRootInvalid => "GlobalExitRootInvalid",
            Self::InvalidSmtProof => "InvalidSmtProof",
            Self::GlobalIndexInvalid => "GlobalIndexInvalid",
            Self::LeafIndexOutOfRange { .. } => "LeafIndexOutOfRange",
            Self::ProofHistoryUnavailable => "ProofHistoryUnavailable",
            Self::AlreadyClaimed => "AlreadyClaimed",
            Self::AmountDoesNotMatchMsgValue => "AmountDoesNotMatchMsgValue",
            Self::MsgValueNotZero => "MsgValueNotZero",
            Self::NotValidAmount => "NotValidAmount",
            Self::NotValidOwner => "NotValidOwner",
            Self::NotValidSpender => "NotValidSpender",
            Self::GasTokenNetworkMustBeZeroOnEther => "GasTokenNetworkMustBeZeroOnEther",
            Self::NativeTokenIsEther => "NativeTokenIsEther",
            Self::NoValueInMessagesOnGasTokenNetworks => "NoValueInMessagesOnGasTokenNetworks",
            Self::InvalidConfig { .. } => "InvalidConfig",
            Self::MessageFailed { .. } => "MessageFailed",
            Self::TransferFailed { .. } => "TransferFailed",
            Self::OnlyEmergencyState => "OnlyEmergencyState",
            Self::OnlyNotEmergencyState => "OnlyNotEmergencyState",
            Self::OnlyAggregatorAuthority => "OnlyAggregatorAuthority",
            Self::OnlyReplica => "OnlyReplica",
            Self::WrappedTokenAlreadyRegistered { .. } => "WrappedTokenAlreadyRegistered",
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
