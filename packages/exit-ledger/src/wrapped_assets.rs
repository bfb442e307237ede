//! Wrapped asset registry
//!
//! A foreign token gets exactly one local wrapped representation, whose
//! address is derived deterministically from the token's origin before it is
//! ever deployed. Anyone can predict the address with
//! [`WrappedAssetRegistry::compute_wrapped_address`].

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use alloy_primitives::{Address, B256};

use crate::error::{LedgerError, Result};
use crate::hash::{Keccak256, NodeHasher};
use crate::metadata::TokenMetadata;
use crate::types::TokenInfo;

/// Turns (deployer, salt, init code) into a contract address.
pub trait AddressDerivation: Send + Sync {
    fn derive(&self, deployer: &Address, salt: &B256, init_code: &[u8]) -> Address;
}

/// `H(0xff ‖ deployer ‖ salt ‖ H(initCode))[12..]`
#[derive(Debug, Clone, Copy, Default)]
pub struct Create2<H: NodeHasher = Keccak256>(PhantomData<fn() -> H>);

impl<H: NodeHasher> Create2<H> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<H: NodeHasher> AddressDerivation for Create2<H> {
    fn derive(&self, deployer: &Address, salt: &B256, init_code: &[u8]) -> Address {
        let init_code_hash = H::hash(init_code);

        // 1 + 20 + 32 + 32 = 85 bytes
        let mut data = [0u8; 85];
        data[0] = 0xff;
        data[1..21].copy_from_slice(deployer.as_slice());
        data[21..53].copy_from_slice(salt.as_slice());
        data[53..85].copy_from_slice(init_code_hash.as_slice());

        Address::from_slice(&H::hash(&data)[12..])
    }
}

/// Salt identifying a token origin: `H(be32(originNetwork) ‖ originToken)`.
pub fn token_info_hash<H: NodeHasher>(origin_network: u32, origin_token: &Address) -> B256 {
    let mut data = [0u8; 24];
    data[0..4].copy_from_slice(&origin_network.to_be_bytes());
    data[4..24].copy_from_slice(origin_token.as_slice());
    H::hash(&data)
}

pub struct WrappedAssetRegistry<H: NodeHasher = Keccak256> {
    deployer: Address,
    template: Vec<u8>,
    derivation: Box<dyn AddressDerivation>,
    token_info_to_wrapped: HashMap<B256, Address>,
    wrapped_to_token_info: HashMap<Address, TokenInfo>,
    _hasher: PhantomData<fn() -> H>,
}

impl<H: NodeHasher> fmt::Debug for WrappedAssetRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrappedAssetRegistry")
            .field("deployer", &self.deployer)
            .field("template_len", &self.template.len())
            .field("wrapped_tokens", &self.wrapped_to_token_info.len())
            .finish()
    }
}

impl<H: NodeHasher> WrappedAssetRegistry<H> {
    /// Registry deriving addresses with CREATE2 from `deployer`.
    pub fn new(deployer: Address, template: Vec<u8>) -> Self {
        Self::with_derivation(deployer, template, Box::new(Create2::<H>::new()))
    }

    pub fn with_derivation(
        deployer: Address,
        template: Vec<u8>,
        derivation: Box<dyn AddressDerivation>,
    ) -> Self {
        Self {
            deployer,
            template,
            derivation,
            token_info_to_wrapped: HashMap::new(),
            wrapped_to_token_info: HashMap::new(),
            _hasher: PhantomData,
        }
    }

    pub fn deployer(&self) -> Address {
        self.deployer
    }

    /// Init code of a wrapped token: template followed by the encoded metadata.
    pub fn init_code(&self, metadata: &[u8]) -> Vec<u8> {
        let mut code = Vec::with_capacity(self.template.len() + metadata.len());
        code.extend_from_slice(&self.template);
        code.extend_from_slice(metadata);
        code
    }

    /// Address the wrapped token for this origin will have.
    pub fn compute_wrapped_address(
        &self,
        origin_network: u32,
        origin_token: &Address,
        name: &str,
        symbol: &str,
        decimals: u8,
    ) -> Address {
        let metadata = TokenMetadata::new(name, symbol, decimals).encode();
        self.compute_wrapped_address_from_metadata(origin_network, origin_token, &metadata)
    }

    pub fn compute_wrapped_address_from_metadata(
        &self,
        origin_network: u32,
        origin_token: &Address,
        metadata: &[u8],
    ) -> Address {
        let salt = token_info_hash::<H>(origin_network, origin_token);
        self.derive_with_salt(&salt, metadata)
    }

    pub(crate) fn derive_with_salt(&self, salt: &B256, metadata: &[u8]) -> Address {
        self.derivation
            .derive(&self.deployer, salt, &self.init_code(metadata))
    }

    pub fn resolve(&self, origin_network: u32, origin_token: &Address) -> Option<Address> {
        self.token_info_to_wrapped
            .get(&token_info_hash::<H>(origin_network, origin_token))
            .copied()
    }

    pub fn token_info(&self, wrapped: &Address) -> Option<TokenInfo> {
        self.wrapped_to_token_info.get(wrapped).copied()
    }

    /// Record both directions of the mapping. An origin is registered at most once.
    pub fn register(
        &mut self,
        origin_network: u32,
        origin_token: Address,
        wrapped: Address,
    ) -> Result<()> {
        let key = token_info_hash::<H>(origin_network, &origin_token);
        if self.token_info_to_wrapped.contains_key(&key)
            || self.wrapped_to_token_info.contains_key(&wrapped)
        {
            return Err(LedgerError::WrappedTokenAlreadyRegistered { origin_network });
        }

        self.token_info_to_wrapped.insert(key, wrapped);
        self.wrapped_to_token_info
            .insert(wrapped, TokenInfo::new(origin_network, origin_token));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.wrapped_to_token_info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrapped_to_token_info.is_empty()
    }
}
