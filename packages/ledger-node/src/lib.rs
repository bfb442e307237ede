//! Exit Ledger Node - Library interface
//!
//! Hosts a [`exit_ledger::BridgeLedger`] behind an HTTP API and keeps it in
//! step with its peers. Re-exports internal modules for use in integration
//! tests.

pub mod clock;
pub mod config;
pub mod dto;
pub mod error;
pub mod metrics;
pub mod node;
pub mod server;
pub mod sync;
