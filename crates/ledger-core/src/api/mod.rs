//! Ledger RPC client abstraction.
//!
//! The smart-contract network is a black box behind [`LedgerGateway`]: build
//! unsigned operation envelopes, simulate read-only calls, submit signed
//! envelopes, and poll for finality. All implementations perform network I/O
//! and may fail transiently; retry policy lives in the transaction pipeline,
//! not here.

pub mod calls;
pub mod soroban;

pub use calls::ContractCall;
pub use soroban::SorobanGateway;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by the ledger on envelope submission. Submission
/// is not finality; callers must poll the hash until a terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAck {
    pub hash: String,
    pub status: String,
}

/// Finality status of a submitted transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TxPoll {
    /// Durably applied; carries the operation's return value.
    Success(serde_json::Value),
    /// Durably rejected by the ledger. Terminal, never retried.
    Failed(String),
    /// Not yet visible; poll again after backoff.
    NotFound,
}

/// Thin RPC client over the external ledger.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Execute a read-only contract call. Never mutates ledger state; used
    /// for quotes (pool state, odds) and account lookups.
    async fn simulate(&self, call: &ContractCall) -> Result<serde_json::Value>;

    /// Submit a base64 signed envelope.
    async fn submit(&self, envelope_b64: &str) -> Result<SubmitAck>;

    /// Check finality of a previously submitted transaction.
    async fn poll(&self, hash: &str) -> Result<TxPoll>;

    /// Build an unsigned envelope for `call` with `source_account` (hex
    /// public key) as the transaction source, returned as base64.
    async fn build_unsigned(&self, call: &ContractCall, source_account: &str) -> Result<String>;
}
