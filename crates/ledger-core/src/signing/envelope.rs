//! Transaction envelope model and codec.
//!
//! Envelopes are bincode-serialized and exchanged as base64. A simple
//! envelope wraps one transaction with its signatures; a fee-bump envelope
//! wraps an inner signed envelope with a separate fee source and signature
//! list. The canonical transaction hash binds the network passphrase so a
//! signature is only valid on the network it was produced for.

use crate::{Error, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Envelope type tags mixed into the canonical hash.
const ENVELOPE_TYPE_TX: u8 = 2;

/// A signature plus the last four bytes of the signer's public key. The hint
/// lets a verifier pick the right signature out of a multi-signer list
/// without trial verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: Vec<u8>,
}

/// One contract invocation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub contract_id: String,
    pub function: String,
    /// JSON-encoded argument list; kept as a string so the binary codec
    /// stays self-contained.
    pub args_json: String,
}

/// The signed payload: source account, sequence number, fee, operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hex-encoded 32-byte ed25519 public key of the source account.
    pub source_account: String,
    pub sequence: i64,
    pub fee: u64,
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Canonical hash signed by the source account:
    /// `sha256(network_id ‖ type tag ‖ bincode(tx))`.
    pub fn hash(&self, network_id: &[u8; 32]) -> Result<[u8; 32]> {
        let body = bincode::serialize(self)
            .map_err(|e| Error::MalformedEnvelope(format!("unserializable transaction: {}", e)))?;
        let mut hasher = Sha256::new();
        hasher.update(network_id);
        hasher.update([ENVELOPE_TYPE_TX]);
        hasher.update(&body);
        Ok(hasher.finalize().into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub tx: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBumpEnvelope {
    /// Hex-encoded public key paying the bumped fee.
    pub fee_source: String,
    pub fee: u64,
    pub inner: TransactionEnvelope,
    pub signatures: Vec<DecoratedSignature>,
}

/// Either a simple or a fee-bump envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Envelope {
    Tx(TransactionEnvelope),
    FeeBump(FeeBumpEnvelope),
}

impl Envelope {
    /// Decode a base64 envelope. Fails with `MalformedEnvelope` when the
    /// input is not valid base64 or neither envelope form decodes.
    pub fn from_base64(envelope_b64: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(envelope_b64.trim())
            .map_err(|e| Error::MalformedEnvelope(format!("invalid base64: {}", e)))?;

        bincode::deserialize::<Envelope>(&bytes).map_err(|_| {
            Error::MalformedEnvelope(
                "payload is neither a transaction nor a fee-bump envelope".to_string(),
            )
        })
    }

    /// Encode to base64 for submission.
    pub fn to_base64(&self) -> Result<String> {
        let bytes = bincode::serialize(self)
            .map_err(|e| Error::MalformedEnvelope(format!("unserializable envelope: {}", e)))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// The transaction whose hash the source account signs. For fee-bump
    /// envelopes this is the inner transaction.
    pub fn inner_tx(&self) -> &Transaction {
        match self {
            Envelope::Tx(env) => &env.tx,
            Envelope::FeeBump(env) => &env.inner.tx,
        }
    }
}
