//! Envelope signature verification and custodial signing.
//!
//! The security gate for non-custodial flows: a user submits a signed,
//! base64-encoded envelope and the backend proves it was signed by the
//! caller's registered public key before anything reaches the ledger. The
//! expected key always comes from a previously authenticated identity, never
//! from the request body, so a caller cannot replay someone else's signed
//! payload under their own claimed identity.

pub mod envelope;
pub mod signer;

pub use envelope::{
    DecoratedSignature, Envelope, FeeBumpEnvelope, Operation, Transaction, TransactionEnvelope,
};
pub use signer::AdminSigner;

use crate::{Error, Result};
use ed25519_dalek::{Signature, VerifyingKey};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Derive the 32-byte network id from the network passphrase.
pub fn network_id(passphrase: &str) -> [u8; 32] {
    Sha256::digest(passphrase.as_bytes()).into()
}

/// Signature hint: the last four bytes of the signer's public key.
pub fn signature_hint(public_key: &[u8; 32]) -> [u8; 4] {
    let mut hint = [0u8; 4];
    hint.copy_from_slice(&public_key[28..]);
    hint
}

/// Parse a hex-encoded 32-byte ed25519 public key.
pub fn decode_public_key(public_key_hex: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(public_key_hex.trim())
        .map_err(|_| Error::Validation("public key is not valid hex".to_string()))?;
    bytes
        .try_into()
        .map_err(|_| Error::Validation("public key must be 32 bytes".to_string()))
}

/// Decode a base64 envelope, failing with `MalformedEnvelope` when neither a
/// simple nor a fee-bump envelope decodes.
pub fn decode_envelope(envelope_b64: &str) -> Result<Envelope> {
    Envelope::from_base64(envelope_b64)
}

/// Verify that `envelope` carries a valid signature from `expected_public_key`
/// over the canonical transaction hash. Fee-bump envelopes recurse into the
/// inner envelope: the expected signer authorizes the inner transaction, not
/// the fee bump. Fails closed with `InvalidSignature` when no matching
/// signature verifies.
pub fn verify_envelope(
    envelope: &Envelope,
    expected_public_key: &str,
    network: &[u8; 32],
) -> Result<()> {
    let key_bytes = decode_public_key(expected_public_key)?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| Error::Validation("invalid ed25519 public key".to_string()))?;

    let inner = match envelope {
        Envelope::Tx(env) => env,
        Envelope::FeeBump(env) => &env.inner,
    };

    let digest = inner.tx.hash(network)?;
    let hint = signature_hint(&key_bytes);

    for decorated in inner.signatures.iter().filter(|s| s.hint == hint) {
        let Ok(signature) = Signature::from_slice(&decorated.signature) else {
            continue;
        };
        if verifying_key.verify_strict(&digest, &signature).is_ok() {
            return Ok(());
        }
    }

    warn!(
        expected = %expected_public_key,
        signatures = inner.signatures.len(),
        "envelope carried no valid signature from the expected key"
    );
    Err(Error::InvalidSignature)
}
