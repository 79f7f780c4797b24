//! Custodial admin signer.
//!
//! In custodial deployments the platform admin key signs ledger operations
//! the backend originates (market creation, pool seeding, admin-relayed
//! trades). This is the only private key the process ever holds; user funds
//! on users' own accounts stay outside its authority by construction.

use super::envelope::{DecoratedSignature, Envelope};
use super::{network_id, signature_hint};
use crate::{Error, Result};
use ed25519_dalek::{Signer as _, SigningKey};

pub struct AdminSigner {
    signing_key: SigningKey,
    public_key: [u8; 32],
    network: [u8; 32],
}

impl AdminSigner {
    /// Create a signer from a hex-encoded 32-byte ed25519 secret key.
    pub fn from_hex_secret(secret_hex: &str, network_passphrase: &str) -> Result<Self> {
        let bytes: [u8; 32] = hex::decode(secret_hex.trim())
            .map_err(|_| Error::Config {
                message: "admin secret key is not valid hex".to_string(),
            })?
            .try_into()
            .map_err(|_| Error::Config {
                message: "admin secret key must be 32 bytes".to_string(),
            })?;
        let signing_key = SigningKey::from_bytes(&bytes);
        let public_key = signing_key.verifying_key().to_bytes();
        Ok(Self {
            signing_key,
            public_key,
            network: network_id(network_passphrase),
        })
    }

    /// Hex-encoded public key, used as the source account for envelopes the
    /// backend builds for itself.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Sign a base64 unsigned envelope, appending a decorated signature over
    /// the canonical transaction hash. For fee-bump envelopes the inner
    /// transaction is signed.
    pub fn sign_envelope(&self, envelope_b64: &str) -> Result<String> {
        let mut envelope = Envelope::from_base64(envelope_b64)?;
        let digest = envelope.inner_tx().hash(&self.network)?;
        let signature = self.signing_key.sign(&digest);
        let decorated = DecoratedSignature {
            hint: signature_hint(&self.public_key),
            signature: signature.to_bytes().to_vec(),
        };

        match &mut envelope {
            Envelope::Tx(env) => env.signatures.push(decorated),
            Envelope::FeeBump(env) => env.inner.signatures.push(decorated),
        }
        envelope.to_base64()
    }
}

impl std::fmt::Debug for AdminSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose the secret key in debug output
        f.debug_struct("AdminSigner")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::envelope::{Operation, Transaction, TransactionEnvelope};
    use crate::signing::verify_envelope;

    const TEST_SECRET: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";
    const PASSPHRASE: &str = "Stakeline Test Network";

    fn unsigned(source: &str) -> String {
        Envelope::Tx(TransactionEnvelope {
            tx: Transaction {
                source_account: source.to_string(),
                sequence: 42,
                fee: 100,
                operations: vec![Operation {
                    contract_id: "CMKT".to_string(),
                    function: "create_market".to_string(),
                    args_json: "[]".to_string(),
                }],
            },
            signatures: Vec::new(),
        })
        .to_base64()
        .unwrap()
    }

    #[test]
    fn test_signed_envelope_verifies() {
        let signer = AdminSigner::from_hex_secret(TEST_SECRET, PASSPHRASE).unwrap();
        let signed = signer.sign_envelope(&unsigned(&signer.public_key_hex())).unwrap();

        let envelope = Envelope::from_base64(&signed).unwrap();
        verify_envelope(
            &envelope,
            &signer.public_key_hex(),
            &network_id(PASSPHRASE),
        )
        .unwrap();
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(AdminSigner::from_hex_secret("zz", PASSPHRASE).is_err());
        assert!(AdminSigner::from_hex_secret("1234", PASSPHRASE).is_err());
    }

    #[test]
    fn test_debug_does_not_expose_secret() {
        let signer = AdminSigner::from_hex_secret(TEST_SECRET, PASSPHRASE).unwrap();
        let debug_str = format!("{:?}", signer);
        assert!(debug_str.contains("public_key"));
        assert!(!debug_str.contains(TEST_SECRET));
    }
}
