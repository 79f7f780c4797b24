//! Submission-to-finality state machine for ledger operations.
//!
//! Every operation moves `SUBMITTED -> poll loop -> CONFIRMED | FAILED |
//! TIMED_OUT`. A ledger-reported FAILED is terminal and never retried.
//! NOT_FOUND responses consume the confirmation budget with doubling
//! backoff; network-level errors consume a separate, smaller budget with a
//! fixed delay. Exhausting either budget quarantines the operation in the
//! dead-letter queue and raises an alert. Callers must treat any error from
//! this module as "the operation did not happen" and apply no local-store
//! side effects.

use crate::alerts::{Alert, AlertSink};
use crate::dlq::DeadLetterSink;
use ledger_core::api::{LedgerGateway, TxPoll};
use ledger_core::config::ReliabilityConfig;
use ledger_core::signing::{self, Envelope};
use ledger_core::types::DeadLetter;
use ledger_core::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Originating call site, carried into dead-letter records so an operator
/// can triage a quarantined operation without grepping logs.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub service: String,
    pub function: String,
    pub params: Value,
}

impl OperationContext {
    pub fn new(service: impl Into<String>, function: impl Into<String>, params: Value) -> Self {
        Self {
            service: service.into(),
            function: function.into(),
            params,
        }
    }
}

/// A durably confirmed operation and its return payload.
#[derive(Debug, Clone)]
pub struct ConfirmedTx {
    pub hash: String,
    pub return_value: Value,
}

/// Reliability wrapper around a [`LedgerGateway`].
pub struct TransactionPipeline {
    gateway: Arc<dyn LedgerGateway>,
    dead_letters: Arc<dyn DeadLetterSink>,
    alerts: Arc<dyn AlertSink>,
    config: ReliabilityConfig,
    network: [u8; 32],
}

impl TransactionPipeline {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        dead_letters: Arc<dyn DeadLetterSink>,
        alerts: Arc<dyn AlertSink>,
        config: ReliabilityConfig,
        network_passphrase: &str,
    ) -> Self {
        Self {
            gateway,
            dead_letters,
            alerts,
            config,
            network: signing::network_id(network_passphrase),
        }
    }

    /// Submit a signed envelope and drive it to finality.
    pub async fn execute(&self, envelope_b64: &str, ctx: OperationContext) -> Result<ConfirmedTx> {
        // The canonical hash is computable locally, so even a pre-submission
        // failure gets a stable dead-letter key.
        let envelope = Envelope::from_base64(envelope_b64)?;
        let hash = hex::encode(envelope.inner_tx().hash(&self.network)?);

        let mut network_attempts = 0u32;

        // Submission, with the network retry budget. Duplicate resubmission
        // after an ambiguous failure is rejected by the ledger's
        // sequence-number ordering, not deduplicated here.
        let ack = loop {
            match self.gateway.submit(envelope_b64).await {
                Ok(ack) => break ack,
                Err(e) if is_network_error(&e) => {
                    network_attempts += 1;
                    warn!(
                        hash = %hash,
                        attempt = network_attempts,
                        error = %e,
                        "network error submitting transaction"
                    );
                    if network_attempts >= self.config.network_retry_budget {
                        return Err(self
                            .quarantine(
                                &hash,
                                &ctx,
                                Error::NetworkExhausted {
                                    attempts: network_attempts,
                                    last_error: e.to_string(),
                                },
                            )
                            .await);
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.network_retry_delay_ms))
                        .await;
                }
                Err(e) => return Err(e),
            }
        };

        debug!(hash = %ack.hash, status = %ack.status, function = %ctx.function, "transaction submitted");
        self.confirm(&ack.hash, ctx, network_attempts).await
    }

    /// Decode, verify, and submit a user-signed envelope. The expected key
    /// must come from a previously authenticated identity; a verification
    /// failure is adversarial input and is never retried.
    pub async fn submit_signed(
        &self,
        envelope_b64: &str,
        expected_public_key: &str,
        ctx: OperationContext,
    ) -> Result<ConfirmedTx> {
        let envelope = signing::decode_envelope(envelope_b64)?;
        if let Err(e) = signing::verify_envelope(&envelope, expected_public_key, &self.network) {
            warn!(
                function = %ctx.function,
                expected = %expected_public_key,
                "rejected envelope with invalid signature"
            );
            return Err(e);
        }
        self.execute(envelope_b64, ctx).await
    }

    /// Poll a submitted transaction until a terminal status or budget
    /// exhaustion.
    async fn confirm(
        &self,
        hash: &str,
        ctx: OperationContext,
        mut network_attempts: u32,
    ) -> Result<ConfirmedTx> {
        let mut poll_attempts = 0u32;
        let mut backoff = Duration::from_millis(self.config.poll_base_delay_ms);
        let backoff_cap = Duration::from_millis(self.config.poll_max_delay_ms);

        loop {
            match self.gateway.poll(hash).await {
                Ok(TxPoll::Success(return_value)) => {
                    info!(hash = %hash, function = %ctx.function, polls = poll_attempts + 1, "transaction confirmed");
                    return Ok(ConfirmedTx {
                        hash: hash.to_string(),
                        return_value,
                    });
                }
                // Ledger-reported failure is terminal: no retry, straight to
                // quarantine.
                Ok(TxPoll::Failed(reason)) => {
                    return Err(self
                        .quarantine(
                            hash,
                            &ctx,
                            Error::LedgerRejected {
                                hash: hash.to_string(),
                                reason,
                            },
                        )
                        .await);
                }
                Ok(TxPoll::NotFound) => {
                    poll_attempts += 1;
                    if poll_attempts >= self.config.max_poll_attempts {
                        return Err(self
                            .quarantine(
                                hash,
                                &ctx,
                                Error::ConfirmationTimeout {
                                    hash: hash.to_string(),
                                    attempts: poll_attempts,
                                },
                            )
                            .await);
                    }
                    debug!(hash = %hash, attempt = poll_attempts, backoff_ms = backoff.as_millis() as u64, "transaction not yet found");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(backoff_cap);
                }
                Err(e) if is_network_error(&e) => {
                    network_attempts += 1;
                    warn!(
                        hash = %hash,
                        attempt = network_attempts,
                        error = %e,
                        "network error polling transaction"
                    );
                    if network_attempts >= self.config.network_retry_budget {
                        return Err(self
                            .quarantine(
                                hash,
                                &ctx,
                                Error::NetworkExhausted {
                                    attempts: network_attempts,
                                    last_error: e.to_string(),
                                },
                            )
                            .await);
                    }
                    tokio::time::sleep(Duration::from_millis(self.config.network_retry_delay_ms))
                        .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record a permanent failure in the DLQ (idempotent per hash) and raise
    /// an alert, then hand the typed error back for the caller to surface.
    async fn quarantine(&self, hash: &str, ctx: &OperationContext, error: Error) -> Error {
        let reason = error.to_string();
        let letter = DeadLetter::new(
            hash,
            ctx.service.clone(),
            ctx.function.clone(),
            ctx.params.clone(),
            reason.clone(),
        );
        if let Err(e) = self.dead_letters.record(&letter).await {
            // The operation is already lost; losing the DLQ record as well
            // only costs triage convenience, so log and continue.
            warn!(hash = %hash, error = %e, "failed to record dead letter");
        }
        self.alerts
            .raise(Alert::permanent_failure(
                hash,
                &ctx.service,
                &ctx.function,
                &reason,
            ))
            .await;
        error
    }
}

/// Transient transport-level failures: RPC unreachable or a malformed
/// response. Distinct from a ledger-reported FAILED status, which is final.
fn is_network_error(error: &Error) -> bool {
    matches!(error, Error::Http(_) | Error::Rpc { .. } | Error::Json(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogAlertSink;
    use crate::dlq::MemoryDeadLetterSink;
    use ledger_core::api::{ContractCall, SubmitAck};
    use ledger_core::signing::{Operation, Transaction, TransactionEnvelope};
    use mockall::mock;
    use mockall::Sequence;
    use serde_json::json;

    mock! {
        Gateway {}

        #[async_trait::async_trait]
        impl LedgerGateway for Gateway {
            async fn simulate(&self, call: &ContractCall) -> Result<serde_json::Value>;
            async fn submit(&self, envelope_b64: &str) -> Result<SubmitAck>;
            async fn poll(&self, hash: &str) -> Result<TxPoll>;
            async fn build_unsigned(&self, call: &ContractCall, source_account: &str) -> Result<String>;
        }
    }

    const PASSPHRASE: &str = "Stakeline Test Network";

    // RFC 8032 test vector 1 secret; only used to derive a well-formed
    // verifying key for negative signature tests.
    const TEST_SECRET: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn test_public_key() -> String {
        ledger_core::signing::AdminSigner::from_hex_secret(TEST_SECRET, PASSPHRASE)
            .unwrap()
            .public_key_hex()
    }

    fn fast_config() -> ReliabilityConfig {
        ReliabilityConfig {
            max_poll_attempts: 12,
            poll_base_delay_ms: 1,
            poll_max_delay_ms: 4,
            network_retry_budget: 3,
            network_retry_delay_ms: 1,
        }
    }

    fn test_envelope() -> String {
        Envelope::Tx(TransactionEnvelope {
            tx: Transaction {
                source_account: "cd".repeat(32),
                sequence: 1,
                fee: 100,
                operations: vec![Operation {
                    contract_id: "CAMM".to_string(),
                    function: "buy_shares".to_string(),
                    args_json: "[]".to_string(),
                }],
            },
            signatures: Vec::new(),
        })
        .to_base64()
        .unwrap()
    }

    fn ctx() -> OperationContext {
        OperationContext::new("trade", "buy_shares", json!({"market": "m1"}))
    }

    fn pipeline(
        gateway: MockGateway,
        dlq: Arc<MemoryDeadLetterSink>,
        config: ReliabilityConfig,
    ) -> TransactionPipeline {
        TransactionPipeline::new(
            Arc::new(gateway),
            dlq,
            Arc::new(LogAlertSink),
            config,
            PASSPHRASE,
        )
    }

    fn expect_submit(gateway: &mut MockGateway) {
        gateway.expect_submit().times(1).returning(|_| {
            Ok(SubmitAck {
                hash: "abc123".to_string(),
                status: "PENDING".to_string(),
            })
        });
    }

    #[tokio::test]
    async fn test_not_found_twice_then_success_polls_exactly_three_times() {
        let mut gateway = MockGateway::new();
        expect_submit(&mut gateway);

        let mut seq = Sequence::new();
        for _ in 0..2 {
            gateway
                .expect_poll()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(TxPoll::NotFound));
        }
        gateway
            .expect_poll()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(TxPoll::Success(json!({"ok": true}))));

        let dlq = Arc::new(MemoryDeadLetterSink::new());
        let pipeline = pipeline(gateway, dlq.clone(), fast_config());

        let confirmed = pipeline.execute(&test_envelope(), ctx()).await.unwrap();
        assert_eq!(confirmed.hash, "abc123");
        assert_eq!(confirmed.return_value, json!({"ok": true}));
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_failed_is_terminal_one_poll_and_dead_letter() {
        let mut gateway = MockGateway::new();
        expect_submit(&mut gateway);
        gateway
            .expect_poll()
            .times(1)
            .returning(|_| Ok(TxPoll::Failed("insufficient liquidity".to_string())));

        let dlq = Arc::new(MemoryDeadLetterSink::new());
        let pipeline = pipeline(gateway, dlq.clone(), fast_config());

        let err = pipeline.execute(&test_envelope(), ctx()).await.unwrap_err();
        assert!(matches!(err, Error::LedgerRejected { .. }));
        assert_eq!(dlq.len(), 1);
        let letter = &dlq.letters()[0];
        assert_eq!(letter.tx_hash, "abc123");
        assert_eq!(letter.service_name, "trade");
        assert_eq!(letter.function_name, "buy_shares");
    }

    #[tokio::test]
    async fn test_poll_budget_exhaustion_times_out() {
        let mut gateway = MockGateway::new();
        expect_submit(&mut gateway);
        gateway
            .expect_poll()
            .times(3)
            .returning(|_| Ok(TxPoll::NotFound));

        let dlq = Arc::new(MemoryDeadLetterSink::new());
        let config = ReliabilityConfig {
            max_poll_attempts: 3,
            ..fast_config()
        };
        let pipeline = pipeline(gateway, dlq.clone(), config);

        let err = pipeline.execute(&test_envelope(), ctx()).await.unwrap_err();
        assert!(matches!(err, Error::ConfirmationTimeout { attempts: 3, .. }));
        assert_eq!(dlq.len(), 1);
    }

    #[tokio::test]
    async fn test_network_budget_separate_from_poll_budget() {
        let mut gateway = MockGateway::new();
        expect_submit(&mut gateway);

        // Poll alternates NOT_FOUND / network error; the network budget (3)
        // trips before the poll budget (12).
        let mut seq = Sequence::new();
        for _ in 0..2 {
            gateway
                .expect_poll()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(TxPoll::NotFound));
            gateway
                .expect_poll()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| {
                    Err(Error::Rpc {
                        message: "connection reset".to_string(),
                    })
                });
        }
        gateway
            .expect_poll()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(Error::Rpc {
                    message: "connection reset".to_string(),
                })
            });

        let dlq = Arc::new(MemoryDeadLetterSink::new());
        let pipeline = pipeline(gateway, dlq.clone(), fast_config());

        let err = pipeline.execute(&test_envelope(), ctx()).await.unwrap_err();
        assert!(matches!(err, Error::NetworkExhausted { attempts: 3, .. }));
        assert_eq!(dlq.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_network_errors_retried_within_budget() {
        let mut gateway = MockGateway::new();
        let mut seq = Sequence::new();
        for _ in 0..2 {
            gateway
                .expect_submit()
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| {
                    Err(Error::Rpc {
                        message: "rpc unreachable".to_string(),
                    })
                });
        }
        gateway
            .expect_submit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(SubmitAck {
                    hash: "abc123".to_string(),
                    status: "PENDING".to_string(),
                })
            });
        gateway
            .expect_poll()
            .times(1)
            .returning(|_| Ok(TxPoll::Success(serde_json::Value::Null)));

        let dlq = Arc::new(MemoryDeadLetterSink::new());
        let pipeline = pipeline(gateway, dlq.clone(), fast_config());

        pipeline.execute(&test_envelope(), ctx()).await.unwrap();
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_failure_of_same_hash_upserts_one_dead_letter() {
        let dlq = Arc::new(MemoryDeadLetterSink::new());

        for _ in 0..2 {
            let mut gateway = MockGateway::new();
            expect_submit(&mut gateway);
            gateway
                .expect_poll()
                .times(1)
                .returning(|_| Ok(TxPoll::Failed("no".to_string())));
            let pipeline = pipeline(gateway, dlq.clone(), fast_config());
            let _ = pipeline.execute(&test_envelope(), ctx()).await;
        }

        assert_eq!(dlq.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_signed_rejects_forged_envelope_before_submission() {
        // No submit/poll expectations: any gateway call would panic the mock.
        let gateway = MockGateway::new();
        let dlq = Arc::new(MemoryDeadLetterSink::new());
        let pipeline = pipeline(gateway, dlq.clone(), fast_config());

        let err = pipeline
            .submit_signed(&test_envelope(), &test_public_key(), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignature));
        assert!(dlq.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_envelope_rejected_before_submission() {
        let gateway = MockGateway::new();
        let dlq = Arc::new(MemoryDeadLetterSink::new());
        let pipeline = pipeline(gateway, dlq.clone(), fast_config());

        let err = pipeline
            .submit_signed("!!!", &test_public_key(), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }
}
