//! Integration tests for component interactions.
//!
//! These tests drive the signing gate and the transaction pipeline against an
//! in-memory ledger double implementing the gateway trait, end to end and
//! without a database.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use ledger_core::api::{ContractCall, LedgerGateway, SubmitAck, TxPoll};
use ledger_core::config::{
    AlertsConfig, BroadcastConfig, Config, DatabaseConfig, ExecutionMode, LedgerConfig,
    ReliabilityConfig, TradingConfig,
};
use ledger_core::db;
use ledger_core::db::balances::BalanceRepository;
use ledger_core::db::dead_letters::DeadLetterRepository;
use ledger_core::db::positions::PositionRepository;
use ledger_core::db::trades::TradeRepository;
use ledger_core::signing::{
    self, AdminSigner, Envelope, Operation, Transaction, TransactionEnvelope,
};
use ledger_core::types::{
    BuyReceipt, DeadLetter, DeadLetterStatus, Market, OddsQuote, OutcomeSide, PoolState,
    TradeStatus,
};
use ledger_core::{Error, Result};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use market_engine::{BuyRequest, CreateMarketRequest, MarketService, TradeService};
use tx_pipeline::{LogAlertSink, MemoryDeadLetterSink, OperationContext, TransactionPipeline};
use uuid::Uuid;

const PASSPHRASE: &str = "Stakeline Test Network";

// Hex ed25519 secret from RFC 8032 test vector 1; test-only key.
const ADMIN_SECRET: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

/// Ledger double: a tiny AMM that fills buys at a 1% fee and remembers one
/// result per submitted transaction.
struct InMemoryLedger {
    network: [u8; 32],
    results: Mutex<HashMap<String, Value>>,
    submissions: AtomicUsize,
    /// When set, submissions are acknowledged but never become pollable,
    /// simulating a transaction that drops out of the mempool.
    amnesia: AtomicBool,
    /// When set, envelope building fails, simulating an unreachable RPC
    /// before anything is submitted.
    refuse_build: AtomicBool,
}

impl InMemoryLedger {
    fn new() -> Self {
        Self {
            network: signing::network_id(PASSPHRASE),
            results: Mutex::new(HashMap::new()),
            submissions: AtomicUsize::new(0),
            amnesia: AtomicBool::new(false),
            refuse_build: AtomicBool::new(false),
        }
    }

    fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    fn apply(&self, op: &Operation) -> Result<Value> {
        let args: Vec<Value> = serde_json::from_str(&op.args_json)?;
        let decimal_arg = |i: usize| -> Decimal {
            args.get(i)
                .and_then(|v| v.as_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(Decimal::ZERO)
        };

        match op.function.as_str() {
            "buy_shares" => {
                let amount = decimal_arg(3);
                let fee = amount * Decimal::new(1, 2);
                // Even-odds AMM: each outcome share costs 0.5 USDC.
                let shares = (amount - fee) * Decimal::TWO;
                Ok(json!({
                    "shares_received": shares.to_string(),
                    "price_per_unit": "0.5",
                    "total_cost": amount.to_string(),
                    "fee_amount": fee.to_string(),
                }))
            }
            "sell_shares" => {
                let shares = decimal_arg(3);
                let gross = shares * Decimal::new(5, 1);
                let fee = gross * Decimal::new(1, 2);
                Ok(json!({
                    "payout": (gross - fee).to_string(),
                    "price_per_unit": "0.5",
                    "fee_amount": fee.to_string(),
                }))
            }
            "create_market" => Ok(json!({
                "market_id": Uuid::new_v4().simple().to_string(),
            })),
            other => Ok(json!({ "function": other })),
        }
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn simulate(&self, call: &ContractCall) -> Result<Value> {
        match call.function.as_str() {
            "get_pool" => Ok(json!({
                "yes_reserve": "500",
                "no_reserve": "500",
                "yes_odds": "50",
                "no_odds": "50",
            })),
            "get_balances" => Ok(json!({
                "usdc": "1000",
                "shares": {},
            })),
            other => Err(Error::Rpc {
                message: format!("unknown read-only function {}", other),
            }),
        }
    }

    async fn submit(&self, envelope_b64: &str) -> Result<SubmitAck> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let envelope = Envelope::from_base64(envelope_b64)?;

        // A real ledger rejects unsigned envelopes at the door.
        let signed = match &envelope {
            Envelope::Tx(env) => !env.signatures.is_empty(),
            Envelope::FeeBump(env) => !env.inner.signatures.is_empty(),
        };
        if !signed {
            return Err(Error::Rpc {
                message: "transaction has no signatures".to_string(),
            });
        }

        let op = envelope.inner_tx().operations.first().ok_or(Error::Rpc {
            message: "transaction has no operations".to_string(),
        })?;
        let result = self.apply(op)?;

        let hash = hex::encode(envelope.inner_tx().hash(&self.network)?);
        if !self.amnesia.load(Ordering::SeqCst) {
            self.results.lock().unwrap().insert(hash.clone(), result);
        }
        Ok(SubmitAck {
            hash,
            status: "PENDING".to_string(),
        })
    }

    async fn poll(&self, hash: &str) -> Result<TxPoll> {
        match self.results.lock().unwrap().get(hash) {
            Some(value) => Ok(TxPoll::Success(value.clone())),
            None => Ok(TxPoll::NotFound),
        }
    }

    async fn build_unsigned(&self, call: &ContractCall, source_account: &str) -> Result<String> {
        if self.refuse_build.load(Ordering::SeqCst) {
            return Err(Error::Rpc {
                message: "rpc unreachable".to_string(),
            });
        }
        Envelope::Tx(TransactionEnvelope {
            tx: Transaction {
                source_account: source_account.to_string(),
                sequence: 1,
                fee: 100,
                operations: vec![Operation {
                    contract_id: call.contract_id.clone(),
                    function: call.function.clone(),
                    args_json: serde_json::to_string(&call.args)?,
                }],
            },
            signatures: Vec::new(),
        })
        .to_base64()
    }
}

fn fast_reliability() -> ReliabilityConfig {
    ReliabilityConfig {
        max_poll_attempts: 4,
        poll_base_delay_ms: 1,
        poll_max_delay_ms: 2,
        network_retry_budget: 2,
        network_retry_delay_ms: 1,
    }
}

fn pipeline_over(
    ledger: Arc<InMemoryLedger>,
    dlq: Arc<MemoryDeadLetterSink>,
) -> TransactionPipeline {
    TransactionPipeline::new(
        ledger,
        dlq,
        Arc::new(LogAlertSink),
        fast_reliability(),
        PASSPHRASE,
    )
}

fn ctx(function: &str) -> OperationContext {
    OperationContext::new("integration-test", function, json!({}))
}

fn admin() -> AdminSigner {
    // Deterministic key; verify against it below.
    match AdminSigner::from_hex_secret(ADMIN_SECRET, PASSPHRASE) {
        Ok(signer) => signer,
        Err(e) => panic!("test key rejected: {}", e),
    }
}

/// Fresh keypair per call so repeated database runs never collide on the
/// unique ledger account column.
fn random_signer() -> AdminSigner {
    let secret = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
    match AdminSigner::from_hex_secret(&secret, PASSPHRASE) {
        Ok(signer) => signer,
        Err(e) => panic!("test key rejected: {}", e),
    }
}

/// Custodial path: build, admin-sign, execute, parse the buy receipt.
#[tokio::test]
async fn test_custodial_buy_settles_through_pipeline() {
    let ledger = Arc::new(InMemoryLedger::new());
    let dlq = Arc::new(MemoryDeadLetterSink::new());
    let pipeline = pipeline_over(ledger.clone(), dlq.clone());
    let admin = admin();

    let call = ContractCall::buy_shares(
        "CAMM",
        &admin.public_key_hex(),
        "market-1",
        OutcomeSide::Yes,
        Decimal::new(100, 0),
        Decimal::new(95, 0),
    );
    let unsigned = ledger
        .build_unsigned(&call, &admin.public_key_hex())
        .await
        .unwrap();
    let signed = admin.sign_envelope(&unsigned).unwrap();

    let confirmed = pipeline.execute(&signed, ctx("buy_shares")).await.unwrap();
    let receipt = BuyReceipt::from_value(&confirmed.return_value).unwrap();

    assert_eq!(receipt.total_cost, Decimal::new(100, 0));
    assert_eq!(receipt.shares_received, Decimal::new(198, 0));
    assert_eq!(receipt.fee_amount, Decimal::ONE);
    assert!(dlq.is_empty());
}

/// Non-custodial path: a user-signed envelope passes the signature gate and
/// reaches the ledger.
#[tokio::test]
async fn test_user_signed_envelope_accepted() {
    let ledger = Arc::new(InMemoryLedger::new());
    let dlq = Arc::new(MemoryDeadLetterSink::new());
    let pipeline = pipeline_over(ledger.clone(), dlq);

    let user = admin();
    let call = ContractCall::sell_shares(
        "CAMM",
        &user.public_key_hex(),
        "market-1",
        OutcomeSide::No,
        Decimal::new(40, 0),
        Decimal::ZERO,
    );
    let unsigned = ledger
        .build_unsigned(&call, &user.public_key_hex())
        .await
        .unwrap();
    let signed = user.sign_envelope(&unsigned).unwrap();

    let confirmed = pipeline
        .submit_signed(&signed, &user.public_key_hex(), ctx("sell_shares"))
        .await
        .unwrap();
    assert!(confirmed.return_value.get("payout").is_some());
    assert_eq!(ledger.submission_count(), 1);
}

/// The signature gate drops forged envelopes before any ledger traffic.
#[tokio::test]
async fn test_forged_envelope_never_reaches_ledger() {
    let ledger = Arc::new(InMemoryLedger::new());
    let dlq = Arc::new(MemoryDeadLetterSink::new());
    let pipeline = pipeline_over(ledger.clone(), dlq.clone());

    let attacker = admin();
    let victim = match AdminSigner::from_hex_secret(&"42".repeat(32), PASSPHRASE) {
        Ok(signer) => signer,
        Err(e) => panic!("test key rejected: {}", e),
    };
    let victim_key = victim.public_key_hex();

    let call = ContractCall::sell_shares(
        "CAMM",
        &victim_key,
        "market-1",
        OutcomeSide::Yes,
        Decimal::new(500, 0),
        Decimal::ZERO,
    );
    // Attacker signs a transaction sourced from the victim's account.
    let unsigned = ledger.build_unsigned(&call, &victim_key).await.unwrap();
    let forged = attacker.sign_envelope(&unsigned).unwrap();

    let err = pipeline
        .submit_signed(&forged, &victim_key, ctx("sell_shares"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidSignature));
    assert_eq!(ledger.submission_count(), 0);
    assert!(dlq.is_empty());
}

/// Unsigned envelopes are a ledger-side rejection even if a caller bypasses
/// the gate via execute().
#[tokio::test]
async fn test_unsigned_envelope_rejected_by_ledger() {
    let ledger = Arc::new(InMemoryLedger::new());
    let dlq = Arc::new(MemoryDeadLetterSink::new());
    let pipeline = pipeline_over(ledger.clone(), dlq.clone());

    let call = ContractCall::get_pool("CAMM", "market-1");
    let unsigned = ledger
        .build_unsigned(&call, &"cd".repeat(32))
        .await
        .unwrap();

    let err = pipeline
        .execute(&unsigned, ctx("get_pool"))
        .await
        .unwrap_err();
    // Submission errors burn the network budget, then quarantine.
    assert!(matches!(err, Error::NetworkExhausted { .. }));
    assert_eq!(dlq.len(), 1);
}

/// Odds derived from the pool read always sum to exactly 100 percent.
#[tokio::test]
async fn test_pool_read_produces_complementary_odds() {
    let ledger = InMemoryLedger::new();
    let value = ledger
        .simulate(&ContractCall::get_pool("CAMM", "market-1"))
        .await
        .unwrap();
    let pool = PoolState::from_value(&value).unwrap();
    let quote = OddsQuote::from_pool(Uuid::new_v4(), &pool).unwrap();

    assert_eq!(quote.yes_percentage + quote.no_percentage, 100);
    assert_eq!(quote.yes_liquidity, Decimal::new(500, 0));
}

/// A transaction the ledger never confirms exhausts the poll budget and
/// lands in the dead-letter queue exactly once.
#[tokio::test]
async fn test_unconfirmed_transaction_quarantined() {
    let ledger = Arc::new(InMemoryLedger::new());
    let dlq = Arc::new(MemoryDeadLetterSink::new());
    let pipeline = pipeline_over(ledger.clone(), dlq.clone());
    let admin = admin();

    ledger.amnesia.store(true, Ordering::SeqCst);

    let call = ContractCall::buy_shares(
        "CAMM",
        &admin.public_key_hex(),
        "market-1",
        OutcomeSide::Yes,
        Decimal::new(10, 0),
        Decimal::new(9, 0),
    );
    let unsigned = ledger
        .build_unsigned(&call, &admin.public_key_hex())
        .await
        .unwrap();
    let signed = admin.sign_envelope(&unsigned).unwrap();

    let err = pipeline
        .execute(&signed, ctx("buy_shares"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConfirmationTimeout { attempts: 4, .. }));
    assert_eq!(dlq.len(), 1);

    // The canonical envelope hash keys the quarantine record.
    let envelope = signing::decode_envelope(&signed).unwrap();
    let expected = hex::encode(
        envelope
            .inner_tx()
            .hash(&signing::network_id(PASSPHRASE))
            .unwrap(),
    );
    assert_eq!(dlq.letters()[0].tx_hash, expected);
}

fn db_config() -> Config {
    Config {
        database: DatabaseConfig {
            url: std::env::var("DATABASE_URL").unwrap_or_default(),
            max_connections: 5,
        },
        ledger: LedgerConfig {
            rpc_url: "http://localhost:8000/rpc".to_string(),
            network_passphrase: PASSPHRASE.to_string(),
            market_contract: "CMKT".to_string(),
            amm_contract: "CAMM".to_string(),
            oracle_contract: "CORC".to_string(),
            admin_secret_key: Some(ADMIN_SECRET.to_string()),
        },
        reliability: fast_reliability(),
        trading: TradingConfig::default(),
        alerts: AlertsConfig::default(),
        broadcast: BroadcastConfig::default(),
    }
}

/// Full custodial lifecycle: create market, seed the pool, buy YES, close,
/// resolve YES, settle. The winning position ends marked, with positive PnL
/// and the payout credited.
#[tokio::test]
#[ignore = "Requires database connection - set DATABASE_URL and run with --ignored"]
async fn test_market_lifecycle_settles_winning_position() {
    let config = db_config();
    let pool = db::create_pool(&config.database).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let ledger = Arc::new(InMemoryLedger::new());
    let dlq = Arc::new(MemoryDeadLetterSink::new());
    let pipeline = Arc::new(TransactionPipeline::new(
        ledger.clone(),
        dlq.clone(),
        Arc::new(LogAlertSink),
        fast_reliability(),
        PASSPHRASE,
    ));
    let markets = MarketService::new(ledger.clone(), pipeline.clone(), pool.clone(), &config)
        .unwrap();
    let trades = TradeService::new(ledger.clone(), pipeline, pool.clone(), &config).unwrap();

    let user_id = Uuid::new_v4();
    let balances = BalanceRepository::new(pool.clone());
    balances
        .create(user_id, &random_signer().public_key_hex(), Decimal::new(1_000, 0))
        .await
        .unwrap();

    let market = markets
        .create_market(CreateMarketRequest {
            creator_id: user_id,
            title: "Will it rain tomorrow".to_string(),
            description: None,
            category: "weather".to_string(),
            outcome_a: "No".to_string(),
            outcome_b: "Yes".to_string(),
            closing_at: Utc::now() + Duration::hours(1),
            resolution_at: None,
        })
        .await
        .unwrap();

    markets
        .create_pool(market.id, Decimal::new(1_000, 0))
        .await
        .unwrap();

    // 100 USDC at even odds buys 198 shares (1 USDC fee, 0.5 per share).
    let receipt = trades
        .buy(BuyRequest {
            user_id,
            market_id: market.id,
            outcome: OutcomeSide::Yes,
            amount: Decimal::new(100, 0),
            min_shares: None,
        })
        .await
        .unwrap();
    assert_eq!(receipt.quantity, Decimal::new(198, 0));
    assert_eq!(
        balances.get(user_id).await.unwrap().unwrap().balance,
        Decimal::new(900, 0)
    );

    markets.close_market(market.id).await.unwrap();
    let settled = markets
        .resolve_market(market.id, OutcomeSide::Yes)
        .await
        .unwrap();
    assert_eq!(settled, 1);

    // Winner credited 1 USDC per share: 900 + 198.
    assert_eq!(
        balances.get(user_id).await.unwrap().unwrap().balance,
        Decimal::new(1_098, 0)
    );
    let position = PositionRepository::new(pool.clone())
        .get(user_id, market.id, OutcomeSide::Yes)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(position.is_winner, Some(true));
    assert!(position.settled_at.is_some());
    assert_eq!(position.realized_pnl, Decimal::new(98, 0));
    assert!(dlq.is_empty());

    let stats = balances.get_stats(user_id).await.unwrap().unwrap();
    assert!(stats.wins >= 1);

    // Custody reconciliation read passes the contract value through.
    let ledger_balances = trades.get_ledger_balances(user_id).await.unwrap();
    assert!(ledger_balances.get("usdc").is_some());
}

/// Services plus repositories over a real database, backed by the in-memory
/// ledger double.
struct DbHarness {
    pool: sqlx::PgPool,
    ledger: Arc<InMemoryLedger>,
    markets: MarketService,
    trades: TradeService,
    balances: BalanceRepository,
}

async fn db_harness(config: Config) -> DbHarness {
    let pool = db::create_pool(&config.database).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let ledger = Arc::new(InMemoryLedger::new());
    let pipeline = Arc::new(TransactionPipeline::new(
        ledger.clone(),
        Arc::new(MemoryDeadLetterSink::new()),
        Arc::new(LogAlertSink),
        fast_reliability(),
        PASSPHRASE,
    ));
    let markets =
        MarketService::new(ledger.clone(), pipeline.clone(), pool.clone(), &config).unwrap();
    let trades = TradeService::new(ledger.clone(), pipeline, pool.clone(), &config).unwrap();
    let balances = BalanceRepository::new(pool.clone());

    DbHarness {
        pool,
        ledger,
        markets,
        trades,
        balances,
    }
}

async fn open_market(h: &DbHarness, creator_id: Uuid, title: &str) -> Market {
    h.markets
        .create_market(CreateMarketRequest {
            creator_id,
            title: title.to_string(),
            description: None,
            category: "test".to_string(),
            outcome_a: "No".to_string(),
            outcome_b: "Yes".to_string(),
            closing_at: Utc::now() + Duration::hours(1),
            resolution_at: None,
        })
        .await
        .unwrap()
}

/// Every illegal lifecycle move gets its own error, and none of them mutate
/// the market.
#[tokio::test]
#[ignore = "Requires database connection - set DATABASE_URL and run with --ignored"]
async fn test_lifecycle_transitions_reject_illegal_moves() {
    let h = db_harness(db_config()).await;
    let creator_id = Uuid::new_v4();
    let market = open_market(&h, creator_id, "Lifecycle guards").await;

    h.markets
        .create_pool(market.id, Decimal::new(1_000, 0))
        .await
        .unwrap();
    let err = h
        .markets
        .create_pool(market.id, Decimal::new(500, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePool { .. }));

    h.markets.close_market(market.id).await.unwrap();

    // Trading stopped at close.
    let err = h
        .trades
        .buy(BuyRequest {
            user_id: Uuid::new_v4(),
            market_id: market.id,
            outcome: OutcomeSide::Yes,
            amount: Decimal::new(10, 0),
            min_shares: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MarketNotOpen { .. }));

    let err = h.markets.close_market(market.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    let err = h
        .markets
        .cancel_market(market.id, Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)));

    h.markets
        .resolve_market(market.id, OutcomeSide::Yes)
        .await
        .unwrap();

    // Resolution is terminal; even the creator cannot cancel past it.
    let err = h
        .markets
        .cancel_market(market.id, creator_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CannotCancelResolved));
}

/// A signed envelope only completes the trade it was prepared for. A valid
/// signature over some other call must neither reach the ledger nor settle
/// the pending trade.
#[tokio::test]
#[ignore = "Requires database connection - set DATABASE_URL and run with --ignored"]
async fn test_completion_envelope_must_match_prepared_trade() {
    let mut config = db_config();
    config.trading.execution_mode = ExecutionMode::NonCustodial;
    let h = db_harness(config).await;

    let user = random_signer();
    let user_id = Uuid::new_v4();
    h.balances
        .create(user_id, &user.public_key_hex(), Decimal::new(1_000, 0))
        .await
        .unwrap();

    let market_a = open_market(&h, user_id, "Envelope pinning A").await;
    let market_b = open_market(&h, user_id, "Envelope pinning B").await;
    h.markets
        .create_pool(market_a.id, Decimal::new(1_000, 0))
        .await
        .unwrap();
    h.markets
        .create_pool(market_b.id, Decimal::new(1_000, 0))
        .await
        .unwrap();

    let prepared = h
        .trades
        .prepare_buy(BuyRequest {
            user_id,
            market_id: market_a.id,
            outcome: OutcomeSide::Yes,
            amount: Decimal::new(100, 0),
            min_shares: None,
        })
        .await
        .unwrap();

    // Correctly signed call for the other market and outcome, five times
    // the prepared stake.
    let rogue_call = ContractCall::buy_shares(
        "CAMM",
        &user.public_key_hex(),
        &market_b.ledger_id,
        OutcomeSide::No,
        Decimal::new(500, 0),
        Decimal::ONE,
    );
    let rogue_unsigned = h
        .ledger
        .build_unsigned(&rogue_call, &user.public_key_hex())
        .await
        .unwrap();
    let rogue_signed = user.sign_envelope(&rogue_unsigned).unwrap();

    let before = h.ledger.submission_count();
    let err = h
        .trades
        .complete_signed(prepared.trade_id, &rogue_signed)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(h.ledger.submission_count(), before);

    // The rejected attempt leaves the trade retryable.
    let trade = TradeRepository::new(h.pool.clone())
        .get(prepared.trade_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(trade.status, TradeStatus::Pending);

    // The envelope the user was actually handed still completes.
    let signed = user.sign_envelope(&prepared.envelope_b64).unwrap();
    let receipt = h
        .trades
        .complete_signed(prepared.trade_id, &signed)
        .await
        .unwrap();
    assert_eq!(receipt.quantity, Decimal::new(198, 0));
    assert_eq!(
        h.balances.get(user_id).await.unwrap().unwrap().balance,
        Decimal::new(900, 0)
    );
}

/// A failure before anything reaches the ledger still moves the trade row to
/// FAILED instead of leaving it pending forever.
#[tokio::test]
#[ignore = "Requires database connection - set DATABASE_URL and run with --ignored"]
async fn test_prebuild_failure_marks_trade_failed() {
    let h = db_harness(db_config()).await;
    let user_id = Uuid::new_v4();
    h.balances
        .create(user_id, &random_signer().public_key_hex(), Decimal::new(500, 0))
        .await
        .unwrap();
    let market = open_market(&h, user_id, "Stranded pending").await;
    h.markets
        .create_pool(market.id, Decimal::new(1_000, 0))
        .await
        .unwrap();

    h.ledger.refuse_build.store(true, Ordering::SeqCst);
    let err = h
        .trades
        .buy(BuyRequest {
            user_id,
            market_id: market.id,
            outcome: OutcomeSide::Yes,
            amount: Decimal::new(50, 0),
            min_shares: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Rpc { .. }));

    let trades = TradeRepository::new(h.pool.clone())
        .list_by_user(user_id)
        .await
        .unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].status, TradeStatus::Failed);
}

/// Operator triage over the persistent dead-letter queue: quarantined
/// failures show up as pending and leave the queue once resolved.
#[tokio::test]
#[ignore = "Requires database connection - set DATABASE_URL and run with --ignored"]
async fn test_dead_letter_triage_roundtrip() {
    let config = db_config();
    let pool = db::create_pool(&config.database).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let repo = DeadLetterRepository::new(pool);

    let tx_hash = format!("dl-{}", Uuid::new_v4().simple());
    let letter = DeadLetter::new(
        &tx_hash,
        "integration-test",
        "buy_shares",
        json!({ "reason": "confirmation timeout" }),
        "transaction never confirmed",
    );
    repo.upsert(&letter).await.unwrap();

    let pending = repo.list_pending().await.unwrap();
    assert!(pending.iter().any(|l| l.tx_hash == tx_hash));

    repo.mark_resolved(&tx_hash).await.unwrap();
    let stored = repo.get(&tx_hash).await.unwrap().unwrap();
    assert_eq!(stored.status, DeadLetterStatus::Resolved);
    assert!(!repo
        .list_pending()
        .await
        .unwrap()
        .iter()
        .any(|l| l.tx_hash == tx_hash));
}
