//! Trade orchestration against the ledger AMM.
//!
//! Every fund-moving call goes ledger-first: the AMM contract holds custody
//! and enforces slippage bounds; the local store is a projection updated only
//! after the ledger confirms. On acceptance the four local effects (trade
//! confirmation, position update, balance change, market volume) commit in a
//! single database transaction with the balance and position rows locked, so
//! a crash leaves either all four applied or none.

use ledger_core::api::{ContractCall, LedgerGateway};
use ledger_core::config::{Config, ExecutionMode, LedgerConfig, TradingConfig};
use ledger_core::db::balances::BalanceRepository;
use ledger_core::db::markets::MarketRepository;
use ledger_core::db::positions::PositionRepository;
use ledger_core::db::trades::TradeRepository;
use ledger_core::signing::{self, AdminSigner, Envelope};
use ledger_core::types::{
    BuyReceipt, Market, OddsQuote, OutcomeSide, PoolState, Position, PositionSummary, SellReceipt,
    Trade, TradeSide, TradeStatus, UserBalance,
};
use ledger_core::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};
use tx_pipeline::{ConfirmedTx, OperationContext, TransactionPipeline};
use uuid::Uuid;

const SERVICE_NAME: &str = "trade-orchestrator";

#[derive(Debug, Clone, Deserialize)]
pub struct BuyRequest {
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub outcome: OutcomeSide,
    /// USDC to spend, including fees.
    pub amount: Decimal,
    /// Minimum acceptable shares; defaults to the configured fill floor.
    pub min_shares: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SellRequest {
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub outcome: OutcomeSide,
    /// Shares to sell.
    pub quantity: Decimal,
    /// Minimum acceptable payout; defaults to zero (market sell).
    pub min_payout: Option<Decimal>,
}

/// Result of an accepted trade, returned after the ledger confirmed and the
/// local settlement transaction committed.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReceipt {
    pub trade_id: Uuid,
    pub tx_hash: String,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price_per_unit: Decimal,
    pub total_amount: Decimal,
    pub fee: Decimal,
    pub position: PositionSummary,
}

/// First half of the non-custodial two-phase flow: an unsigned envelope the
/// user signs client-side, plus the pending trade it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedTrade {
    pub trade_id: Uuid,
    pub envelope_b64: String,
    /// Hex public key the signature will be checked against.
    pub source_account: String,
}

/// Orchestrates buys and sells in either custody mode.
pub struct TradeService {
    gateway: Arc<dyn LedgerGateway>,
    pipeline: Arc<TransactionPipeline>,
    db: PgPool,
    markets: MarketRepository,
    trades: TradeRepository,
    balances: BalanceRepository,
    positions: PositionRepository,
    ledger: LedgerConfig,
    trading: TradingConfig,
    admin: Option<AdminSigner>,
}

impl TradeService {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        pipeline: Arc<TransactionPipeline>,
        db: PgPool,
        config: &Config,
    ) -> Result<Self> {
        // Lazily enforced: read-only callers (odds polling) never need the
        // signer, so a missing key only fails at execution time.
        let admin = config
            .ledger
            .admin_secret_key
            .as_deref()
            .map(|secret| AdminSigner::from_hex_secret(secret, &config.ledger.network_passphrase))
            .transpose()?;

        Ok(Self {
            gateway,
            pipeline,
            markets: MarketRepository::new(db.clone()),
            trades: TradeRepository::new(db.clone()),
            balances: BalanceRepository::new(db.clone()),
            positions: PositionRepository::new(db.clone()),
            db,
            ledger: config.ledger.clone(),
            trading: config.trading.clone(),
            admin,
        })
    }

    /// Current odds for a market, read straight from the AMM pool. Pure read;
    /// never touches local state.
    pub async fn get_odds(&self, market_id: Uuid) -> Result<OddsQuote> {
        let market = self.require_market(market_id).await?;
        if !market.has_pool() {
            return Err(Error::Validation(
                "market has no liquidity pool".to_string(),
            ));
        }

        let call = ContractCall::get_pool(&self.ledger.amm_contract, &market.ledger_id);
        let value = self.gateway.simulate(&call).await?;
        let pool = PoolState::from_value(&value)?;
        OddsQuote::from_pool(market_id, &pool)
    }

    /// Ledger-side balances for a user's account. Pure read used to
    /// reconcile custody against the local projection; the raw contract
    /// value is passed through.
    pub async fn get_ledger_balances(&self, user_id: Uuid) -> Result<serde_json::Value> {
        let balance = self.require_balance(user_id).await?;
        let call =
            ContractCall::get_balances(&self.ledger.market_contract, &balance.ledger_account);
        self.gateway.simulate(&call).await
    }

    /// Buy outcome shares (custodial mode). Validates preconditions, submits
    /// `buy_shares` signed by the platform key, then settles locally.
    pub async fn buy(&self, request: BuyRequest) -> Result<TradeReceipt> {
        let admin = self.require_custodial()?;
        let (market, balance, min_shares) = self.validate_buy(&request).await?;

        let trade = Trade::pending(
            request.user_id,
            request.market_id,
            request.outcome,
            TradeSide::Buy,
            min_shares,
            Decimal::ZERO,
            request.amount,
        );
        self.trades.insert(&trade).await?;

        let call = ContractCall::buy_shares(
            &self.ledger.amm_contract,
            &balance.ledger_account,
            &market.ledger_id,
            request.outcome,
            request.amount,
            min_shares,
        );
        let confirmed = self.execute_custodial(admin, &call, &trade).await?;

        self.settle_buy(&trade, min_shares, &confirmed).await
    }

    /// Sell outcome shares (custodial mode).
    pub async fn sell(&self, request: SellRequest) -> Result<TradeReceipt> {
        let admin = self.require_custodial()?;
        let (market, balance, min_payout) = self.validate_sell(&request).await?;

        let trade = Trade::pending(
            request.user_id,
            request.market_id,
            request.outcome,
            TradeSide::Sell,
            request.quantity,
            Decimal::ZERO,
            min_payout,
        );
        self.trades.insert(&trade).await?;

        let call = ContractCall::sell_shares(
            &self.ledger.amm_contract,
            &balance.ledger_account,
            &market.ledger_id,
            request.outcome,
            request.quantity,
            min_payout,
        );
        let confirmed = self.execute_custodial(admin, &call, &trade).await?;

        self.settle_sell(&trade, &confirmed).await
    }

    /// Non-custodial phase one: validate, record the PENDING trade, and hand
    /// back an unsigned envelope with the user's account as source and the
    /// slippage bound baked into the call.
    pub async fn prepare_buy(&self, request: BuyRequest) -> Result<PreparedTrade> {
        self.require_non_custodial()?;
        let (market, balance, min_shares) = self.validate_buy(&request).await?;

        let trade = Trade::pending(
            request.user_id,
            request.market_id,
            request.outcome,
            TradeSide::Buy,
            min_shares,
            Decimal::ZERO,
            request.amount,
        );
        self.trades.insert(&trade).await?;

        let call = ContractCall::buy_shares(
            &self.ledger.amm_contract,
            &balance.ledger_account,
            &market.ledger_id,
            request.outcome,
            request.amount,
            min_shares,
        );
        let envelope_b64 = self
            .gateway
            .build_unsigned(&call, &balance.ledger_account)
            .await?;

        Ok(PreparedTrade {
            trade_id: trade.id,
            envelope_b64,
            source_account: balance.ledger_account,
        })
    }

    /// Non-custodial phase one for sells.
    pub async fn prepare_sell(&self, request: SellRequest) -> Result<PreparedTrade> {
        self.require_non_custodial()?;
        let (market, balance, min_payout) = self.validate_sell(&request).await?;

        let trade = Trade::pending(
            request.user_id,
            request.market_id,
            request.outcome,
            TradeSide::Sell,
            request.quantity,
            Decimal::ZERO,
            min_payout,
        );
        self.trades.insert(&trade).await?;

        let call = ContractCall::sell_shares(
            &self.ledger.amm_contract,
            &balance.ledger_account,
            &market.ledger_id,
            request.outcome,
            request.quantity,
            min_payout,
        );
        let envelope_b64 = self
            .gateway
            .build_unsigned(&call, &balance.ledger_account)
            .await?;

        Ok(PreparedTrade {
            trade_id: trade.id,
            envelope_b64,
            source_account: balance.ledger_account,
        })
    }

    /// Non-custodial phase two: verify the user-signed envelope against their
    /// registered account key, check its operation against the prepared
    /// trade, submit, and settle. The expected key comes from the stored
    /// identity, never from the request.
    pub async fn complete_signed(
        &self,
        trade_id: Uuid,
        envelope_b64: &str,
    ) -> Result<TradeReceipt> {
        self.require_non_custodial()?;

        let trade = self
            .trades
            .get(trade_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("trade {}", trade_id)))?;
        if trade.status != TradeStatus::Pending {
            return Err(Error::Validation(format!(
                "trade {} is not pending",
                trade_id
            )));
        }

        let market = self.require_market(trade.market_id).await?;
        let balance = self.require_balance(trade.user_id).await?;
        let min_shares = trade.quantity;

        // The prepared trade pins the exact ledger call. The user holds the
        // signing key, so a valid signature alone proves nothing about what
        // the envelope does; a signed call for another market, outcome, or
        // amount must not settle this trade. The trade stays PENDING so the
        // caller can retry with the envelope they were actually handed.
        let expected = match trade.side {
            TradeSide::Buy => ContractCall::buy_shares(
                &self.ledger.amm_contract,
                &balance.ledger_account,
                &market.ledger_id,
                trade.outcome,
                trade.total_amount,
                trade.quantity,
            ),
            TradeSide::Sell => ContractCall::sell_shares(
                &self.ledger.amm_contract,
                &balance.ledger_account,
                &market.ledger_id,
                trade.outcome,
                trade.quantity,
                trade.total_amount,
            ),
        };
        let envelope = signing::decode_envelope(envelope_b64)?;
        if let Err(e) = verify_prepared_envelope(&envelope, &expected, &balance.ledger_account) {
            warn!(
                trade_id = %trade_id,
                user_id = %trade.user_id,
                error = %e,
                "rejected completion envelope"
            );
            return Err(e);
        }

        let confirmed = match self
            .pipeline
            .submit_signed(
                envelope_b64,
                &balance.ledger_account,
                self.trade_context(&trade),
            )
            .await
        {
            Ok(confirmed) => confirmed,
            Err(e) => {
                self.fail_trade(&trade, None).await;
                return Err(e);
            }
        };

        match trade.side {
            TradeSide::Buy => self.settle_buy(&trade, min_shares, &confirmed).await,
            TradeSide::Sell => self.settle_sell(&trade, &confirmed).await,
        }
    }

    async fn validate_buy(
        &self,
        request: &BuyRequest,
    ) -> Result<(Market, UserBalance, Decimal)> {
        if request.amount <= Decimal::ZERO {
            return Err(Error::Validation(
                "trade amount must be positive".to_string(),
            ));
        }
        let market = self.require_open_market(request.market_id).await?;
        let balance = self.require_balance(request.user_id).await?;
        if balance.balance < request.amount {
            return Err(Error::InsufficientBalance {
                available: balance.balance,
                required: request.amount,
            });
        }
        let min_shares = request
            .min_shares
            .unwrap_or(request.amount * self.trading.default_min_fill);

        Ok((market, balance, min_shares))
    }

    async fn validate_sell(
        &self,
        request: &SellRequest,
    ) -> Result<(Market, UserBalance, Decimal)> {
        if request.quantity <= Decimal::ZERO {
            return Err(Error::Validation(
                "sell quantity must be positive".to_string(),
            ));
        }
        let market = self.require_open_market(request.market_id).await?;
        let balance = self.require_balance(request.user_id).await?;

        let held = self
            .positions
            .get(request.user_id, request.market_id, request.outcome)
            .await?
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO);
        if held < request.quantity {
            return Err(Error::InsufficientShares {
                held,
                requested: request.quantity,
            });
        }

        let min_payout = request.min_payout.unwrap_or(Decimal::ZERO);
        Ok((market, balance, min_payout))
    }

    /// Apply the four buy effects atomically: debit, position increment,
    /// trade confirmation, volume increment.
    async fn settle_buy(
        &self,
        trade: &Trade,
        min_shares: Decimal,
        confirmed: &ConfirmedTx,
    ) -> Result<TradeReceipt> {
        let receipt = BuyReceipt::from_value(&confirmed.return_value)?;

        // The ledger already enforced min_shares inside buy_shares; this
        // check only fires if the contract and backend disagree.
        if receipt.shares_received < min_shares {
            self.fail_trade(trade, Some(&confirmed.hash)).await;
            return Err(Error::SlippageExceeded {
                received: receipt.shares_received,
                minimum: min_shares,
            });
        }

        let mut tx = self.db.begin().await?;

        BalanceRepository::lock(&mut *tx, trade.user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("balance for user {}", trade.user_id)))?;
        BalanceRepository::debit(&mut *tx, trade.user_id, receipt.total_cost).await?;

        let position = match PositionRepository::lock(
            &mut *tx,
            trade.user_id,
            trade.market_id,
            trade.outcome,
        )
        .await?
        {
            Some(mut p) => {
                p.apply_buy(receipt.shares_received, receipt.total_cost);
                p
            }
            None => Position::open(
                trade.user_id,
                trade.market_id,
                trade.outcome,
                receipt.shares_received,
                receipt.total_cost,
            ),
        };
        PositionRepository::upsert(&mut *tx, &position).await?;

        TradeRepository::confirm(
            &mut *tx,
            trade.id,
            &confirmed.hash,
            receipt.shares_received,
            receipt.price_per_unit,
            receipt.total_cost,
            receipt.fee_amount,
        )
        .await?;
        MarketRepository::add_volume(&mut *tx, trade.market_id, receipt.total_cost).await?;

        if let Err(e) = tx.commit().await {
            // Funds already moved on the ledger. The trade row stays PENDING
            // with the hash in the log for manual reconciliation.
            error!(
                trade_id = %trade.id,
                tx_hash = %confirmed.hash,
                error = %e,
                "ledger confirmed but local settlement failed to commit"
            );
            return Err(e.into());
        }

        info!(
            trade_id = %trade.id,
            tx_hash = %confirmed.hash,
            user_id = %trade.user_id,
            market_id = %trade.market_id,
            outcome = %trade.outcome,
            shares = %receipt.shares_received,
            cost = %receipt.total_cost,
            "buy settled"
        );

        Ok(TradeReceipt {
            trade_id: trade.id,
            tx_hash: confirmed.hash.clone(),
            side: TradeSide::Buy,
            quantity: receipt.shares_received,
            price_per_unit: receipt.price_per_unit,
            total_amount: receipt.total_cost,
            fee: receipt.fee_amount,
            position: PositionSummary::from(&position),
        })
    }

    /// Apply the four sell effects atomically: credit, position decrement,
    /// trade confirmation, volume increment.
    async fn settle_sell(&self, trade: &Trade, confirmed: &ConfirmedTx) -> Result<TradeReceipt> {
        let receipt = SellReceipt::from_value(&confirmed.return_value)?;
        let quantity = trade.quantity;

        let mut tx = self.db.begin().await?;

        BalanceRepository::lock(&mut *tx, trade.user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("balance for user {}", trade.user_id)))?;
        BalanceRepository::credit(&mut *tx, trade.user_id, receipt.payout).await?;

        let mut position = PositionRepository::lock(
            &mut *tx,
            trade.user_id,
            trade.market_id,
            trade.outcome,
        )
        .await?
        .ok_or_else(|| Error::NotFound(format!("position for trade {}", trade.id)))?;
        position.apply_sell(quantity, receipt.payout);
        PositionRepository::upsert(&mut *tx, &position).await?;

        TradeRepository::confirm(
            &mut *tx,
            trade.id,
            &confirmed.hash,
            quantity,
            receipt.price_per_unit,
            receipt.payout,
            receipt.fee_amount,
        )
        .await?;
        MarketRepository::add_volume(&mut *tx, trade.market_id, receipt.payout).await?;

        if let Err(e) = tx.commit().await {
            error!(
                trade_id = %trade.id,
                tx_hash = %confirmed.hash,
                error = %e,
                "ledger confirmed but local settlement failed to commit"
            );
            return Err(e.into());
        }

        info!(
            trade_id = %trade.id,
            tx_hash = %confirmed.hash,
            user_id = %trade.user_id,
            market_id = %trade.market_id,
            outcome = %trade.outcome,
            shares = %quantity,
            payout = %receipt.payout,
            "sell settled"
        );

        Ok(TradeReceipt {
            trade_id: trade.id,
            tx_hash: confirmed.hash.clone(),
            side: TradeSide::Sell,
            quantity,
            price_per_unit: receipt.price_per_unit,
            total_amount: receipt.payout,
            fee: receipt.fee_amount,
            position: PositionSummary::from(&position),
        })
    }

    /// Build, sign, and drive a custodial call through the pipeline. Any
    /// failure, pre-submission included, marks the trade FAILED so no row is
    /// stranded PENDING.
    async fn execute_custodial(
        &self,
        admin: &AdminSigner,
        call: &ContractCall,
        trade: &Trade,
    ) -> Result<ConfirmedTx> {
        let result = async {
            let unsigned = self
                .gateway
                .build_unsigned(call, &admin.public_key_hex())
                .await?;
            let signed = admin.sign_envelope(&unsigned)?;
            self.pipeline.execute(&signed, self.trade_context(trade)).await
        }
        .await;

        match result {
            Ok(confirmed) => Ok(confirmed),
            Err(e) => {
                self.fail_trade(trade, None).await;
                Err(e)
            }
        }
    }

    async fn fail_trade(&self, trade: &Trade, tx_hash: Option<&str>) {
        if let Err(e) = self.trades.mark_failed(trade.id, tx_hash).await {
            warn!(trade_id = %trade.id, error = %e, "failed to mark trade FAILED");
        }
    }

    fn trade_context(&self, trade: &Trade) -> OperationContext {
        OperationContext::new(
            SERVICE_NAME,
            match trade.side {
                TradeSide::Buy => "buy_shares",
                TradeSide::Sell => "sell_shares",
            },
            json!({
                "trade_id": trade.id,
                "user_id": trade.user_id,
                "market_id": trade.market_id,
                "outcome": trade.outcome,
                "quantity": trade.quantity.to_string(),
                "total_amount": trade.total_amount.to_string(),
            }),
        )
    }

    async fn require_market(&self, market_id: Uuid) -> Result<Market> {
        self.markets
            .get(market_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("market {}", market_id)))
    }

    async fn require_open_market(&self, market_id: Uuid) -> Result<Market> {
        let market = self.require_market(market_id).await?;
        if !market.is_open() {
            return Err(Error::MarketNotOpen {
                status: market.status,
            });
        }
        Ok(market)
    }

    async fn require_balance(&self, user_id: Uuid) -> Result<UserBalance> {
        self.balances
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("balance for user {}", user_id)))
    }

    fn require_custodial(&self) -> Result<&AdminSigner> {
        match self.trading.execution_mode {
            ExecutionMode::NonCustodial => Err(Error::Validation(
                "direct execution requires custodial mode; use prepare/complete".to_string(),
            )),
            ExecutionMode::Custodial => self.admin.as_ref().ok_or_else(|| Error::Config {
                message: "custodial mode requires ADMIN_SECRET_KEY".to_string(),
            }),
        }
    }

    fn require_non_custodial(&self) -> Result<()> {
        match self.trading.execution_mode {
            ExecutionMode::NonCustodial => Ok(()),
            ExecutionMode::Custodial => Err(Error::Validation(
                "prepare/complete flow requires non-custodial mode".to_string(),
            )),
        }
    }
}

/// Check a completion envelope against the call the trade was prepared with:
/// same source account, exactly one operation, same contract and function,
/// same arguments. Account, market id, and outcome compare exactly; the two
/// amount arguments compare numerically because the database projection may
/// round-trip a different decimal scale than the prepared envelope carries.
fn verify_prepared_envelope(
    envelope: &Envelope,
    expected: &ContractCall,
    source_account: &str,
) -> Result<()> {
    let tx = envelope.inner_tx();
    if tx.source_account != source_account {
        return Err(Error::Validation(
            "envelope source does not match the trade account".to_string(),
        ));
    }

    let [op] = tx.operations.as_slice() else {
        return Err(Error::Validation(
            "envelope must carry exactly one operation".to_string(),
        ));
    };
    if op.contract_id != expected.contract_id || op.function != expected.function {
        return Err(Error::Validation(
            "envelope operation does not match the prepared trade".to_string(),
        ));
    }

    let args: Vec<serde_json::Value> = serde_json::from_str(&op.args_json).map_err(|_| {
        Error::MalformedEnvelope("operation arguments are not valid JSON".to_string())
    })?;
    // buy_shares and sell_shares both carry
    // [account, market, outcome, amount, bound].
    let matches = args.len() == 5
        && expected.args.len() == 5
        && args[..3] == expected.args[..3]
        && decimal_arg_eq(&args[3], &expected.args[3])
        && decimal_arg_eq(&args[4], &expected.args[4]);
    if !matches {
        return Err(Error::Validation(
            "envelope arguments do not match the prepared trade".to_string(),
        ));
    }
    Ok(())
}

fn decimal_arg_eq(actual: &serde_json::Value, expected: &serde_json::Value) -> bool {
    match (
        actual.as_str().and_then(|s| s.parse::<Decimal>().ok()),
        expected.as_str().and_then(|s| s.parse::<Decimal>().ok()),
    ) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
