//! Market lifecycle: creation, pool seeding, closing, resolution with
//! settlement fan-out, and cancellation.
//!
//! Status transitions form a strict DAG (OPEN -> CLOSED -> RESOLVED,
//! OPEN/CLOSED -> CANCELLED) enforced twice: a status check up front for a
//! clean error, and a guarded UPDATE in the repository so concurrent
//! transitions cannot double-apply.

use chrono::{DateTime, Duration, Utc};
use futures_util::stream::{self, StreamExt};
use ledger_core::api::{ContractCall, LedgerGateway};
use ledger_core::config::{Config, ExecutionMode, LedgerConfig, TradingConfig};
use ledger_core::db::balances::BalanceRepository;
use ledger_core::db::markets::MarketRepository;
use ledger_core::db::positions::PositionRepository;
use ledger_core::signing::AdminSigner;
use ledger_core::types::{Market, MarketStatus, OutcomeSide, Position};
use ledger_core::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};
use tx_pipeline::{ConfirmedTx, OperationContext, TransactionPipeline};
use uuid::Uuid;

const SERVICE_NAME: &str = "market-lifecycle";

/// Concurrency bound for settlement fan-out; each position settles in its own
/// database transaction.
const SETTLEMENT_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMarketRequest {
    pub creator_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub outcome_a: String,
    pub outcome_b: String,
    pub closing_at: DateTime<Utc>,
    /// Defaults to `closing_at` plus the configured fallback window.
    pub resolution_at: Option<DateTime<Utc>>,
}

/// Owns market rows and their lifecycle against the ledger market contract.
pub struct MarketService {
    gateway: Arc<dyn LedgerGateway>,
    pipeline: Arc<TransactionPipeline>,
    db: PgPool,
    markets: MarketRepository,
    positions: PositionRepository,
    balances: BalanceRepository,
    ledger: LedgerConfig,
    trading: TradingConfig,
    admin: Option<AdminSigner>,
}

impl MarketService {
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        pipeline: Arc<TransactionPipeline>,
        db: PgPool,
        config: &Config,
    ) -> Result<Self> {
        // Lifecycle operations are platform-sourced in both custody modes,
        // so the admin key is required whenever one is configured at all.
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
            positions: PositionRepository::new(db.clone()),
            balances: BalanceRepository::new(db.clone()),
            db,
            ledger: config.ledger.clone(),
            trading: config.trading.clone(),
            admin,
        })
    }

    /// Create the market on the ledger, then insert the local OPEN row.
    pub async fn create_market(&self, request: CreateMarketRequest) -> Result<Market> {
        if request.title.trim().is_empty() {
            return Err(Error::Validation("market title is required".to_string()));
        }
        let now = Utc::now();
        if request.closing_at <= now {
            return Err(Error::Validation(
                "closing time must be in the future".to_string(),
            ));
        }
        let resolution_at = request.resolution_at.unwrap_or(
            request.closing_at + Duration::hours(self.trading.resolution_fallback_hours),
        );
        if resolution_at < request.closing_at {
            return Err(Error::Validation(
                "resolution time cannot precede closing time".to_string(),
            ));
        }

        let admin = self.require_admin()?;
        let call = ContractCall::create_market(
            &self.ledger.market_contract,
            &admin.public_key_hex(),
            &request.title,
            request.description.as_deref().unwrap_or(""),
            &request.category,
            request.closing_at,
            resolution_at,
        );
        let confirmed = self
            .submit_as_admin(
                call,
                OperationContext::new(
                    SERVICE_NAME,
                    "create_market",
                    json!({ "title": request.title, "creator_id": request.creator_id }),
                ),
            )
            .await?;
        let ledger_id = Self::extract_market_id(&confirmed)?;

        let market = Market {
            id: Uuid::new_v4(),
            ledger_id,
            creator_id: request.creator_id,
            title: request.title,
            description: request.description,
            category: request.category,
            outcome_a: request.outcome_a,
            outcome_b: request.outcome_b,
            status: MarketStatus::Open,
            yes_reserve: Decimal::ZERO,
            no_reserve: Decimal::ZERO,
            total_volume: Decimal::ZERO,
            closing_at: request.closing_at,
            resolution_at,
            winning_outcome: None,
            created_at: now,
            updated_at: now,
        };
        self.markets.insert(&market).await?;

        info!(
            market_id = %market.id,
            ledger_id = %market.ledger_id,
            tx_hash = %confirmed.hash,
            "market created"
        );
        Ok(market)
    }

    /// Seed the AMM pool for an OPEN market. Legal exactly once; reserves
    /// must still be zero.
    pub async fn create_pool(&self, market_id: Uuid, initial_liquidity: Decimal) -> Result<()> {
        if initial_liquidity <= Decimal::ZERO {
            return Err(Error::Validation(
                "initial liquidity must be positive".to_string(),
            ));
        }
        let market = self.require_market(market_id).await?;
        if !market.is_open() {
            return Err(Error::MarketNotOpen {
                status: market.status,
            });
        }
        if market.has_pool() {
            return Err(Error::DuplicatePool {
                market_id: market.ledger_id,
            });
        }

        let call = ContractCall::create_pool(
            &self.ledger.amm_contract,
            &market.ledger_id,
            initial_liquidity,
        );
        let confirmed = self
            .submit_as_admin(
                call,
                OperationContext::new(
                    SERVICE_NAME,
                    "create_pool",
                    json!({ "market_id": market_id, "liquidity": initial_liquidity.to_string() }),
                ),
            )
            .await?;

        let half = initial_liquidity / Decimal::TWO;
        self.markets.set_reserves(market_id, half, half).await?;

        info!(
            market_id = %market_id,
            tx_hash = %confirmed.hash,
            liquidity = %initial_liquidity,
            "liquidity pool seeded"
        );
        Ok(())
    }

    /// OPEN -> CLOSED. Trading stops; resolution becomes possible.
    pub async fn close_market(&self, market_id: Uuid) -> Result<()> {
        let market = self.require_market(market_id).await?;
        if market.status != MarketStatus::Open {
            return Err(Error::InvalidTransition {
                from: market.status,
                to: MarketStatus::Closed,
            });
        }

        let call = ContractCall::close_market(&self.ledger.market_contract, &market.ledger_id);
        self.submit_as_admin(
            call,
            OperationContext::new(SERVICE_NAME, "close_market", json!({ "market_id": market_id })),
        )
        .await?;

        if !self
            .markets
            .transition(market_id, MarketStatus::Open, MarketStatus::Closed)
            .await?
        {
            return Err(Error::InvalidTransition {
                from: MarketStatus::Closed,
                to: MarketStatus::Closed,
            });
        }

        info!(market_id = %market_id, "market closed");
        Ok(())
    }

    /// Resolve the market to a winning outcome and settle every outstanding
    /// position. Legal from CLOSED, and from OPEN for same-day resolutions.
    pub async fn resolve_market(&self, market_id: Uuid, winning: OutcomeSide) -> Result<u64> {
        let market = self.require_market(market_id).await?;
        let from = market.status;
        if !matches!(from, MarketStatus::Open | MarketStatus::Closed) {
            return Err(Error::InvalidTransition {
                from,
                to: MarketStatus::Resolved,
            });
        }

        let call = ContractCall::resolve_market(&self.ledger.market_contract, &market.ledger_id);
        self.submit_as_admin(
            call,
            OperationContext::new(
                SERVICE_NAME,
                "resolve_market",
                json!({ "market_id": market_id, "winning_outcome": winning.index() }),
            ),
        )
        .await?;

        if !self
            .markets
            .mark_resolved(market_id, from, winning, Utc::now())
            .await?
        {
            return Err(Error::InvalidTransition {
                from,
                to: MarketStatus::Resolved,
            });
        }

        let settled = self.settle_outstanding(market_id, winning).await?;
        info!(
            market_id = %market_id,
            winning_outcome = %winning,
            settled_positions = settled,
            "market resolved"
        );
        Ok(settled)
    }

    /// Creator-authorized cancellation. Local transition only; the ledger
    /// contract surface has no cancel entry point.
    pub async fn cancel_market(&self, market_id: Uuid, caller_id: Uuid) -> Result<()> {
        let market = self.require_market(market_id).await?;
        if market.creator_id != caller_id {
            return Err(Error::Unauthorized(
                "only the market creator may cancel".to_string(),
            ));
        }
        match market.status {
            MarketStatus::Resolved => return Err(Error::CannotCancelResolved),
            MarketStatus::Cancelled => {
                return Err(Error::InvalidTransition {
                    from: MarketStatus::Cancelled,
                    to: MarketStatus::Cancelled,
                })
            }
            MarketStatus::Open | MarketStatus::Closed => {}
        }

        if !self
            .markets
            .transition(market_id, market.status, MarketStatus::Cancelled)
            .await?
        {
            return Err(Error::InvalidTransition {
                from: market.status,
                to: MarketStatus::Cancelled,
            });
        }

        info!(market_id = %market_id, caller_id = %caller_id, "market cancelled");
        Ok(())
    }

    /// Relay a `claim_winnings` call for a user after resolution. The
    /// settlement fan-out already projected the payout locally; the claim
    /// reconciles custody on the ledger side, so nothing is credited here.
    pub async fn claim_winnings(
        &self,
        user_id: Uuid,
        market_id: Uuid,
        signed_envelope: Option<&str>,
    ) -> Result<ConfirmedTx> {
        let market = self.require_market(market_id).await?;
        if market.status != MarketStatus::Resolved {
            return Err(Error::Validation(
                "winnings can only be claimed on a resolved market".to_string(),
            ));
        }
        let account = self
            .balances
            .get(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("balance for user {}", user_id)))?
            .ledger_account;

        let ctx = OperationContext::new(
            SERVICE_NAME,
            "claim_winnings",
            json!({ "user_id": user_id, "market_id": market_id }),
        );

        match (self.trading.execution_mode, signed_envelope) {
            (ExecutionMode::NonCustodial, Some(envelope)) => {
                self.pipeline.submit_signed(envelope, &account, ctx).await
            }
            (ExecutionMode::NonCustodial, None) => Err(Error::Validation(
                "non-custodial claims require a signed envelope".to_string(),
            )),
            (ExecutionMode::Custodial, _) => {
                let call = ContractCall::claim_winnings(
                    &self.ledger.market_contract,
                    &account,
                    &market.ledger_id,
                );
                self.submit_as_admin(call, ctx).await
            }
        }
    }

    /// Relay an oracle attestation for a market outcome.
    pub async fn submit_attestation(
        &self,
        market_id: Uuid,
        outcome: OutcomeSide,
    ) -> Result<ConfirmedTx> {
        let market = self.require_market(market_id).await?;
        let call = ContractCall::submit_attestation(
            &self.ledger.oracle_contract,
            &market.ledger_id,
            outcome,
        );
        self.submit_as_admin(
            call,
            OperationContext::new(
                SERVICE_NAME,
                "submit_attestation",
                json!({ "market_id": market_id, "outcome": outcome.index() }),
            ),
        )
        .await
    }

    /// Read the oracle's consensus state for a market. Consensus internals
    /// are the contract's business; the raw value is passed through.
    pub async fn check_consensus(&self, market_id: Uuid) -> Result<serde_json::Value> {
        let market = self.require_market(market_id).await?;
        let call = ContractCall::check_consensus(&self.ledger.oracle_contract, &market.ledger_id);
        self.gateway.simulate(&call).await
    }

    /// Settle every outstanding position on a resolved market. Winners are
    /// credited 1 USDC per share; each user settles in their own transaction
    /// and one user's failure never aborts the rest.
    async fn settle_outstanding(&self, market_id: Uuid, winning: OutcomeSide) -> Result<u64> {
        let outstanding = self.positions.list_outstanding(market_id).await?;
        let total = outstanding.len();

        let settled = stream::iter(outstanding)
            .map(|position| async move {
                match self.settle_position(&position, winning).await {
                    Ok(applied) => u64::from(applied),
                    Err(e) => {
                        warn!(
                            market_id = %market_id,
                            user_id = %position.user_id,
                            position_id = %position.id,
                            error = %e,
                            "position settlement failed; skipping"
                        );
                        0
                    }
                }
            })
            .buffer_unordered(SETTLEMENT_CONCURRENCY)
            .fold(0u64, |acc, n| async move { acc + n })
            .await;

        if (settled as usize) < total {
            warn!(
                market_id = %market_id,
                settled,
                outstanding = total,
                "settlement fan-out completed with failures"
            );
        }
        Ok(settled)
    }

    /// Settle one position atomically: credit (winners only), settlement
    /// verdict, and stats aggregation commit together.
    async fn settle_position(&self, position: &Position, winning: OutcomeSide) -> Result<bool> {
        let mut tx = self.db.begin().await?;

        // Re-read under lock: the snapshot from the fan-out listing may have
        // raced with a sell or an earlier settlement attempt.
        let Some(current) = PositionRepository::lock(
            &mut *tx,
            position.user_id,
            position.market_id,
            position.outcome,
        )
        .await?
        else {
            return Ok(false);
        };
        if current.settled_at.is_some() || current.is_empty() {
            return Ok(false);
        }

        let won = current.outcome == winning;
        let payout = if won { current.quantity } else { Decimal::ZERO };
        let pnl = payout - current.cost_basis;

        if won {
            BalanceRepository::credit(&mut *tx, current.user_id, payout).await?;
        }
        PositionRepository::mark_settled(&mut *tx, current.id, won, pnl, Utc::now()).await?;
        BalanceRepository::record_settlement(&mut *tx, current.user_id, won, pnl).await?;

        tx.commit().await?;

        info!(
            user_id = %current.user_id,
            market_id = %current.market_id,
            outcome = %current.outcome,
            won,
            payout = %payout,
            pnl = %pnl,
            "position settled"
        );
        Ok(true)
    }

    /// Sign and submit a platform-sourced call through the pipeline.
    async fn submit_as_admin(
        &self,
        call: ContractCall,
        ctx: OperationContext,
    ) -> Result<ConfirmedTx> {
        let admin = self.require_admin()?;
        let unsigned = self
            .gateway
            .build_unsigned(&call, &admin.public_key_hex())
            .await?;
        let signed = admin.sign_envelope(&unsigned)?;
        self.pipeline.execute(&signed, ctx).await
    }

    fn require_admin(&self) -> Result<&AdminSigner> {
        self.admin.as_ref().ok_or_else(|| Error::Config {
            message: "lifecycle operations require ADMIN_SECRET_KEY".to_string(),
        })
    }

    async fn require_market(&self, market_id: Uuid) -> Result<Market> {
        self.markets
            .get(market_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("market {}", market_id)))
    }

    fn extract_market_id(confirmed: &ConfirmedTx) -> Result<String> {
        confirmed
            .return_value
            .as_str()
            .map(str::to_string)
            .or_else(|| {
                confirmed
                    .return_value
                    .get("market_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .ok_or_else(|| Error::Rpc {
                message: "create_market returned no market id".to_string(),
            })
    }
}
