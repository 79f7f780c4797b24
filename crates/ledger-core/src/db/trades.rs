//! Database operations for trade records.

use crate::types::{OutcomeSide, Trade, TradeSide, TradeStatus};
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

/// Repository for trade rows. Trades are append-then-transition: inserted
/// PENDING before the ledger outcome is known, moved to CONFIRMED or FAILED
/// afterwards, and never deleted.
pub struct TradeRepository {
    pool: PgPool,
}

impl TradeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending trade ahead of ledger submission.
    pub async fn insert(&self, trade: &Trade) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                id, user_id, market_id, outcome, side, quantity, price,
                total_amount, fee, tx_hash, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(trade.id)
        .bind(trade.user_id)
        .bind(trade.market_id)
        .bind(trade.outcome.as_i16())
        .bind(trade.side.as_i16())
        .bind(trade.quantity)
        .bind(trade.price)
        .bind(trade.total_amount)
        .bind(trade.fee)
        .bind(&trade.tx_hash)
        .bind(trade.status.as_i16())
        .bind(trade.created_at)
        .bind(trade.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a trade by id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Trade>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, market_id, outcome, side, quantity, price,
                   total_amount, fee, tx_hash, status, created_at, updated_at
            FROM trades WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_trade(&r)))
    }

    /// A user's trade history, newest first.
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Trade>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, market_id, outcome, side, quantity, price,
                   total_amount, fee, tx_hash, status, created_at, updated_at
            FROM trades WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_trade).collect())
    }

    /// Mark a trade FAILED. Outside any settlement transaction: a failed
    /// ledger call has no local-store effects to keep atomic with.
    pub async fn mark_failed(&self, id: Uuid, tx_hash: Option<&str>) -> Result<()> {
        sqlx::query(
            "UPDATE trades SET status = $2, tx_hash = COALESCE($3, tx_hash), updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(TradeStatus::Failed.as_i16())
        .bind(tx_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Confirm a trade with the ledger receipt, inside the settlement
    /// transaction so confirmation and local effects commit together.
    #[allow(clippy::too_many_arguments)]
    pub async fn confirm(
        conn: &mut PgConnection,
        id: Uuid,
        tx_hash: &str,
        quantity: Decimal,
        price: Decimal,
        total_amount: Decimal,
        fee: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE trades
            SET status = $2, tx_hash = $3, quantity = $4, price = $5,
                total_amount = $6, fee = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(TradeStatus::Confirmed.as_i16())
        .bind(tx_hash)
        .bind(quantity)
        .bind(price)
        .bind(total_amount)
        .bind(fee)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        Ok(())
    }

    fn row_to_trade(r: &sqlx::postgres::PgRow) -> Trade {
        Trade {
            id: r.get("id"),
            user_id: r.get("user_id"),
            market_id: r.get("market_id"),
            outcome: OutcomeSide::from_i16(r.get("outcome")),
            side: TradeSide::from_i16(r.get("side")),
            quantity: r.get("quantity"),
            price: r.get("price"),
            total_amount: r.get("total_amount"),
            fee: r.get("fee"),
            tx_hash: r.get("tx_hash"),
            status: TradeStatus::from_i16(r.get("status")),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}
