//! Database operations for markets.

use crate::types::{Market, MarketStatus, OutcomeSide};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

/// Repository for market rows.
pub struct MarketRepository {
    pool: PgPool,
}

const MARKET_COLUMNS: &str = r#"
    id, ledger_id, creator_id, title, description, category,
    outcome_a, outcome_b, status, yes_reserve, no_reserve,
    total_volume, closing_at, resolution_at, winning_outcome,
    created_at, updated_at
"#;

impl MarketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new market.
    pub async fn insert(&self, market: &Market) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO markets (
                id, ledger_id, creator_id, title, description, category,
                outcome_a, outcome_b, status, yes_reserve, no_reserve,
                total_volume, closing_at, resolution_at, winning_outcome,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(market.id)
        .bind(&market.ledger_id)
        .bind(market.creator_id)
        .bind(&market.title)
        .bind(&market.description)
        .bind(&market.category)
        .bind(&market.outcome_a)
        .bind(&market.outcome_b)
        .bind(market.status.as_i16())
        .bind(market.yes_reserve)
        .bind(market.no_reserve)
        .bind(market.total_volume)
        .bind(market.closing_at)
        .bind(market.resolution_at)
        .bind(market.winning_outcome.map(|o| o.as_i16()))
        .bind(market.created_at)
        .bind(market.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a market by local id.
    pub async fn get(&self, id: Uuid) -> Result<Option<Market>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM markets WHERE id = $1",
            MARKET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_market(&r)))
    }

    /// Get every market in a given status.
    pub async fn list_by_status(&self, status: MarketStatus) -> Result<Vec<Market>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM markets WHERE status = $1 ORDER BY created_at DESC",
            MARKET_COLUMNS
        ))
        .bind(status.as_i16())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_market).collect())
    }

    /// Atomically transition a market from one status to another. Returns
    /// false when the market was not in `from`, which callers report as an
    /// illegal transition; the WHERE guard keeps the status DAG race-free.
    pub async fn transition(&self, id: Uuid, from: MarketStatus, to: MarketStatus) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE markets SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_i16())
        .bind(to.as_i16())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record resolution outcome and time alongside the RESOLVED status.
    pub async fn mark_resolved(
        &self,
        id: Uuid,
        from: MarketStatus,
        winning_outcome: OutcomeSide,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE markets
            SET status = $3, winning_outcome = $4, resolution_at = $5, updated_at = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_i16())
        .bind(MarketStatus::Resolved.as_i16())
        .bind(winning_outcome.as_i16())
        .bind(resolved_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record the seeded pool reserves.
    pub async fn set_reserves(&self, id: Uuid, yes: Decimal, no: Decimal) -> Result<()> {
        sqlx::query(
            "UPDATE markets SET yes_reserve = $2, no_reserve = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(id)
        .bind(yes)
        .bind(no)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Increment cumulative volume inside an open transaction.
    pub async fn add_volume(conn: &mut PgConnection, id: Uuid, amount: Decimal) -> Result<()> {
        sqlx::query(
            "UPDATE markets SET total_volume = total_volume + $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(amount)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        Ok(())
    }

    fn row_to_market(r: &sqlx::postgres::PgRow) -> Market {
        Market {
            id: r.get("id"),
            ledger_id: r.get("ledger_id"),
            creator_id: r.get("creator_id"),
            title: r.get("title"),
            description: r.get("description"),
            category: r.get("category"),
            outcome_a: r.get("outcome_a"),
            outcome_b: r.get("outcome_b"),
            status: MarketStatus::from_i16(r.get("status")),
            yes_reserve: r.get("yes_reserve"),
            no_reserve: r.get("no_reserve"),
            total_volume: r.get("total_volume"),
            closing_at: r.get("closing_at"),
            resolution_at: r.get("resolution_at"),
            winning_outcome: r
                .get::<Option<i16>, _>("winning_outcome")
                .map(OutcomeSide::from_i16),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}
