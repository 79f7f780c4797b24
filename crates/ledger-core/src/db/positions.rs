//! Database operations for positions.

use crate::types::{OutcomeSide, Position};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

/// Repository for position rows.
pub struct PositionRepository {
    pool: PgPool,
}

const POSITION_COLUMNS: &str = r#"
    id, user_id, market_id, outcome, quantity, cost_basis, entry_price,
    sold_quantity, realized_pnl, is_winner, settled_at, created_at, updated_at
"#;

impl PositionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a position by its (user, market, outcome) key.
    pub async fn get(
        &self,
        user_id: Uuid,
        market_id: Uuid,
        outcome: OutcomeSide,
    ) -> Result<Option<Position>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM positions WHERE user_id = $1 AND market_id = $2 AND outcome = $3",
            POSITION_COLUMNS
        ))
        .bind(user_id)
        .bind(market_id)
        .bind(outcome.as_i16())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_position(&r)))
    }

    /// All outstanding (non-empty, unsettled) positions on a market, for
    /// settlement fan-out.
    pub async fn list_outstanding(&self, market_id: Uuid) -> Result<Vec<Position>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM positions
            WHERE market_id = $1 AND quantity > 0 AND settled_at IS NULL
            ORDER BY created_at ASC
            "#,
            POSITION_COLUMNS
        ))
        .bind(market_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_position).collect())
    }

    /// Lock and load a position inside an open transaction.
    pub async fn lock(
        conn: &mut PgConnection,
        user_id: Uuid,
        market_id: Uuid,
        outcome: OutcomeSide,
    ) -> Result<Option<Position>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM positions
            WHERE user_id = $1 AND market_id = $2 AND outcome = $3
            FOR UPDATE
            "#,
            POSITION_COLUMNS
        ))
        .bind(user_id)
        .bind(market_id)
        .bind(outcome.as_i16())
        .fetch_optional(conn)
        .await?;

        Ok(row.map(|r| Self::row_to_position(&r)))
    }

    /// Insert or fully rewrite a position inside an open transaction. The
    /// (user, market, outcome) unique key makes this the create-or-increment
    /// point for buys and the decrement point for sells.
    pub async fn upsert(conn: &mut PgConnection, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, user_id, market_id, outcome, quantity, cost_basis,
                entry_price, sold_quantity, realized_pnl, is_winner,
                settled_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (user_id, market_id, outcome) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                cost_basis = EXCLUDED.cost_basis,
                entry_price = EXCLUDED.entry_price,
                sold_quantity = EXCLUDED.sold_quantity,
                realized_pnl = EXCLUDED.realized_pnl,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(position.id)
        .bind(position.user_id)
        .bind(position.market_id)
        .bind(position.outcome.as_i16())
        .bind(position.quantity)
        .bind(position.cost_basis)
        .bind(position.entry_price)
        .bind(position.sold_quantity)
        .bind(position.realized_pnl)
        .bind(position.is_winner)
        .bind(position.settled_at)
        .bind(position.created_at)
        .bind(position.updated_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Persist a settlement verdict inside an open transaction.
    pub async fn mark_settled(
        conn: &mut PgConnection,
        id: Uuid,
        is_winner: bool,
        settlement_pnl: Decimal,
        settled_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE positions
            SET is_winner = $2, realized_pnl = realized_pnl + $3,
                settled_at = $4, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(is_winner)
        .bind(settlement_pnl)
        .bind(settled_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    fn row_to_position(r: &sqlx::postgres::PgRow) -> Position {
        Position {
            id: r.get("id"),
            user_id: r.get("user_id"),
            market_id: r.get("market_id"),
            outcome: OutcomeSide::from_i16(r.get("outcome")),
            quantity: r.get("quantity"),
            cost_basis: r.get("cost_basis"),
            entry_price: r.get("entry_price"),
            sold_quantity: r.get("sold_quantity"),
            realized_pnl: r.get("realized_pnl"),
            is_winner: r.get("is_winner"),
            settled_at: r.get("settled_at"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }
}
