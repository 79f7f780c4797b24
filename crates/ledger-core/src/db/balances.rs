//! Database operations for user balances and settlement statistics.

use crate::types::{UserBalance, UserStats};
use crate::{Error, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

/// Repository for the USDC balance projection. Balances are only ever
/// mutated through [`BalanceRepository::debit`] / [`BalanceRepository::credit`]
/// inside the same transaction as the trade or settlement that justifies the
/// change.
pub struct BalanceRepository {
    pool: PgPool,
}

impl BalanceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a balance row for a user with their ledger account key.
    pub async fn create(
        &self,
        user_id: Uuid,
        ledger_account: &str,
        initial_balance: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, ledger_account, balance, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(ledger_account)
        .bind(initial_balance)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a user's balance row.
    pub async fn get(&self, user_id: Uuid) -> Result<Option<UserBalance>> {
        let row = sqlx::query(
            "SELECT user_id, ledger_account, balance, updated_at FROM user_balances WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_balance(&r)))
    }

    /// Lock and load a balance row inside an open transaction. The row lock
    /// serializes concurrent trades by the same user, preventing lost
    /// updates.
    pub async fn lock(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<UserBalance>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, ledger_account, balance, updated_at
            FROM user_balances WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(|r| Self::row_to_balance(&r)))
    }

    /// Debit inside an open transaction. The `balance >= amount` guard in
    /// the WHERE clause keeps the never-negative invariant even if the
    /// caller's precondition check raced.
    pub async fn debit(conn: &mut PgConnection, user_id: Uuid, amount: Decimal) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_balances
            SET balance = balance - $2, updated_at = $3
            WHERE user_id = $1 AND balance >= $2
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        if result.rows_affected() != 1 {
            return Err(Error::InsufficientBalance {
                available: Decimal::ZERO,
                required: amount,
            });
        }
        Ok(())
    }

    /// Credit inside an open transaction.
    pub async fn credit(conn: &mut PgConnection, user_id: Uuid, amount: Decimal) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_balances
            SET balance = balance + $2, updated_at = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Fold one settlement result into the user's lifetime aggregates,
    /// inside the settlement transaction.
    pub async fn record_settlement(
        conn: &mut PgConnection,
        user_id: Uuid,
        won: bool,
        pnl: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_stats (user_id, wins, losses, total_pnl, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE SET
                wins = user_stats.wins + EXCLUDED.wins,
                losses = user_stats.losses + EXCLUDED.losses,
                total_pnl = user_stats.total_pnl + EXCLUDED.total_pnl,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(user_id)
        .bind(if won { 1i64 } else { 0i64 })
        .bind(if won { 0i64 } else { 1i64 })
        .bind(pnl)
        .bind(Utc::now())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Get a user's lifetime settlement aggregates.
    pub async fn get_stats(&self, user_id: Uuid) -> Result<Option<UserStats>> {
        let row = sqlx::query(
            "SELECT user_id, wins, losses, total_pnl FROM user_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserStats {
            user_id: r.get("user_id"),
            wins: r.get("wins"),
            losses: r.get("losses"),
            total_pnl: r.get("total_pnl"),
        }))
    }

    fn row_to_balance(r: &sqlx::postgres::PgRow) -> UserBalance {
        UserBalance {
            user_id: r.get("user_id"),
            ledger_account: r.get("ledger_account"),
            balance: r.get("balance"),
            updated_at: r.get("updated_at"),
        }
    }
}
