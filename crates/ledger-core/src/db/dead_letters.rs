//! Database operations for the ledger dead-letter queue.

use crate::types::{DeadLetter, DeadLetterStatus};
use crate::Result;
use chrono::Utc;
use sqlx::{PgPool, Row};

/// Repository for permanently failed ledger operations, keyed by transaction
/// hash.
pub struct DeadLetterRepository {
    pool: PgPool,
}

impl DeadLetterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert: a repeated failure of the same hash refreshes the
    /// record instead of duplicating it.
    pub async fn upsert(&self, letter: &DeadLetter) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ledger_dead_letters (
                tx_hash, service_name, function_name, params, error, status, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tx_hash) DO UPDATE SET
                service_name = EXCLUDED.service_name,
                function_name = EXCLUDED.function_name,
                params = EXCLUDED.params,
                error = EXCLUDED.error,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&letter.tx_hash)
        .bind(&letter.service_name)
        .bind(&letter.function_name)
        .bind(&letter.params)
        .bind(&letter.error)
        .bind(letter.status.as_i16())
        .bind(letter.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get a dead letter by transaction hash.
    pub async fn get(&self, tx_hash: &str) -> Result<Option<DeadLetter>> {
        let row = sqlx::query(
            r#"
            SELECT tx_hash, service_name, function_name, params, error, status, updated_at
            FROM ledger_dead_letters WHERE tx_hash = $1
            "#,
        )
        .bind(tx_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_letter(&r)))
    }

    /// All letters awaiting triage, oldest first.
    pub async fn list_pending(&self) -> Result<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r#"
            SELECT tx_hash, service_name, function_name, params, error, status, updated_at
            FROM ledger_dead_letters
            WHERE status = $1
            ORDER BY updated_at ASC
            "#,
        )
        .bind(DeadLetterStatus::Pending.as_i16())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_letter).collect())
    }

    /// Operator marks a letter handled.
    pub async fn mark_resolved(&self, tx_hash: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ledger_dead_letters SET status = $2, updated_at = $3 WHERE tx_hash = $1",
        )
        .bind(tx_hash)
        .bind(DeadLetterStatus::Resolved.as_i16())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_letter(r: &sqlx::postgres::PgRow) -> DeadLetter {
        DeadLetter {
            tx_hash: r.get("tx_hash"),
            service_name: r.get("service_name"),
            function_name: r.get("function_name"),
            params: r.get("params"),
            error: r.get("error"),
            status: DeadLetterStatus::from_i16(r.get("status")),
            updated_at: r.get("updated_at"),
        }
    }
}
