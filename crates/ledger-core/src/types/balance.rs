//! User balance and aggregate statistics projections.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// USDC-denominated local balance. Never negative; only mutated inside the
/// same database transaction as the trade/position update that justifies the
/// change. `ledger_account` is the user's registered public key on the ledger
/// and is the only source for signature-verification expectations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBalance {
    pub user_id: Uuid,
    pub ledger_account: String,
    pub balance: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Lifetime win/loss aggregates, updated during settlement fan-out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: Uuid,
    pub wins: i64,
    pub losses: i64,
    pub total_pnl: Decimal,
}
