//! Trade records.

use crate::types::OutcomeSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_i16(&self) -> i16 {
        match self {
            TradeSide::Buy => 0,
            TradeSide::Sell => 1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            TradeSide::Sell
        } else {
            TradeSide::Buy
        }
    }
}

/// Confirmation state of a trade against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TradeStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            TradeStatus::Pending => 0,
            TradeStatus::Confirmed => 1,
            TradeStatus::Failed => 2,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => TradeStatus::Confirmed,
            2 => TradeStatus::Failed,
            _ => TradeStatus::Pending,
        }
    }
}

/// A single buy or sell. Created PENDING before the ledger outcome is
/// durably known, transitioned to CONFIRMED/FAILED afterwards; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub outcome: OutcomeSide,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub total_amount: Decimal,
    pub fee: Decimal,
    pub tx_hash: Option<String>,
    pub status: TradeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Create a pending trade record ahead of ledger submission. Quantity and
    /// price are the requested values; the confirmed ledger receipt overwrites
    /// them at confirmation time.
    pub fn pending(
        user_id: Uuid,
        market_id: Uuid,
        outcome: OutcomeSide,
        side: TradeSide,
        quantity: Decimal,
        price: Decimal,
        total_amount: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id,
            outcome,
            side,
            quantity,
            price,
            total_amount,
            fee: Decimal::ZERO,
            tx_hash: None,
            status: TradeStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_trade_defaults() {
        let t = Trade::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            OutcomeSide::Yes,
            TradeSide::Buy,
            Decimal::new(100, 0),
            Decimal::ONE,
            Decimal::new(100, 0),
        );
        assert_eq!(t.status, TradeStatus::Pending);
        assert!(t.tx_hash.is_none());
        assert_eq!(t.fee, Decimal::ZERO);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [TradeStatus::Pending, TradeStatus::Confirmed, TradeStatus::Failed] {
            assert_eq!(TradeStatus::from_i16(status.as_i16()), status);
        }
    }
}
