//! Market types and lifecycle states.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a market. Transitions form a strict DAG; no transition
/// is reversible and RESOLVED/CANCELLED are mutually exclusive terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Open,
    Closed,
    Resolved,
    Cancelled,
}

impl MarketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketStatus::Resolved | MarketStatus::Cancelled)
    }

    /// Database encoding (smallint column).
    pub fn as_i16(&self) -> i16 {
        match self {
            MarketStatus::Open => 0,
            MarketStatus::Closed => 1,
            MarketStatus::Resolved => 2,
            MarketStatus::Cancelled => 3,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            0 => MarketStatus::Open,
            1 => MarketStatus::Closed,
            2 => MarketStatus::Resolved,
            _ => MarketStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for MarketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketStatus::Open => "OPEN",
            MarketStatus::Closed => "CLOSED",
            MarketStatus::Resolved => "RESOLVED",
            MarketStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One of the two outcomes of a binary market. The numeric encoding matches
/// the contract's outcome domain: 0 = NO, 1 = YES.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeSide {
    No,
    Yes,
}

impl OutcomeSide {
    /// Parse an outcome index, rejecting anything outside {0, 1}.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(OutcomeSide::No),
            1 => Some(OutcomeSide::Yes),
            _ => None,
        }
    }

    pub fn index(&self) -> u8 {
        match self {
            OutcomeSide::No => 0,
            OutcomeSide::Yes => 1,
        }
    }

    pub fn as_i16(&self) -> i16 {
        self.index() as i16
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            OutcomeSide::Yes
        } else {
            OutcomeSide::No
        }
    }
}

impl std::fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeSide::No => f.write_str("NO"),
            OutcomeSide::Yes => f.write_str("YES"),
        }
    }
}

/// A prediction market. The local row is a read-optimized projection; the
/// ledger contract identified by `ledger_id` holds funds authoritatively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: Uuid,
    /// Hex-encoded 32-byte market id on the ledger.
    pub ledger_id: String,
    pub creator_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub outcome_a: String,
    pub outcome_b: String,
    pub status: MarketStatus,
    pub yes_reserve: Decimal,
    pub no_reserve: Decimal,
    pub total_volume: Decimal,
    pub closing_at: DateTime<Utc>,
    pub resolution_at: DateTime<Utc>,
    pub winning_outcome: Option<OutcomeSide>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Market {
    /// Whether a liquidity pool has already been seeded.
    pub fn has_pool(&self) -> bool {
        !self.yes_reserve.is_zero() || !self.no_reserve.is_zero()
    }

    pub fn is_open(&self) -> bool {
        self.status == MarketStatus::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_domain() {
        assert_eq!(OutcomeSide::from_index(0), Some(OutcomeSide::No));
        assert_eq!(OutcomeSide::from_index(1), Some(OutcomeSide::Yes));
        assert_eq!(OutcomeSide::from_index(2), None);
        assert_eq!(OutcomeSide::from_index(255), None);
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            MarketStatus::Open,
            MarketStatus::Closed,
            MarketStatus::Resolved,
            MarketStatus::Cancelled,
        ] {
            assert_eq!(MarketStatus::from_i16(status.as_i16()), status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!MarketStatus::Open.is_terminal());
        assert!(!MarketStatus::Closed.is_terminal());
        assert!(MarketStatus::Resolved.is_terminal());
        assert!(MarketStatus::Cancelled.is_terminal());
    }
}
