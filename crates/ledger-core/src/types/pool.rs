//! Value types returned by ledger contract calls.

use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// AMM pool state as reported by `get_pool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolState {
    pub yes_reserve: Decimal,
    pub no_reserve: Decimal,
    pub yes_odds: Decimal,
    pub no_odds: Decimal,
}

impl PoolState {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::Rpc {
            message: format!("malformed get_pool result: {}", e),
        })
    }
}

/// Result payload of a confirmed `buy_shares` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyReceipt {
    pub shares_received: Decimal,
    pub price_per_unit: Decimal,
    pub total_cost: Decimal,
    pub fee_amount: Decimal,
}

impl BuyReceipt {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::Rpc {
            message: format!("malformed buy_shares result: {}", e),
        })
    }
}

/// Result payload of a confirmed `sell_shares` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellReceipt {
    pub payout: Decimal,
    pub price_per_unit: Decimal,
    pub fee_amount: Decimal,
}

impl SellReceipt {
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::Rpc {
            message: format!("malformed sell_shares result: {}", e),
        })
    }
}

/// Odds quote served to callers. Percentages are rounded and always sum to
/// exactly 100 for a well-formed pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OddsQuote {
    pub market_id: Uuid,
    pub yes_odds: Decimal,
    pub no_odds: Decimal,
    pub yes_percentage: u32,
    pub no_percentage: u32,
    pub yes_liquidity: Decimal,
    pub no_liquidity: Decimal,
}

impl OddsQuote {
    /// Build a quote from pool state, rounding the YES share and deriving the
    /// NO share as the complement so the two always sum to 100.
    pub fn from_pool(market_id: Uuid, pool: &PoolState) -> Result<Self> {
        let total = pool.yes_odds + pool.no_odds;
        if total <= Decimal::ZERO {
            return Err(Error::Rpc {
                message: "degenerate pool state: non-positive odds total".to_string(),
            });
        }
        let yes_pct = (pool.yes_odds * Decimal::ONE_HUNDRED / total)
            .round()
            .to_u32()
            .unwrap_or(0)
            .min(100);
        Ok(Self {
            market_id,
            yes_odds: pool.yes_odds,
            no_odds: pool.no_odds,
            yes_percentage: yes_pct,
            no_percentage: 100 - yes_pct,
            yes_liquidity: pool.yes_reserve,
            no_liquidity: pool.no_reserve,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(yes: Decimal, no: Decimal) -> PoolState {
        PoolState {
            yes_reserve: Decimal::new(500, 0),
            no_reserve: Decimal::new(500, 0),
            yes_odds: yes,
            no_odds: no,
        }
    }

    #[test]
    fn test_percentages_sum_to_100() {
        let cases = [
            (Decimal::new(50, 0), Decimal::new(50, 0)),
            (Decimal::new(511, 1), Decimal::new(489, 1)),
            (Decimal::new(333, 1), Decimal::new(667, 1)),
            (Decimal::new(1, 0), Decimal::new(99, 0)),
        ];
        for (yes, no) in cases {
            let quote = OddsQuote::from_pool(Uuid::new_v4(), &pool(yes, no)).unwrap();
            assert_eq!(quote.yes_percentage + quote.no_percentage, 100);
        }
    }

    #[test]
    fn test_degenerate_pool_rejected() {
        let result = OddsQuote::from_pool(Uuid::new_v4(), &pool(Decimal::ZERO, Decimal::ZERO));
        assert!(result.is_err());
    }

    #[test]
    fn test_receipt_parsing() {
        let value = serde_json::json!({
            "shares_received": "99.0",
            "price_per_unit": "1.0",
            "total_cost": "100.0",
            "fee_amount": "1.0",
        });
        let receipt = BuyReceipt::from_value(&value).unwrap();
        assert_eq!(receipt.shares_received, Decimal::new(99, 0));
        assert_eq!(receipt.fee_amount, Decimal::ONE);
    }
}
