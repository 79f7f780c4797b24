//! Share positions held per (user, market, outcome).

use crate::types::OutcomeSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's holding of one outcome of one market.
///
/// Created on first buy, incrementally updated on subsequent buys/sells, and
/// zeroed when fully sold. Cost basis and entry price are maintained as
/// weighted averages across buys; sells reduce cost basis proportionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub user_id: Uuid,
    pub market_id: Uuid,
    pub outcome: OutcomeSide,
    pub quantity: Decimal,
    pub cost_basis: Decimal,
    pub entry_price: Decimal,
    pub sold_quantity: Decimal,
    pub realized_pnl: Decimal,
    /// Set during settlement fan-out when the market resolves.
    pub is_winner: Option<bool>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Open a fresh position from a first buy.
    pub fn open(
        user_id: Uuid,
        market_id: Uuid,
        outcome: OutcomeSide,
        quantity: Decimal,
        cost: Decimal,
    ) -> Self {
        let now = Utc::now();
        let entry_price = if quantity.is_zero() {
            Decimal::ZERO
        } else {
            cost / quantity
        };
        Self {
            id: Uuid::new_v4(),
            user_id,
            market_id,
            outcome,
            quantity,
            cost_basis: cost,
            entry_price,
            sold_quantity: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            is_winner: None,
            settled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fold another buy into the position, re-weighting the entry price.
    pub fn apply_buy(&mut self, quantity: Decimal, cost: Decimal) {
        self.cost_basis += cost;
        self.quantity += quantity;
        if !self.quantity.is_zero() {
            self.entry_price = self.cost_basis / self.quantity;
        }
        self.updated_at = Utc::now();
    }

    /// Remove `quantity` shares sold for `proceeds`, reducing cost basis
    /// proportionally. Returns the realized PnL on the sold portion.
    ///
    /// Callers must have checked `quantity <= self.quantity`.
    pub fn apply_sell(&mut self, quantity: Decimal, proceeds: Decimal) -> Decimal {
        let cost_removed = if self.quantity.is_zero() {
            Decimal::ZERO
        } else {
            self.cost_basis * quantity / self.quantity
        };
        let realized = proceeds - cost_removed;

        self.quantity -= quantity;
        self.cost_basis -= cost_removed;
        self.sold_quantity += quantity;
        self.realized_pnl += realized;
        if self.quantity.is_zero() {
            self.cost_basis = Decimal::ZERO;
        }
        self.updated_at = Utc::now();
        realized
    }

    /// Mark-to-market PnL at a given price.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        self.quantity * current_price - self.cost_basis
    }

    pub fn is_empty(&self) -> bool {
        self.quantity.is_zero()
    }
}

/// Compact view of a position returned in trade receipts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSummary {
    pub market_id: Uuid,
    pub outcome: OutcomeSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub cost_basis: Decimal,
    pub realized_pnl: Decimal,
}

impl From<&Position> for PositionSummary {
    fn from(p: &Position) -> Self {
        Self {
            market_id: p.market_id,
            outcome: p.outcome,
            quantity: p.quantity,
            entry_price: p.entry_price,
            cost_basis: p.cost_basis,
            realized_pnl: p.realized_pnl,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_position() -> Position {
        Position::open(
            Uuid::new_v4(),
            Uuid::new_v4(),
            OutcomeSide::Yes,
            Decimal::new(100, 0),
            Decimal::new(50, 0), // 100 shares @ 0.50
        )
    }

    #[test]
    fn test_open_sets_entry_price() {
        let p = base_position();
        assert_eq!(p.entry_price, Decimal::new(5, 1));
        assert_eq!(p.cost_basis, Decimal::new(50, 0));
    }

    #[test]
    fn test_apply_buy_weighted_average() {
        let mut p = base_position();
        // 100 more shares at 0.70
        p.apply_buy(Decimal::new(100, 0), Decimal::new(70, 0));
        assert_eq!(p.quantity, Decimal::new(200, 0));
        assert_eq!(p.cost_basis, Decimal::new(120, 0));
        assert_eq!(p.entry_price, Decimal::new(6, 1)); // 0.60
    }

    #[test]
    fn test_apply_sell_proportional_cost_basis() {
        let mut p = base_position();
        // Sell half for 40 USDC; half the cost basis (25) is removed.
        let realized = p.apply_sell(Decimal::new(50, 0), Decimal::new(40, 0));
        assert_eq!(realized, Decimal::new(15, 0));
        assert_eq!(p.quantity, Decimal::new(50, 0));
        assert_eq!(p.cost_basis, Decimal::new(25, 0));
        assert_eq!(p.realized_pnl, Decimal::new(15, 0));
        assert_eq!(p.sold_quantity, Decimal::new(50, 0));
    }

    #[test]
    fn test_full_sell_zeroes_position() {
        let mut p = base_position();
        let realized = p.apply_sell(Decimal::new(100, 0), Decimal::new(60, 0));
        assert_eq!(realized, Decimal::new(10, 0));
        assert!(p.is_empty());
        assert_eq!(p.cost_basis, Decimal::ZERO);
    }

    #[test]
    fn test_unrealized_pnl() {
        let p = base_position();
        assert_eq!(
            p.unrealized_pnl(Decimal::new(8, 1)),
            Decimal::new(30, 0) // 100 * 0.8 - 50
        );
    }
}
