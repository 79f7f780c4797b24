//! Typed builders for the contract surface the backend consumes.

use crate::types::OutcomeSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One invocation of a contract function, with JSON-encoded arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract_id: String,
    pub function: String,
    pub args: Vec<serde_json::Value>,
}

impl ContractCall {
    pub fn new(contract_id: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            contract_id: contract_id.into(),
            function: function.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, value: serde_json::Value) -> Self {
        self.args.push(value);
        self
    }

    pub fn get_pool(amm_contract: &str, market_ledger_id: &str) -> Self {
        Self::new(amm_contract, "get_pool").arg(json!(market_ledger_id))
    }

    pub fn buy_shares(
        amm_contract: &str,
        buyer: &str,
        market_ledger_id: &str,
        outcome: OutcomeSide,
        amount: Decimal,
        min_shares: Decimal,
    ) -> Self {
        Self::new(amm_contract, "buy_shares")
            .arg(json!(buyer))
            .arg(json!(market_ledger_id))
            .arg(json!(outcome.index()))
            .arg(json!(amount.to_string()))
            .arg(json!(min_shares.to_string()))
    }

    pub fn sell_shares(
        amm_contract: &str,
        seller: &str,
        market_ledger_id: &str,
        outcome: OutcomeSide,
        shares: Decimal,
        min_payout: Decimal,
    ) -> Self {
        Self::new(amm_contract, "sell_shares")
            .arg(json!(seller))
            .arg(json!(market_ledger_id))
            .arg(json!(outcome.index()))
            .arg(json!(shares.to_string()))
            .arg(json!(min_payout.to_string()))
    }

    pub fn create_pool(amm_contract: &str, market_ledger_id: &str, initial_liquidity: Decimal) -> Self {
        Self::new(amm_contract, "create_pool")
            .arg(json!(market_ledger_id))
            .arg(json!(initial_liquidity.to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_market(
        market_contract: &str,
        creator: &str,
        title: &str,
        description: &str,
        category: &str,
        closing_at: DateTime<Utc>,
        resolution_at: DateTime<Utc>,
    ) -> Self {
        Self::new(market_contract, "create_market")
            .arg(json!(creator))
            .arg(json!(title))
            .arg(json!(description))
            .arg(json!(category))
            .arg(json!(closing_at.timestamp()))
            .arg(json!(resolution_at.timestamp()))
    }

    pub fn close_market(market_contract: &str, market_ledger_id: &str) -> Self {
        Self::new(market_contract, "close_market").arg(json!(market_ledger_id))
    }

    pub fn resolve_market(market_contract: &str, market_ledger_id: &str) -> Self {
        Self::new(market_contract, "resolve_market").arg(json!(market_ledger_id))
    }

    pub fn claim_winnings(market_contract: &str, user: &str, market_ledger_id: &str) -> Self {
        Self::new(market_contract, "claim_winnings")
            .arg(json!(user))
            .arg(json!(market_ledger_id))
    }

    pub fn submit_attestation(
        oracle_contract: &str,
        market_ledger_id: &str,
        outcome: OutcomeSide,
    ) -> Self {
        Self::new(oracle_contract, "submit_attestation")
            .arg(json!(market_ledger_id))
            .arg(json!(outcome.index()))
    }

    pub fn check_consensus(oracle_contract: &str, market_ledger_id: &str) -> Self {
        Self::new(oracle_contract, "check_consensus").arg(json!(market_ledger_id))
    }

    pub fn get_balances(market_contract: &str, account: &str) -> Self {
        Self::new(market_contract, "get_balances").arg(json!(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buy_shares_carries_min_shares() {
        let call = ContractCall::buy_shares(
            "CAMM",
            "aabb",
            "m1",
            OutcomeSide::Yes,
            Decimal::new(100, 0),
            Decimal::new(95, 0),
        );
        assert_eq!(call.function, "buy_shares");
        assert_eq!(call.args.len(), 5);
        // The slippage bound travels in the call itself so the ledger
        // enforces it atomically.
        assert_eq!(call.args[4], serde_json::json!("95"));
    }

    #[test]
    fn test_outcome_encoded_as_index() {
        let call = ContractCall::submit_attestation("CORC", "m1", OutcomeSide::No);
        assert_eq!(call.args[1], serde_json::json!(0));
    }
}
