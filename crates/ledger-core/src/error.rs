//! Error types for the Stakeline settlement backend.

use crate::types::MarketStatus;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Market is not open for trading (status: {status})")]
    MarketNotOpen { status: MarketStatus },

    #[error("Invalid market transition: {from} -> {to}")]
    InvalidTransition { from: MarketStatus, to: MarketStatus },

    #[error("Liquidity pool already exists for market {market_id}")]
    DuplicatePool { market_id: String },

    #[error("Cannot cancel a resolved market")]
    CannotCancelResolved,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Decimal, required: Decimal },

    #[error("Insufficient shares: held {held}, requested {requested}")]
    InsufficientShares { held: Decimal, requested: Decimal },

    #[error("Slippage exceeded: received {received}, minimum {minimum}")]
    SlippageExceeded { received: Decimal, minimum: Decimal },

    #[error("Malformed transaction envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Envelope signature does not match the expected signer")]
    InvalidSignature,

    #[error("Ledger rejected transaction {hash}: {reason}")]
    LedgerRejected { hash: String, reason: String },

    #[error("Transaction {hash} not confirmed after {attempts} polls")]
    ConfirmationTimeout { hash: String, attempts: u32 },

    #[error("Network retry budget exhausted after {attempts} attempts: {last_error}")]
    NetworkExhausted { attempts: u32, last_error: String },

    #[error("Ledger RPC error: {message}")]
    Rpc { message: String },
}

impl Error {
    /// True for errors that must be surfaced as a single opaque blockchain
    /// failure: the operation did not (durably) happen and no local-store
    /// side effects may be applied.
    pub fn is_ledger_failure(&self) -> bool {
        matches!(
            self,
            Error::LedgerRejected { .. }
                | Error::ConfirmationTimeout { .. }
                | Error::NetworkExhausted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_failures_are_terminal() {
        assert!(Error::LedgerRejected {
            hash: "abc".to_string(),
            reason: "no".to_string(),
        }
        .is_ledger_failure());
        assert!(Error::ConfirmationTimeout {
            hash: "abc".to_string(),
            attempts: 4,
        }
        .is_ledger_failure());
        assert!(Error::NetworkExhausted {
            attempts: 3,
            last_error: "unreachable".to_string(),
        }
        .is_ledger_failure());
        assert!(!Error::InvalidSignature.is_ledger_failure());
        assert!(!Error::Validation("bad".to_string()).is_ledger_failure());
    }
}
