//! Configuration management for the Stakeline settlement backend.

use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub reliability: ReliabilityConfig,
    pub trading: TradingConfig,
    pub alerts: AlertsConfig,
    pub broadcast: BroadcastConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Connection details for the external ledger RPC endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub rpc_url: String,
    /// Network passphrase mixed into canonical transaction hashes.
    pub network_passphrase: String,
    /// Contract addresses for the deployed market/AMM/oracle contracts.
    pub market_contract: String,
    pub amm_contract: String,
    pub oracle_contract: String,
    /// Hex-encoded ed25519 key for the platform admin account. Only needed
    /// in custodial deployments; the backend never holds user keys.
    pub admin_secret_key: Option<String>,
}

/// Retry and confirmation budgets for the transaction pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct ReliabilityConfig {
    /// Maximum confirmation polls before declaring a timeout.
    pub max_poll_attempts: u32,
    /// Initial confirmation backoff in milliseconds; doubles per NOT_FOUND.
    pub poll_base_delay_ms: u64,
    /// Confirmation backoff cap in milliseconds.
    pub poll_max_delay_ms: u64,
    /// Separate budget for network-level failures (RPC unreachable).
    pub network_retry_budget: u32,
    /// Fixed delay between network retries in milliseconds.
    pub network_retry_delay_ms: u64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: 12,
            poll_base_delay_ms: 1_000,
            poll_max_delay_ms: 8_000,
            network_retry_budget: 3,
            network_retry_delay_ms: 500,
        }
    }
}

/// Trading policy knobs. The defaults are product policy, not invariants.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Custody model for ledger submissions.
    pub execution_mode: ExecutionMode,
    /// Default minimum fill as a fraction of the requested amount when the
    /// caller omits an explicit slippage bound.
    pub default_min_fill: Decimal,
    /// Hours after closing time used when a market's resolution time is omitted.
    pub resolution_fallback_hours: i64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Custodial,
            default_min_fill: Decimal::new(95, 2), // 95%
            resolution_fallback_hours: 24,
        }
    }
}

/// Who signs fund-moving ledger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// The platform admin key signs operations on behalf of users.
    Custodial,
    /// Users sign their own envelopes; the backend only verifies and relays.
    NonCustodial,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AlertsConfig {
    pub webhook_url: Option<String>,
}

/// Odds broadcaster tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    pub poll_interval_secs: u64,
    /// Minimum relative odds change (fraction) that triggers a broadcast.
    pub change_threshold: Decimal,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            change_threshold: Decimal::new(1, 2), // 1%
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let execution_mode = match env::var("EXECUTION_MODE").as_deref() {
            Ok("non_custodial") => ExecutionMode::NonCustodial,
            Ok("custodial") | Err(_) => ExecutionMode::Custodial,
            Ok(other) => {
                return Err(Error::Config {
                    message: format!("Unknown EXECUTION_MODE: {}", other),
                })
            }
        };

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| Error::Config {
                    message: "DATABASE_URL environment variable not set".to_string(),
                })?,
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(5),
            },
            ledger: LedgerConfig {
                rpc_url: env::var("LEDGER_RPC_URL").map_err(|_| Error::Config {
                    message: "LEDGER_RPC_URL environment variable not set".to_string(),
                })?,
                network_passphrase: env::var("LEDGER_NETWORK_PASSPHRASE")
                    .unwrap_or_else(|_| "Stakeline Test Network".to_string()),
                market_contract: env::var("MARKET_CONTRACT_ID").unwrap_or_default(),
                amm_contract: env::var("AMM_CONTRACT_ID").unwrap_or_default(),
                oracle_contract: env::var("ORACLE_CONTRACT_ID").unwrap_or_default(),
                admin_secret_key: env::var("ADMIN_SECRET_KEY").ok(),
            },
            reliability: ReliabilityConfig {
                max_poll_attempts: env_parse("TX_MAX_POLL_ATTEMPTS").unwrap_or(12),
                poll_base_delay_ms: env_parse("TX_POLL_BASE_DELAY_MS").unwrap_or(1_000),
                poll_max_delay_ms: env_parse("TX_POLL_MAX_DELAY_MS").unwrap_or(8_000),
                network_retry_budget: env_parse("TX_NETWORK_RETRY_BUDGET").unwrap_or(3),
                network_retry_delay_ms: env_parse("TX_NETWORK_RETRY_DELAY_MS").unwrap_or(500),
            },
            trading: TradingConfig {
                execution_mode,
                default_min_fill: env_parse("TRADE_DEFAULT_MIN_FILL")
                    .unwrap_or_else(|| Decimal::new(95, 2)),
                resolution_fallback_hours: env_parse("MARKET_RESOLUTION_FALLBACK_HOURS")
                    .unwrap_or(24),
            },
            alerts: AlertsConfig {
                webhook_url: env::var("ALERT_WEBHOOK_URL").ok(),
            },
            broadcast: BroadcastConfig {
                poll_interval_secs: env_parse("ODDS_POLL_INTERVAL_SECS").unwrap_or(5),
                change_threshold: env_parse("ODDS_CHANGE_THRESHOLD")
                    .unwrap_or_else(|| Decimal::new(1, 2)),
            },
        })
    }

    /// Load configuration for testing (with defaults).
    pub fn test_config() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgres://localhost/stakeline_test".to_string(),
                max_connections: 2,
            },
            ledger: LedgerConfig {
                rpc_url: "http://localhost:8000/rpc".to_string(),
                network_passphrase: "Stakeline Test Network".to_string(),
                market_contract: "CMKT".to_string(),
                amm_contract: "CAMM".to_string(),
                oracle_contract: "CORC".to_string(),
                admin_secret_key: None,
            },
            reliability: ReliabilityConfig::default(),
            trading: TradingConfig::default(),
            alerts: AlertsConfig::default(),
            broadcast: BroadcastConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reliability_defaults() {
        let config = ReliabilityConfig::default();
        assert_eq!(config.max_poll_attempts, 12);
        assert_eq!(config.network_retry_budget, 3);
        assert!(config.poll_max_delay_ms >= config.poll_base_delay_ms);
    }

    #[test]
    fn test_trading_defaults_are_policy_not_invariants() {
        let config = TradingConfig::default();
        assert_eq!(config.default_min_fill, Decimal::new(95, 2));
        assert_eq!(config.resolution_fallback_hours, 24);
        assert_eq!(config.execution_mode, ExecutionMode::Custodial);
    }
}
