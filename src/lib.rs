//! Stakeline: prediction-market settlement backend over an external
//! smart-contract ledger.
//!
//! This is the root crate tying the workspace together for integration
//! tests. For actual functionality, use the individual crates directly:
//!
//! - `ledger-core`: core types, config, database repositories, the ledger
//!   RPC gateway, and envelope signing/verification
//! - `tx-pipeline`: transaction reliability layer (confirmation polling,
//!   retry budgets, dead-letter quarantine, alerting)
//! - `market-engine`: trade orchestration, market lifecycle and settlement,
//!   realtime odds broadcasting
//! - `odds-monitor`: daemon binary driving the broadcaster

pub use ledger_core as core;
pub use market_engine as engine;
pub use tx_pipeline as pipeline;
