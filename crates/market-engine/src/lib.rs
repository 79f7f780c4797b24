//! Market Engine
//!
//! Trade orchestration against the ledger AMM, market lifecycle with
//! settlement fan-out, and realtime odds broadcasting.

pub mod broadcaster;
pub mod lifecycle;
pub mod orchestrator;

pub use broadcaster::{OddsBroadcaster, OddsDirection, OddsSource, OddsUpdate};
pub use lifecycle::{CreateMarketRequest, MarketService};
pub use orchestrator::{BuyRequest, PreparedTrade, SellRequest, TradeReceipt, TradeService};
