//! Odds Monitor
//!
//! Daemon that keeps the odds broadcaster subscribed to every OPEN market
//! and logs the change events it publishes.

use anyhow::Result;
use ledger_core::api::SorobanGateway;
use ledger_core::config::Config;
use ledger_core::db;
use ledger_core::db::markets::MarketRepository;
use ledger_core::types::MarketStatus;
use market_engine::{OddsBroadcaster, TradeService};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tx_pipeline::{PgDeadLetterSink, TransactionPipeline, WebhookAlertSink};
use uuid::Uuid;

const HEALTH_FILE: &str = "/tmp/healthy";
const SUBSCRIBER_ID: &str = "odds-monitor";

/// How often the set of OPEN markets is re-read from the database.
const REFRESH_INTERVAL_SECS: u64 = 30;

fn touch_health_file() {
    let _ = std::fs::write(HEALTH_FILE, format!("{}", chrono::Utc::now().timestamp()));
}

#[tokio::main]
async fn main() -> Result<()> {
    // Filter out noisy crates by default
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "odds_monitor=info,market_engine=info,ledger_core=warn,hyper=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Odds Monitor");
    touch_health_file();

    let config = Config::from_env()?;
    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let gateway = Arc::new(SorobanGateway::new(&config.ledger));
    let pipeline = Arc::new(TransactionPipeline::new(
        gateway.clone(),
        Arc::new(PgDeadLetterSink::new(pool.clone())),
        Arc::new(WebhookAlertSink::new(&config.alerts)),
        config.reliability.clone(),
        &config.ledger.network_passphrase,
    ));
    let trades = Arc::new(TradeService::new(
        gateway,
        pipeline,
        pool.clone(),
        &config,
    )?);

    let broadcaster = Arc::new(OddsBroadcaster::new(trades, config.broadcast.clone()));
    let markets = MarketRepository::new(pool);

    let poller = tokio::spawn(broadcaster.clone().run());
    let mut events = broadcaster.events();

    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(update) => info!(
                    market_id = %update.market_id,
                    yes_pct = update.quote.yes_percentage,
                    no_pct = update.quote.no_percentage,
                    direction = ?update.direction,
                    "odds changed"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "odds event logger lagged")
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let refresher = {
        let broadcaster = broadcaster.clone();
        tokio::spawn(async move {
            let mut subscribed: HashSet<Uuid> = HashSet::new();
            let mut ticker = tokio::time::interval(Duration::from_secs(REFRESH_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                touch_health_file();
                match markets.list_by_status(MarketStatus::Open).await {
                    Ok(open) => {
                        let current: HashSet<Uuid> = open.iter().map(|m| m.id).collect();
                        for id in current.difference(&subscribed) {
                            broadcaster.subscribe(*id, SUBSCRIBER_ID);
                            info!(market_id = %id, "tracking open market");
                        }
                        for id in subscribed.difference(&current) {
                            broadcaster.unsubscribe(*id, SUBSCRIBER_ID);
                            info!(market_id = %id, "market no longer open, untracked");
                        }
                        subscribed = current;
                    }
                    Err(e) => warn!(error = %e, "failed to refresh open markets"),
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    poller.abort();
    logger.abort();
    refresher.abort();

    Ok(())
}
