//! Realtime odds change detection and broadcast.
//!
//! One shared timer polls the AMM pool for every market with at least one
//! subscriber and publishes a change event when the odds moved by more than
//! the configured threshold relative to the last published value. The first
//! observation of a market only records the baseline.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use ledger_core::config::BroadcastConfig;
use ledger_core::types::OddsQuote;
use ledger_core::Result;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Upper bound on markets polled at once within a cycle.
const POLL_CONCURRENCY: usize = 8;

/// Which side of the book moved up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OddsDirection {
    Yes,
    No,
}

/// A published odds change.
#[derive(Debug, Clone)]
pub struct OddsUpdate {
    pub market_id: Uuid,
    pub quote: OddsQuote,
    pub direction: OddsDirection,
}

/// Quote provider seam, implemented by the trade orchestrator and mocked in
/// tests.
#[async_trait]
pub trait OddsSource: Send + Sync {
    async fn quote(&self, market_id: Uuid) -> Result<OddsQuote>;
}

#[async_trait]
impl OddsSource for crate::orchestrator::TradeService {
    async fn quote(&self, market_id: Uuid) -> Result<OddsQuote> {
        self.get_odds(market_id).await
    }
}

/// Polls odds for subscribed markets on a single shared timer and fans
/// change events out over a broadcast channel.
pub struct OddsBroadcaster {
    source: Arc<dyn OddsSource>,
    config: BroadcastConfig,
    /// Subscriber ids per market; a market is polled while non-empty.
    subscribers: DashMap<Uuid, HashSet<String>>,
    /// Last *published* quote per market, not last observed.
    baselines: DashMap<Uuid, OddsQuote>,
    events: broadcast::Sender<OddsUpdate>,
    /// Suppresses overlapping poll cycles when the ledger is slow.
    in_flight: AtomicBool,
}

impl OddsBroadcaster {
    pub fn new(source: Arc<dyn OddsSource>, config: BroadcastConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            source,
            config,
            subscribers: DashMap::new(),
            baselines: DashMap::new(),
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Register interest in a market and get the event stream.
    pub fn subscribe(&self, market_id: Uuid, subscriber_id: &str) -> broadcast::Receiver<OddsUpdate> {
        self.subscribers
            .entry(market_id)
            .or_default()
            .insert(subscriber_id.to_string());
        debug!(market_id = %market_id, subscriber = %subscriber_id, "odds subscription added");
        self.events.subscribe()
    }

    /// Event stream without registering any market interest.
    pub fn events(&self) -> broadcast::Receiver<OddsUpdate> {
        self.events.subscribe()
    }

    /// Drop a subscription. Removing the last subscriber evicts the baseline
    /// so a later re-subscribe starts fresh.
    pub fn unsubscribe(&self, market_id: Uuid, subscriber_id: &str) {
        let mut empty = false;
        if let Some(mut entry) = self.subscribers.get_mut(&market_id) {
            entry.remove(subscriber_id);
            empty = entry.is_empty();
        }
        if empty {
            self.subscribers.remove(&market_id);
            self.baselines.remove(&market_id);
            debug!(market_id = %market_id, "last subscriber left, baseline evicted");
        }
    }

    pub fn subscriber_count(&self, market_id: Uuid) -> usize {
        self.subscribers
            .get(&market_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }

    /// Drive the shared poll timer until the task is aborted.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.poll_interval_secs,
            threshold = %self.config.change_threshold,
            "odds broadcaster started"
        );

        loop {
            ticker.tick().await;
            if self.in_flight.swap(true, Ordering::AcqRel) {
                debug!("previous odds poll still running, skipping tick");
                continue;
            }
            self.poll_cycle().await;
            self.in_flight.store(false, Ordering::Release);
        }
    }

    /// One poll pass over every subscribed market, fanned out so one slow
    /// pool read does not serialize the cycle. Public so tests and tooling
    /// can drive cycles without the timer.
    pub async fn poll_cycle(&self) {
        let market_ids: Vec<Uuid> = self.subscribers.iter().map(|e| *e.key()).collect();
        stream::iter(market_ids)
            .for_each_concurrent(POLL_CONCURRENCY, |market_id| async move {
                if let Err(e) = self.poll_market(market_id).await {
                    warn!(market_id = %market_id, error = %e, "odds poll failed");
                }
            })
            .await;
    }

    async fn poll_market(&self, market_id: Uuid) -> Result<()> {
        let quote = self.source.quote(market_id).await?;

        let direction = match self.baselines.get(&market_id) {
            None => {
                self.baselines.insert(market_id, quote);
                return Ok(());
            }
            Some(baseline) => significant_change(&baseline, &quote, self.config.change_threshold),
        };

        if let Some(direction) = direction {
            info!(
                market_id = %market_id,
                yes_pct = quote.yes_percentage,
                direction = ?direction,
                "odds change broadcast"
            );
            // Send failures just mean no receiver is currently listening.
            let _ = self.events.send(OddsUpdate {
                market_id,
                quote: quote.clone(),
                direction,
            });
            self.baselines.insert(market_id, quote);
        }
        Ok(())
    }
}

/// Compare a quote against the last published baseline. Returns the move
/// direction when the larger relative change of the two sides strictly
/// exceeds `threshold`.
fn significant_change(
    baseline: &OddsQuote,
    next: &OddsQuote,
    threshold: Decimal,
) -> Option<OddsDirection> {
    let yes = relative_change(baseline.yes_odds, next.yes_odds);
    let no = relative_change(baseline.no_odds, next.no_odds);
    if yes.max(no) > threshold {
        Some(if next.yes_odds >= baseline.yes_odds {
            OddsDirection::Yes
        } else {
            OddsDirection::No
        })
    } else {
        None
    }
}

fn relative_change(baseline: Decimal, next: Decimal) -> Decimal {
    if baseline.is_zero() {
        if next.is_zero() {
            Decimal::ZERO
        } else {
            Decimal::ONE
        }
    } else {
        ((next - baseline) / baseline).abs()
    }
}
