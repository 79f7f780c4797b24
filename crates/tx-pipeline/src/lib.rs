//! Transaction Reliability Layer
//!
//! Drives ledger submissions to finality: confirmation polling with
//! exponential backoff, a separate network-error retry budget, and
//! quarantine of permanent failures into a dead-letter queue with alerting.

pub mod alerts;
pub mod dlq;
pub mod pipeline;

pub use alerts::{Alert, AlertSink, LogAlertSink, WebhookAlertSink};
pub use dlq::{DeadLetterSink, MemoryDeadLetterSink, PgDeadLetterSink};
pub use pipeline::{ConfirmedTx, OperationContext, TransactionPipeline};
