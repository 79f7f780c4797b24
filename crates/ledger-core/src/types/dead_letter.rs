//! Dead-letter queue records for permanently failed ledger operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterStatus {
    /// Awaiting manual triage.
    Pending,
    /// Operator marked the failure handled.
    Resolved,
}

impl DeadLetterStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            DeadLetterStatus::Pending => 0,
            DeadLetterStatus::Resolved => 1,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        if value == 1 {
            DeadLetterStatus::Resolved
        } else {
            DeadLetterStatus::Pending
        }
    }
}

/// One permanently failed or timed-out ledger operation, keyed by transaction
/// hash. Repeated failures of the same hash upsert rather than duplicate.
/// The DLQ is a manual retry/triage surface, not an automatic retry queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub tx_hash: String,
    pub service_name: String,
    pub function_name: String,
    pub params: serde_json::Value,
    pub error: String,
    pub status: DeadLetterStatus,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(
        tx_hash: impl Into<String>,
        service_name: impl Into<String>,
        function_name: impl Into<String>,
        params: serde_json::Value,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            service_name: service_name.into(),
            function_name: function_name.into(),
            params,
            error: error.into(),
            status: DeadLetterStatus::Pending,
            updated_at: Utc::now(),
        }
    }
}
