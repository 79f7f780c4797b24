//! Dead-letter quarantine sinks.

use async_trait::async_trait;
use ledger_core::db::dead_letters::DeadLetterRepository;
use ledger_core::types::DeadLetter;
use ledger_core::Result;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

/// Storage seam for dead letters. Recording must be idempotent per
/// transaction hash.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn record(&self, letter: &DeadLetter) -> Result<()>;
}

/// Durable sink backed by the `ledger_dead_letters` table.
pub struct PgDeadLetterSink {
    repository: DeadLetterRepository,
}

impl PgDeadLetterSink {
    pub fn new(pool: PgPool) -> Self {
        Self {
            repository: DeadLetterRepository::new(pool),
        }
    }
}

#[async_trait]
impl DeadLetterSink for PgDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) -> Result<()> {
        self.repository.upsert(letter).await
    }
}

/// In-memory sink for tests and DB-less tooling. Upserts by hash like the
/// durable sink.
#[derive(Default)]
pub struct MemoryDeadLetterSink {
    letters: Mutex<HashMap<String, DeadLetter>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn record(&self, letter: &DeadLetter) -> Result<()> {
        self.letters
            .lock()
            .unwrap()
            .insert(letter.tx_hash.clone(), letter.clone());
        Ok(())
    }
}
