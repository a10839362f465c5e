//! Ledger persistence as seen by the service: Postgres in production, the
//! engine's own file-backed store for local runs and tests.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use minechain::{Block, CommitOutcome, EventRecord, Ledger, LedgerStore, MiningEvent};
use tokio::sync::RwLock;

#[async_trait]
pub trait LedgerBackend: Send + Sync {
    async fn insert_event(&self, event: MiningEvent) -> Result<()>;

    /// Oldest uncommitted events first
    async fn pending_events(&self, limit: usize) -> Result<Vec<MiningEvent>>;

    async fn mempool_size(&self) -> Result<u64>;

    async fn latest_block(&self) -> Result<Option<Block>>;

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>>;

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>>;

    /// Newest first
    async fn list_blocks(&self, limit: usize, offset: usize) -> Result<Vec<Block>>;

    /// Genesis first
    async fn chain(&self) -> Result<Vec<Block>>;

    async fn event(&self, id: &str) -> Result<Option<EventRecord>>;

    /// Events of one block in leaf order
    async fn events_in_block(&self, height: u64) -> Result<Vec<EventRecord>>;

    /// Atomically append the block and mark its events. Fails with
    /// `LedgerError::ChainConflict` if the tip moved since the batch was read.
    async fn apply_commit(&self, outcome: &CommitOutcome) -> Result<()>;
}

pub async fn with_ledger_blocking<S, R, F>(
    ledger: Arc<RwLock<Ledger<S>>>,
    f: F,
) -> Result<R, tokio::task::JoinError>
where
    S: LedgerStore + 'static,
    R: Send + 'static,
    F: FnOnce(&mut Ledger<S>) -> R + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = ledger.blocking_write();
        f(&mut guard)
    })
    .await
}

/// Backend over an in-process [`Ledger`]
pub struct LocalBackend<S: LedgerStore> {
    ledger: Arc<RwLock<Ledger<S>>>,
}

impl<S: LedgerStore + 'static> LocalBackend<S> {
    pub fn new(ledger: Ledger<S>) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
        }
    }
}

#[async_trait]
impl<S: LedgerStore + 'static> LedgerBackend for LocalBackend<S> {
    async fn insert_event(&self, event: MiningEvent) -> Result<()> {
        with_ledger_blocking(self.ledger.clone(), move |l| l.record_event(event)).await??;
        Ok(())
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<MiningEvent>> {
        Ok(self.ledger.read().await.store().pending_events(limit)?)
    }

    async fn mempool_size(&self) -> Result<u64> {
        Ok(self.ledger.read().await.mempool_size()? as u64)
    }

    async fn latest_block(&self) -> Result<Option<Block>> {
        Ok(self.ledger.read().await.latest_block().cloned())
    }

    async fn block_by_height(&self, height: u64) -> Result<Option<Block>> {
        Ok(self.ledger.read().await.block_by_height(height).cloned())
    }

    async fn block_by_hash(&self, hash: &str) -> Result<Option<Block>> {
        Ok(self.ledger.read().await.block_by_hash(hash).cloned())
    }

    async fn list_blocks(&self, limit: usize, offset: usize) -> Result<Vec<Block>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.blocks().iter().rev().skip(offset).take(limit).cloned().collect())
    }

    async fn chain(&self) -> Result<Vec<Block>> {
        Ok(self.ledger.read().await.blocks().to_vec())
    }

    async fn event(&self, id: &str) -> Result<Option<EventRecord>> {
        Ok(self.ledger.read().await.store().event(id)?)
    }

    async fn events_in_block(&self, height: u64) -> Result<Vec<EventRecord>> {
        Ok(self.ledger.read().await.store().events_in_block(height)?)
    }

    async fn apply_commit(&self, outcome: &CommitOutcome) -> Result<()> {
        let outcome = outcome.clone();
        with_ledger_blocking(self.ledger.clone(), move |l| l.apply_commit(&outcome)).await??;
        Ok(())
    }
}
