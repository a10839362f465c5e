//! Storage trait and implementations

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    Block, CommitOutcome, Commitment, EventRecord, Inclusion, LedgerError, MiningEvent, Result,
    GENESIS_PREVIOUS_HASH,
};

/// Persistence collaborator for events, blocks and commitments.
///
/// `apply_commit` must be all-or-nothing: it either records the block, the
/// commitment and every event's inclusion, or changes nothing.
pub trait LedgerStore: Send + Sync {
    fn insert_event(&mut self, event: MiningEvent) -> Result<()>;

    /// Oldest uncommitted events first
    fn pending_events(&self, limit: usize) -> Result<Vec<MiningEvent>>;

    fn pending_count(&self) -> Result<usize>;

    fn event(&self, id: &str) -> Result<Option<EventRecord>>;

    /// Events of one block, in leaf order
    fn events_in_block(&self, height: u64) -> Result<Vec<EventRecord>>;

    /// Every block, genesis first
    fn blocks(&self) -> Result<Vec<Block>>;

    fn commitments(&self) -> Result<Vec<Commitment>>;

    fn apply_commit(&mut self, outcome: &CommitOutcome) -> Result<()>;
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct LedgerSnapshot {
    events: Vec<EventRecord>,
    blocks: Vec<Block>,
    commitments: Vec<Commitment>,
}

/// In-memory storage (for testing and demos)
#[derive(Clone, Debug, Default)]
pub struct InMemoryStorage {
    state: LedgerSnapshot,
    index: HashMap<String, usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn from_snapshot(state: LedgerSnapshot) -> Self {
        let index = state
            .events
            .iter()
            .enumerate()
            .map(|(i, r)| (r.event.id.clone(), i))
            .collect();
        Self { state, index }
    }

    /// Reject the commit unless it extends the current tip with events that
    /// are all still pending.
    fn check_commit(&self, outcome: &CommitOutcome) -> Result<Vec<usize>> {
        let tip = self.state.blocks.last();
        let expected_height = tip.map_or(0, |b| b.block_height + 1);
        let expected_prev = tip.map_or(GENESIS_PREVIOUS_HASH, |b| b.block_hash.as_str());

        let conflict = || LedgerError::ChainConflict {
            expected_height,
            attempted_height: outcome.block.block_height,
        };

        if outcome.block.block_height != expected_height || outcome.block.previous_hash != expected_prev {
            return Err(conflict());
        }

        let mut positions = Vec::with_capacity(outcome.events.len());
        let mut seen = HashSet::with_capacity(outcome.events.len());
        for proven in &outcome.events {
            let pos = *self
                .index
                .get(&proven.event.id)
                .ok_or_else(|| LedgerError::Storage(format!("unknown event {}", proven.event.id)))?;
            if !self.state.events[pos].is_pending() || !seen.insert(pos) {
                return Err(conflict());
            }
            positions.push(pos);
        }
        Ok(positions)
    }
}

impl LedgerStore for InMemoryStorage {
    fn insert_event(&mut self, event: MiningEvent) -> Result<()> {
        if self.index.contains_key(&event.id) {
            return Err(LedgerError::DuplicateEvent(event.id));
        }
        self.index.insert(event.id.clone(), self.state.events.len());
        self.state.events.push(EventRecord::pending(event));
        Ok(())
    }

    fn pending_events(&self, limit: usize) -> Result<Vec<MiningEvent>> {
        Ok(self
            .state
            .events
            .iter()
            .filter(|r| r.is_pending())
            .take(limit)
            .map(|r| r.event.clone())
            .collect())
    }

    fn pending_count(&self) -> Result<usize> {
        Ok(self.state.events.iter().filter(|r| r.is_pending()).count())
    }

    fn event(&self, id: &str) -> Result<Option<EventRecord>> {
        Ok(self.index.get(id).map(|&i| self.state.events[i].clone()))
    }

    fn events_in_block(&self, height: u64) -> Result<Vec<EventRecord>> {
        let mut records: Vec<EventRecord> = self
            .state
            .events
            .iter()
            .filter(|r| r.inclusion.as_ref().is_some_and(|inc| inc.block_height == height))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.inclusion.as_ref().map(|inc| inc.proof.leaf_index));
        Ok(records)
    }

    fn blocks(&self) -> Result<Vec<Block>> {
        Ok(self.state.blocks.clone())
    }

    fn commitments(&self) -> Result<Vec<Commitment>> {
        Ok(self.state.commitments.clone())
    }

    fn apply_commit(&mut self, outcome: &CommitOutcome) -> Result<()> {
        let positions = self.check_commit(outcome)?;

        for (pos, proven) in positions.into_iter().zip(&outcome.events) {
            self.state.events[pos].inclusion = Some(Inclusion {
                block_height: outcome.block.block_height,
                proof: proven.proof.clone(),
            });
        }
        self.state.blocks.push(outcome.block.clone());
        self.state.commitments.push(outcome.commitment.clone());
        Ok(())
    }
}

/// JSON-snapshot storage. The whole ledger is rewritten after every mutation
/// through a temp file + rename, so a crash leaves either the old or the new
/// snapshot on disk.
#[derive(Debug)]
pub struct FileBackedStorage {
    path: PathBuf,
    inner: InMemoryStorage,
}

impl FileBackedStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = std::fs::read(&path).map_err(|e| LedgerError::Storage(e.to_string()))?;
            serde_json::from_slice(&bytes).map_err(|e| LedgerError::Serialization(e.to_string()))?
        } else {
            LedgerSnapshot::default()
        };
        Ok(Self {
            path,
            inner: InMemoryStorage::from_snapshot(state),
        })
    }

    fn flush(&self) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.inner.state)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(|e| LedgerError::Storage(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| LedgerError::Storage(e.to_string()))
    }
}

impl LedgerStore for FileBackedStorage {
    fn insert_event(&mut self, event: MiningEvent) -> Result<()> {
        let id = event.id.clone();
        self.inner.insert_event(event)?;
        if let Err(e) = self.flush() {
            self.inner.index.remove(&id);
            self.inner.state.events.pop();
            return Err(e);
        }
        Ok(())
    }

    fn pending_events(&self, limit: usize) -> Result<Vec<MiningEvent>> {
        self.inner.pending_events(limit)
    }

    fn pending_count(&self) -> Result<usize> {
        self.inner.pending_count()
    }

    fn event(&self, id: &str) -> Result<Option<EventRecord>> {
        self.inner.event(id)
    }

    fn events_in_block(&self, height: u64) -> Result<Vec<EventRecord>> {
        self.inner.events_in_block(height)
    }

    fn blocks(&self) -> Result<Vec<Block>> {
        self.inner.blocks()
    }

    fn commitments(&self) -> Result<Vec<Commitment>> {
        self.inner.commitments()
    }

    fn apply_commit(&mut self, outcome: &CommitOutcome) -> Result<()> {
        // validate against a copy so a failed flush leaves memory untouched
        let mut next = self.inner.clone();
        next.apply_commit(outcome)?;
        let prev = std::mem::replace(&mut self.inner, next);
        if let Err(e) = self.flush() {
            self.inner = prev;
            return Err(e);
        }
        Ok(())
    }
}
