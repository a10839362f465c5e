//! Merkle-chain commitment engine
//!
//! Mining events are batched into a positional Merkle tree, every event gets
//! an inclusion proof, and the batch root is sealed into a block that points
//! at its predecessor. Proofs verify without the tree that produced them.

pub mod chain;
pub mod crypto;
pub mod merkle;
mod history;
mod storage;
mod types;
mod validate;

pub use history::BlockHistory;
pub use merkle::{proof_path, verify_event, verify_proof, MerkleTree};
pub use storage::{FileBackedStorage, InMemoryStorage, LedgerStore};
pub use types::{
    Block, CommitOutcome, Commitment, EventReceipt, EventRecord, HexDigest, Inclusion,
    InclusionProof, MiningEvent, ProvenEvent, RawMiningEvent, SupplyReport, GENESIS_PREVIOUS_HASH,
};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Events per block unless configured otherwise
pub const DEFAULT_BATCH_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Malformed mining event: {0}")]
    MalformedEvent(String),

    #[error("Duplicate event id {0}")]
    DuplicateEvent(String),

    #[error("Points total does not fit in 64 bits")]
    PointsOverflow,

    #[error("Cannot build a Merkle tree from an empty batch")]
    EmptyBatch,

    #[error("Leaf index {index} out of range for {len} leaves")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("commit conflict, retry")]
    ChainConflict { expected_height: u64, attempted_height: u64 },

    #[error("Broken chain at height {height}: {reason}")]
    BrokenChain { height: u64, reason: String },

    #[error("proof invalid")]
    InvalidProof,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

pub fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Build the tree, per-event proofs, the next block and its commitment
/// record for one batch. `Ok(None)` means there was nothing to commit.
pub fn commit_batch(
    pending: &[MiningEvent],
    previous: Option<&Block>,
    mined_at: u64,
) -> Result<Option<CommitOutcome>> {
    if pending.is_empty() {
        return Ok(None);
    }
    for event in pending {
        event.validate()?;
    }

    let tree = MerkleTree::from_events(pending)?;
    let events = pending
        .iter()
        .enumerate()
        .map(|(i, event)| {
            Ok(ProvenEvent {
                event: event.clone(),
                proof: tree.prove(i)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let block = chain::link_block(previous, tree.root(), pending, mined_at)?;
    let commitment = Commitment {
        block_height: block.block_height,
        merkle_root: block.merkle_root.clone(),
        event_count: block.transaction_count,
        events_hash: crypto::events_hash(pending)?,
        transaction_signature: None,
    };

    Ok(Some(CommitOutcome { block, commitment, events }))
}

/// Ledger facade: an append-only block chain over a [`LedgerStore`].
///
/// Commits take `&mut self`, so one `Ledger` is a single writer. Writers in
/// other processes are caught by the store's tip check and surface as
/// [`LedgerError::ChainConflict`].
pub struct Ledger<S: LedgerStore> {
    store: S,
    history: BlockHistory,
    batch_limit: usize,
}

impl<S: LedgerStore> Ledger<S> {
    /// Load and verify the stored chain.
    pub fn open(store: S) -> Result<Self> {
        let blocks = store.blocks()?;
        chain::verify_chain(&blocks)?;
        debug!(blocks = blocks.len(), "ledger: chain loaded");

        Ok(Self {
            store,
            history: BlockHistory::from_blocks(blocks),
            batch_limit: DEFAULT_BATCH_LIMIT,
        })
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn record_event(&mut self, event: MiningEvent) -> Result<()> {
        event.validate()?;
        self.store.insert_event(event)
    }

    pub fn record_raw(&mut self, raw: RawMiningEvent) -> Result<MiningEvent> {
        let event = MiningEvent::try_from(raw)?;
        self.store.insert_event(event.clone())?;
        Ok(event)
    }

    /// The batch the next commit would take
    pub fn pending_events(&self) -> Result<Vec<MiningEvent>> {
        self.store.pending_events(self.batch_limit)
    }

    pub fn mempool_size(&self) -> Result<usize> {
        self.store.pending_count()
    }

    pub fn commit_pending(&mut self) -> Result<Option<CommitOutcome>> {
        self.commit_pending_at(now_millis())
    }

    pub fn commit_pending_at(&mut self, mined_at: u64) -> Result<Option<CommitOutcome>> {
        let Some(outcome) = self.prepare_commit(mined_at)? else {
            debug!("ledger: no events to commit");
            return Ok(None);
        };
        self.apply_commit(&outcome)?;
        Ok(Some(outcome))
    }

    /// Compute the next commit without persisting it.
    pub fn prepare_commit(&self, mined_at: u64) -> Result<Option<CommitOutcome>> {
        let pending = self.pending_events()?;
        commit_batch(&pending, self.history.latest(), mined_at)
    }

    /// Persist a prepared commit. On conflict the local chain view is
    /// reloaded so the caller can retry with a fresh batch.
    pub fn apply_commit(&mut self, outcome: &CommitOutcome) -> Result<()> {
        match self.store.apply_commit(outcome) {
            Ok(()) => {
                self.history.record(outcome.block.clone());
                info!(
                    height = outcome.block.block_height,
                    root = %outcome.block.merkle_root,
                    events = outcome.events.len(),
                    "ledger: block committed"
                );
                Ok(())
            }
            Err(e @ LedgerError::ChainConflict { .. }) => {
                warn!("ledger: {e}; reloading chain");
                self.reload()?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    pub fn reload(&mut self) -> Result<()> {
        let blocks = self.store.blocks()?;
        chain::verify_chain(&blocks)?;
        self.history = BlockHistory::from_blocks(blocks);
        Ok(())
    }

    pub fn latest_block(&self) -> Option<&Block> {
        self.history.latest()
    }

    pub fn block_by_height(&self, height: u64) -> Option<&Block> {
        self.history.by_height(height)
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.history.by_hash(hash)
    }

    pub fn blocks(&self) -> &[Block] {
        self.history.blocks()
    }

    /// Event, proof and block root for a committed event
    pub fn receipt(&self, event_id: &str) -> Result<Option<EventReceipt>> {
        let Some(record) = self.store.event(event_id)? else {
            return Ok(None);
        };
        let Some(height) = record.block_height() else {
            return Ok(None);
        };
        Ok(self.history.by_height(height).and_then(|block| record.into_receipt(block)))
    }

    /// Was `event` part of the block at `block_height`?
    pub fn verify_inclusion(&self, event: &MiningEvent, proof: &InclusionProof, block_height: u64) -> bool {
        self.history
            .root_at(block_height)
            .is_some_and(|root| verify_event(event, proof, root))
    }

    /// Re-verify linkage, every block's root against its stored events, and
    /// that minted points equal the points of included events.
    pub fn audit(&self) -> Result<SupplyReport> {
        chain::audit_chain(self.history.blocks(), |block| {
            let records = self.store.events_in_block(block.block_height)?;
            Ok(records.into_iter().map(|r| r.event).collect())
        })
    }
}
