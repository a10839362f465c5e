use std::time::Duration;

use anyhow::{Context, Result};
use minechain::{commit_batch, now_millis, CommitOutcome, LedgerError};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::SharedState;

/// True when a `ChainConflict` sits anywhere in the error chain
pub fn is_conflict(e: &anyhow::Error) -> bool {
    e.chain()
        .any(|cause| matches!(cause.downcast_ref::<LedgerError>(), Some(LedgerError::ChainConflict { .. })))
}

/// One commit: latest block, pending batch, tree + block, anchor, persist.
/// `Ok(None)` when the mempool is empty.
pub async fn run_commit_cycle(state: &SharedState) -> Result<Option<CommitOutcome>> {
    let _writer = state.commit_lock.lock().await;

    let previous = state.backend.latest_block().await.context("reading chain tip")?;
    let pending = state
        .backend
        .pending_events(state.config.batch_limit)
        .await
        .context("reading pending events")?;

    let Some(mut outcome) = commit_batch(&pending, previous.as_ref(), now_millis())? else {
        debug!("commit: no events to commit");
        return Ok(None);
    };

    // anchor first: a failed anchor leaves the batch pending for the next cycle
    let signature = state
        .anchor
        .anchor(&outcome.block)
        .await
        .with_context(|| format!("anchoring root of block {}", outcome.block.block_height))?;
    outcome.commitment.transaction_signature = Some(signature);

    state.backend.apply_commit(&outcome).await?;

    info!(
        height = outcome.block.block_height,
        hash = %outcome.block.block_hash,
        root = %outcome.block.merkle_root,
        events = outcome.events.len(),
        "commit: block sealed"
    );
    Ok(Some(outcome))
}

pub async fn run_commit_loop(state: SharedState, cancel: CancellationToken) {
    let every = Duration::from_secs(state.config.commit_interval_secs);
    info!(interval_secs = state.config.commit_interval_secs, "commit_loop: started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(every) => {
                match run_commit_cycle(&state).await {
                    Ok(_) => {}
                    Err(e) if is_conflict(&e) => warn!("commit_loop: {e}; retrying next tick"),
                    Err(e) => error!("commit_loop: cycle failed: {e:?}"),
                }
            }
        }
    }

    info!("commit_loop: stopped");
}
