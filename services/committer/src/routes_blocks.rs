use std::collections::HashMap;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use minechain::{chain, Block, LedgerError, MiningEvent, SupplyReport};
use tracing::warn;

use crate::backend::LedgerBackend;
use crate::error::{api_error, not_found, ApiError};
use crate::state::SharedState;
use crate::types::{AuditResponse, BlockDetail, BlockListResponse, BlocksQuery, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub async fn list_blocks(
    State(state): State<SharedState>,
    Query(q): Query<BlocksQuery>,
) -> Result<Json<BlockListResponse>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let offset = q.offset.unwrap_or(0);
    let backend = &state.backend;

    let blocks = backend.list_blocks(limit, offset).await.map_err(api_error)?;
    let latest_block = backend.latest_block().await.map_err(api_error)?;
    let mempool_size = backend.mempool_size().await.map_err(api_error)?;

    Ok(Json(BlockListResponse {
        blocks,
        total_blocks: latest_block.as_ref().map_or(0, |b| b.block_height + 1),
        latest_block,
        mempool_size,
    }))
}

async fn with_transactions(backend: &dyn LedgerBackend, block: Block) -> Result<BlockDetail> {
    let transactions = backend
        .events_in_block(block.block_height)
        .await?
        .into_iter()
        .map(|r| r.event)
        .collect();
    Ok(BlockDetail { block, transactions })
}

pub async fn get_block_by_height(
    State(state): State<SharedState>,
    Path(height): Path<u64>,
) -> Result<Json<BlockDetail>, ApiError> {
    let block = state
        .backend
        .block_by_height(height)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Block"))?;
    let detail = with_transactions(state.backend.as_ref(), block).await.map_err(api_error)?;
    Ok(Json(detail))
}

pub async fn get_block_by_hash(
    State(state): State<SharedState>,
    Path(hash): Path<String>,
) -> Result<Json<BlockDetail>, ApiError> {
    let block = state
        .backend
        .block_by_hash(&hash)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Block"))?;
    let detail = with_transactions(state.backend.as_ref(), block).await.map_err(api_error)?;
    Ok(Json(detail))
}

/// Linkage, per-block roots over stored events, and supply reconciliation
pub async fn audit_chain(backend: &dyn LedgerBackend) -> Result<SupplyReport> {
    let blocks = backend.chain().await?;

    let mut stored: HashMap<u64, Vec<MiningEvent>> = HashMap::with_capacity(blocks.len());
    for block in &blocks {
        let events = backend
            .events_in_block(block.block_height)
            .await?
            .into_iter()
            .map(|r| r.event)
            .collect();
        stored.insert(block.block_height, events);
    }

    let report = chain::audit_chain(&blocks, |block| Ok(stored.remove(&block.block_height).unwrap_or_default()))?;
    Ok(report)
}

pub async fn get_audit(State(state): State<SharedState>) -> Result<Json<AuditResponse>, ApiError> {
    let height = state.backend.latest_block().await.map_err(api_error)?.map(|b| b.block_height);

    let resp = match audit_chain(state.backend.as_ref()).await {
        Ok(report) => AuditResponse {
            ok: report.balanced(),
            height,
            minted_supply: report.minted_supply,
            included_points: report.included_points,
            error: (!report.balanced()).then(|| "minted supply does not match included points".to_string()),
        },
        Err(e) => match e.downcast_ref::<LedgerError>() {
            Some(broken @ (LedgerError::BrokenChain { .. } | LedgerError::PointsOverflow)) => {
                warn!("audit: {broken}");
                AuditResponse {
                    ok: false,
                    height,
                    minted_supply: 0,
                    included_points: 0,
                    error: Some(broken.to_string()),
                }
            }
            _ => return Err(api_error(e)),
        },
    };
    Ok(Json(resp))
}
