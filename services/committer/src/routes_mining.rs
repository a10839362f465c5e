use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use minechain::{verify_event, EventReceipt, InclusionProof, LedgerError, MiningEvent, RawMiningEvent};
use tracing::info;
use uuid::Uuid;

use crate::commit_loop::run_commit_cycle;
use crate::error::{api_error, not_found, ApiError};
use crate::state::SharedState;
use crate::types::{CommitResponse, VerifyRequest, VerifyResponse};

/// Accept a solved event. PoW checking happens upstream; the id and
/// timestamp are assigned here when the caller leaves them out.
pub async fn submit_event(
    State(state): State<SharedState>,
    Json(mut raw): Json<RawMiningEvent>,
) -> Result<(StatusCode, Json<MiningEvent>), ApiError> {
    if raw.id.is_none() {
        raw.id = Some(Uuid::new_v4().to_string());
    }
    if raw.timestamp.is_none() {
        raw.timestamp = Some(Utc::now().timestamp_millis().max(0) as u64);
    }

    let event = MiningEvent::try_from(raw).map_err(|e| api_error(e.into()))?;
    state.backend.insert_event(event.clone()).await.map_err(api_error)?;

    info!(id = %event.id, wallet = %event.wallet_address, points = event.points_awarded, "mining: event queued");
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn commit_now(State(state): State<SharedState>) -> Result<Json<CommitResponse>, ApiError> {
    let Some(outcome) = run_commit_cycle(&state).await.map_err(api_error)? else {
        return Ok(Json(CommitResponse::nothing_to_commit()));
    };

    Ok(Json(CommitResponse {
        committed: true,
        message: None,
        block_height: Some(outcome.block.block_height),
        block_hash: Some(outcome.block.block_hash),
        merkle_root: Some(outcome.block.merkle_root),
        transaction_signature: outcome.commitment.transaction_signature,
        event_count: Some(outcome.commitment.event_count),
    }))
}

pub async fn get_receipt(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<EventReceipt>, ApiError> {
    let record = state.backend.event(&id).await.map_err(api_error)?.ok_or_else(|| not_found("Event"))?;
    let height = record
        .block_height()
        .ok_or_else(|| (StatusCode::NOT_FOUND, "Event not yet committed".to_string()))?;
    let block = state
        .backend
        .block_by_height(height)
        .await
        .map_err(api_error)?
        .ok_or_else(|| not_found("Block"))?;

    let receipt = record.into_receipt(&block).ok_or_else(|| not_found("Block"))?;
    Ok(Json(receipt))
}

/// Check an inclusion proof against a block's root or a supplied root.
pub async fn verify_inclusion(
    State(state): State<SharedState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let invalid = || {
        Json(VerifyResponse {
            valid: false,
            message: Some(LedgerError::InvalidProof.to_string()),
        })
    };

    // an event that cannot exist cannot be included
    let Ok(event) = MiningEvent::try_from(req.event) else {
        return Ok(invalid());
    };

    let root = match (req.merkle_root, req.block_height) {
        (Some(root), _) => root,
        (None, Some(height)) => {
            state
                .backend
                .block_by_height(height)
                .await
                .map_err(api_error)?
                .ok_or_else(|| not_found("Block"))?
                .merkle_root
        }
        (None, None) => {
            return Err((StatusCode::BAD_REQUEST, "merkleRoot or blockHeight required".to_string()));
        }
    };

    let proof = InclusionProof {
        leaf_index: req.leaf_index,
        siblings: req.proof,
    };

    if verify_event(&event, &proof, &root) {
        Ok(Json(VerifyResponse { valid: true, message: None }))
    } else {
        Ok(invalid())
    }
}
