use minechain::{Block, MiningEvent, RawMiningEvent};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub committed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_count: Option<u64>,
}

impl CommitResponse {
    pub fn nothing_to_commit() -> Self {
        Self {
            committed: false,
            message: Some("No events to commit".to_string()),
            block_height: None,
            block_hash: None,
            merkle_root: None,
            transaction_signature: None,
            event_count: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BlocksQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockListResponse {
    pub blocks: Vec<Block>,
    pub latest_block: Option<Block>,
    pub total_blocks: u64,
    pub mempool_size: u64,
}

/// A block with its events, in leaf order
#[derive(Clone, Debug, Serialize)]
pub struct BlockDetail {
    #[serde(flatten)]
    pub block: Block,
    pub transactions: Vec<MiningEvent>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub event: RawMiningEvent,
    pub proof: Vec<String>,
    pub leaf_index: usize,
    /// Verify against this block's stored root
    pub block_height: Option<u64>,
    /// Or against a caller-supplied root
    pub merkle_root: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResponse {
    pub ok: bool,
    pub height: Option<u64>,
    pub minted_supply: u64,
    pub included_points: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
