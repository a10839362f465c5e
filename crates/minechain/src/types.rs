//! Core types for the mining ledger

use serde::{Deserialize, Serialize};

/// Lowercase hex SHA-256 digest
pub type HexDigest = String;

/// `previousHash` of the block at height 0
pub const GENESIS_PREVIOUS_HASH: &str = "genesis";

/// One accepted proof-of-work solution.
///
/// Field order is the canonical order used by the leaf hash and by the
/// commitment's events hash, so it must not be reordered.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MiningEvent {
    pub id: String,
    pub wallet_address: String,
    pub challenge_id: String,
    /// PoW header hash produced by the solver (not the Merkle leaf)
    pub solution_hash: String,
    pub points_awarded: u64,
    pub difficulty: u32,
    /// Milliseconds since epoch
    pub timestamp: u64,
}

/// Loosely typed event as it arrives from a row or a JSON payload.
/// Converted into [`MiningEvent`] with `MiningEvent::try_from`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMiningEvent {
    pub id: Option<String>,
    pub wallet_address: Option<String>,
    pub challenge_id: Option<String>,
    pub solution_hash: Option<String>,
    pub points_awarded: Option<u64>,
    pub difficulty: Option<u32>,
    pub timestamp: Option<u64>,
}

/// Sibling digests from leaf to root, plus the leaf position they were cut for
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    pub leaf_index: usize,
    pub siblings: Vec<HexDigest>,
}

/// One committed batch
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_height: u64,
    pub block_hash: HexDigest,
    pub previous_hash: String,
    pub merkle_root: HexDigest,
    pub transaction_count: u64,
    pub block_reward: u64,
    pub difficulty: u32,
    pub miner_address: Option<String>,
    pub block_time_seconds: Option<u64>,
    /// Millisecond timestamp that went into `block_hash`
    pub mined_at: u64,
}

/// Legacy lookup record mirroring a block
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Commitment {
    pub block_height: u64,
    pub merkle_root: HexDigest,
    pub event_count: u64,
    pub events_hash: HexDigest,
    pub transaction_signature: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProvenEvent {
    pub event: MiningEvent,
    pub proof: InclusionProof,
}

/// Everything one commit cycle produces, ready to be persisted
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitOutcome {
    pub block: Block,
    pub commitment: Commitment,
    pub events: Vec<ProvenEvent>,
}

/// Where an event ended up once committed
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Inclusion {
    pub block_height: u64,
    pub proof: InclusionProof,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event: MiningEvent,
    pub inclusion: Option<Inclusion>,
}

impl EventRecord {
    pub fn pending(event: MiningEvent) -> Self {
        Self { event, inclusion: None }
    }

    pub fn is_pending(&self) -> bool {
        self.inclusion.is_none()
    }

    pub fn block_height(&self) -> Option<u64> {
        self.inclusion.as_ref().map(|inc| inc.block_height)
    }

    /// Receipt against `block`, if this event was committed in it
    pub fn into_receipt(self, block: &Block) -> Option<EventReceipt> {
        let inclusion = self.inclusion.filter(|inc| inc.block_height == block.block_height)?;
        Some(EventReceipt {
            event: self.event,
            block_height: block.block_height,
            merkle_root: block.merkle_root.clone(),
            proof: inclusion.proof,
        })
    }
}

/// Self-contained answer to "was this event in that block?"
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventReceipt {
    pub event: MiningEvent,
    pub block_height: u64,
    pub merkle_root: HexDigest,
    pub proof: InclusionProof,
}

/// Result of a full chain audit
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupplyReport {
    pub minted_supply: u64,
    pub included_points: u64,
}

impl SupplyReport {
    pub fn balanced(&self) -> bool {
        self.minted_supply == self.included_points
    }
}
