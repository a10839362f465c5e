//! Hashing primitives shared by the tree, the verifier and the block linker.
//!
//! Every digest is SHA-256 rendered as lowercase hex, and interior nodes hash
//! the *hex strings* of their children, not the raw bytes.

use sha2::{Digest, Sha256};

use crate::{HexDigest, LedgerError, MiningEvent, Result};

const FIELD_DELIMITER: char = ':';

pub fn sha256_hex(data: &[u8]) -> HexDigest {
    hex::encode(Sha256::digest(data))
}

/// Leaf digest: H("id:wallet:challenge:solution:points:difficulty:timestamp")
pub fn hash_event(event: &MiningEvent) -> HexDigest {
    let data = format!(
        "{}{d}{}{d}{}{d}{}{d}{}{d}{}{d}{}",
        event.id,
        event.wallet_address,
        event.challenge_id,
        event.solution_hash,
        event.points_awarded,
        event.difficulty,
        event.timestamp,
        d = FIELD_DELIMITER,
    );
    sha256_hex(data.as_bytes())
}

/// Interior node: H(left || right). Order-sensitive.
pub fn hash_pair(left: &str, right: &str) -> HexDigest {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// H("previousHash-height-merkleRoot-reward-minedAt")
pub fn block_hash(
    previous_hash: &str,
    block_height: u64,
    merkle_root: &str,
    block_reward: u64,
    mined_at: u64,
) -> HexDigest {
    let data = format!("{previous_hash}-{block_height}-{merkle_root}-{block_reward}-{mined_at}");
    sha256_hex(data.as_bytes())
}

/// Digest over the JSON array of a batch, kept on the commitment record
pub fn events_hash(events: &[MiningEvent]) -> Result<HexDigest> {
    let json = serde_json::to_string(events)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;
    Ok(sha256_hex(json.as_bytes()))
}

pub(crate) fn contains_delimiter(value: &str) -> bool {
    value.contains(FIELD_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> MiningEvent {
        MiningEvent {
            id: "1".into(),
            wallet_address: "A".into(),
            challenge_id: "c1".into(),
            solution_hash: "h1".into(),
            points_awarded: 100,
            difficulty: 4,
            timestamp: 1000,
        }
    }

    #[test]
    fn leaf_is_hash_of_colon_joined_fields() {
        assert_eq!(hash_event(&event()), sha256_hex(b"1:A:c1:h1:100:4:1000"));
    }

    #[test]
    fn known_sha256_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn pair_hash_concatenates_hex_strings() {
        let l = sha256_hex(b"l");
        let r = sha256_hex(b"r");
        assert_eq!(hash_pair(&l, &r), sha256_hex(format!("{l}{r}").as_bytes()));
        assert_ne!(hash_pair(&l, &r), hash_pair(&r, &l));
    }

    #[test]
    fn block_hash_uses_dash_separated_fields() {
        assert_eq!(
            block_hash("genesis", 0, "root", 150, 42),
            sha256_hex(b"genesis-0-root-150-42")
        );
    }

    #[test]
    fn events_hash_uses_camel_case_json() {
        let json = r#"[{"id":"1","walletAddress":"A","challengeId":"c1","solutionHash":"h1","pointsAwarded":100,"difficulty":4,"timestamp":1000}]"#;
        assert_eq!(events_hash(&[event()]).unwrap(), sha256_hex(json.as_bytes()));
    }
}
