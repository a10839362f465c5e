//! Block linking and chain audit.

use crate::crypto;
use crate::{Block, LedgerError, MerkleTree, MiningEvent, Result, SupplyReport, GENESIS_PREVIOUS_HASH};

/// Build the block that follows `previous` for a batch with the given root.
/// Nothing is persisted here. Fails with `PointsOverflow` when the batch's
/// points do not fit in a `u64`.
pub fn link_block(
    previous: Option<&Block>,
    merkle_root: &str,
    batch: &[MiningEvent],
    mined_at: u64,
) -> Result<Block> {
    let block_height = previous.map_or(0, |b| b.block_height + 1);
    let previous_hash = previous
        .map(|b| b.block_hash.clone())
        .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());

    let block_reward = total_points(batch)?;
    let difficulty = mean_difficulty(batch);
    let miner_address = batch.first().map(|e| e.wallet_address.clone());
    let block_time_seconds = previous.map(|b| round_div(mined_at.saturating_sub(b.mined_at), 1000));

    let block_hash = crypto::block_hash(&previous_hash, block_height, merkle_root, block_reward, mined_at);

    Ok(Block {
        block_height,
        block_hash,
        previous_hash,
        merkle_root: merkle_root.to_string(),
        transaction_count: batch.len() as u64,
        block_reward,
        difficulty,
        miner_address,
        block_time_seconds,
        mined_at,
    })
}

pub fn total_points<'a>(events: impl IntoIterator<Item = &'a MiningEvent>) -> Result<u64> {
    events
        .into_iter()
        .try_fold(0u64, |acc, e| acc.checked_add(e.points_awarded))
        .ok_or(LedgerError::PointsOverflow)
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.block_height == 0
    }

    pub fn recompute_hash(&self) -> String {
        crypto::block_hash(
            &self.previous_hash,
            self.block_height,
            &self.merkle_root,
            self.block_reward,
            self.mined_at,
        )
    }
}

/// Check heights, back-pointers and block hashes from genesis upward.
pub fn verify_chain(blocks: &[Block]) -> Result<()> {
    let mut prev: Option<&Block> = None;

    for b in blocks {
        let broken = |reason: String| LedgerError::BrokenChain { height: b.block_height, reason };

        let expected_height = prev.map_or(0, |p| p.block_height + 1);
        if b.block_height != expected_height {
            return Err(broken(format!("expected height {expected_height}")));
        }

        let expected_prev = prev.map_or(GENESIS_PREVIOUS_HASH, |p| p.block_hash.as_str());
        if b.previous_hash != expected_prev {
            return Err(broken("previous hash does not match".into()));
        }

        if b.recompute_hash() != b.block_hash {
            return Err(broken("block hash does not match its fields".into()));
        }

        prev = Some(b);
    }

    Ok(())
}

/// Check one block against the events stored as its leaves, in leaf order.
pub fn audit_block(block: &Block, events: &[MiningEvent]) -> Result<()> {
    let broken = |reason: String| LedgerError::BrokenChain { height: block.block_height, reason };

    if events.len() as u64 != block.transaction_count {
        return Err(broken(format!(
            "{} events stored, block claims {}",
            events.len(),
            block.transaction_count
        )));
    }

    let tree = MerkleTree::from_events(events)?;
    if tree.root() != block.merkle_root {
        return Err(broken("stored events do not reproduce the merkle root".into()));
    }

    let reward = total_points(events)?;
    if reward != block.block_reward {
        return Err(broken(format!("events carry {reward} points, block minted {}", block.block_reward)));
    }

    Ok(())
}

/// Verify the whole chain: linkage, then every block against the events
/// `load` returns for it, then supply reconciliation.
pub fn audit_chain<F>(blocks: &[Block], mut load: F) -> Result<SupplyReport>
where
    F: FnMut(&Block) -> Result<Vec<MiningEvent>>,
{
    verify_chain(blocks)?;

    let mut included = Vec::new();
    for block in blocks {
        let events = load(block)?;
        audit_block(block, &events)?;
        included.extend(events);
    }

    reconcile_supply(blocks, &included)
}

/// Compare points minted in blocks against points carried by included events.
pub fn reconcile_supply<'a>(
    blocks: &[Block],
    included: impl IntoIterator<Item = &'a MiningEvent>,
) -> Result<SupplyReport> {
    let minted_supply = blocks
        .iter()
        .try_fold(0u64, |acc, b| acc.checked_add(b.block_reward))
        .ok_or(LedgerError::PointsOverflow)?;

    Ok(SupplyReport {
        minted_supply,
        included_points: total_points(included)?,
    })
}

fn mean_difficulty(batch: &[MiningEvent]) -> u32 {
    if batch.is_empty() {
        return 0;
    }
    let total: u64 = batch.iter().map(|e| u64::from(e.difficulty)).sum();
    round_div(total, batch.len() as u64) as u32
}

/// `numerator / denominator` rounded half up, without overflowing
fn round_div(numerator: u64, denominator: u64) -> u64 {
    let remainder = numerator % denominator;
    numerator / denominator + u64::from(remainder >= denominator - denominator / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(id: &str, wallet: &str, points: u64, difficulty: u32) -> MiningEvent {
        MiningEvent {
            id: id.into(),
            wallet_address: wallet.into(),
            challenge_id: format!("c-{id}"),
            solution_hash: format!("h-{id}"),
            points_awarded: points,
            difficulty,
            timestamp: 1000,
        }
    }

    #[test]
    fn genesis_block_fields() {
        let batch = vec![ev("1", "A", 100, 4), ev("2", "B", 50, 4)];
        let b = link_block(None, "root", &batch, 5_000).unwrap();

        assert_eq!(b.block_height, 0);
        assert_eq!(b.previous_hash, "genesis");
        assert_eq!(b.block_reward, 150);
        assert_eq!(b.difficulty, 4);
        assert_eq!(b.miner_address.as_deref(), Some("A"));
        assert_eq!(b.transaction_count, 2);
        assert_eq!(b.block_time_seconds, None);
        assert_eq!(b.block_hash, crypto::sha256_hex(b"genesis-0-root-150-5000"));
        assert!(b.is_genesis());
    }

    #[test]
    fn successor_links_to_previous() {
        let g = link_block(None, "r0", &[ev("1", "A", 10, 3)], 10_000).unwrap();
        let b1 = link_block(Some(&g), "r1", &[ev("2", "B", 10, 5)], 12_600).unwrap();

        assert_eq!(b1.block_height, 1);
        assert_eq!(b1.previous_hash, g.block_hash);
        assert_eq!(b1.block_time_seconds, Some(3));
        assert!(verify_chain(&[g, b1]).is_ok());
    }

    #[test]
    fn difficulty_is_rounded_mean() {
        let b = link_block(None, "r", &[ev("1", "A", 1, 4), ev("2", "A", 1, 5)], 0).unwrap();
        assert_eq!(b.difficulty, 5);
        let b = link_block(None, "r", &[ev("1", "A", 1, 4), ev("2", "A", 1, 4), ev("3", "A", 1, 5)], 0).unwrap();
        assert_eq!(b.difficulty, 4);
    }

    #[test]
    fn empty_batch_has_no_miner() {
        let b = link_block(None, "r", &[], 0).unwrap();
        assert_eq!(b.miner_address, None);
        assert_eq!(b.difficulty, 0);
        assert_eq!(b.block_reward, 0);
    }

    #[test]
    fn backwards_clock_saturates_block_time() {
        let g = link_block(None, "r0", &[ev("1", "A", 1, 1)], 10_000).unwrap();
        let b1 = link_block(Some(&g), "r1", &[ev("2", "A", 1, 1)], 9_000).unwrap();
        assert_eq!(b1.block_time_seconds, Some(0));
    }

    #[test]
    fn tampered_chain_is_rejected() {
        let g = link_block(None, "r0", &[ev("1", "A", 10, 3)], 1).unwrap();
        let b1 = link_block(Some(&g), "r1", &[ev("2", "B", 10, 3)], 2).unwrap();

        let mut forged = b1.clone();
        forged.block_reward = 1_000;
        assert!(matches!(
            verify_chain(&[g.clone(), forged]),
            Err(LedgerError::BrokenChain { height: 1, .. })
        ));

        let mut gap = b1.clone();
        gap.block_height = 2;
        assert!(verify_chain(&[g.clone(), gap]).is_err());

        assert!(verify_chain(&[b1]).is_err());
    }

    #[test]
    fn audit_block_checks_root_and_count() {
        let batch = vec![ev("1", "A", 100, 4), ev("2", "B", 50, 4)];
        let tree = MerkleTree::from_events(&batch).unwrap();
        let b = link_block(None, tree.root(), &batch, 0).unwrap();
        assert!(audit_block(&b, &batch).is_ok());

        assert!(matches!(
            audit_block(&b, &batch[..1]),
            Err(LedgerError::BrokenChain { height: 0, .. })
        ));

        let swapped = vec![batch[1].clone(), batch[0].clone()];
        assert!(audit_block(&b, &swapped).is_err());
    }

    #[test]
    fn supply_reconciles() {
        let batch = vec![ev("1", "A", 100, 4), ev("2", "B", 50, 4)];
        let b = link_block(None, "r", &batch, 0).unwrap();
        let report = reconcile_supply(std::slice::from_ref(&b), &batch).unwrap();
        assert!(report.balanced());
        assert_eq!(report.minted_supply, 150);

        let short = reconcile_supply(&[b], &batch[..1]).unwrap();
        assert!(!short.balanced());
    }

    #[test]
    fn overflowing_reward_is_an_error() {
        let batch = vec![ev("1", "A", u64::MAX, 4), ev("2", "B", 2, 4)];
        assert!(matches!(link_block(None, "r", &batch, 10), Err(LedgerError::PointsOverflow)));
        assert!(matches!(total_points(&batch), Err(LedgerError::PointsOverflow)));

        let max = link_block(None, "r", &batch[..1], 10).unwrap();
        assert_eq!(max.block_reward, u64::MAX);
        assert!(matches!(reconcile_supply(&[max.clone(), max], &Vec::<MiningEvent>::new()), Err(LedgerError::PointsOverflow)));
    }

    #[test]
    fn block_time_rounding_does_not_overflow() {
        assert_eq!(round_div(u64::MAX, 1000), u64::MAX / 1000 + 1);
        assert_eq!(round_div(2_499, 1000), 2);
        assert_eq!(round_div(2_500, 1000), 3);
    }

    #[test]
    fn audit_chain_loads_each_block() {
        let first = vec![ev("1", "A", 100, 4), ev("2", "B", 50, 4)];
        let second = vec![ev("3", "C", 7, 4)];
        let r0 = MerkleTree::from_events(&first).unwrap();
        let r1 = MerkleTree::from_events(&second).unwrap();
        let g = link_block(None, r0.root(), &first, 1).unwrap();
        let b1 = link_block(Some(&g), r1.root(), &second, 2).unwrap();
        let blocks = vec![g, b1];

        let report = audit_chain(&blocks, |b| Ok(if b.is_genesis() { first.clone() } else { second.clone() })).unwrap();
        assert_eq!(report.minted_supply, 157);
        assert!(report.balanced());

        let missing = audit_chain(&blocks, |b| Ok(if b.is_genesis() { first.clone() } else { Vec::new() }));
        assert!(matches!(missing, Err(LedgerError::BrokenChain { height: 1, .. })));
    }
}
