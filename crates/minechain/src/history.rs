use std::collections::HashMap;

use crate::{Block, HexDigest};

/// In-memory index of committed blocks, by height and by hash.
#[derive(Clone, Debug, Default)]
pub struct BlockHistory {
    blocks: Vec<Block>,
    by_hash: HashMap<HexDigest, u64>,
}

impl BlockHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        let mut history = Self::new();
        for b in blocks {
            history.record(b);
        }
        history
    }

    /// Append the next block. Heights are positions, so callers must record
    /// blocks in chain order.
    pub fn record(&mut self, block: Block) {
        self.by_hash.insert(block.block_hash.clone(), block.block_height);
        self.blocks.push(block);
    }

    pub fn latest(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn by_height(&self, height: u64) -> Option<&Block> {
        let idx = usize::try_from(height).ok()?;
        self.blocks.get(idx).filter(|b| b.block_height == height)
    }

    pub fn by_hash(&self, hash: &str) -> Option<&Block> {
        self.by_hash.get(hash).and_then(|h| self.by_height(*h))
    }

    pub fn root_at(&self, height: u64) -> Option<&str> {
        self.by_height(height).map(|b| b.merkle_root.as_str())
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::link_block;

    #[test]
    fn lookups_by_height_and_hash() {
        let g = link_block(None, "r0", &[], 1).unwrap();
        let b1 = link_block(Some(&g), "r1", &[], 2).unwrap();
        let history = BlockHistory::from_blocks(vec![g.clone(), b1.clone()]);

        assert_eq!(history.blocks().len(), 2);
        assert_eq!(history.latest(), Some(&b1));
        assert_eq!(history.by_height(0), Some(&g));
        assert_eq!(history.by_hash(&b1.block_hash), Some(&b1));
        assert_eq!(history.root_at(1), Some("r1"));
        assert!(history.by_height(2).is_none());
        assert!(history.by_hash("nope").is_none());
    }
}
