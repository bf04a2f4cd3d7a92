//! Pages: row batches made of position-aligned blocks.

use pageflow_core::error::{Error, Result};
use pageflow_core::types::Value;

use crate::block::Block;
use crate::factory::BlockFactory;

/// An immutable row batch. Channel `i` is `blocks[i]`; position `p` is row `p`.
///
/// Cloning a page (or projecting it) shares the underlying blocks; their
/// memory is released once the last page or operator holding them drops.
#[derive(Debug, Clone, Default)]
pub struct Page {
    blocks: Vec<Block>,
    position_count: usize,
}

impl Page {
    /// Bundle blocks that all share one position count.
    pub fn new(blocks: Vec<Block>) -> Result<Self> {
        let position_count = blocks.first().map_or(0, Block::position_count);
        if let Some((channel, block)) = blocks
            .iter()
            .enumerate()
            .find(|(_, b)| b.position_count() != position_count)
        {
            return Err(Error::IllegalState(format!(
                "block at channel {channel} has {} positions, expected {position_count}",
                block.position_count()
            )));
        }
        Ok(Self {
            blocks,
            position_count,
        })
    }

    /// A page with no blocks but an explicit row count (e.g. `count(*)` input).
    pub fn with_position_count(position_count: usize) -> Self {
        Self {
            blocks: Vec::new(),
            position_count,
        }
    }

    pub fn position_count(&self) -> usize {
        self.position_count
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Zero positions: carries no data but does not mean end-of-stream.
    pub fn is_empty(&self) -> bool {
        self.position_count == 0
    }

    pub fn block(&self, channel: usize) -> Option<&Block> {
        self.blocks.get(channel)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Value at (`channel`, `position`); `None` when null.
    ///
    /// Panics if either index is out of range.
    pub fn get_value(&self, channel: usize, position: usize) -> Option<Value> {
        self.blocks[channel].get_value(position)
    }

    /// Add a channel at the end.
    pub fn append_block(mut self, block: Block) -> Result<Self> {
        if !self.blocks.is_empty() || self.position_count != 0 {
            if block.position_count() != self.position_count {
                return Err(Error::IllegalState(format!(
                    "appended block has {} positions, page has {}",
                    block.position_count(),
                    self.position_count
                )));
            }
        } else {
            self.position_count = block.position_count();
        }
        self.blocks.push(block);
        Ok(self)
    }

    /// Page made of `channels` of this one, in that order. Blocks are shared.
    pub fn project(&self, channels: &[usize]) -> Result<Page> {
        let mut blocks = Vec::with_capacity(channels.len());
        for &c in channels {
            let block = self.blocks.get(c).ok_or(Error::IndexOutOfRange {
                index: c,
                len: self.blocks.len(),
            })?;
            blocks.push(block.clone());
        }
        Ok(Page {
            blocks,
            position_count: self.position_count,
        })
    }

    /// Page holding only `positions` (in order) of every channel.
    pub fn filter(&self, factory: &BlockFactory, positions: &[usize]) -> Result<Page> {
        if self.blocks.is_empty() {
            if let Some(&bad) = positions.iter().find(|&&p| p >= self.position_count) {
                return Err(Error::IndexOutOfRange {
                    index: bad,
                    len: self.position_count,
                });
            }
            return Ok(Page::with_position_count(positions.len()));
        }
        let blocks = self
            .blocks
            .iter()
            .map(|b| b.filter(factory, positions))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            blocks,
            position_count: positions.len(),
        })
    }

    /// Bytes charged by the blocks of this page (shared blocks count fully).
    pub fn ram_bytes_used(&self) -> usize {
        self.blocks.iter().map(Block::ram_bytes_used).sum()
    }

    /// Drop this page's block references. Storage is returned to the factory
    /// when no other page still shares it.
    pub fn release(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn longs(factory: &BlockFactory, values: &[Option<i64>]) -> Block {
        let mut b = factory.new_long_block_builder(values.len()).unwrap();
        for v in values {
            match v {
                Some(v) => b.append(*v).unwrap(),
                None => b.append_null().unwrap(),
            };
        }
        b.build().unwrap().into()
    }

    #[test]
    fn mismatched_position_counts_are_rejected() {
        let factory = BlockFactory::with_limit(1 << 20);
        let a = longs(&factory, &[Some(1), Some(2)]);
        let b = longs(&factory, &[Some(1)]);
        let err = Page::new(vec![a.clone(), b.clone()]).unwrap_err();
        assert!(matches!(err, Error::IllegalState(_)));
        let page = Page::new(vec![a]).unwrap();
        assert!(page.append_block(b).is_err());
    }

    #[test]
    fn projection_shares_blocks_and_release_returns_memory() {
        let factory = BlockFactory::with_limit(1 << 20);
        let page = Page::new(vec![
            longs(&factory, &[Some(1), None]),
            longs(&factory, &[Some(3), Some(4)]),
        ])
        .unwrap();
        let projected = page.project(&[1, 1, 0]).unwrap();
        assert_eq!(projected.block_count(), 3);
        assert_eq!(projected.get_value(0, 1), Some(Value::Long(4)));
        assert_eq!(projected.get_value(2, 1), None);
        assert_eq!(page.block(1).unwrap().ref_count(), 3);
        assert!(matches!(
            page.project(&[2]),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));

        let used = factory.used_bytes();
        page.release();
        assert_eq!(factory.used_bytes(), used);
        projected.release();
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn filter_selects_positions_in_order() {
        let factory = BlockFactory::with_limit(1 << 20);
        let page = Page::new(vec![longs(&factory, &[Some(10), None, Some(30)])]).unwrap();
        let filtered = page.filter(&factory, &[2, 1, 2]).unwrap();
        assert_eq!(filtered.position_count(), 3);
        assert_eq!(filtered.get_value(0, 0), Some(Value::Long(30)));
        assert_eq!(filtered.get_value(0, 1), None);
        assert_eq!(filtered.get_value(0, 2), Some(Value::Long(30)));
        assert!(matches!(
            page.filter(&factory, &[3]),
            Err(Error::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn filter_copies_multi_valued_positions_whole() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut b = factory.new_long_block_builder(3).unwrap();
        b.begin_position_entry().unwrap();
        b.append(1).unwrap().append(2).unwrap();
        b.end_position_entry().unwrap();
        b.append_null().unwrap();
        b.append(3).unwrap();
        let page = Page::new(vec![b.build().unwrap().into()]).unwrap();

        let filtered = page.filter(&factory, &[0, 2, 1, 0]).unwrap();
        let block = filtered.block(0).unwrap();
        assert_eq!(filtered.position_count(), 4);
        assert!(block.may_have_multivalued());
        assert_eq!(block.value_count(0), 2);
        assert_eq!(block.get_values(0), vec![Value::Long(1), Value::Long(2)]);
        assert_eq!(block.get_values(1), vec![Value::Long(3)]);
        assert!(block.is_null(2));
        assert_eq!(block.get_values(3), vec![Value::Long(1), Value::Long(2)]);

        drop(filtered);
        page.release();
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn empty_pages_are_legal() {
        assert!(Page::new(vec![]).unwrap().is_empty());
        let counted = Page::with_position_count(7);
        assert_eq!(counted.position_count(), 7);
        assert_eq!(counted.block_count(), 0);
        assert!(!counted.is_empty());
    }
}
