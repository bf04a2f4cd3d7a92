//! The allocation and accounting authority for blocks.
//!
//! Every builder the factory hands out starts with a reservation for the block
//! overhead plus the pre-sized value store. The charge is taken *before* the
//! store is allocated, so a refused reservation never leaves a half-built
//! builder behind.

use std::fmt;
use std::sync::Arc;

use pageflow_core::breaker::CircuitBreaker;
use pageflow_core::config::EngineConfig;
use pageflow_core::error::{Error, Result};
use pageflow_core::types::{ElementType, Value};
use pageflow_mem::{MemoryBreaker, NoopBreaker, Reservation};

use crate::block::{
    Block, BlockBuilder, BooleanBlockBuilder, Builder, BytesBlockBuilder, DoubleBlockBuilder,
    IntBlockBuilder, LongBlockBuilder, ValueStore,
};

/// Fixed bytes charged per block on top of its storage.
pub const BLOCK_OVERHEAD_BYTES: usize = 64;

/// Largest single allocation a `Vec` may make.
const MAX_BLOCK_BYTES: usize = isize::MAX as usize;

#[derive(Clone)]
pub struct BlockFactory {
    breaker: Arc<dyn CircuitBreaker>,
}

impl BlockFactory {
    pub fn new(breaker: Arc<dyn CircuitBreaker>) -> Self {
        Self { breaker }
    }

    /// Factory backed by a fresh `MemoryBreaker` with the given ceiling.
    pub fn with_limit(limit_bytes: usize) -> Self {
        Self::new(Arc::new(MemoryBreaker::new(limit_bytes)))
    }

    /// Factory that accounts without a ceiling.
    pub fn unlimited() -> Self {
        Self::new(Arc::new(NoopBreaker::new()))
    }

    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self::with_limit(cfg.mem_cap_bytes)
    }

    pub fn breaker(&self) -> &Arc<dyn CircuitBreaker> {
        &self.breaker
    }

    pub fn used_bytes(&self) -> usize {
        self.breaker.used_bytes()
    }

    pub fn limit_bytes(&self) -> usize {
        self.breaker.limit_bytes()
    }

    pub fn peak_bytes(&self) -> usize {
        self.breaker.peak_bytes()
    }

    /// Builder for any store, pre-sized for `estimated_size` values. The hint
    /// is not a cap.
    pub fn new_builder<S: ValueStore>(&self, estimated_size: usize) -> Result<BlockBuilder<S>> {
        let label = S::ELEMENT_TYPE.as_str();
        let bytes = S::bytes_for_capacity(estimated_size).saturating_add(BLOCK_OVERHEAD_BYTES);
        // hints no allocator could honour are refused even by an unlimited breaker
        if bytes > MAX_BLOCK_BYTES {
            return Err(Error::MemoryLimitExceeded {
                label,
                requested: bytes,
                limit: self.limit_bytes().min(MAX_BLOCK_BYTES),
                used: self.used_bytes(),
            });
        }
        let reservation = Reservation::try_new(&self.breaker, bytes, label)?;
        Ok(BlockBuilder::new(S::with_capacity(estimated_size), reservation))
    }

    pub fn new_int_block_builder(&self, estimated_size: usize) -> Result<IntBlockBuilder> {
        self.new_builder(estimated_size)
    }

    pub fn new_long_block_builder(&self, estimated_size: usize) -> Result<LongBlockBuilder> {
        self.new_builder(estimated_size)
    }

    pub fn new_double_block_builder(&self, estimated_size: usize) -> Result<DoubleBlockBuilder> {
        self.new_builder(estimated_size)
    }

    pub fn new_boolean_block_builder(&self, estimated_size: usize) -> Result<BooleanBlockBuilder> {
        self.new_builder(estimated_size)
    }

    pub fn new_bytes_block_builder(&self, estimated_size: usize) -> Result<BytesBlockBuilder> {
        self.new_builder(estimated_size)
    }

    /// Type-erased builder for a kind known only at runtime.
    pub fn new_block_builder(
        &self,
        element_type: ElementType,
        estimated_size: usize,
    ) -> Result<Builder> {
        Ok(match element_type {
            ElementType::Int => Builder::Int(self.new_builder(estimated_size)?),
            ElementType::Long => Builder::Long(self.new_builder(estimated_size)?),
            ElementType::Double => Builder::Double(self.new_builder(estimated_size)?),
            ElementType::Boolean => Builder::Boolean(self.new_builder(estimated_size)?),
            ElementType::Bytes => Builder::Bytes(self.new_builder(estimated_size)?),
        })
    }

    /// Block repeating `value` at every one of `positions`.
    pub fn new_constant_block(&self, value: &Value, positions: usize) -> Result<Block> {
        let mut builder = self.new_block_builder(value.element_type(), positions)?;
        for _ in 0..positions {
            builder.append_value(value.clone())?;
        }
        builder.build()
    }

    /// All-null block of the given kind.
    pub fn new_constant_null_block(
        &self,
        element_type: ElementType,
        positions: usize,
    ) -> Result<Block> {
        // nulls take no value slots
        let mut builder = self.new_block_builder(element_type, 0)?;
        for _ in 0..positions {
            builder.append_null()?;
        }
        builder.build()
    }
}

impl fmt::Debug for BlockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockFactory")
            .field("breaker", &self.breaker.name())
            .field("used_bytes", &self.breaker.used_bytes())
            .field("limit_bytes", &self.breaker.limit_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_below_minimum_reservation_charges_nothing() {
        let factory = BlockFactory::with_limit(BLOCK_OVERHEAD_BYTES - 1);
        let err = factory.new_long_block_builder(0).err().unwrap();
        assert!(matches!(
            err,
            Error::MemoryLimitExceeded {
                label: "long",
                requested: BLOCK_OVERHEAD_BYTES,
                ..
            }
        ));
        assert_eq!(factory.used_bytes(), 0);
        assert_eq!(factory.peak_bytes(), 0);
    }

    #[test]
    fn oversized_hints_are_refused_before_allocating() {
        let factory = BlockFactory::with_limit(1 << 20);
        let long = factory.new_long_block_builder(usize::MAX / 4).err().unwrap();
        assert!(matches!(
            long,
            Error::MemoryLimitExceeded {
                label: "long",
                requested: usize::MAX,
                ..
            }
        ));
        let bytes = factory.new_bytes_block_builder(usize::MAX).err().unwrap();
        assert!(bytes.is_memory_limit());
        assert_eq!(factory.used_bytes(), 0);
        assert_eq!(factory.peak_bytes(), 0);

        let unlimited = BlockFactory::unlimited();
        assert!(unlimited
            .new_long_block_builder(1 << 61)
            .err()
            .unwrap()
            .is_memory_limit());
        assert!(unlimited
            .new_block_builder(ElementType::Double, usize::MAX)
            .err()
            .unwrap()
            .is_memory_limit());
        assert_eq!(unlimited.used_bytes(), 0);
    }

    #[test]
    fn builder_reserves_overhead_plus_hint() {
        let factory = BlockFactory::with_limit(1 << 20);
        let b = factory.new_double_block_builder(10).unwrap();
        assert_eq!(b.estimated_bytes(), BLOCK_OVERHEAD_BYTES + 80);
        assert_eq!(factory.used_bytes(), BLOCK_OVERHEAD_BYTES + 80);
        drop(b);
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn constant_blocks() {
        let factory = BlockFactory::with_limit(1 << 20);
        let block = factory.new_constant_block(&Value::Long(9), 3).unwrap();
        assert_eq!(block.position_count(), 3);
        assert_eq!(block.get_value(2), Some(Value::Long(9)));

        let nulls = factory
            .new_constant_null_block(ElementType::Bytes, 5)
            .unwrap();
        assert_eq!(nulls.element_type(), ElementType::Bytes);
        assert_eq!(nulls.position_count(), 5);
        assert!((0..5).all(|p| nulls.is_null(p)));

        drop(block);
        drop(nulls);
        assert_eq!(factory.used_bytes(), 0);
    }
}
