#![forbid(unsafe_code)]
//! pageflow-data: the columnar data model.
//!
//! - `Block`: immutable typed column, nullable, optionally multi-valued.
//! - `BlockBuilder`: single-use, append-only constructor for one block.
//! - `BlockFactory`: hands out builders and charges every byte they hold to a
//!   shared circuit breaker.
//! - `Page`: position-aligned blocks forming one row batch.
//!
//! Storage is never allocated outside a factory reservation.

pub mod block;
pub mod factory;
pub mod page;

pub use block::{
    Block, BlockBuilder, BooleanBlock, BooleanBlockBuilder, Builder, BytesBlock,
    BytesBlockBuilder, DoubleBlock, DoubleBlockBuilder, IntBlock, IntBlockBuilder, LongBlock,
    LongBlockBuilder, TypedBlock,
};
pub use factory::{BlockFactory, BLOCK_OVERHEAD_BYTES};
pub use page::Page;
