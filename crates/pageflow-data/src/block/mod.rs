//! Blocks: immutable typed columns over a fixed number of positions.
//!
//! The element kinds form a closed set, so `Block` and `Builder` are enums
//! over generic typed containers rather than trait objects.

mod builder;
mod nulls;
mod store;
mod typed;

pub use builder::BlockBuilder;
pub use store::{BytesStore, FixedStore, ValueStore};
pub use typed::TypedBlock;

use pageflow_core::error::Result;
use pageflow_core::types::{ElementType, Value};

use crate::factory::BlockFactory;

pub type IntBlock = TypedBlock<FixedStore<i32>>;
pub type LongBlock = TypedBlock<FixedStore<i64>>;
pub type DoubleBlock = TypedBlock<FixedStore<f64>>;
pub type BooleanBlock = TypedBlock<FixedStore<bool>>;
pub type BytesBlock = TypedBlock<BytesStore>;

pub type IntBlockBuilder = BlockBuilder<FixedStore<i32>>;
pub type LongBlockBuilder = BlockBuilder<FixedStore<i64>>;
pub type DoubleBlockBuilder = BlockBuilder<FixedStore<f64>>;
pub type BooleanBlockBuilder = BlockBuilder<FixedStore<bool>>;
pub type BytesBlockBuilder = BlockBuilder<BytesStore>;

macro_rules! for_each_kind {
    ($enum:ident, $value:expr, $b:ident => $body:expr) => {
        match $value {
            $enum::Int($b) => $body,
            $enum::Long($b) => $body,
            $enum::Double($b) => $body,
            $enum::Boolean($b) => $body,
            $enum::Bytes($b) => $body,
        }
    };
}

macro_rules! map_each_kind {
    ($enum:ident => $out:ident, $value:expr, $b:ident => $body:expr) => {
        match $value {
            $enum::Int($b) => $body.map($out::Int),
            $enum::Long($b) => $body.map($out::Long),
            $enum::Double($b) => $body.map($out::Double),
            $enum::Boolean($b) => $body.map($out::Boolean),
            $enum::Bytes($b) => $body.map($out::Bytes),
        }
    };
}

/// A column of any element kind. Cloning shares the storage.
#[derive(Debug, Clone)]
pub enum Block {
    Int(IntBlock),
    Long(LongBlock),
    Double(DoubleBlock),
    Boolean(BooleanBlock),
    Bytes(BytesBlock),
}

impl Block {
    pub fn element_type(&self) -> ElementType {
        for_each_kind!(Block, self, b => b.element_type())
    }

    pub fn position_count(&self) -> usize {
        for_each_kind!(Block, self, b => b.position_count())
    }

    pub fn is_null(&self, position: usize) -> bool {
        for_each_kind!(Block, self, b => b.is_null(position))
    }

    pub fn value_count(&self, position: usize) -> usize {
        for_each_kind!(Block, self, b => b.value_count(position))
    }

    pub fn first_value_index(&self, position: usize) -> usize {
        for_each_kind!(Block, self, b => b.first_value_index(position))
    }

    pub fn may_have_nulls(&self) -> bool {
        for_each_kind!(Block, self, b => b.may_have_nulls())
    }

    pub fn may_have_multivalued(&self) -> bool {
        for_each_kind!(Block, self, b => b.may_have_multivalued())
    }

    /// First value at `position`, `None` if null.
    pub fn get_value(&self, position: usize) -> Option<Value> {
        for_each_kind!(Block, self, b => b.get_value(position))
    }

    pub fn get_values(&self, position: usize) -> Vec<Value> {
        for_each_kind!(Block, self, b => b.get_values(position))
    }

    pub fn ram_bytes_used(&self) -> usize {
        for_each_kind!(Block, self, b => b.ram_bytes_used())
    }

    pub fn ref_count(&self) -> usize {
        for_each_kind!(Block, self, b => b.ref_count())
    }

    pub fn filter(&self, factory: &BlockFactory, positions: &[usize]) -> Result<Block> {
        map_each_kind!(Block => Block, self, b => b.filter(factory, positions))
    }

    pub fn as_int(&self) -> Option<&IntBlock> {
        match self {
            Block::Int(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<&LongBlock> {
        match self {
            Block::Long(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<&DoubleBlock> {
        match self {
            Block::Double(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<&BooleanBlock> {
        match self {
            Block::Boolean(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&BytesBlock> {
        match self {
            Block::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<IntBlock> for Block {
    fn from(b: IntBlock) -> Self {
        Block::Int(b)
    }
}

impl From<LongBlock> for Block {
    fn from(b: LongBlock) -> Self {
        Block::Long(b)
    }
}

impl From<DoubleBlock> for Block {
    fn from(b: DoubleBlock) -> Self {
        Block::Double(b)
    }
}

impl From<BooleanBlock> for Block {
    fn from(b: BooleanBlock) -> Self {
        Block::Boolean(b)
    }
}

impl From<BytesBlock> for Block {
    fn from(b: BytesBlock) -> Self {
        Block::Bytes(b)
    }
}

/// A builder of any element kind, for code that only knows the schema at
/// runtime (tuple sources, aggregations).
pub enum Builder {
    Int(IntBlockBuilder),
    Long(LongBlockBuilder),
    Double(DoubleBlockBuilder),
    Boolean(BooleanBlockBuilder),
    Bytes(BytesBlockBuilder),
}

impl Builder {
    pub fn element_type(&self) -> ElementType {
        for_each_kind!(Builder, self, b => b.element_type())
    }

    pub fn position_count(&self) -> usize {
        for_each_kind!(Builder, self, b => b.position_count())
    }

    pub fn append_value(&mut self, value: Value) -> Result<()> {
        for_each_kind!(Builder, self, b => b.append_value(value).map(|_| ()))
    }

    pub fn append_null(&mut self) -> Result<()> {
        for_each_kind!(Builder, self, b => b.append_null().map(|_| ()))
    }

    /// `Some` appends the value, `None` appends a null.
    pub fn append_option(&mut self, value: Option<Value>) -> Result<()> {
        match value {
            Some(v) => self.append_value(v),
            None => self.append_null(),
        }
    }

    pub fn begin_position_entry(&mut self) -> Result<()> {
        for_each_kind!(Builder, self, b => b.begin_position_entry().map(|_| ()))
    }

    pub fn end_position_entry(&mut self) -> Result<()> {
        for_each_kind!(Builder, self, b => b.end_position_entry().map(|_| ()))
    }

    pub fn build(self) -> Result<Block> {
        map_each_kind!(Builder => Block, self, b => b.build())
    }
}
