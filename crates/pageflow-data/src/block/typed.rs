//! Immutable, reference-counted block of one element kind.

use std::fmt;
use std::sync::Arc;

use pageflow_core::error::{Error, Result};
use pageflow_core::types::{ElementType, Value};
use pageflow_mem::Reservation;

use super::nulls::NullMask;
use super::store::{BytesStore, FixedStore, ValueStore};
use crate::factory::BlockFactory;

/// Frozen storage of a block. Owned by exactly one `Arc`; the reservation is
/// released when the last `TypedBlock` pointing at it drops.
pub(crate) struct BlockData<S> {
    pub(crate) position_count: usize,
    pub(crate) values: S,
    pub(crate) nulls: NullMask,
    /// `offsets[p]..offsets[p + 1]` are the values of position `p`. Absent
    /// while every position holds exactly one value.
    pub(crate) offsets: Option<FixedStore<usize>>,
    pub(crate) multivalued: bool,
    pub(crate) reservation: Reservation,
}

pub struct TypedBlock<S: ValueStore> {
    data: Arc<BlockData<S>>,
}

impl<S: ValueStore> Clone for TypedBlock<S> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<S: ValueStore> TypedBlock<S> {
    pub(crate) fn from_data(data: BlockData<S>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn element_type(&self) -> ElementType {
        S::ELEMENT_TYPE
    }

    pub fn position_count(&self) -> usize {
        self.data.position_count
    }

    /// Total number of values across all positions.
    pub fn total_value_count(&self) -> usize {
        self.data.values.len()
    }

    fn check_position(&self, position: usize) {
        assert!(
            position < self.data.position_count,
            "position {position} out of range for block of {} positions",
            self.data.position_count
        );
    }

    /// Panics if `position >= position_count()`.
    pub fn is_null(&self, position: usize) -> bool {
        self.check_position(position);
        self.data.nulls.is_null(position)
    }

    pub fn may_have_nulls(&self) -> bool {
        self.data.nulls.any()
    }

    pub fn may_have_multivalued(&self) -> bool {
        self.data.multivalued
    }

    /// Index into the flattened values of the first value at `position`.
    pub fn first_value_index(&self, position: usize) -> usize {
        self.check_position(position);
        match &self.data.offsets {
            Some(offsets) => offsets.get(position),
            None => position,
        }
    }

    /// Number of values at `position`; zero for a null position.
    pub fn value_count(&self, position: usize) -> usize {
        self.check_position(position);
        match &self.data.offsets {
            Some(offsets) => offsets.get(position + 1) - offsets.get(position),
            None => 1,
        }
    }

    /// The value at `value_index` of the flattened value array.
    pub fn item(&self, value_index: usize) -> S::Item {
        self.data.values.item(value_index)
    }

    /// First value at `position`, or `None` if the position is null.
    pub fn get_value(&self, position: usize) -> Option<Value> {
        if self.value_count(position) == 0 {
            return None;
        }
        Some(self.data.values.value(self.first_value_index(position)))
    }

    /// Every value at `position`; empty for a null position.
    pub fn get_values(&self, position: usize) -> Vec<Value> {
        let first = self.first_value_index(position);
        (first..first + self.value_count(position))
            .map(|i| self.data.values.value(i))
            .collect()
    }

    /// Bytes this block holds against the breaker.
    pub fn ram_bytes_used(&self) -> usize {
        self.data.reservation.bytes()
    }

    /// Number of live handles sharing this block's storage.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    /// New block holding `positions` of this one, in order; repeats allowed.
    pub fn filter(&self, factory: &BlockFactory, positions: &[usize]) -> Result<Self> {
        let len = self.position_count();
        if let Some(&bad) = positions.iter().find(|&&p| p >= len) {
            return Err(Error::IndexOutOfRange { index: bad, len });
        }
        let mut builder = factory.new_builder::<S>(positions.len())?;
        for &p in positions {
            match self.value_count(p) {
                0 => {
                    builder.append_null()?;
                }
                1 => {
                    builder.append(self.item(self.first_value_index(p)))?;
                }
                n => {
                    let first = self.first_value_index(p);
                    builder.begin_position_entry()?;
                    for i in first..first + n {
                        builder.append(self.item(i))?;
                    }
                    builder.end_position_entry()?;
                }
            }
        }
        builder.build()
    }
}

impl<T> TypedBlock<FixedStore<T>>
where
    T: Copy,
    FixedStore<T>: ValueStore<Item = T>,
{
    /// The value at `value_index` of the flattened value array.
    pub fn get(&self, value_index: usize) -> T {
        self.data.values.get(value_index)
    }

    /// First value at `position`, or `None` if null.
    pub fn first(&self, position: usize) -> Option<T> {
        if self.value_count(position) == 0 {
            None
        } else {
            Some(self.get(self.first_value_index(position)))
        }
    }

    /// The flattened values, excluding null positions.
    pub fn values(&self) -> &[T] {
        self.data.values.as_slice()
    }
}

impl TypedBlock<BytesStore> {
    pub fn get(&self, value_index: usize) -> &[u8] {
        self.data.values.get(value_index)
    }

    pub fn first(&self, position: usize) -> Option<&[u8]> {
        if self.value_count(position) == 0 {
            None
        } else {
            Some(self.get(self.first_value_index(position)))
        }
    }
}

impl<S: ValueStore> fmt::Debug for TypedBlock<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("element_type", &S::ELEMENT_TYPE)
            .field("positions", &self.data.position_count)
            .field("values", &self.data.values.len())
            .field("ram_bytes", &self.data.reservation.bytes())
            .finish()
    }
}
