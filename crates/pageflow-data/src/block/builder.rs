//! Append-only, single-use block builders.
//!
//! Every growth of the value store, null bitmap or offset table is priced
//! first and charged to the builder's reservation; only then is the memory
//! allocated. A failed charge leaves the builder exactly as it was.

use pageflow_core::error::{Error, Result};
use pageflow_core::types::{ElementType, Value};
use pageflow_mem::Reservation;

use super::nulls::NullMask;
use super::store::{grow_capacity, FixedStore, ValueStore};
use super::typed::{BlockData, TypedBlock};
use crate::factory::BLOCK_OVERHEAD_BYTES;

pub struct BlockBuilder<S: ValueStore> {
    values: S,
    nulls: NullMask,
    offsets: Option<FixedStore<usize>>,
    position_count: usize,
    /// Value index where the open multi-value entry started.
    entry_start: Option<usize>,
    multivalued: bool,
    reservation: Reservation,
}

impl<S: ValueStore> BlockBuilder<S> {
    /// `reservation` must already cover `values.accounted_bytes()` plus the
    /// fixed block overhead.
    pub(crate) fn new(values: S, reservation: Reservation) -> Self {
        Self {
            values,
            nulls: NullMask::default(),
            offsets: None,
            position_count: 0,
            entry_start: None,
            multivalued: false,
            reservation,
        }
    }

    pub fn element_type(&self) -> ElementType {
        S::ELEMENT_TYPE
    }

    /// Positions appended so far (an open entry is not counted yet).
    pub fn position_count(&self) -> usize {
        self.position_count
    }

    /// Bytes currently charged for this builder.
    pub fn estimated_bytes(&self) -> usize {
        self.reservation.bytes()
    }

    fn offsets_bytes(&self) -> usize {
        self.offsets.as_ref().map_or(0, |o| o.accounted())
    }

    /// Offset-table bytes once one more position has been closed.
    fn offsets_bytes_after_close(&self) -> usize {
        match &self.offsets {
            Some(o) => o.bytes_after(1),
            // materialize `0..=position_count`, then push the new end
            None => FixedStore::<usize>::bytes_for(grow_capacity(0, self.position_count + 2)),
        }
    }

    fn charge(&mut self, values: usize, nulls: usize, offsets: usize) -> Result<()> {
        let projected = BLOCK_OVERHEAD_BYTES
            .saturating_add(values)
            .saturating_add(nulls)
            .saturating_add(offsets);
        if projected > self.reservation.bytes() {
            self.reservation.try_resize(projected)?;
        }
        Ok(())
    }

    /// Switch from the implicit one-value-per-position layout to an explicit
    /// offset table. Only valid while every closed position has one value.
    fn materialize_offsets(&mut self) {
        if self.offsets.is_none() {
            let mut offsets = FixedStore::allocate(grow_capacity(0, self.position_count + 2));
            for p in 0..=self.position_count {
                offsets.push_value(p);
            }
            self.offsets = Some(offsets);
        }
    }

    fn close_position(&mut self) {
        if let Some(offsets) = &mut self.offsets {
            offsets.push_value(self.values.len());
        }
        self.position_count += 1;
    }

    /// Append one value: a new position, or another value of the open entry.
    pub fn append(&mut self, item: S::Item) -> Result<&mut Self> {
        let offsets = if self.entry_start.is_some() {
            self.offsets_bytes()
        } else {
            self.offsets.as_ref().map_or(0, |o| o.bytes_after(1))
        };
        self.charge(
            self.values.bytes_after_push(&item),
            self.nulls.accounted_bytes(),
            offsets,
        )?;
        self.values.push(item);
        if self.entry_start.is_none() {
            self.close_position();
        }
        Ok(self)
    }

    /// Append a dynamically typed value; `TypeMismatch` if it does not fit.
    pub fn append_value(&mut self, value: Value) -> Result<&mut Self> {
        let item = S::coerce(value)?;
        self.append(item)
    }

    /// Append a null position. Consumes no value slot.
    pub fn append_null(&mut self) -> Result<&mut Self> {
        if self.entry_start.is_some() {
            return Err(Error::illegal_state(
                "cannot append a null inside a multi-value entry",
            ));
        }
        self.push_null_position()?;
        Ok(self)
    }

    fn push_null_position(&mut self) -> Result<()> {
        self.charge(
            self.values.accounted_bytes(),
            self.nulls.bytes_after_set(self.position_count),
            self.offsets_bytes_after_close(),
        )?;
        self.materialize_offsets();
        self.nulls.set(self.position_count);
        self.close_position();
        Ok(())
    }

    /// Start a position holding several values.
    pub fn begin_position_entry(&mut self) -> Result<&mut Self> {
        if self.entry_start.is_some() {
            return Err(Error::illegal_state("multi-value entry already open"));
        }
        self.entry_start = Some(self.values.len());
        Ok(self)
    }

    /// Close the open entry. An entry without values is a null position.
    pub fn end_position_entry(&mut self) -> Result<&mut Self> {
        let start = self
            .entry_start
            .ok_or_else(|| Error::illegal_state("no multi-value entry open"))?;
        let count = self.values.len() - start;
        match count {
            0 => {
                self.push_null_position()?;
            }
            1 => {
                self.charge(
                    self.values.accounted_bytes(),
                    self.nulls.accounted_bytes(),
                    self.offsets.as_ref().map_or(0, |o| o.bytes_after(1)),
                )?;
                self.close_position();
            }
            _ => {
                self.charge(
                    self.values.accounted_bytes(),
                    self.nulls.accounted_bytes(),
                    self.offsets_bytes_after_close(),
                )?;
                // the entry starts right after the single-valued positions, so
                // the identity table still describes them
                self.materialize_offsets();
                self.multivalued = true;
                self.close_position();
            }
        }
        self.entry_start = None;
        Ok(self)
    }

    /// Freeze into an immutable block. Spare capacity is trimmed and its
    /// charge handed back before the block takes over the reservation.
    pub fn build(mut self) -> Result<TypedBlock<S>> {
        if self.entry_start.is_some() {
            return Err(Error::illegal_state(
                "cannot build with an open multi-value entry",
            ));
        }
        self.values.shrink_to_fit();
        self.nulls.shrink();
        if let Some(offsets) = &mut self.offsets {
            offsets.shrink();
        }
        let total = BLOCK_OVERHEAD_BYTES
            + self.values.accounted_bytes()
            + self.nulls.accounted_bytes()
            + self.offsets_bytes();
        self.reservation.try_resize(total)?;

        tracing::trace!(
            element_type = %S::ELEMENT_TYPE,
            positions = self.position_count,
            bytes = total,
            "built block"
        );

        Ok(TypedBlock::from_data(BlockData {
            position_count: self.position_count,
            values: self.values,
            nulls: self.nulls,
            offsets: self.offsets,
            multivalued: self.multivalued,
            reservation: self.reservation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use crate::factory::BlockFactory;
    use pageflow_core::error::Error;
    use pageflow_core::types::Value;

    #[test]
    fn nulls_do_not_consume_value_slots() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut b = factory.new_long_block_builder(4).unwrap();
        b.append(10).unwrap();
        b.append_null().unwrap();
        b.append(0).unwrap();
        let block = b.build().unwrap();

        assert_eq!(block.position_count(), 3);
        assert_eq!(block.total_value_count(), 2);
        assert_eq!(block.first(0), Some(10));
        assert!(block.is_null(1));
        assert_eq!(block.first(1), None);
        assert_eq!(block.get_value(1), None);
        assert_eq!(block.first(2), Some(0));
        assert!(!block.is_null(2));
    }

    #[test]
    fn multi_value_entries() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut b = factory.new_int_block_builder(2).unwrap();
        b.append(1).unwrap();
        b.begin_position_entry().unwrap();
        b.append(2).unwrap().append(3).unwrap();
        b.end_position_entry().unwrap();
        b.begin_position_entry().unwrap();
        b.end_position_entry().unwrap();
        b.begin_position_entry().unwrap();
        b.append(4).unwrap();
        b.end_position_entry().unwrap();
        let block = b.build().unwrap();

        assert!(block.may_have_multivalued());
        assert!(block.may_have_nulls());
        assert_eq!(block.position_count(), 4);
        assert_eq!(block.get_values(0), vec![Value::Int(1)]);
        assert_eq!(block.get_values(1), vec![Value::Int(2), Value::Int(3)]);
        assert!(block.is_null(2));
        assert!(block.get_values(2).is_empty());
        assert_eq!(block.value_count(3), 1);
        assert_eq!(block.first(3), Some(4));
    }

    #[test]
    fn entry_misuse_is_illegal_state() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut b = factory.new_double_block_builder(1).unwrap();
        assert!(matches!(b.end_position_entry(), Err(Error::IllegalState(_))));
        b.begin_position_entry().unwrap();
        assert!(matches!(b.begin_position_entry(), Err(Error::IllegalState(_))));
        assert!(matches!(b.append_null(), Err(Error::IllegalState(_))));
        assert!(matches!(b.build(), Err(Error::IllegalState(_))));
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn growth_past_hint_is_charged_and_trimmed_on_build() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut b = factory.new_long_block_builder(1).unwrap();
        let initial = b.estimated_bytes();
        for i in 0..100 {
            b.append(i).unwrap();
        }
        assert!(b.estimated_bytes() > initial);
        assert_eq!(factory.used_bytes(), b.estimated_bytes());
        let block = b.build().unwrap();
        assert_eq!(block.ram_bytes_used(), super::BLOCK_OVERHEAD_BYTES + 100 * 8);
        assert_eq!(factory.used_bytes(), block.ram_bytes_used());
        drop(block);
        assert_eq!(factory.used_bytes(), 0);
    }

    #[test]
    fn failed_growth_leaves_builder_usable() {
        // overhead + 8 longs fit, the growth to 12 does not
        let factory = BlockFactory::with_limit(super::BLOCK_OVERHEAD_BYTES + 8 * 8 + 16);
        let mut b = factory.new_long_block_builder(8).unwrap();
        for i in 0..8 {
            b.append(i).unwrap();
        }
        let err = b.append(8).err().unwrap();
        assert!(err.is_memory_limit());
        assert_eq!(b.position_count(), 8);
        let block = b.build().unwrap();
        assert_eq!(block.values(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn append_value_checks_type_and_widens() {
        let factory = BlockFactory::with_limit(1 << 20);
        let mut b = factory.new_long_block_builder(2).unwrap();
        b.append_value(Value::Int(5)).unwrap();
        let err = b.append_value(Value::Double(1.0)).err().unwrap();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        let block = b.build().unwrap();
        assert_eq!(block.position_count(), 1);
        assert_eq!(block.first(0), Some(5i64));
    }
}
