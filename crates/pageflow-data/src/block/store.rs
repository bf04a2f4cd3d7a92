//! Value storage behind a block.
//!
//! Stores track a *logical* capacity next to the `Vec` they wrap. Accounting
//! is done on that logical capacity, so the bytes charged to the breaker are
//! deterministic and growth can be priced before it happens.

use std::mem::size_of;

use pageflow_core::error::{Error, Result};
use pageflow_core::types::{ElementType, Value};

const MIN_CAPACITY: usize = 8;

/// Capacity to grow to so that `needed` slots fit (about 1.5x growth).
pub(crate) fn grow_capacity(current: usize, needed: usize) -> usize {
    if needed <= current {
        return current;
    }
    needed
        .max(current.saturating_add(current >> 1))
        .max(MIN_CAPACITY)
}

/// Storage for the flattened values of one element kind.
pub trait ValueStore: Sized + Send + Sync + 'static {
    type Item: Clone + Send;

    const ELEMENT_TYPE: ElementType;

    /// Bytes accounted for a store pre-sized to hold `values` values.
    /// Saturates at `usize::MAX` instead of wrapping.
    fn bytes_for_capacity(values: usize) -> usize;

    /// Allocate a store pre-sized to hold `values` values.
    fn with_capacity(values: usize) -> Self;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes accounted at the current logical capacity.
    fn accounted_bytes(&self) -> usize;

    /// Bytes that will be accounted once `item` has been pushed.
    fn bytes_after_push(&self, item: &Self::Item) -> usize;

    fn push(&mut self, item: Self::Item);

    /// Drop spare capacity; accounted bytes follow.
    fn shrink_to_fit(&mut self);

    fn item(&self, index: usize) -> Self::Item;

    fn value(&self, index: usize) -> Value;

    /// Turn a dynamic value into an item, widening integers where allowed.
    fn coerce(value: Value) -> Result<Self::Item>;
}

/// Fixed-width values in one contiguous vector.
#[derive(Debug, Clone)]
pub struct FixedStore<T> {
    values: Vec<T>,
    capacity: usize,
}

impl<T: Copy> FixedStore<T> {
    pub(crate) fn allocate(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn bytes_for(capacity: usize) -> usize {
        capacity.saturating_mul(size_of::<T>())
    }

    /// Accounted bytes once `additional` more values are pushed.
    pub(crate) fn bytes_after(&self, additional: usize) -> usize {
        Self::bytes_for(grow_capacity(self.capacity, self.values.len() + additional))
    }

    pub(crate) fn accounted(&self) -> usize {
        Self::bytes_for(self.capacity)
    }

    pub(crate) fn push_value(&mut self, v: T) {
        let len = self.values.len();
        if len == self.capacity {
            self.capacity = grow_capacity(self.capacity, len + 1);
            self.values.reserve_exact(self.capacity - len);
        }
        self.values.push(v);
    }

    pub(crate) fn shrink(&mut self) {
        self.values.shrink_to_fit();
        self.capacity = self.values.len();
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn get(&self, index: usize) -> T {
        self.values[index]
    }
}

macro_rules! fixed_store {
    ($t:ty, $variant:ident) => {
        impl ValueStore for FixedStore<$t> {
            type Item = $t;

            const ELEMENT_TYPE: ElementType = ElementType::$variant;

            fn bytes_for_capacity(values: usize) -> usize {
                Self::bytes_for(values)
            }

            fn with_capacity(values: usize) -> Self {
                Self::allocate(values)
            }

            fn len(&self) -> usize {
                self.values.len()
            }

            fn accounted_bytes(&self) -> usize {
                self.accounted()
            }

            fn bytes_after_push(&self, _item: &$t) -> usize {
                self.bytes_after(1)
            }

            fn push(&mut self, item: $t) {
                self.push_value(item);
            }

            fn shrink_to_fit(&mut self) {
                self.shrink();
            }

            fn item(&self, index: usize) -> $t {
                self.values[index]
            }

            fn value(&self, index: usize) -> Value {
                Value::$variant(self.values[index])
            }

            fn coerce(value: Value) -> Result<$t> {
                match value.widen_to(ElementType::$variant)? {
                    Value::$variant(v) => Ok(v),
                    other => Err(Error::TypeMismatch {
                        expected: ElementType::$variant,
                        actual: other.element_type(),
                    }),
                }
            }
        }
    };
}

fixed_store!(i32, Int);
fixed_store!(i64, Long);
fixed_store!(f64, Double);
fixed_store!(bool, Boolean);

/// Variable-length byte sequences: one data buffer plus an end-offset table.
#[derive(Debug, Clone)]
pub struct BytesStore {
    /// `offsets[i]..offsets[i + 1]` is value `i`; always starts with `0`.
    offsets: FixedStore<usize>,
    data: Vec<u8>,
    data_capacity: usize,
}

impl BytesStore {
    pub fn get(&self, index: usize) -> &[u8] {
        let start = self.offsets.get(index);
        let end = self.offsets.get(index + 1);
        &self.data[start..end]
    }
}

impl ValueStore for BytesStore {
    type Item = Vec<u8>;

    const ELEMENT_TYPE: ElementType = ElementType::Bytes;

    fn bytes_for_capacity(values: usize) -> usize {
        FixedStore::<usize>::bytes_for(values.saturating_add(1))
    }

    fn with_capacity(values: usize) -> Self {
        let mut offsets = FixedStore::allocate(values + 1);
        offsets.push_value(0);
        Self {
            offsets,
            data: Vec::new(),
            data_capacity: 0,
        }
    }

    fn len(&self) -> usize {
        self.offsets.as_slice().len() - 1
    }

    fn accounted_bytes(&self) -> usize {
        self.offsets.accounted() + self.data_capacity
    }

    fn bytes_after_push(&self, item: &Vec<u8>) -> usize {
        self.offsets.bytes_after(1) + grow_capacity(self.data_capacity, self.data.len() + item.len())
    }

    fn push(&mut self, item: Vec<u8>) {
        let needed = self.data.len() + item.len();
        if needed > self.data_capacity {
            self.data_capacity = grow_capacity(self.data_capacity, needed);
            self.data.reserve_exact(self.data_capacity - self.data.len());
        }
        self.data.extend_from_slice(&item);
        self.offsets.push_value(self.data.len());
    }

    fn shrink_to_fit(&mut self) {
        self.offsets.shrink();
        self.data.shrink_to_fit();
        self.data_capacity = self.data.len();
    }

    fn item(&self, index: usize) -> Vec<u8> {
        self.get(index).to_vec()
    }

    fn value(&self, index: usize) -> Value {
        Value::Bytes(self.item(index))
    }

    fn coerce(value: Value) -> Result<Vec<u8>> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(Error::TypeMismatch {
                expected: ElementType::Bytes,
                actual: other.element_type(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_is_priced_before_it_happens() {
        let mut s = <FixedStore<i64> as ValueStore>::with_capacity(2);
        assert_eq!(s.accounted_bytes(), 16);
        s.push(1);
        assert_eq!(s.bytes_after_push(&2), 16);
        s.push(2);
        let priced = s.bytes_after_push(&3);
        assert_eq!(priced, 8 * MIN_CAPACITY);
        s.push(3);
        assert_eq!(s.accounted_bytes(), priced);
        s.shrink_to_fit();
        assert_eq!(s.accounted_bytes(), 24);
    }

    #[test]
    fn bytes_store_round_trips_slices() {
        let mut s = BytesStore::with_capacity(1);
        s.push(b"abc".to_vec());
        s.push(Vec::new());
        s.push(b"de".to_vec());
        assert_eq!(s.len(), 3);
        assert_eq!(s.get(0), b"abc");
        assert_eq!(s.get(1), b"");
        assert_eq!(s.get(2), b"de");
    }

    #[test]
    fn huge_capacities_saturate_instead_of_wrapping() {
        assert_eq!(<FixedStore<i64> as ValueStore>::bytes_for_capacity(usize::MAX / 4), usize::MAX);
        assert_eq!(BytesStore::bytes_for_capacity(usize::MAX), usize::MAX);
        assert_eq!(<FixedStore<i64> as ValueStore>::bytes_for_capacity(3), 24);
    }

    #[test]
    fn coerce_widens_int_into_long_only() {
        assert_eq!(<FixedStore<i64> as ValueStore>::coerce(Value::Int(4)).unwrap(), 4);
        assert!(<FixedStore<i32> as ValueStore>::coerce(Value::Long(4)).is_err());
        assert!(BytesStore::coerce(Value::Boolean(true)).is_err());
    }
}
