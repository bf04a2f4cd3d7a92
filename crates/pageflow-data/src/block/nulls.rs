//! Per-position null bitmap, allocated lazily on the first null.

use super::store::grow_capacity;

const WORD_BITS: usize = 64;

#[derive(Debug, Clone, Default)]
pub(crate) struct NullMask {
    words: Vec<u64>,
    capacity_words: usize,
}

impl NullMask {
    fn word_of(position: usize) -> (usize, u64) {
        (position / WORD_BITS, 1u64 << (position % WORD_BITS))
    }

    pub(crate) fn accounted_bytes(&self) -> usize {
        self.capacity_words * std::mem::size_of::<u64>()
    }

    /// Accounted bytes once `position` has been marked null.
    pub(crate) fn bytes_after_set(&self, position: usize) -> usize {
        let needed = position / WORD_BITS + 1;
        grow_capacity(self.capacity_words, needed.max(self.words.len())) * std::mem::size_of::<u64>()
    }

    pub(crate) fn set(&mut self, position: usize) {
        let (word, bit) = Self::word_of(position);
        if word >= self.words.len() {
            if word >= self.capacity_words {
                self.capacity_words = grow_capacity(self.capacity_words, word + 1);
                self.words
                    .reserve_exact(self.capacity_words - self.words.len());
            }
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= bit;
    }

    pub(crate) fn is_null(&self, position: usize) -> bool {
        let (word, bit) = Self::word_of(position);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// True if at least one position is null. Only `set` creates words.
    pub(crate) fn any(&self) -> bool {
        !self.words.is_empty()
    }

    pub(crate) fn shrink(&mut self) {
        self.words.shrink_to_fit();
        self.capacity_words = self.words.len();
    }
}
