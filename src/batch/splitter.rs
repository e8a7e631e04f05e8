//! Splits an owned input into contiguous batches

/// A contiguous run of input items processed as one unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// Position of this batch in dispatch order
    pub index: usize,
    /// Index of the batch's first item in the original input
    pub offset: usize,
    /// The items themselves
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    /// Number of items in the batch
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True for a batch without items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Input index range covered by this batch
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.items.len()
    }
}

/// Iterator moving consecutive batches of `batch_size` items out of a vector.
///
/// Only the last batch may be shorter. Empty input yields nothing.
#[derive(Debug)]
pub struct Batches<T> {
    remaining: std::vec::IntoIter<T>,
    batch_size: usize,
    index: usize,
    offset: usize,
}

impl<T> Batches<T> {
    /// Split `items` into batches of `batch_size` (treated as 1 when zero)
    pub fn new(items: Vec<T>, batch_size: usize) -> Self {
        Self {
            remaining: items.into_iter(),
            batch_size: batch_size.max(1),
            index: 0,
            offset: 0,
        }
    }

    /// Number of batches `len` items produce at `batch_size`
    pub fn count_for(len: usize, batch_size: usize) -> usize {
        len.div_ceil(batch_size.max(1))
    }
}

impl<T> Iterator for Batches<T> {
    type Item = Batch<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let items: Vec<T> = self.remaining.by_ref().take(self.batch_size).collect();
        if items.is_empty() {
            return None;
        }

        let batch = Batch { index: self.index, offset: self.offset, items };
        self.index += 1;
        self.offset += batch.len();
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let count = Self::count_for(self.remaining.len(), self.batch_size);
        (count, Some(count))
    }
}

impl<T> ExactSizeIterator for Batches<T> {}

impl<T> std::iter::FusedIterator for Batches<T> {}
