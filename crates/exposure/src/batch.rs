//! Fixed-size windows over a date-ordered work list.

/// Blobs read concurrently within one batch.
pub(crate) const READ_CONCURRENCY: usize = 8;

/// One window of a [`BatchPlan`].
#[derive(Debug)]
pub struct Batch<'a, T> {
    /// Zero-based batch number
    pub index: usize,
    /// Total number of batches in the plan
    pub total: usize,
    pub items: &'a [T],
}

/// Splits candidates into windows of at most `batch_size` items so that only
/// one window is materialised at a time.
#[derive(Debug, Clone)]
pub struct BatchPlan<T> {
    items: Vec<T>,
    batch_size: usize,
}

impl<T> BatchPlan<T> {
    /// A zero batch size is treated as 1.
    pub fn new(items: Vec<T>, batch_size: usize) -> Self {
        Self {
            items,
            batch_size: batch_size.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.items.len().div_ceil(self.batch_size)
    }

    pub fn batches(&self) -> impl Iterator<Item = Batch<'_, T>> {
        let total = self.batch_count();
        self.items
            .chunks(self.batch_size)
            .enumerate()
            .map(move |(index, items)| Batch {
                index,
                total,
                items,
            })
    }
}
