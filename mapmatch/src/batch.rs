/// The API rejects requests with more waypoints than this.
pub const MAX_WAYPOINTS_PER_REQUEST: usize = 1000;

/// One contiguous slice of the input, numbered from 1 in submission order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Batch<'a, T> {
    pub number: usize,
    pub total: usize,
    pub items: &'a [T],
}

impl<'a, T> Batch<'a, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// How many batches of at most `max_per_batch` items are needed. A limit of 0 is treated as 1.
pub fn num_batches(num_items: usize, max_per_batch: usize) -> usize {
    let max = max_per_batch.max(1);
    (num_items + max - 1) / max
}

/// Splits `items` into consecutive batches of `max_per_batch`; only the last one may be shorter.
pub fn batches<T>(items: &[T], max_per_batch: usize) -> impl Iterator<Item = Batch<'_, T>> {
    let max = max_per_batch.max(1);
    let total = num_batches(items.len(), max);
    items
        .chunks(max)
        .enumerate()
        .map(move |(idx, items)| Batch {
            number: idx + 1,
            total,
            items,
        })
}
