use std::{num::NonZeroUsize, ops::Range};

/// How `total` rows are split among `workers`.
///
/// Every worker gets `ceil(total / workers)` contiguous rows, the trailing partitions absorb
/// the remainder and may be short or empty.
///
/// Properties:
/// - Ranges are contiguous, disjoint and cover `[0..total)`.
/// - A worker whose start is past `total` gets an empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    total: usize,
    workers: NonZeroUsize,
    chunk: usize,
}

impl PartitionPlan {
    pub fn new(total: usize, workers: NonZeroUsize) -> Self {
        Self {
            total,
            workers,
            chunk: total.div_ceil(workers.get()),
        }
    }

    #[inline]
    pub fn total(&self) -> usize {
        self.total
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    /// Rows per partition, the last non empty one may hold fewer.
    #[inline]
    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// The rows of worker `worker`, empty for any worker past the end.
    pub fn range(&self, worker: usize) -> Range<usize> {
        let start = worker.saturating_mul(self.chunk).min(self.total);
        let end = worker
            .saturating_add(1)
            .saturating_mul(self.chunk)
            .min(self.total);
        start..end
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        (0..self.workers()).map(|worker| self.range(worker))
    }
}

/// Splits `total` rows among `workers`.
pub fn partition(total: usize, workers: NonZeroUsize) -> Vec<Range<usize>> {
    PartitionPlan::new(total, workers).ranges().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn remainder_goes_to_the_tail() {
        // total 10, workers 3 => chunk 4, sizes 4,4,2
        assert_eq!(partition(10, nz(3)), vec![0..4, 4..8, 8..10]);
    }

    #[test]
    fn more_workers_than_rows_leaves_empty_partitions() {
        // chunk 1
        assert_eq!(partition(2, nz(4)), vec![0..1, 1..2, 2..2, 2..2]);
        // chunk 2 => the last worker starts past the end
        assert_eq!(partition(5, nz(4)), vec![0..2, 2..4, 4..5, 5..5]);
    }

    #[test]
    fn no_rows_means_only_empty_partitions() {
        let plan = PartitionPlan::new(0, nz(3));
        assert_eq!(plan.chunk(), 0);
        assert!(plan.ranges().all(|r| r.is_empty()));
    }

    #[test]
    fn ranges_are_disjoint_and_cover_everything() {
        for total in 0..40 {
            for workers in 1..9 {
                let ranges = partition(total, nz(workers));
                assert_eq!(ranges.len(), workers);

                let mut next = 0;
                for range in &ranges {
                    assert_eq!(range.start, next, "total {total} workers {workers}");
                    assert!(range.start <= range.end);
                    next = range.end;
                }
                assert_eq!(next, total);
            }
        }
    }

    #[test]
    fn out_of_plan_workers_get_nothing() {
        let plan = PartitionPlan::new(10, nz(2));
        assert!(plan.range(7).is_empty());
        assert!(plan.range(usize::MAX).is_empty());
    }
}
