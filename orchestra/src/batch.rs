use std::{num::NonZeroUsize, ops::Range};

use machine_learning::Batch;
use ndarray::ArrayView2;

use crate::data::{DatasetMatrix, Sample};

/// Lifecycle of the accumulator's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Empty,
    Filling,
    /// A full batch was handed out, the buffer is reset on the next `accumulate`.
    Full,
    /// The trailing partial batch was handed out by `finish`.
    Flushed,
}

/// Why a batch was handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flush {
    Full,
    Partial,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchStats {
    pub full: usize,
    pub partial: usize,
    pub samples: usize,
}

/// Gathers streamed samples into a reusable buffer of `capacity` rows.
///
/// A dispatched batch borrows the accumulator, so the buffer can't be refilled while anyone is
/// still reading it.
#[derive(Debug)]
pub struct BatchAccumulator {
    buf: DatasetMatrix,
    state: BatchState,
    stats: BatchStats,
    first_row: usize,
}

/// A dispatched batch.
#[derive(Debug, Clone, Copy)]
pub struct BatchView<'a> {
    buf: &'a DatasetMatrix,
    flush: Flush,
    first_row: usize,
}

impl BatchAccumulator {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            buf: DatasetMatrix::new(capacity.get()),
            state: BatchState::Empty,
            stats: BatchStats::default(),
            first_row: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn state(&self) -> BatchState {
        self.state
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Adds `sample` to the buffer.
    ///
    /// # Returns
    /// The batch once it reached capacity.
    pub fn accumulate(&mut self, sample: &Sample) -> Option<BatchView<'_>> {
        self.release();

        let _ = self.buf.push(sample);
        self.stats.samples += 1;

        if self.buf.is_full() {
            self.state = BatchState::Full;
            self.stats.full += 1;
            return Some(self.view(Flush::Full));
        }

        self.state = BatchState::Filling;
        None
    }

    /// Ends the stream.
    ///
    /// # Returns
    /// The trailing partial batch, if any sample is still waiting in the buffer.
    pub fn finish(&mut self) -> Option<BatchView<'_>> {
        if self.state != BatchState::Filling {
            self.release();
            return None;
        }

        self.state = BatchState::Flushed;
        self.stats.partial += 1;
        Some(self.view(Flush::Partial))
    }

    fn release(&mut self) {
        if matches!(self.state, BatchState::Full | BatchState::Flushed) {
            self.first_row += self.buf.len();
            self.buf.clear();
            self.state = BatchState::Empty;
        }
    }

    fn view(&self, flush: Flush) -> BatchView<'_> {
        BatchView {
            buf: &self.buf,
            flush,
            first_row: self.first_row,
        }
    }
}

impl<'a> BatchView<'a> {
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn flush(&self) -> Flush {
        self.flush
    }

    /// Global index, within the stream, of the first row of this batch.
    pub fn first_row(&self) -> usize {
        self.first_row
    }

    pub fn rows(&self) -> Range<usize> {
        0..self.len()
    }

    pub fn row(&self, index: usize) -> Option<&'a [f32]> {
        self.buf.row(index)
    }

    pub fn features(&self, range: Range<usize>) -> Option<ArrayView2<'a, f32>> {
        self.buf.features(range)
    }

    pub fn batch(&self, range: Range<usize>) -> Option<Batch<'a>> {
        self.buf.batch(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RowLayout, sample::tests::raw_row};

    fn sample(hot: usize) -> Sample {
        RowLayout::Labeled.normalize(&raw_row(Some(1), hot)).unwrap()
    }

    /// Streams `n` samples and returns the sizes and first rows of every dispatched batch.
    fn stream(n: usize, capacity: usize) -> (Vec<(Flush, usize, usize)>, BatchStats) {
        let mut acc = BatchAccumulator::new(NonZeroUsize::new(capacity).unwrap());
        let mut dispatched = Vec::new();

        for i in 0..n {
            if let Some(batch) = acc.accumulate(&sample(i % 784)) {
                dispatched.push((batch.flush(), batch.len(), batch.first_row()));
            }
        }
        if let Some(batch) = acc.finish() {
            dispatched.push((batch.flush(), batch.len(), batch.first_row()));
        }

        (dispatched, acc.stats())
    }

    #[test]
    fn multiple_of_capacity_has_no_partial_flush() {
        let (dispatched, stats) = stream(9, 3);
        assert_eq!(
            dispatched,
            vec![(Flush::Full, 3, 0), (Flush::Full, 3, 3), (Flush::Full, 3, 6)]
        );
        assert_eq!(stats, BatchStats { full: 3, partial: 0, samples: 9 });
    }

    #[test]
    fn remainder_is_flushed_once() {
        let (dispatched, stats) = stream(8, 3);
        assert_eq!(
            dispatched,
            vec![(Flush::Full, 3, 0), (Flush::Full, 3, 3), (Flush::Partial, 2, 6)]
        );
        assert_eq!(stats, BatchStats { full: 2, partial: 1, samples: 8 });
    }

    #[test]
    fn empty_stream_dispatches_nothing() {
        let (dispatched, stats) = stream(0, 3);
        assert!(dispatched.is_empty());
        assert_eq!(stats, BatchStats::default());
    }

    #[test]
    fn finish_twice_never_flushes_twice() {
        let mut acc = BatchAccumulator::new(NonZeroUsize::new(4).unwrap());
        assert!(acc.accumulate(&sample(0)).is_none());
        assert_eq!(acc.state(), BatchState::Filling);

        assert_eq!(acc.finish().map(|b| b.len()), Some(1));
        assert_eq!(acc.state(), BatchState::Flushed);
        assert!(acc.finish().is_none());
        assert_eq!(acc.state(), BatchState::Empty);
    }

    #[test]
    fn buffer_is_reused_between_batches() {
        let mut acc = BatchAccumulator::new(NonZeroUsize::new(2).unwrap());
        assert!(acc.accumulate(&sample(0)).is_none());
        let first = acc.accumulate(&sample(1)).unwrap();
        assert_eq!(first.row(1).unwrap()[1], 1.0);

        assert!(acc.accumulate(&sample(2)).is_none());
        let second = acc.finish().unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second.row(0).unwrap()[2], 1.0);
        assert_eq!(second.first_row(), 2);
    }
}
