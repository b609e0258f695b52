use std::ops::Range;

use machine_learning::Batch;
use ndarray::{ArrayView1, ArrayView2, s};

use super::{FEATURES, Sample, WIDTH};
use crate::{OrchestraErr, Result};

/// Whether [`DatasetMatrix::push`] stored the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Admission {
    Accepted,
    /// The matrix was already at capacity, the row was dropped and the matrix marked truncated.
    Rejected,
}

/// Dense row major storage of normalized rows, [`WIDTH`] values each.
///
/// At most `capacity` rows are ever stored. Only the populated prefix can be read back.
#[derive(Debug, Clone, Default)]
pub struct DatasetMatrix {
    data: Vec<f32>,
    rows: usize,
    capacity: usize,
    truncated: bool,
}

impl DatasetMatrix {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            capacity,
            truncated: false,
        }
    }

    /// Appends a normalized row, its label (or `0.0` when unlabeled) goes in the trailing column.
    pub fn push(&mut self, sample: &Sample) -> Admission {
        if self.is_full() {
            self.truncated = true;
            return Admission::Rejected;
        }

        self.data.extend_from_slice(sample.features());
        self.data.push(sample.label().map_or(0.0, f32::from));
        self.rows += 1;
        Admission::Accepted
    }

    /// Replaces the content with `raw`, a row major buffer as produced by [`Self::populated`].
    pub fn fill_from_raw(&mut self, raw: &[f32]) -> Result<()> {
        if raw.len() % WIDTH != 0 {
            return Err(OrchestraErr::Protocol(format!(
                "received {} values, not a multiple of the row width {WIDTH}",
                raw.len()
            )));
        }

        let rows = raw.len() / WIDTH;
        if rows > self.capacity {
            return Err(OrchestraErr::Protocol(format!(
                "received {rows} rows for a matrix of capacity {}",
                self.capacity
            )));
        }

        self.data.clear();
        self.data.extend_from_slice(raw);
        self.rows = rows;
        self.truncated = false;
        Ok(())
    }

    /// Empties the matrix, keeping its allocation.
    pub fn clear(&mut self) {
        self.data.clear();
        self.rows = 0;
        self.truncated = false;
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.rows >= self.capacity
    }

    /// Whether rows were dropped because the matrix was at capacity.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub(crate) fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    /// Every populated value, row after row.
    pub fn populated(&self) -> &[f32] {
        &self.data[..self.rows * WIDTH]
    }

    /// The raw values of the rows in `range`, `None` if it reaches past the populated rows.
    pub fn raw_rows(&self, range: Range<usize>) -> Option<&[f32]> {
        if range.start > range.end || range.end > self.rows {
            return None;
        }

        Some(&self.data[range.start * WIDTH..range.end * WIDTH])
    }

    pub fn row(&self, index: usize) -> Option<&[f32]> {
        self.raw_rows(index..index + 1)
    }

    /// The features of the rows in `range`, one row per sample.
    pub fn features(&self, range: Range<usize>) -> Option<ArrayView2<'_, f32>> {
        let view = self.view(range)?;
        Some(view.slice_move(s![.., ..FEATURES]))
    }

    /// The labels of the rows in `range`.
    pub fn labels(&self, range: Range<usize>) -> Option<ArrayView1<'_, f32>> {
        let view = self.view(range)?;
        Some(view.slice_move(s![.., FEATURES]))
    }

    /// The rows in `range` as a batch for the model.
    pub fn batch(&self, range: Range<usize>) -> Option<Batch<'_>> {
        let features = self.features(range.clone())?;
        let labels = self.labels(range)?;
        Some(Batch { x: features, labels })
    }

    fn view(&self, range: Range<usize>) -> Option<ArrayView2<'_, f32>> {
        let rows = range.len();
        let raw = self.raw_rows(range)?;
        ArrayView2::from_shape((rows, WIDTH), raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{RowLayout, sample::tests::raw_row};

    fn sample(label: u8, hot: usize) -> Sample {
        RowLayout::Labeled.normalize(&raw_row(Some(label), hot)).unwrap()
    }

    #[test]
    fn push_stops_at_capacity() {
        let mut matrix = DatasetMatrix::new(2);

        assert_eq!(matrix.push(&sample(1, 0)), Admission::Accepted);
        assert_eq!(matrix.push(&sample(2, 1)), Admission::Accepted);
        assert!(!matrix.truncated());
        assert_eq!(matrix.push(&sample(3, 2)), Admission::Rejected);

        assert!(matrix.truncated());
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.populated().len(), 2 * WIDTH);
    }

    #[test]
    fn label_lives_in_the_trailing_column() {
        let mut matrix = DatasetMatrix::new(4);
        let _ = matrix.push(&sample(7, 10));

        let row = matrix.row(0).unwrap();
        assert_eq!(row[10], 1.0);
        assert_eq!(row[FEATURES], 7.0);
    }

    #[test]
    fn unlabeled_rows_get_a_zero_label() {
        let mut matrix = DatasetMatrix::new(1);
        let unlabeled = RowLayout::Unlabeled.normalize(&raw_row(None, 3)).unwrap();
        let _ = matrix.push(&unlabeled);

        assert_eq!(matrix.row(0).unwrap()[FEATURES], 0.0);
    }

    #[test]
    fn unpopulated_rows_are_not_readable() {
        let mut matrix = DatasetMatrix::new(10);
        let _ = matrix.push(&sample(1, 0));

        assert!(matrix.row(1).is_none());
        assert!(matrix.raw_rows(0..2).is_none());
        assert!(matrix.features(0..2).is_none());
        assert_eq!(matrix.features(1..1).unwrap().nrows(), 0);
    }

    #[test]
    fn batch_views_split_features_and_labels() {
        let mut matrix = DatasetMatrix::new(3);
        for (label, hot) in [(4, 0), (5, 1), (6, 2)] {
            let _ = matrix.push(&sample(label, hot));
        }

        let batch = matrix.batch(1..3).unwrap();
        assert_eq!(batch.x.dim(), (2, FEATURES));
        assert_eq!(batch.labels.to_vec(), vec![5.0, 6.0]);
        assert_eq!(batch.x[[0, 1]], 1.0);
    }

    #[test]
    fn fill_from_raw_round_trips_the_populated_prefix() {
        let mut source = DatasetMatrix::new(3);
        let _ = source.push(&sample(1, 0));
        let _ = source.push(&sample(2, 1));

        let mut copy = DatasetMatrix::new(3);
        copy.fill_from_raw(source.populated()).unwrap();
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.populated(), source.populated());

        assert!(copy.fill_from_raw(&[0.0; WIDTH + 1]).is_err());
        assert!(DatasetMatrix::new(1).fill_from_raw(source.populated()).is_err());
    }

    #[test]
    fn clear_forgets_rows_and_truncation() {
        let mut matrix = DatasetMatrix::new(1);
        let _ = matrix.push(&sample(1, 0));
        let _ = matrix.push(&sample(1, 0));
        matrix.clear();

        assert!(matrix.is_empty());
        assert!(!matrix.truncated());
    }
}
