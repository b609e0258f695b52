use std::ops::Range;

use ndarray::{ArrayView1, ArrayView2, s};

use crate::{MlErr, Result};

/// A batch of samples: one row of features per sample and its label as a class index.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    pub x: ArrayView2<'a, f32>,
    pub labels: ArrayView1<'a, f32>,
}

impl<'a> Batch<'a> {
    /// Pairs a feature matrix with its labels, both must have the same amount of rows.
    pub fn new(x: ArrayView2<'a, f32>, labels: ArrayView1<'a, f32>) -> Result<Self> {
        if x.nrows() != labels.len() {
            return Err(MlErr::SizeMismatch {
                what: "batch labels",
                got: labels.len(),
                expected: x.nrows(),
            });
        }

        Ok(Self { x, labels })
    }

    pub fn len(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The rows in `range` as a batch of their own.
    ///
    /// # Panics
    /// If `range` exceeds the batch.
    pub fn slice(self, range: Range<usize>) -> Batch<'a> {
        Batch {
            x: self.x.slice_move(s![range.clone(), ..]),
            labels: self.labels.slice_move(s![range]),
        }
    }
}

/// A model that maps feature rows to class indices and learns from labeled batches.
///
/// The gradient is computed on `&self` so it may be split across threads and summed.
pub trait Classifier: Send + Sync {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Computes the gradient of the loss over `batch`, summed over its rows, into `grad`.
    ///
    /// # Returns
    /// The loss summed over the rows of the batch.
    fn gradient(&self, batch: Batch<'_>, grad: &mut [f32]) -> Result<f32>;

    /// Takes one optimization step with a gradient that was summed over `rows` samples.
    fn apply_gradient(&mut self, grad: &[f32], rows: usize, learning_rate: f32) -> Result<()>;

    /// Returns the most likely class of every row of `x`.
    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<u8>>;

    /// One gradient step over the whole `batch`.
    ///
    /// # Returns
    /// The mean loss of the batch.
    fn train(&mut self, batch: Batch<'_>, learning_rate: f32) -> Result<f32> {
        if batch.is_empty() {
            return Ok(0.0);
        }

        let mut grad = vec![0.0; self.size()];
        let loss = self.gradient(batch, &mut grad)?;
        self.apply_gradient(&grad, batch.len(), learning_rate)?;
        Ok(loss / batch.len() as f32)
    }
}
