use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::Sigmoid};

/// A fully connected layer whose parameters live outside of it.
///
/// The layer keeps no forward metadata, every pass hands its intermediate arrays back to the
/// caller. This keeps `forward` and `backward` on `&self`, so one layer may serve several
/// threads at once.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Sigmoid,
    size: usize,
}

/// The arrays a forward pass leaves behind for the backward pass.
#[derive(Debug)]
pub struct Trace {
    pub z: Array2<f32>,
    pub a: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of inputs and outputs of the layer.
    /// * `act_fn` - The activation applied to every output.
    pub fn new(dim: (usize, usize), act_fn: Sigmoid) -> Self {
        Self {
            dim,
            act_fn,
            size: (dim.0 + 1) * dim.1,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the amount of inputs and outputs of this layer.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Computes `z = x·w + b` and its activation.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `x` - The input, one row per sample.
    pub fn forward(&self, params: &[f32], x: ArrayView2<f32>) -> Result<Trace> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "layer inputs",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let mut z = x.dot(&w);
        z += &b;

        let act_fn = self.act_fn;
        let a = z.mapv(|z| act_fn.f(z));
        Ok(Trace { z, a })
    }

    /// Writes this layer's gradient into `grad` and returns the delta for the previous layer.
    ///
    /// # Arguments
    /// * `params` - This layer's slice of parameters.
    /// * `grad` - This layer's slice of the gradient, overwritten.
    /// * `x` - The input this layer received on the forward pass.
    /// * `z` - The pre activation output of the forward pass.
    /// * `d` - The derivative of the loss with respect to this layer's activated output.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        x: ArrayView2<f32>,
        z: ArrayView2<f32>,
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        let act_fn = self.act_fn;
        d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 0.0, &mut dw);
        db.assign(&d.sum_axis(Axis(0)));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        let got = grad.len();
        let mismatch = || MlErr::SizeMismatch {
            what: "layer gradient",
            got,
            expected: self.size,
        };
        if got != self.size {
            return Err(mismatch());
        }

        let (dw_raw, db_raw) = grad.split_at_mut(self.size - self.dim.1);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).map_err(|_| mismatch())?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).map_err(|_| mismatch())?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let got = params.len();
        let mismatch = || MlErr::SizeMismatch {
            what: "layer parameters",
            got,
            expected: self.size,
        };
        if got != self.size {
            return Err(mismatch());
        }

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let w = ArrayView2::from_shape(self.dim, w_raw).map_err(|_| mismatch())?;
        let b = ArrayView1::from_shape(self.dim.1, b_raw).map_err(|_| mismatch())?;
        Ok((w, b))
    }
}
