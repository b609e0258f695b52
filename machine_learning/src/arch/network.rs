use std::ops::Range;

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{
    Batch, Classifier,
    activations::Sigmoid,
    layers::{Dense, Trace},
    loss::{LossFn, Mse},
};
use crate::{MlErr, Result, optimization::{GradientDescent, Optimizer}};

/// A sequential stack of sigmoid activated dense layers trained against one hot targets.
///
/// Every parameter lives in a single flat buffer, each layer owning a contiguous range of it,
/// so a whole model travels as one slice.
#[derive(Debug, Clone)]
pub struct Network {
    layers: Vec<Dense>,
    ranges: Vec<Range<usize>>,
    params: Vec<f32>,
    loss_fn: Mse,
}

impl Network {
    /// Creates a new `Network` with seeded random weights and zeroed biases.
    ///
    /// # Arguments
    /// * `dims` - The width of every layer, inputs first and classes last.
    /// * `seed` - The seed for the weight initialization.
    ///
    /// # Returns
    /// A new `Network` or an error if the topology has less than two layers, an empty layer or
    /// more than 256 classes.
    pub fn new(dims: &[usize], seed: u64) -> Result<Self> {
        let valid = dims.len() >= 2
            && dims.iter().all(|&d| d > 0)
            && dims.last().is_some_and(|&classes| classes <= 256);
        if !valid {
            return Err(MlErr::InvalidTopology {
                dims: dims.to_vec(),
            });
        }

        let layers: Vec<_> = dims
            .windows(2)
            .map(|w| Dense::new((w[0], w[1]), Sigmoid::default()))
            .collect();

        let mut ranges = Vec::with_capacity(layers.len());
        let mut offset = 0;
        for layer in &layers {
            ranges.push(offset..offset + layer.size());
            offset += layer.size();
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = Vec::with_capacity(offset);
        for layer in &layers {
            let (inputs, outputs) = layer.dim();
            let scale = 1.0 / (inputs as f32).sqrt();
            params.extend((0..inputs * outputs).map(|_| (rng.random::<f32>() * 2.0 - 1.0) * scale));
            params.extend(std::iter::repeat_n(0.0, outputs));
        }

        Ok(Self {
            layers,
            ranges,
            params,
            loss_fn: Mse::new(),
        })
    }

    /// A digit classifier over flattened 28x28 images with one hidden layer.
    pub fn digits(hidden: usize, seed: u64) -> Result<Self> {
        Self::new(&[784, hidden, 10], seed)
    }

    /// Returns the amount of features a row must have.
    pub fn inputs(&self) -> usize {
        self.layers.first().map_or(0, |layer| layer.dim().0)
    }

    /// Returns the amount of classes predicted.
    pub fn classes(&self) -> usize {
        self.layers.last().map_or(0, |layer| layer.dim().1)
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    fn check_inputs(&self, x: ArrayView2<f32>) -> Result<()> {
        if x.ncols() != self.inputs() {
            return Err(MlErr::SizeMismatch {
                what: "features",
                got: x.ncols(),
                expected: self.inputs(),
            });
        }

        Ok(())
    }

    fn forward(&self, x: ArrayView2<f32>) -> Result<Vec<Trace>> {
        let mut traces: Vec<Trace> = Vec::with_capacity(self.layers.len());

        for (layer, range) in self.layers.iter().zip(&self.ranges) {
            let params = &self.params[range.clone()];
            let trace = match traces.last() {
                Some(prev) => layer.forward(params, prev.a.view())?,
                None => layer.forward(params, x)?,
            };
            traces.push(trace);
        }

        Ok(traces)
    }

    fn one_hot(&self, labels: ArrayView1<f32>) -> Result<Array2<f32>> {
        let classes = self.classes();
        let mut targets = Array2::zeros((labels.len(), classes));

        for (row, (&label, mut target)) in labels.iter().zip(targets.rows_mut()).enumerate() {
            let valid = label >= 0.0 && label.fract() == 0.0 && (label as usize) < classes;
            if !valid {
                return Err(MlErr::InvalidLabel {
                    row,
                    label,
                    classes,
                });
            }

            target[label as usize] = 1.0;
        }

        Ok(targets)
    }
}

impl Classifier for Network {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn gradient(&self, batch: Batch<'_>, grad: &mut [f32]) -> Result<f32> {
        if grad.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: self.size(),
            });
        }
        self.check_inputs(batch.x)?;

        if batch.is_empty() {
            grad.fill(0.0);
            return Ok(0.0);
        }

        let y = self.one_hot(batch.labels)?;
        let traces = self.forward(batch.x)?;
        let Some(last) = traces.last() else {
            return Ok(0.0);
        };

        let loss = self.loss_fn.loss(last.a.view(), y.view());
        let mut d = self.loss_fn.loss_prime(last.a.view(), y.view());

        for i in (0..self.layers.len()).rev() {
            let range = self.ranges[i].clone();
            let x = match i {
                0 => batch.x,
                _ => traces[i - 1].a.view(),
            };

            d = self.layers[i].backward(
                &self.params[range.clone()],
                &mut grad[range],
                x,
                traces[i].z.view(),
                d,
            )?;
        }

        Ok(loss)
    }

    fn apply_gradient(&mut self, grad: &[f32], rows: usize, learning_rate: f32) -> Result<()> {
        if grad.len() != self.size() {
            return Err(MlErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: self.size(),
            });
        }

        if rows == 0 {
            return Ok(());
        }

        GradientDescent::new(learning_rate / rows as f32).update_params(&mut self.params, grad);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<'_, f32>) -> Result<Vec<u8>> {
        self.check_inputs(x)?;

        if x.nrows() == 0 {
            return Ok(Vec::new());
        }

        let traces = self.forward(x)?;
        let Some(last) = traces.last() else {
            return Ok(Vec::new());
        };

        let predictions = last
            .a
            .axis_iter(Axis(0))
            .map(|row| {
                let (class, _) = row.iter().enumerate().fold(
                    (0, f32::NEG_INFINITY),
                    |best, (class, &p)| if p > best.1 { (class, p) } else { best },
                );
                class as u8
            })
            .collect();

        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array1, array};

    use super::*;

    fn tiny() -> Network {
        Network::new(&[3, 4, 2], 7).unwrap()
    }

    #[test]
    fn topology_must_have_two_layers() {
        assert!(matches!(
            Network::new(&[784], 0),
            Err(MlErr::InvalidTopology { .. })
        ));
        assert!(matches!(
            Network::new(&[784, 0, 10], 0),
            Err(MlErr::InvalidTopology { .. })
        ));
    }

    #[test]
    fn digits_have_one_hidden_layer() {
        let net = Network::digits(32, 0).unwrap();
        assert_eq!(net.inputs(), 784);
        assert_eq!(net.classes(), 10);
        assert_eq!(net.size(), 785 * 32 + 33 * 10);
    }

    #[test]
    fn same_seed_same_weights() {
        assert_eq!(tiny().params(), tiny().params());
        assert_ne!(tiny().params(), Network::new(&[3, 4, 2], 8).unwrap().params());
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let net = tiny();
        let x = Array2::zeros((2, 3));
        let labels = array![1.0f32, 2.0];
        let batch = Batch::new(x.view(), labels.view()).unwrap();
        let mut grad = vec![0.0; net.size()];

        assert_eq!(
            net.gradient(batch, &mut grad),
            Err(MlErr::InvalidLabel {
                row: 1,
                label: 2.0,
                classes: 2
            })
        );
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let net = tiny();
        let x = Array2::zeros((1, 4));
        assert!(matches!(
            net.predict(x.view()),
            Err(MlErr::SizeMismatch { what: "features", .. })
        ));
    }

    #[test]
    fn empty_input_predicts_nothing() {
        let net = tiny();
        let x = Array2::zeros((0, 3));
        assert_eq!(net.predict(x.view()).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let net = tiny();
        let x = array![[0.2f32, -0.4, 0.9], [1.0, 0.5, -0.3], [-0.7, 0.1, 0.4]];
        let labels = array![0.0f32, 1.0, 1.0];
        let batch = Batch::new(x.view(), labels.view()).unwrap();

        let mut grad = vec![0.0; net.size()];
        net.gradient(batch, &mut grad).unwrap();

        let eps = 1e-2;
        let mut scratch = vec![0.0; net.size()];
        for i in 0..net.size() {
            let mut plus = net.clone();
            plus.params[i] += eps;
            let mut minus = net.clone();
            minus.params[i] -= eps;

            let numeric = (plus.gradient(batch, &mut scratch).unwrap()
                - minus.gradient(batch, &mut scratch).unwrap())
                / (2.0 * eps);
            assert!(
                (numeric - grad[i]).abs() < 1e-3,
                "param {i}: numeric {numeric} analytic {}",
                grad[i]
            );
        }
    }

    #[test]
    fn gradient_sums_over_rows() {
        let net = tiny();
        let x = array![[0.2f32, -0.4, 0.9], [1.0, 0.5, -0.3], [-0.7, 0.1, 0.4], [0.3, 0.3, 0.3]];
        let labels = array![0.0f32, 1.0, 1.0, 0.0];
        let batch = Batch::new(x.view(), labels.view()).unwrap();

        let mut whole = vec![0.0; net.size()];
        let whole_loss = net.gradient(batch, &mut whole).unwrap();

        let mut summed = Array1::<f32>::zeros(net.size());
        let mut summed_loss = 0.0;
        for range in [0..1, 1..3, 3..4] {
            let mut part = vec![0.0; net.size()];
            summed_loss += net.gradient(batch.slice(range), &mut part).unwrap();
            summed += &Array1::from(part);
        }

        assert!((whole_loss - summed_loss).abs() < 1e-5);
        for (a, b) in whole.iter().zip(summed.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
