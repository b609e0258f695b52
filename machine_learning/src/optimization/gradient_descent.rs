use super::Optimizer;

/// Plain gradient descent: a fixed step against the gradient.
#[derive(Debug, Clone, Copy)]
pub struct GradientDescent {
    step: f32,
}

impl GradientDescent {
    /// Returns a new `GradientDescent`.
    ///
    /// # Arguments
    /// * `step` - The factor the gradient is scaled by before being subtracted, usually the
    ///   learning rate divided by the amount of rows the gradient was summed over.
    pub fn new(step: f32) -> Self {
        Self { step }
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let step = self.step;

        for (w, g) in params.iter_mut().zip(grad) {
            *w -= step * g;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut params = [1.0, -1.0, 0.5];
        GradientDescent::new(0.5).update_params(&mut params, &[2.0, -2.0, 0.0]);
        assert_eq!(params, [0.0, 0.0, 0.5]);
    }
}
