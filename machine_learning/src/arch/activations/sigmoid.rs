/// The logistic function, scaled by `amp`.
#[derive(Clone, Copy, Debug)]
pub struct Sigmoid {
    amp: f32,
}

impl Default for Sigmoid {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Sigmoid {
    pub fn new(amp: f32) -> Self {
        Self { amp }
    }

    pub fn f(&self, z: f32) -> f32 {
        self.amp / (1. + (-z).exp())
    }

    pub fn df(&self, z: f32) -> f32 {
        let s = 1. / (1. + (-z).exp());
        self.amp * s * (1. - s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn midpoint_is_half_the_amplitude() {
        let sigmoid = Sigmoid::new(2.0);
        assert_eq!(sigmoid.f(0.0), 1.0);
        assert_eq!(sigmoid.df(0.0), 0.5);
    }

    #[test]
    fn saturates_without_nan() {
        let sigmoid = Sigmoid::default();
        assert!(sigmoid.f(-1000.0).abs() < 1e-6);
        assert!((sigmoid.f(1000.0) - 1.0).abs() < 1e-6);
        assert!(sigmoid.df(-1000.0).is_finite());
        assert!(sigmoid.df(1000.0).is_finite());
    }
}
