use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug, Clone, PartialEq)]
pub enum MlErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    InvalidLabel {
        row: usize,
        label: f32,
        classes: usize,
    },
    InvalidTopology {
        dims: Vec<usize>,
    },
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch in {what}, got {got} and expected {expected}"
            ),
            MlErr::InvalidLabel {
                row,
                label,
                classes,
            } => write!(
                f,
                "label {label} in row {row} is not one of the {classes} classes"
            ),
            MlErr::InvalidTopology { dims } => write!(
                f,
                "invalid topology {dims:?}, expected at least two non empty layers and at most 256 classes"
            ),
        }
    }
}

impl Error for MlErr {}
