pub mod arch;
pub mod error;
pub mod optimization;

pub use arch::{Batch, Classifier, Network};
pub use error::{MlErr, Result};
