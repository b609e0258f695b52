pub mod activations;
pub mod layers;
pub mod loss;
mod classifier;
mod network;

pub use classifier::{Batch, Classifier};
pub use network::Network;
