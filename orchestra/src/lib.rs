pub mod batch;
pub mod collective;
pub mod config;
pub mod data;
mod error;
pub mod gather;
pub mod image_dump;
pub mod monitor;
pub mod partition;
pub mod pipeline;
pub mod strategy;

pub use config::{RunConfig, Settings};
pub use error::{OrchestraErr, Result};
pub use pipeline::{Outcome, RunReport, run, run_local, run_with};
pub use strategy::{MessagePassing, SharedMemory, Strategy};
