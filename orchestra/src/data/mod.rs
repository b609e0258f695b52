//! Dataset ingestion: row normalization, the dense matrix the coordinator owns and the CSV
//! readers that fill it.

pub mod loader;
pub mod matrix;
pub mod sample;

pub use loader::{RowStream, load};
pub use matrix::{Admission, DatasetMatrix};
pub use sample::{FEATURES, IMAGE_SIDE, PIXEL_MAX, ParseRowErr, RowLayout, Sample, WIDTH};
