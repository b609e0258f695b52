pub mod training;
pub mod worker;
