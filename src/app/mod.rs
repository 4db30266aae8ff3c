pub mod pipelines;
pub mod runner;

pub use runner::{run_all, run_all_with_lookup};
