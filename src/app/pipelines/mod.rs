pub mod green_space_pipeline;

pub use green_space_pipeline::GreenSpacePipeline;
