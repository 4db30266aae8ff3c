pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::NominatimClient;
pub use app::pipelines::GreenSpacePipeline;
pub use config::{cli::LocalStorage, toml_config::TomlConfig};
pub use crate::core::{
    etl::{EtlEngine, EtlReport},
    geocoder::Geocoder,
};
pub use utils::error::{EtlError, Result};
