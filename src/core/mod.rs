pub mod etl;
pub mod export;
pub mod geocoder;
pub mod loader;
pub mod spatializer;

pub use crate::domain::model::{GeoTable, Record, Table, TransformResult};
pub use crate::domain::ports::{AddressLookup, ConfigProvider, Pipeline, Storage};
pub use crate::utils::error::Result;
