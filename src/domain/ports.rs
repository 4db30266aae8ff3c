use crate::domain::model::{
    ColumnMapping, Coordinates, DatasetSpec, ExportPlan, LookupFailure, Table, TransformResult,
};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// 地理編碼服務。`Ok(None)` 表示服務回應了但沒有可用的座標。
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> std::result::Result<Option<Coordinates>, LookupFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocoderSettings {
    pub address_column: String,
    pub latitude_column: String,
    pub longitude_column: String,
    pub concurrent_requests: usize,
    pub min_request_interval: Option<Duration>,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            address_column: "ADRES".to_string(),
            latitude_column: "latitude".to_string(),
            longitude_column: "longitude".to_string(),
            concurrent_requests: 1,
            min_request_interval: None,
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn api_endpoint(&self) -> &str;
    fn user_agent(&self) -> &str;
    fn request_timeout(&self) -> Option<Duration>;
    fn extra_query_params(&self) -> Vec<(String, String)>;
    fn input_path(&self) -> &str;
    fn output_path(&self) -> &str;
    fn delimiter(&self) -> u8;
    fn datasets(&self) -> Vec<DatasetSpec>;
    fn geocoder_settings(&self) -> GeocoderSettings;
    fn rename_mapping(&self) -> ColumnMapping;
    fn export_plan(&self) -> ExportPlan;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Name of the dataset this pipeline instance processes.
    fn dataset_name(&self) -> &str;
    async fn extract(&self) -> Result<Table>;
    async fn transform(&self, data: Table) -> Result<TransformResult>;
    /// Returns the storage-relative paths of every artefact written.
    async fn load(&self, result: TransformResult) -> Result<Vec<String>>;
}
