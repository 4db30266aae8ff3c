use crate::adapters::NominatimClient;
use crate::app::pipelines::GreenSpacePipeline;
use crate::config::cli::LocalStorage;
use crate::core::etl::{EtlEngine, EtlReport};
use crate::core::geocoder::Geocoder;
use crate::core::{AddressLookup, ConfigProvider};
use crate::utils::error::Result;
use std::sync::Arc;

/// 建立一個共用的 Nominatim 客戶端，依序處理所有資料集
pub async fn run_all<C: ConfigProvider>(config: &C, monitor_enabled: bool) -> Result<Vec<EtlReport>> {
    let client = NominatimClient::from_config(config)?;
    tracing::info!("🌐 Geocoding service: {}", client.endpoint());
    run_all_with_lookup(config, Arc::new(client), monitor_enabled).await
}

/// Runs every configured dataset through its own pipeline, one after another.
/// The first failing dataset aborts the run; earlier datasets keep their outputs.
pub async fn run_all_with_lookup<C: ConfigProvider>(
    config: &C,
    lookup: Arc<dyn AddressLookup>,
    monitor_enabled: bool,
) -> Result<Vec<EtlReport>> {
    let geocoder = Arc::new(Geocoder::from_settings(lookup, &config.geocoder_settings()));
    let datasets = config.datasets();
    let mut reports = Vec::with_capacity(datasets.len());

    for dataset in datasets {
        let pipeline = GreenSpacePipeline::from_config(
            dataset,
            LocalStorage::new(config.input_path()),
            LocalStorage::new(config.output_path()),
            Arc::clone(&geocoder),
            config,
        );
        let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);
        reports.push(engine.run().await?);
        engine.monitor().log_final_stats();
    }

    Ok(reports)
}
