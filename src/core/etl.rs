use crate::core::Pipeline;
use crate::domain::model::GeocodeStats;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

/// 單一資料集執行完畢的摘要
#[derive(Debug, Clone, PartialEq)]
pub struct EtlReport {
    pub dataset: String,
    pub records: usize,
    pub stats: GeocodeStats,
    pub outputs: Vec<String>,
}

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    /// Loaded → Geocoded → Spatialized → Exported, each stage exactly once.
    pub async fn run(&self) -> Result<EtlReport> {
        let dataset = self.pipeline.dataset_name().to_string();
        tracing::info!("🚀 [{}] Starting geocoding pipeline", dataset);

        // Extract
        let table = self.pipeline.extract().await?;
        tracing::info!(
            "📥 [{}] Loaded {} records ({} columns)",
            dataset,
            table.len(),
            table.columns.len()
        );
        self.monitor.log_stage(&dataset, "extract");

        // Transform
        let result = self.pipeline.transform(table).await?;
        let records = result.spatial.len();
        let stats = result.stats.clone();
        tracing::info!(
            "🔄 [{}] Spatialized {} records, {} with unknown coordinates",
            dataset,
            records,
            stats.unknown()
        );
        self.monitor.log_stage(&dataset, "transform");

        // Load
        let outputs = self.pipeline.load(result).await?;
        tracing::info!("✅ [{}] Wrote {} files", dataset, outputs.len());
        self.monitor.log_stage(&dataset, "load");

        Ok(EtlReport {
            dataset,
            records,
            stats,
            outputs,
        })
    }

    pub fn monitor(&self) -> &SystemMonitor {
        &self.monitor
    }
}
