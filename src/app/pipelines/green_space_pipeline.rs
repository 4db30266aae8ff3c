use crate::core::export;
use crate::core::geocoder::Geocoder;
use crate::core::{loader, spatializer};
use crate::core::{ConfigProvider, Pipeline, Storage, Table, TransformResult};
use crate::domain::model::{ColumnMapping, DatasetSpec, ExportFormat, ExportPlan, GeoTable};
use crate::domain::ports::GeocoderSettings;
use crate::utils::error::{EtlError, Result};
use std::sync::Arc;

/// 單一區域 (北/南) 綠地資料的處理管道。
///
/// Each dataset gets its own instance; the geocoder (and the HTTP client behind
/// it) is shared between instances.
pub struct GreenSpacePipeline<S: Storage> {
    dataset: DatasetSpec,
    input: S,
    output: S,
    geocoder: Arc<Geocoder>,
    settings: GeocoderSettings,
    delimiter: u8,
    mapping: ColumnMapping,
    plan: ExportPlan,
}

impl<S: Storage> GreenSpacePipeline<S> {
    pub fn new(dataset: DatasetSpec, input: S, output: S, geocoder: Arc<Geocoder>) -> Self {
        Self {
            dataset,
            input,
            output,
            geocoder,
            settings: GeocoderSettings::default(),
            delimiter: b';',
            mapping: ColumnMapping::default(),
            plan: ExportPlan::default(),
        }
    }

    pub fn from_config<C: ConfigProvider>(
        dataset: DatasetSpec,
        input: S,
        output: S,
        geocoder: Arc<Geocoder>,
        config: &C,
    ) -> Self {
        Self::new(dataset, input, output, geocoder)
            .with_settings(config.geocoder_settings())
            .with_delimiter(config.delimiter())
            .with_mapping(config.rename_mapping())
            .with_plan(config.export_plan())
    }

    pub fn with_settings(mut self, settings: GeocoderSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_mapping(mut self, mapping: ColumnMapping) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn with_plan(mut self, plan: ExportPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn dataset(&self) -> &DatasetSpec {
        &self.dataset
    }

    fn stem(&self) -> &str {
        &self.dataset.output_stem
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for GreenSpacePipeline<S> {
    fn dataset_name(&self) -> &str {
        &self.dataset.name
    }

    async fn extract(&self) -> Result<Table> {
        tracing::info!("📂 [{}] Reading {}", self.dataset.name, self.dataset.input);
        let bytes = self.input.read_file(&self.dataset.input).await?;
        loader::parse_table(&bytes, self.delimiter, &self.dataset.input)
    }

    async fn transform(&self, data: Table) -> Result<TransformResult> {
        let (geocoded, stats) = self
            .geocoder
            .geocode_table(&self.dataset.name, data, &self.settings)
            .await?;

        if self.plan.write_intermediate {
            let path = format!("{}_with_coordinates.csv", self.stem());
            let bytes = loader::write_table_csv(&geocoded)?;
            self.output.write_file(&path, &bytes).await?;
            tracing::info!("📝 [{}] Intermediate table saved to {}", self.dataset.name, path);
        }

        let spatial = spatializer::attach_geometry(
            &self.dataset.name,
            geocoded,
            &self.settings.longitude_column,
            &self.settings.latitude_column,
        );

        Ok(TransformResult { spatial, stats })
    }

    async fn load(&self, result: TransformResult) -> Result<Vec<String>> {
        let stem = self.stem().to_string();
        let mut written = Vec::new();

        if self.plan.includes(ExportFormat::Shapefile) && self.plan.unrenamed_shapefile {
            written.extend(self.export_shapefile(&result.spatial, &stem).await?);
        }

        let renamed = spatializer::rename(result.spatial, &self.mapping)?;

        if self.plan.includes(ExportFormat::Shapefile) {
            let fixed = format!("{}_fixed", stem);
            written.extend(self.export_shapefile(&renamed, &fixed).await?);
        }
        for format in [ExportFormat::GeoJson, ExportFormat::GeoPackage] {
            if self.plan.includes(format) {
                let paths = export::export(
                    &self.output,
                    &renamed,
                    &stem,
                    format,
                    self.plan.bundle_shapefiles,
                )
                .await?;
                written.extend(paths);
            }
        }

        Ok(written)
    }
}

impl<S: Storage> GreenSpacePipeline<S> {
    /// 欄名超過 dBase 上限時只略過這一份 Shapefile，其他錯誤照常中止
    async fn export_shapefile(&self, table: &GeoTable, stem: &str) -> Result<Vec<String>> {
        match export::check_field_names(table, ExportFormat::Shapefile) {
            Ok(()) => {
                export::export(
                    &self.output,
                    table,
                    stem,
                    ExportFormat::Shapefile,
                    self.plan.bundle_shapefiles,
                )
                .await
            }
            Err(EtlError::FieldNameTooLong { field, limit, .. }) => {
                tracing::warn!(
                    "⚠️ [{}] Skipping {}.shp: column '{}' exceeds the {}-byte field name limit",
                    self.dataset.name,
                    stem,
                    field,
                    limit
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
