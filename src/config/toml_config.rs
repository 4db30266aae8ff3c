use crate::adapters::nominatim::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
use crate::core::ConfigProvider;
use crate::domain::model::{
    ColumnMapping, DatasetSpec, ExportFormat, ExportPlan, LEGACY_FIELD_NAME_LIMIT,
};
use crate::domain::ports::GeocoderSettings;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub transform: TransformConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
}

/// 地理編碼服務設定
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    pub timeout_seconds: Option<u64>,
    /// Extra query parameters sent with every search, e.g. `countrycodes = "tr"`.
    pub parameters: Option<BTreeMap<String, String>>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            user_agent: default_user_agent(),
            timeout_seconds: None,
            parameters: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_address_column")]
    pub address_column: String,
    pub concurrent_requests: Option<usize>,
    pub request_interval_ms: Option<u64>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            delimiter: default_delimiter(),
            address_column: default_address_column(),
            concurrent_requests: None,
            request_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub input: String,
    pub output_stem: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    pub latitude_column: Option<String>,
    pub longitude_column: Option<String>,
    pub write_intermediate: Option<bool>,
    /// 長欄位名稱 → 短別名；未設定時使用預設對照表
    pub rename: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<String>,
    pub unrenamed_shapefile: Option<bool>,
    pub bundle_shapefiles: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub log_json: Option<bool>,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_input_dir() -> String {
    ".".to_string()
}

fn default_delimiter() -> String {
    ";".to_string()
}

fn default_address_column() -> String {
    "ADRES".to_string()
}

fn default_output_formats() -> Vec<String> {
    vec!["shp".to_string(), "geojson".to_string(), "gpkg".to_string()]
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${NOMINATIM_URL})；未設定的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validation::validate_url("source.endpoint", &self.source.endpoint)?;
        validation::validate_non_empty_string("source.user_agent", &self.source.user_agent)?;
        validation::validate_path("extract.input_dir", &self.extract.input_dir)?;
        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_delimiter("extract.delimiter", &self.extract.delimiter)?;
        validation::validate_non_empty_string("extract.address_column", &self.extract.address_column)?;

        if let Some(concurrent) = self.extract.concurrent_requests {
            validation::validate_range("extract.concurrent_requests", concurrent, 1, 64)?;
        }
        if let Some(timeout) = self.source.timeout_seconds {
            validation::validate_positive_number("source.timeout_seconds", timeout as usize, 1)?;
        }

        for format in &self.load.output_formats {
            if ExportFormat::parse(format).is_none() {
                return Err(EtlError::InvalidConfigValueError {
                    field: "load.output_formats".to_string(),
                    value: format.clone(),
                    reason: "Unsupported format. Valid formats: shp, geojson, gpkg".to_string(),
                });
            }
        }

        for dataset in &self.datasets {
            validation::validate_non_empty_string("datasets.name", &dataset.name)?;
            validation::validate_path("datasets.input", &dataset.input)?;
        }
        let specs = self.datasets();
        validation::validate_unique_names("datasets.name", specs.iter().map(|d| d.name.as_str()))?;
        validation::validate_unique_names(
            "datasets.output_stem",
            specs.iter().map(|d| d.output_stem.as_str()),
        )?;

        let mapping = self.rename_mapping();
        for (_, alias) in mapping.entries() {
            validation::validate_field_name_length("transform.rename", alias, LEGACY_FIELD_NAME_LIMIT)?;
        }
        validation::validate_unique_names(
            "transform.rename",
            mapping.entries().iter().map(|(_, alias)| alias.as_str()),
        )?;

        Ok(())
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn log_json(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_json)
            .unwrap_or(false)
    }
}

impl ConfigProvider for TomlConfig {
    fn api_endpoint(&self) -> &str {
        &self.source.endpoint
    }

    fn user_agent(&self) -> &str {
        &self.source.user_agent
    }

    fn request_timeout(&self) -> Option<Duration> {
        self.source.timeout_seconds.map(Duration::from_secs)
    }

    fn extra_query_params(&self) -> Vec<(String, String)> {
        self.source
            .parameters
            .as_ref()
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn input_path(&self) -> &str {
        &self.extract.input_dir
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn delimiter(&self) -> u8 {
        self.extract.delimiter.bytes().next().unwrap_or(b';')
    }

    fn datasets(&self) -> Vec<DatasetSpec> {
        if self.datasets.is_empty() {
            return DatasetSpec::izmir_defaults();
        }
        self.datasets
            .iter()
            .map(|d| {
                let mut spec = DatasetSpec::new(&d.name, &d.input);
                if let Some(stem) = &d.output_stem {
                    spec.output_stem = stem.clone();
                }
                spec
            })
            .collect()
    }

    fn geocoder_settings(&self) -> GeocoderSettings {
        let defaults = GeocoderSettings::default();
        GeocoderSettings {
            address_column: self.extract.address_column.clone(),
            latitude_column: self
                .transform
                .latitude_column
                .clone()
                .unwrap_or(defaults.latitude_column),
            longitude_column: self
                .transform
                .longitude_column
                .clone()
                .unwrap_or(defaults.longitude_column),
            concurrent_requests: self.extract.concurrent_requests.unwrap_or(1),
            min_request_interval: self
                .extract
                .request_interval_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
        }
    }

    fn rename_mapping(&self) -> ColumnMapping {
        match &self.transform.rename {
            Some(rename) => ColumnMapping::new(rename.clone()),
            None => ColumnMapping::default(),
        }
    }

    fn export_plan(&self) -> ExportPlan {
        let defaults = ExportPlan::default();
        ExportPlan {
            formats: self
                .load
                .output_formats
                .iter()
                .filter_map(|f| ExportFormat::parse(f))
                .collect(),
            unrenamed_shapefile: self
                .load
                .unrenamed_shapefile
                .unwrap_or(defaults.unrenamed_shapefile),
            bundle_shapefiles: self
                .load
                .bundle_shapefiles
                .unwrap_or(defaults.bundle_shapefiles),
            write_intermediate: self
                .transform
                .write_intermediate
                .unwrap_or(defaults.write_intermediate),
        }
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[pipeline]
name = "izmir-green-spaces"

[load]
output_path = "./output"
"#;

    #[test]
    fn test_minimal_config_uses_original_defaults() {
        let config = TomlConfig::from_toml_str(MINIMAL).unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.api_endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(config.user_agent(), "geo_app");
        assert_eq!(config.delimiter(), b';');
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.datasets(), DatasetSpec::izmir_defaults());
        assert_eq!(config.rename_mapping(), ColumnMapping::default());
        assert_eq!(config.export_plan(), ExportPlan::default());
        assert_eq!(config.geocoder_settings(), GeocoderSettings::default());
        assert!(!config.monitoring_enabled());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[pipeline]
name = "izmir"
description = "North and south parks"
version = "1.0.0"

[source]
endpoint = "http://localhost:8080/search"
user_agent = "izmir-parks/1.0"
timeout_seconds = 10
parameters = { countrycodes = "tr" }

[extract]
input_dir = "./data"
delimiter = ","
concurrent_requests = 2
request_interval_ms = 1000

[[datasets]]
name = "north"
input = "kuzey.csv"
output_stem = "kuzey"

[transform]
write_intermediate = false

[transform.rename]
PARK_ADI = "park"

[load]
output_path = "./out"
output_formats = ["geojson", "gpkg"]
bundle_shapefiles = true

[monitoring]
enabled = true
log_json = true
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.delimiter(), b',');
        assert_eq!(config.input_path(), "./data");
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(
            config.extra_query_params(),
            vec![("countrycodes".to_string(), "tr".to_string())]
        );
        assert_eq!(config.datasets()[0].output_stem, "kuzey");

        let settings = config.geocoder_settings();
        assert_eq!(settings.concurrent_requests, 2);
        assert_eq!(settings.min_request_interval, Some(Duration::from_secs(1)));

        assert_eq!(config.rename_mapping().get("PARK_ADI"), Some("park"));
        let plan = config.export_plan();
        assert_eq!(plan.formats, vec![ExportFormat::GeoJson, ExportFormat::GeoPackage]);
        assert!(plan.bundle_shapefiles);
        assert!(!plan.write_intermediate);
        assert!(config.monitoring_enabled());
        assert!(config.log_json());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("GREEN_GEO_TEST_ENDPOINT", "https://geocoder.example.com/search");

        let toml_content = r#"
[pipeline]
name = "test"

[source]
endpoint = "${GREEN_GEO_TEST_ENDPOINT}"

[load]
output_path = "./output"
"#;

        let config = TomlConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.source.endpoint, "https://geocoder.example.com/search");

        std::env::remove_var("GREEN_GEO_TEST_ENDPOINT");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            ("[source]\nendpoint = \"not-a-url\"", "source.endpoint"),
            ("[extract]\ndelimiter = \";;\"", "extract.delimiter"),
            ("[transform.rename]\ngreen_space_name = \"green_space_nm\"", "transform.rename"),
        ];

        for (section, field) in cases {
            let content = format!("{}\n{}", MINIMAL, section);
            let config = TomlConfig::from_toml_str(&content).unwrap();
            match config.validate() {
                Err(EtlError::InvalidConfigValueError { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected invalid {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validation_rejects_unknown_format_and_duplicate_datasets() {
        let content = r#"
[pipeline]
name = "test"

[[datasets]]
name = "north"
input = "a.csv"

[[datasets]]
name = "north"
input = "b.csv"

[load]
output_path = "./output"
"#;
        let config = TomlConfig::from_toml_str(content).unwrap();
        assert!(config.validate().is_err());

        let content = MINIMAL.replace(
            "output_path = \"./output\"",
            "output_path = \"./output\"\noutput_formats = [\"kml\"]",
        );
        let config = TomlConfig::from_toml_str(&content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = TomlConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.pipeline.name, "izmir-green-spaces");
    }
}
