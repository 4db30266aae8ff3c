pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use cli_config::CliConfig;

#[cfg(feature = "cli")]
mod cli_config {
    use crate::adapters::nominatim::{DEFAULT_ENDPOINT, DEFAULT_USER_AGENT};
    use crate::core::ConfigProvider;
    use crate::domain::model::{ColumnMapping, DatasetSpec, ExportFormat, ExportPlan};
    use crate::domain::ports::GeocoderSettings;
    use crate::utils::error::{EtlError, Result};
    use crate::utils::validation::{self, Validate};
    use clap::Parser;
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Clone, Serialize, Deserialize, Parser)]
    #[command(name = "green-geo-etl")]
    #[command(about = "Geocode İzmir green space tables and export them as Shapefile, GeoJSON and GeoPackage")]
    pub struct CliConfig {
        #[arg(long, default_value = ".")]
        pub input_dir: String,

        #[arg(long, default_value = "kuzeyparklar.csv", help = "North dataset file")]
        pub north: String,

        #[arg(long, default_value = "guneyparklar.csv", help = "South dataset file")]
        pub south: String,

        #[arg(long, default_value = ";")]
        pub delimiter: String,

        #[arg(long, default_value = "ADRES")]
        pub address_column: String,

        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        pub api_endpoint: String,

        #[arg(long, default_value = DEFAULT_USER_AGENT)]
        pub user_agent: String,

        #[arg(long, default_value = "./output")]
        pub output_path: String,

        #[arg(long, default_value = "1")]
        pub concurrent_requests: usize,

        #[arg(long, default_value = "0", help = "Minimum delay between geocoding requests")]
        pub request_interval_ms: u64,

        #[arg(long)]
        pub timeout_seconds: Option<u64>,

        #[arg(long, value_delimiter = ',', default_value = "shp,geojson,gpkg")]
        pub formats: Vec<String>,

        #[arg(long, help = "Zip each Shapefile and its sidecars into one archive")]
        pub bundle_shapefiles: bool,

        #[arg(long, help = "Do not export a Shapefile with the original column names")]
        pub skip_unrenamed: bool,

        #[arg(long, help = "Do not write the <stem>_with_coordinates.csv table")]
        pub no_intermediate: bool,

        #[arg(long, help = "Print a summary of an exported file and exit")]
        pub inspect: Option<String>,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log CPU and memory usage per stage")]
        pub monitor: bool,

        #[arg(long, help = "Emit logs as JSON lines")]
        pub log_json: bool,
    }

    impl ConfigProvider for CliConfig {
        fn api_endpoint(&self) -> &str {
            &self.api_endpoint
        }

        fn user_agent(&self) -> &str {
            &self.user_agent
        }

        fn request_timeout(&self) -> Option<Duration> {
            self.timeout_seconds.map(Duration::from_secs)
        }

        fn extra_query_params(&self) -> Vec<(String, String)> {
            Vec::new()
        }

        fn input_path(&self) -> &str {
            &self.input_dir
        }

        fn output_path(&self) -> &str {
            &self.output_path
        }

        fn delimiter(&self) -> u8 {
            self.delimiter.bytes().next().unwrap_or(b';')
        }

        fn datasets(&self) -> Vec<DatasetSpec> {
            vec![
                DatasetSpec::new("north", &self.north),
                DatasetSpec::new("south", &self.south),
            ]
        }

        fn geocoder_settings(&self) -> GeocoderSettings {
            GeocoderSettings {
                address_column: self.address_column.clone(),
                concurrent_requests: self.concurrent_requests,
                min_request_interval: Some(Duration::from_millis(self.request_interval_ms))
                    .filter(|d| !d.is_zero()),
                ..GeocoderSettings::default()
            }
        }

        fn rename_mapping(&self) -> ColumnMapping {
            ColumnMapping::default()
        }

        fn export_plan(&self) -> ExportPlan {
            ExportPlan {
                formats: self
                    .formats
                    .iter()
                    .filter_map(|f| ExportFormat::parse(f.trim()))
                    .collect(),
                unrenamed_shapefile: !self.skip_unrenamed,
                bundle_shapefiles: self.bundle_shapefiles,
                write_intermediate: !self.no_intermediate,
            }
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validation::validate_url("api_endpoint", &self.api_endpoint)?;
            validation::validate_non_empty_string("user_agent", &self.user_agent)?;
            validation::validate_path("input_dir", &self.input_dir)?;
            validation::validate_path("output_path", &self.output_path)?;
            validation::validate_path("north", &self.north)?;
            validation::validate_path("south", &self.south)?;
            validation::validate_delimiter("delimiter", &self.delimiter)?;
            validation::validate_non_empty_string("address_column", &self.address_column)?;
            validation::validate_range("concurrent_requests", self.concurrent_requests, 1, 64)?;

            for format in &self.formats {
                if ExportFormat::parse(format.trim()).is_none() {
                    return Err(EtlError::InvalidConfigValueError {
                        field: "formats".to_string(),
                        value: format.clone(),
                        reason: "Unsupported format. Valid formats: shp, geojson, gpkg".to_string(),
                    });
                }
            }
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_defaults_reproduce_original_run() {
            let config = CliConfig::parse_from(["green-geo-etl"]);

            assert!(config.validate().is_ok());
            assert_eq!(config.datasets(), DatasetSpec::izmir_defaults());
            assert_eq!(config.delimiter(), b';');
            assert_eq!(config.user_agent(), "geo_app");
            assert_eq!(config.export_plan(), ExportPlan::default());
            assert_eq!(config.geocoder_settings(), GeocoderSettings::default());
        }

        #[test]
        fn test_flags_override_plan_and_settings() {
            let config = CliConfig::parse_from([
                "green-geo-etl",
                "--formats",
                "geojson,gpkg",
                "--bundle-shapefiles",
                "--no-intermediate",
                "--concurrent-requests",
                "4",
                "--request-interval-ms",
                "1000",
            ]);

            let plan = config.export_plan();
            assert_eq!(plan.formats, vec![ExportFormat::GeoJson, ExportFormat::GeoPackage]);
            assert!(plan.bundle_shapefiles);
            assert!(!plan.write_intermediate);

            let settings = config.geocoder_settings();
            assert_eq!(settings.concurrent_requests, 4);
            assert_eq!(settings.min_request_interval, Some(Duration::from_secs(1)));
        }

        #[test]
        fn test_invalid_values_fail_validation() {
            let config = CliConfig::parse_from(["green-geo-etl", "--formats", "kml"]);
            assert!(config.validate().is_err());

            let config = CliConfig::parse_from(["green-geo-etl", "--delimiter", "ab"]);
            assert!(config.validate().is_err());

            let config = CliConfig::parse_from(["green-geo-etl", "--api-endpoint", "ftp://x"]);
            assert!(config.validate().is_err());
        }
    }
}
