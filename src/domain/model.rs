use geo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// WGS84 地理座標系
pub const EPSG_WGS84: u32 = 4326;

/// 舊式容器格式 (Shapefile/dBase) 的欄位名稱長度上限
pub const LEGACY_FIELD_NAME_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    pub data: HashMap<String, serde_json::Value>,
}

impl Record {
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.data.get(column).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.data.get(column).and_then(|v| v.as_f64())
    }
}

/// 依表頭順序保存欄位的資料表
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Appends `column` to the header unless it is already present.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    /// Returns `None` unless both values are finite.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        (lat.is_finite() && lon.is_finite()).then_some(Self { lat, lon })
    }
}

/// Why a lookup produced no coordinates even though the service was asked.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupFailure {
    Network,
    Timeout,
    RateLimited,
    HttpStatus(u16),
    MalformedResponse(String),
}

impl LookupFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            LookupFailure::Network => "network",
            LookupFailure::Timeout => "timeout",
            LookupFailure::RateLimited => "rate_limited",
            LookupFailure::HttpStatus(_) => "http_status",
            LookupFailure::MalformedResponse(_) => "malformed_response",
        }
    }
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupFailure::HttpStatus(code) => write!(f, "http_status({})", code),
            LookupFailure::MalformedResponse(detail) => write!(f, "malformed_response({})", detail),
            other => f.write_str(other.kind()),
        }
    }
}

/// 單筆地址的地理編碼結果。輸出表中 NotFound 與 Failed 都寫成空座標，
/// 但標籤保留下來供日誌與統計使用。
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Resolved(Coordinates),
    NotFound,
    Failed(LookupFailure),
}

impl GeocodeOutcome {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            GeocodeOutcome::Resolved(coords) => Some(*coords),
            _ => None,
        }
    }

    /// The (latitude, longitude) cell pair; both null unless resolved.
    pub fn to_values(&self) -> (serde_json::Value, serde_json::Value) {
        match self.coordinates() {
            Some(c) => (serde_json::Value::from(c.lat), serde_json::Value::from(c.lon)),
            None => (serde_json::Value::Null, serde_json::Value::Null),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeocodeStats {
    pub total: usize,
    pub resolved: usize,
    pub not_found: usize,
    pub failed: usize,
    pub failures_by_kind: HashMap<String, usize>,
}

impl GeocodeStats {
    pub fn record(&mut self, outcome: &GeocodeOutcome) {
        self.total += 1;
        match outcome {
            GeocodeOutcome::Resolved(_) => self.resolved += 1,
            GeocodeOutcome::NotFound => self.not_found += 1,
            GeocodeOutcome::Failed(failure) => {
                self.failed += 1;
                *self
                    .failures_by_kind
                    .entry(failure.kind().to_string())
                    .or_insert(0) += 1;
            }
        }
    }

    pub fn unknown(&self) -> usize {
        self.not_found + self.failed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    pub record: Record,
    pub geometry: Option<Point<f64>>,
}

/// 帶幾何欄位的資料表；空間參考是整個資料集共用的
#[derive(Debug, Clone, PartialEq)]
pub struct GeoTable {
    pub name: String,
    pub columns: Vec<String>,
    pub features: Vec<GeoRecord>,
    pub srid: u32,
}

impl GeoTable {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = Point<f64>> + '_ {
        self.features.iter().filter_map(|f| f.geometry)
    }
}

/// One regional input file and where its outputs go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub input: String,
    pub output_stem: String,
}

impl DatasetSpec {
    pub fn new(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            output_stem: format!("{}_green_spaces", name),
        }
    }

    /// 原始腳本處理的北區與南區兩個資料集
    pub fn izmir_defaults() -> Vec<Self> {
        vec![
            Self::new("north", "kuzeyparklar.csv"),
            Self::new("south", "guneyparklar.csv"),
        ]
    }
}

/// Ordered long-name to short-alias mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(from, _)| from == column)
            .map(|(_, to)| to.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::new([
            ("latitude", "lat"),
            ("longitude", "lon"),
            ("green_space_name", "gs_name"),
            ("neighborhood_name", "nbhd_name"),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportFormat {
    Shapefile,
    GeoJson,
    GeoPackage,
}

impl ExportFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "shp" | "shapefile" => Some(ExportFormat::Shapefile),
            "geojson" | "json" => Some(ExportFormat::GeoJson),
            "gpkg" | "geopackage" => Some(ExportFormat::GeoPackage),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Shapefile => "shp",
            ExportFormat::GeoJson => "geojson",
            ExportFormat::GeoPackage => "gpkg",
        }
    }

    pub fn field_name_limit(&self) -> Option<usize> {
        match self {
            ExportFormat::Shapefile => Some(LEGACY_FIELD_NAME_LIMIT),
            ExportFormat::GeoJson | ExportFormat::GeoPackage => None,
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportFormat::Shapefile => "Shapefile",
            ExportFormat::GeoJson => "GeoJSON",
            ExportFormat::GeoPackage => "GeoPackage",
        })
    }
}

/// 每個資料集要輸出哪些檔案
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub formats: Vec<ExportFormat>,
    /// Also write a Shapefile with the original column names before renaming.
    pub unrenamed_shapefile: bool,
    pub bundle_shapefiles: bool,
    pub write_intermediate: bool,
}

impl ExportPlan {
    pub fn includes(&self, format: ExportFormat) -> bool {
        self.formats.contains(&format)
    }
}

impl Default for ExportPlan {
    fn default() -> Self {
        Self {
            formats: vec![
                ExportFormat::Shapefile,
                ExportFormat::GeoJson,
                ExportFormat::GeoPackage,
            ],
            unrenamed_shapefile: true,
            bundle_shapefiles: false,
            write_intermediate: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformResult {
    pub spatial: GeoTable,
    pub stats: GeocodeStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_reject_non_finite() {
        assert!(Coordinates::new(38.46, 27.21).is_some());
        assert!(Coordinates::new(f64::NAN, 27.21).is_none());
        assert!(Coordinates::new(38.46, f64::INFINITY).is_none());
    }

    #[test]
    fn test_unknown_outcomes_materialise_as_null_pair() {
        for outcome in [
            GeocodeOutcome::NotFound,
            GeocodeOutcome::Failed(LookupFailure::Timeout),
        ] {
            let (lat, lon) = outcome.to_values();
            assert!(lat.is_null());
            assert!(lon.is_null());
        }

        let resolved = GeocodeOutcome::Resolved(Coordinates { lat: 38.46, lon: 27.21 });
        let (lat, lon) = resolved.to_values();
        assert_eq!(lat.as_f64(), Some(38.46));
        assert_eq!(lon.as_f64(), Some(27.21));
    }

    #[test]
    fn test_stats_keep_failure_kinds_apart() {
        let mut stats = GeocodeStats::default();
        stats.record(&GeocodeOutcome::NotFound);
        stats.record(&GeocodeOutcome::Failed(LookupFailure::RateLimited));
        stats.record(&GeocodeOutcome::Failed(LookupFailure::HttpStatus(503)));
        stats.record(&GeocodeOutcome::Resolved(Coordinates { lat: 1.0, lon: 2.0 }));

        assert_eq!(stats.total, 4);
        assert_eq!(stats.unknown(), 3);
        assert_eq!(stats.failures_by_kind.get("rate_limited"), Some(&1));
        assert_eq!(stats.failures_by_kind.get("http_status"), Some(&1));
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!(ExportFormat::parse("SHP"), Some(ExportFormat::Shapefile));
        assert_eq!(ExportFormat::parse("gpkg"), Some(ExportFormat::GeoPackage));
        assert_eq!(ExportFormat::parse("kml"), None);
        assert_eq!(ExportFormat::Shapefile.field_name_limit(), Some(10));
        assert_eq!(ExportFormat::GeoJson.field_name_limit(), None);
    }

    #[test]
    fn test_default_mapping_targets_fit_legacy_limit() {
        let mapping = ColumnMapping::default();
        assert_eq!(mapping.get("green_space_name"), Some("gs_name"));
        assert!(mapping
            .entries()
            .iter()
            .all(|(_, to)| to.chars().count() <= LEGACY_FIELD_NAME_LIMIT));
    }
}
