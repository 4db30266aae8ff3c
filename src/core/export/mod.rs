pub mod geojson;
pub mod gpkg;
pub mod shp;

use crate::domain::model::{ExportFormat, GeoTable, EPSG_WGS84};
use crate::domain::ports::Storage;
use crate::utils::error::{EtlError, Result};
use std::io::Write;
use std::path::Path;
use zip::write::{FileOptions, ZipWriter};

/// ESRI 風格 WKT，寫入 `.prj`
pub(crate) const ESRI_WGS84_WKT: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

/// OGC WKT，寫入 GeoPackage 的 `gpkg_spatial_ref_sys`
pub(crate) const OGC_WGS84_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

/// A single file produced by an encoder, addressed relative to the output root.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Text,
    Real,
}

/// 全部非空值都是數字的欄位視為實數欄位，其餘一律為文字
pub(crate) fn column_kinds(table: &GeoTable) -> Vec<ColumnKind> {
    table
        .columns
        .iter()
        .map(|column| {
            let mut saw_number = false;
            for feature in &table.features {
                match feature.record.data.get(column) {
                    None | Some(serde_json::Value::Null) => {}
                    Some(serde_json::Value::Number(_)) => saw_number = true,
                    Some(_) => return ColumnKind::Text,
                }
            }
            if saw_number {
                ColumnKind::Real
            } else {
                ColumnKind::Text
            }
        })
        .collect()
}

pub(crate) fn text_value(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn ensure_supported_srid(srid: u32) -> Result<()> {
    if srid == EPSG_WGS84 {
        Ok(())
    } else {
        Err(EtlError::UnsupportedSrid { srid })
    }
}

/// The exporter never truncates or renames; names must already fit.
///
/// dBase 欄名上限以 UTF-8 位元組計，`İLÇE_ADI_X` 是 10 個字元但 12 個位元組。
pub fn check_field_names(table: &GeoTable, format: ExportFormat) -> Result<()> {
    if let Some(limit) = format.field_name_limit() {
        if let Some(column) = table.columns.iter().find(|c| c.len() > limit) {
            return Err(EtlError::FieldNameTooLong {
                field: column.clone(),
                limit,
                format: format.to_string(),
            });
        }
    }
    Ok(())
}

pub fn encode(table: &GeoTable, stem: &str, format: ExportFormat) -> Result<Vec<Artifact>> {
    check_field_names(table, format)?;
    ensure_supported_srid(table.srid)?;

    match format {
        ExportFormat::Shapefile => shp::encode(table, stem),
        ExportFormat::GeoJson => Ok(vec![geojson::encode(table, stem)?]),
        ExportFormat::GeoPackage => Ok(vec![gpkg::encode(table, stem)?]),
    }
}

/// 將 Shapefile 的附屬檔打包成單一 zip
pub fn bundle_zip(stem: &str, artifacts: &[Artifact]) -> Result<Artifact> {
    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
    for artifact in artifacts {
        let name = Path::new(&artifact.path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(artifact.path.as_str());
        zip.start_file::<_, ()>(name, FileOptions::default())?;
        zip.write_all(&artifact.bytes)?;
    }
    let cursor = zip.finish()?;

    Ok(Artifact {
        path: format!("{}.shp.zip", stem),
        bytes: cursor.into_inner(),
    })
}

/// 每個 (資料集, 格式) 只產生一組輸出。失敗時不回滾先前已寫出的檔案。
pub async fn export<S: Storage>(
    storage: &S,
    table: &GeoTable,
    stem: &str,
    format: ExportFormat,
    bundle_shapefiles: bool,
) -> Result<Vec<String>> {
    let mut artifacts = encode(table, stem, format)?;
    if bundle_shapefiles && format == ExportFormat::Shapefile {
        artifacts = vec![bundle_zip(stem, &artifacts)?];
    }

    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        tracing::debug!(
            "Writing {} ({} bytes) to storage",
            artifact.path,
            artifact.bytes.len()
        );
        storage.write_file(&artifact.path, &artifact.bytes).await?;
        written.push(artifact.path);
    }

    tracing::info!(
        "💾 [{}] Exported {} rows as {} -> {}",
        table.name,
        table.len(),
        format,
        written.first().map(String::as_str).unwrap_or("-")
    );
    Ok(written)
}

/// Reads an exported file back into a [`GeoTable`].
pub fn read_back(path: &Path, format: ExportFormat) -> Result<GeoTable> {
    match format {
        ExportFormat::Shapefile => shp::read(path),
        ExportFormat::GeoJson => geojson::read(path),
        ExportFormat::GeoPackage => gpkg::read(path),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::sample_table;
    use super::*;

    #[test]
    fn test_column_kinds() {
        let table = sample_table();
        assert_eq!(
            column_kinds(&table),
            vec![
                ColumnKind::Text,
                ColumnKind::Text,
                ColumnKind::Text,
                ColumnKind::Real,
                ColumnKind::Real
            ]
        );
    }

    #[test]
    fn test_long_names_rejected_for_shapefile_only() {
        let mut table = sample_table();
        table.columns[0] = "green_space_name".to_string();

        let err = check_field_names(&table, ExportFormat::Shapefile).unwrap_err();
        assert!(matches!(err, EtlError::FieldNameTooLong { limit: 10, .. }));
        assert!(check_field_names(&table, ExportFormat::GeoJson).is_ok());
        assert!(check_field_names(&table, ExportFormat::GeoPackage).is_ok());
    }

    #[test]
    fn test_field_name_limit_counts_bytes() {
        let mut table = sample_table();
        table.columns[1] = "İLÇE_ADI_X".to_string();
        assert_eq!(table.columns[1].chars().count(), 10);

        let err = check_field_names(&table, ExportFormat::Shapefile).unwrap_err();
        assert!(matches!(err, EtlError::FieldNameTooLong { ref field, .. } if field == "İLÇE_ADI_X"));

        table.columns[1] = "İLÇE_ADI".to_string();
        assert!(check_field_names(&table, ExportFormat::Shapefile).is_ok());
    }

    #[test]
    fn test_other_srids_are_rejected() {
        let mut table = sample_table();
        table.srid = 3857;
        assert!(matches!(
            encode(&table, "north_green_spaces", ExportFormat::GeoJson),
            Err(EtlError::UnsupportedSrid { srid: 3857 })
        ));
    }

    #[test]
    fn test_bundle_contains_every_sidecar() {
        let table = sample_table();
        let artifacts = encode(&table, "north_green_spaces_fixed", ExportFormat::Shapefile).unwrap();
        let bundle = bundle_zip("north_green_spaces_fixed", &artifacts).unwrap();

        assert_eq!(bundle.path, "north_green_spaces_fixed.shp.zip");
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bundle.bytes)).unwrap();
        let mut names: Vec<&str> = archive.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "north_green_spaces_fixed.cpg",
                "north_green_spaces_fixed.dbf",
                "north_green_spaces_fixed.prj",
                "north_green_spaces_fixed.shp",
                "north_green_spaces_fixed.shx"
            ]
        );
    }
}
