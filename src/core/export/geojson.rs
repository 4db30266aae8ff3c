use super::Artifact;
use crate::domain::model::{GeoRecord, GeoTable, Record, EPSG_WGS84};
use crate::utils::error::{EtlError, Result};
use anyhow::Context;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::Path;

const CRS84_URN: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

/// Write a GeoTable as a GeoJSON FeatureCollection; unknown rows get `"geometry": null`.
///
/// 欄位順序另存於 `columns` 成員，沒有任何 feature 時 schema 也能讀回。
pub fn encode(table: &GeoTable, stem: &str) -> Result<Artifact> {
    let features: Vec<Value> = table
        .features
        .iter()
        .map(|feature| {
            let mut properties = Map::with_capacity(table.columns.len());
            for column in &table.columns {
                let value = feature.record.data.get(column).cloned().unwrap_or(Value::Null);
                properties.insert(column.clone(), value);
            }

            let geometry = match feature.geometry {
                Some(p) => json!({ "type": "Point", "coordinates": [p.x(), p.y()] }),
                None => Value::Null,
            };

            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": geometry,
            })
        })
        .collect();

    let collection = json!({
        "type": "FeatureCollection",
        "name": stem,
        "crs": { "type": "name", "properties": { "name": CRS84_URN } },
        "columns": table.columns,
        "features": features,
    });

    Ok(Artifact {
        path: format!("{}.geojson", stem),
        bytes: serde_json::to_vec_pretty(&collection)?,
    })
}

/// Read a FeatureCollection written by [`encode`] (or any point-only GeoJSON).
pub fn read(path: &Path) -> Result<GeoTable> {
    let bytes = std::fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes)?;
    parse_collection(&value).map_err(|e| EtlError::ProcessingError {
        message: format!("{}: {:#}", path.display(), e),
    })
}

fn parse_collection(value: &Value) -> anyhow::Result<GeoTable> {
    let features = value["features"]
        .as_array()
        .context("FeatureCollection has no 'features' array")?;

    let mut columns: Vec<String> = match value.get("columns").and_then(Value::as_array) {
        Some(names) => names
            .iter()
            .map(|n| n.as_str().map(str::to_string).context("column names must be strings"))
            .collect::<anyhow::Result<_>>()?,
        None => Vec::new(),
    };
    let mut parsed = Vec::with_capacity(features.len());

    for (index, feature) in features.iter().enumerate() {
        let mut data = HashMap::new();
        if let Some(properties) = feature["properties"].as_object() {
            for (key, value) in properties {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
                data.insert(key.clone(), value.clone());
            }
        }

        let geometry = parse_point(&feature["geometry"])
            .with_context(|| format!("Invalid geometry in feature {}", index))?;
        parsed.push(GeoRecord {
            record: Record { data },
            geometry,
        });
    }

    Ok(GeoTable {
        name: value["name"].as_str().unwrap_or_default().to_string(),
        columns,
        features: parsed,
        srid: EPSG_WGS84,
    })
}

fn parse_point(geometry: &Value) -> anyhow::Result<Option<geo::Point<f64>>> {
    if geometry.is_null() {
        return Ok(None);
    }
    anyhow::ensure!(
        geometry["type"].as_str() == Some("Point"),
        "expected Point geometry, found {}",
        geometry["type"]
    );

    let coords = geometry["coordinates"]
        .as_array()
        .context("Point has no coordinates")?;
    let x = coords.first().and_then(Value::as_f64).context("x must be a number")?;
    let y = coords.get(1).and_then(Value::as_f64).context("y must be a number")?;
    Ok(Some(geo::Point::new(x, y)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::test_support::sample_table;

    #[test]
    fn test_feature_collection_layout() {
        let artifact = encode(&sample_table(), "north_green_spaces").unwrap();
        assert_eq!(artifact.path, "north_green_spaces.geojson");

        let value: Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(value["type"], "FeatureCollection");
        assert_eq!(value["crs"]["properties"]["name"], CRS84_URN);
        assert_eq!(value["features"].as_array().unwrap().len(), 2);
        assert_eq!(
            value["features"][0]["geometry"]["coordinates"],
            json!([27.21, 38.46])
        );
        assert!(value["features"][1]["geometry"].is_null());
        assert!(value["features"][1]["properties"]["lat"].is_null());

        let keys: Vec<&String> = value["features"][0]["properties"]
            .as_object()
            .unwrap()
            .keys()
            .collect();
        assert_eq!(keys, vec!["gs_name", "nbhd_name", "ADRES", "lat", "lon"]);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table();
        let artifact = encode(&table, "south_green_spaces").unwrap();
        let path = dir.path().join(&artifact.path);
        std::fs::write(&path, &artifact.bytes).unwrap();

        let back = read(&path).unwrap();
        assert_eq!(back.name, "south_green_spaces");
        assert_eq!(back.columns, table.columns);
        assert_eq!(back.features, table.features);
    }

    #[test]
    fn test_header_only_table_keeps_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = sample_table();
        table.features.clear();
        let artifact = encode(&table, "north_green_spaces").unwrap();
        let path = dir.path().join(&artifact.path);
        std::fs::write(&path, &artifact.bytes).unwrap();

        let back = read(&path).unwrap();
        assert!(back.is_empty());
        assert_eq!(back.columns, vec!["gs_name", "nbhd_name", "ADRES", "lat", "lon"]);
    }

    #[test]
    fn test_columns_fall_back_to_properties() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "name": "Kordon", "ADRES": "Alsancak" },
                "geometry": null
            }]
        });
        let table = parse_collection(&value).unwrap();
        assert_eq!(table.columns, vec!["name", "ADRES"]);
    }

    #[test]
    fn test_rejects_non_point_geometry() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "LineString", "coordinates": [[0, 0], [1, 1]] }
            }]
        });
        assert!(parse_collection(&value).is_err());
    }
}
