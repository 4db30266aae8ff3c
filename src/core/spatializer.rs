use crate::domain::model::{ColumnMapping, GeoRecord, GeoTable, Table, EPSG_WGS84};
use crate::utils::error::{EtlError, Result};
use geo::Point;

/// 由經緯度欄位建立點幾何。座標任一為空或非有限值時幾何為 `None`，
/// 該列仍保留在資料表中。不做投影轉換。
pub fn attach_geometry(
    name: &str,
    table: Table,
    longitude_column: &str,
    latitude_column: &str,
) -> GeoTable {
    let features: Vec<GeoRecord> = table
        .records
        .into_iter()
        .map(|record| {
            let lon = record.get_f64(longitude_column).filter(|v| v.is_finite());
            let lat = record.get_f64(latitude_column).filter(|v| v.is_finite());
            let geometry = match (lon, lat) {
                (Some(x), Some(y)) => Some(Point::new(x, y)),
                _ => None,
            };
            GeoRecord { record, geometry }
        })
        .collect();

    let missing = features.iter().filter(|f| f.geometry.is_none()).count();
    if missing > 0 {
        tracing::warn!(
            "📍 [{}] {} of {} rows have no geometry (unknown coordinates)",
            name,
            missing,
            features.len()
        );
    }

    GeoTable {
        name: name.to_string(),
        columns: table.columns,
        features,
        srid: EPSG_WGS84,
    }
}

/// 依對照表縮短欄位名稱。已改名的欄位不在對照表的定義域內，所以重複套用不會有變化。
pub fn rename(mut table: GeoTable, mapping: &ColumnMapping) -> Result<GeoTable> {
    let mut renamed = Vec::new();
    let mut columns = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        match mapping.get(column) {
            Some(alias) if alias != column => {
                if table.columns.iter().any(|c| c == alias) {
                    return Err(EtlError::ValidationError {
                        message: format!(
                            "Cannot rename '{}' to '{}' in '{}': column already exists",
                            column, alias, table.name
                        ),
                    });
                }
                renamed.push((column.clone(), alias.to_string()));
                columns.push(alias.to_string());
            }
            _ => columns.push(column.clone()),
        }
    }

    if renamed.is_empty() {
        return Ok(table);
    }

    for feature in &mut table.features {
        for (from, to) in &renamed {
            if let Some(value) = feature.record.data.remove(from) {
                feature.record.data.insert(to.clone(), value);
            }
        }
    }

    tracing::debug!("[{}] Renamed columns: {:?}", table.name, renamed);
    table.columns = columns;
    Ok(table)
}
