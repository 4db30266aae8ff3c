use super::{column_kinds, Artifact, ColumnKind, OGC_WGS84_WKT};
use crate::domain::model::{GeoRecord, GeoTable, Record};
use crate::utils::error::{EtlError, Result};
use geo::BoundingRect;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::Path;

/// "GPKG" as a big-endian i32
const APPLICATION_ID: i32 = 0x4750_4B47;
const USER_VERSION: i32 = 10200;
const GEOMETRY_COLUMN: &str = "geom";
const FID_COLUMN: &str = "fid";

const SCHEMA: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
    srs_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL PRIMARY KEY,
    organization TEXT NOT NULL,
    organization_coordsys_id INTEGER NOT NULL,
    definition TEXT NOT NULL,
    description TEXT
);
CREATE TABLE gpkg_contents (
    table_name TEXT NOT NULL PRIMARY KEY,
    data_type TEXT NOT NULL,
    identifier TEXT UNIQUE,
    description TEXT DEFAULT '',
    last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
    min_x DOUBLE,
    min_y DOUBLE,
    max_x DOUBLE,
    max_y DOUBLE,
    srs_id INTEGER,
    CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
CREATE TABLE gpkg_geometry_columns (
    table_name TEXT NOT NULL,
    column_name TEXT NOT NULL,
    geometry_type_name TEXT NOT NULL,
    srs_id INTEGER NOT NULL,
    z TINYINT NOT NULL,
    m TINYINT NOT NULL,
    CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
    CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
    CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
INSERT INTO gpkg_spatial_ref_sys VALUES
    ('Undefined cartesian SRS', -1, 'NONE', -1, 'undefined', 'undefined cartesian coordinate reference system'),
    ('Undefined geographic SRS', 0, 'NONE', 0, 'undefined', 'undefined geographic coordinate reference system');
";

/// 以 SQLite 產生單一圖層的 GeoPackage。
///
/// The database is built in a scratch directory and returned as bytes so it
/// goes through the same storage path as every other format.
pub fn encode(table: &GeoTable, stem: &str) -> Result<Artifact> {
    let scratch = tempfile::tempdir()?;
    let db_path = scratch.path().join(format!("{}.gpkg", stem));

    {
        let mut conn = Connection::open(&db_path)?;
        write_layer(&mut conn, table, stem)?;
    }

    Ok(Artifact {
        path: format!("{}.gpkg", stem),
        bytes: std::fs::read(&db_path)?,
    })
}

fn write_layer(conn: &mut Connection, table: &GeoTable, layer: &str) -> Result<()> {
    for column in &table.columns {
        if column.eq_ignore_ascii_case(FID_COLUMN) || column.eq_ignore_ascii_case(GEOMETRY_COLUMN) {
            return Err(EtlError::ValidationError {
                message: format!("Column name '{}' is reserved in GeoPackage layers", column),
            });
        }
    }

    conn.pragma_update(None, "application_id", APPLICATION_ID)?;
    conn.pragma_update(None, "user_version", USER_VERSION)?;

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    tx.execute(
        "INSERT INTO gpkg_spatial_ref_sys VALUES ('WGS 84 geodetic', ?1, 'EPSG', ?1, ?2, 'longitude/latitude coordinates in decimal degrees on the WGS 84 spheroid')",
        params![table.srid, OGC_WGS84_WKT],
    )?;

    let kinds = column_kinds(table);
    let mut ddl = format!(
        "CREATE TABLE {} ({} INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL, {} POINT",
        quote(layer),
        quote(FID_COLUMN),
        quote(GEOMETRY_COLUMN)
    );
    for (column, kind) in table.columns.iter().zip(&kinds) {
        let sql_type = match kind {
            ColumnKind::Real => "REAL",
            ColumnKind::Text => "TEXT",
        };
        ddl.push_str(&format!(", {} {}", quote(column), sql_type));
    }
    ddl.push(')');
    tx.execute_batch(&ddl)?;

    let points: Vec<geo::Point<f64>> = table.points().collect();
    let bbox = geo::MultiPoint::from(points).bounding_rect();
    let last_change = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    tx.execute(
        "INSERT INTO gpkg_contents (table_name, data_type, identifier, description, last_change, min_x, min_y, max_x, max_y, srs_id)
         VALUES (?1, 'features', ?1, '', ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            layer,
            last_change,
            bbox.map(|r| r.min().x),
            bbox.map(|r| r.min().y),
            bbox.map(|r| r.max().x),
            bbox.map(|r| r.max().y),
            table.srid
        ],
    )?;
    tx.execute(
        "INSERT INTO gpkg_geometry_columns VALUES (?1, ?2, 'POINT', ?3, 0, 0)",
        params![layer, GEOMETRY_COLUMN, table.srid],
    )?;

    {
        let column_list: Vec<String> = std::iter::once(GEOMETRY_COLUMN.to_string())
            .chain(table.columns.iter().cloned())
            .map(|c| quote(&c))
            .collect();
        let placeholders: Vec<String> = (1..=column_list.len()).map(|i| format!("?{}", i)).collect();
        let mut insert = tx.prepare(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(layer),
            column_list.join(", "),
            placeholders.join(", ")
        ))?;

        for feature in &table.features {
            let mut values = Vec::with_capacity(table.columns.len() + 1);
            values.push(match feature.geometry {
                Some(p) => SqlValue::Blob(encode_point(p, table.srid)),
                None => SqlValue::Null,
            });
            for (column, kind) in table.columns.iter().zip(&kinds) {
                values.push(sql_value(feature.record.data.get(column), *kind));
            }
            insert.execute(params_from_iter(values))?;
        }
    }

    tx.commit()?;
    tracing::debug!("[{}] GeoPackage layer '{}' written", table.name, layer);
    Ok(())
}

fn sql_value(value: Option<&serde_json::Value>, kind: ColumnKind) -> SqlValue {
    match (value, kind) {
        (None | Some(serde_json::Value::Null), _) => SqlValue::Null,
        (Some(v), ColumnKind::Real) => v.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        (Some(serde_json::Value::String(s)), ColumnKind::Text) => SqlValue::Text(s.clone()),
        (Some(other), ColumnKind::Text) => SqlValue::Text(other.to_string()),
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// GeoPackage binary header (no envelope) followed by a little-endian WKB point.
pub fn encode_point(point: geo::Point<f64>, srid: u32) -> Vec<u8> {
    let mut blob = Vec::with_capacity(8 + 21);
    blob.extend_from_slice(b"GP");
    blob.push(0); // version
    blob.push(0b0000_0001); // little endian, no envelope
    blob.extend_from_slice(&(srid as i32).to_le_bytes());

    blob.push(1);
    blob.extend_from_slice(&1u32.to_le_bytes());
    blob.extend_from_slice(&point.x().to_le_bytes());
    blob.extend_from_slice(&point.y().to_le_bytes());
    blob
}

/// 解析 GeoPackage 幾何 blob，只接受點
pub fn decode_point(blob: &[u8]) -> Result<Option<geo::Point<f64>>> {
    let invalid = |reason: &str| EtlError::ProcessingError {
        message: format!("Invalid GeoPackage geometry: {}", reason),
    };

    if blob.len() < 8 || &blob[0..2] != b"GP" {
        return Err(invalid("missing GP magic"));
    }
    let flags = blob[3];
    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        _ => return Err(invalid("unknown envelope indicator")),
    };
    // empty geometry flag
    if flags & 0b0001_0000 != 0 {
        return Ok(None);
    }

    let wkb = blob
        .get(8 + envelope_len..)
        .ok_or_else(|| invalid("truncated header"))?;
    if wkb.len() < 21 {
        return Err(invalid("truncated WKB point"));
    }

    let little_endian = wkb[0] == 1;
    let read_u32 = |b: &[u8]| {
        let bytes = [b[0], b[1], b[2], b[3]];
        if little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        }
    };
    let read_f64 = |b: &[u8]| {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&b[..8]);
        if little_endian {
            f64::from_le_bytes(bytes)
        } else {
            f64::from_be_bytes(bytes)
        }
    };

    let geometry_type = read_u32(&wkb[1..5]);
    if geometry_type != 1 {
        return Err(invalid(&format!("expected WKB point, found type {}", geometry_type)));
    }
    let x = read_f64(&wkb[5..13]);
    let y = read_f64(&wkb[13..21]);
    if x.is_nan() && y.is_nan() {
        return Ok(None);
    }
    Ok(Some(geo::Point::new(x, y)))
}

/// 讀回第一個 features 圖層
pub fn read(path: &Path) -> Result<GeoTable> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let (layer, srid): (String, Option<u32>) = conn.query_row(
        "SELECT table_name, srs_id FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name LIMIT 1",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    let geometry_column: String = conn.query_row(
        "SELECT column_name FROM gpkg_geometry_columns WHERE table_name = ?1",
        params![layer],
        |row| row.get(0),
    )?;

    let columns: Vec<String> = {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(&layer)))?;
        let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
        names
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|name| name != &geometry_column && !name.eq_ignore_ascii_case(FID_COLUMN))
            .collect()
    };

    let select: Vec<String> = std::iter::once(&geometry_column)
        .chain(columns.iter())
        .map(|c| quote(c))
        .collect();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM {} ORDER BY {}",
        select.join(", "),
        quote(&layer),
        quote(FID_COLUMN)
    ))?;

    let mut rows = stmt.query([])?;
    let mut features = Vec::new();
    while let Some(row) = rows.next()? {
        let geometry = match row.get_ref(0)? {
            ValueRef::Blob(blob) => decode_point(blob)?,
            _ => None,
        };

        let mut data = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            let value = match row.get_ref(i + 1)? {
                ValueRef::Null | ValueRef::Blob(_) => serde_json::Value::Null,
                ValueRef::Integer(n) => serde_json::Value::from(n),
                ValueRef::Real(n) => serde_json::Value::from(n),
                ValueRef::Text(t) => serde_json::Value::String(String::from_utf8_lossy(t).into_owned()),
            };
            data.insert(column.clone(), value);
        }
        features.push(GeoRecord {
            record: Record { data },
            geometry,
        });
    }

    Ok(GeoTable {
        name: layer,
        columns,
        features,
        srid: srid.unwrap_or(crate::domain::model::EPSG_WGS84),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::test_support::sample_table;

    #[test]
    fn test_point_blob_layout() {
        let blob = encode_point(geo::Point::new(27.21, 38.46), 4326);

        assert_eq!(&blob[0..2], b"GP");
        assert_eq!(blob[3], 0x01);
        assert_eq!(i32::from_le_bytes([blob[4], blob[5], blob[6], blob[7]]), 4326);
        assert_eq!(blob.len(), 8 + 21);
        assert_eq!(decode_point(&blob).unwrap(), Some(geo::Point::new(27.21, 38.46)));
    }

    #[test]
    fn test_decode_skips_envelope() {
        let plain = encode_point(geo::Point::new(1.5, 2.5), 4326);
        let mut with_envelope = plain[..8].to_vec();
        with_envelope[3] = 0b0000_0011; // xy envelope
        for v in [1.5f64, 1.5, 2.5, 2.5] {
            with_envelope.extend_from_slice(&v.to_le_bytes());
        }
        with_envelope.extend_from_slice(&plain[8..]);

        assert_eq!(decode_point(&with_envelope).unwrap(), Some(geo::Point::new(1.5, 2.5)));
        assert!(decode_point(b"XX").is_err());
    }

    #[test]
    fn test_gpkg_metadata_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let table = sample_table();
        let artifact = encode(&table, "north_green_spaces").unwrap();
        assert_eq!(artifact.path, "north_green_spaces.gpkg");
        let path = dir.path().join(&artifact.path);
        std::fs::write(&path, &artifact.bytes).unwrap();

        let conn = Connection::open(&path).unwrap();
        let app_id: i32 = conn
            .query_row("PRAGMA application_id", [], |r| r.get(0))
            .unwrap();
        assert_eq!(app_id, APPLICATION_ID);
        let (min_x, max_y): (f64, f64) = conn
            .query_row(
                "SELECT min_x, max_y FROM gpkg_contents WHERE table_name = 'north_green_spaces'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!((min_x, max_y), (27.21, 38.46));
        drop(conn);

        let back = read(&path).unwrap();
        assert_eq!(back.name, "north_green_spaces");
        assert_eq!(back.srid, 4326);
        assert_eq!(back.columns, table.columns);
        assert_eq!(back.features, table.features);
    }

    #[test]
    fn test_reserved_column_names_rejected() {
        let mut table = sample_table();
        table.columns[0] = "fid".to_string();
        assert!(matches!(
            encode(&table, "north_green_spaces"),
            Err(EtlError::ValidationError { .. })
        ));
    }
}
