use super::{column_kinds, text_value, Artifact, ColumnKind, ESRI_WGS84_WKT};
use crate::domain::model::{GeoRecord, GeoTable, Record, EPSG_WGS84};
use crate::utils::error::{EtlError, Result};
use shapefile::dbase::{self, FieldName, FieldValue, TableWriterBuilder};
use shapefile::{Shape, ShapeReader, ShapeWriter, Writer};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

const NUMERIC_WIDTH: u8 = 24;
const NUMERIC_DECIMALS: u8 = 15;
const MAX_CHARACTER_WIDTH: usize = 254;

/// 產生 `.shp/.shx/.dbf/.prj/.cpg` 五個檔案。
///
/// The underlying writer cannot emit null shapes, so rows without geometry are
/// written as a point with NaN coordinates; [`read`] maps those back to `None`.
pub fn encode(table: &GeoTable, stem: &str) -> Result<Vec<Artifact>> {
    let kinds = column_kinds(table);

    let mut builder = TableWriterBuilder::new();
    let mut widths = HashMap::with_capacity(table.columns.len());
    for (column, kind) in table.columns.iter().zip(&kinds) {
        let name = FieldName::try_from(column.as_str()).map_err(|_| EtlError::FieldNameTooLong {
            field: column.clone(),
            limit: 10,
            format: "Shapefile".to_string(),
        })?;
        builder = match kind {
            ColumnKind::Real => builder.add_numeric_field(name, NUMERIC_WIDTH, NUMERIC_DECIMALS),
            ColumnKind::Text => {
                let width = character_width(table, column);
                widths.insert(column.as_str(), width as usize);
                builder.add_character_field(name, width)
            }
        };
    }

    let mut shp_dest = Cursor::new(Vec::new());
    let mut shx_dest = Cursor::new(Vec::new());
    let mut dbf_dest = Cursor::new(Vec::new());
    {
        let shape_writer = ShapeWriter::with_shx(&mut shp_dest, &mut shx_dest);
        let dbase_writer = builder.build_with_dest(&mut dbf_dest);
        let mut writer = Writer::new(shape_writer, dbase_writer);

        for (row, feature) in table.features.iter().enumerate() {
            let point = match feature.geometry {
                Some(p) => shapefile::Point::new(p.x(), p.y()),
                None => shapefile::Point::new(f64::NAN, f64::NAN),
            };
            let record = dbase_record(table, row, &feature.record, &kinds, &widths);
            writer.write_shape_and_record(&point, &record)?;
        }
        // 離開作用域時 writer 會回寫檔頭
    }

    Ok(vec![
        Artifact {
            path: format!("{}.shp", stem),
            bytes: shp_dest.into_inner(),
        },
        Artifact {
            path: format!("{}.shx", stem),
            bytes: shx_dest.into_inner(),
        },
        Artifact {
            path: format!("{}.dbf", stem),
            bytes: dbf_dest.into_inner(),
        },
        Artifact {
            path: format!("{}.prj", stem),
            bytes: ESRI_WGS84_WKT.as_bytes().to_vec(),
        },
        Artifact {
            path: format!("{}.cpg", stem),
            bytes: b"UTF-8".to_vec(),
        },
    ])
}

/// dBase 字元欄寬以位元組計，最少 1、最多 254
fn character_width(table: &GeoTable, column: &str) -> u8 {
    let longest = table
        .features
        .iter()
        .filter_map(|f| text_value(f.record.data.get(column)))
        .map(|s| s.len())
        .max()
        .unwrap_or(1);
    longest.clamp(1, MAX_CHARACTER_WIDTH) as u8
}

fn dbase_record(
    table: &GeoTable,
    row: usize,
    record: &Record,
    kinds: &[ColumnKind],
    widths: &HashMap<&str, usize>,
) -> dbase::Record {
    let mut out = dbase::Record::default();
    for (column, kind) in table.columns.iter().zip(kinds) {
        let value = record.data.get(column);
        let field = match kind {
            ColumnKind::Real => FieldValue::Numeric(value.and_then(|v| v.as_f64())),
            ColumnKind::Text => {
                let width = widths.get(column.as_str()).copied().unwrap_or(MAX_CHARACTER_WIDTH);
                FieldValue::Character(text_value(value).map(|text| {
                    if text.len() > width {
                        tracing::warn!(
                            "⚠️ [{}] Row {} column '{}' is {} bytes, truncated to {} for the Shapefile",
                            table.name,
                            row,
                            column,
                            text.len(),
                            width
                        );
                    }
                    truncate_to_bytes(text, width)
                }))
            }
        };
        out.insert(column.clone(), field);
    }
    out
}

/// 截斷到不超過 `max` 個位元組，且不切開 UTF-8 字元
fn truncate_to_bytes(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}

pub fn read(path: &Path) -> Result<GeoTable> {
    let shapes = ShapeReader::from_path(path)?.read()?;

    let mut dbf = dbase::Reader::from_path(path.with_extension("dbf"))
        .map_err(shapefile::Error::from)?;
    let columns: Vec<String> = dbf.fields().iter().map(|f| f.name().to_string()).collect();
    let records = dbf.read().map_err(shapefile::Error::from)?;

    if shapes.len() != records.len() {
        return Err(EtlError::ProcessingError {
            message: format!(
                "{} has {} shapes but {} attribute rows",
                path.display(),
                shapes.len(),
                records.len()
            ),
        });
    }

    let mut features = Vec::with_capacity(shapes.len());
    for (shape, mut row) in shapes.into_iter().zip(records) {
        let geometry = match shape {
            Shape::Point(p) if p.x.is_finite() && p.y.is_finite() => Some(geo::Point::new(p.x, p.y)),
            Shape::Point(_) | Shape::NullShape => None,
            other => {
                return Err(EtlError::ProcessingError {
                    message: format!("Unexpected {} shape in {}", other.shapetype(), path.display()),
                })
            }
        };

        let mut data = HashMap::with_capacity(columns.len());
        for column in &columns {
            let value = match row.remove(column) {
                Some(FieldValue::Character(Some(s))) => serde_json::Value::String(s),
                Some(FieldValue::Numeric(Some(n))) => serde_json::Value::from(n),
                Some(FieldValue::Float(Some(n))) => serde_json::Value::from(f64::from(n)),
                Some(FieldValue::Double(n)) => serde_json::Value::from(n),
                Some(FieldValue::Integer(n)) => serde_json::Value::from(n),
                _ => serde_json::Value::Null,
            };
            data.insert(column.clone(), value);
        }
        features.push(GeoRecord {
            record: Record { data },
            geometry,
        });
    }

    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(GeoTable {
        name,
        columns,
        features,
        srid: EPSG_WGS84,
    })
}
