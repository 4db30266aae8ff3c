use crate::domain::model::{Record, Table};
use crate::utils::error::{EtlError, Result};
use std::collections::HashMap;

const UTF8_BOM: char = '\u{feff}';
const CANDIDATE_DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// 將分隔文字檔解析成資料表，欄位順序與表頭相同，所有值保留為字串。
///
/// `source` is only used in error messages.
pub fn parse_table(bytes: &[u8], delimiter: u8, source: &str) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_reader(bytes);

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches(UTF8_BOM) } else { h };
            h.to_string()
        })
        .collect();

    check_delimiter(&columns, delimiter, source)?;

    let mut table = Table::new(columns);
    for row in reader.records() {
        let row = row?;
        let mut data = HashMap::with_capacity(table.columns.len());
        for (column, value) in table.columns.iter().zip(row.iter()) {
            data.insert(column.clone(), serde_json::Value::String(value.to_string()));
        }
        table.records.push(Record { data });
    }

    tracing::debug!(
        "Parsed {} rows x {} columns from {}",
        table.len(),
        table.columns.len(),
        source
    );
    Ok(table)
}

/// 分隔符號不符時，整行表頭會被讀成單一欄位
fn check_delimiter(columns: &[String], delimiter: u8, source: &str) -> Result<()> {
    if let [only] = columns {
        let foreign = CANDIDATE_DELIMITERS
            .iter()
            .any(|&c| c as u8 != delimiter && only.contains(c));
        if foreign {
            return Err(EtlError::DelimiterMismatch {
                path: source.to_string(),
                expected: delimiter as char,
            });
        }
    }
    Ok(())
}

/// 把含座標的中繼表寫成逗號分隔的 CSV；未知座標輸出為空白欄位
pub fn write_table_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;

    for record in &table.records {
        let row: Vec<String> = table
            .columns
            .iter()
            .map(|column| match record.data.get(column) {
                None | Some(serde_json::Value::Null) => String::new(),
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&row)?;
    }

    writer.into_inner().map_err(|e| EtlError::ProcessingError {
        message: format!("Failed to flush CSV buffer: {}", e),
    })
}
