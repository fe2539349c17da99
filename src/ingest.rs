//! CSV Ingestion
//!
//! Thin adapter from CSV files to the engine's row model. Cells stay raw
//! strings (the Type Profiler owns numeric interpretation); blank cells
//! become nulls and formula-injection-prone leading `=` characters are
//! neutralized before the engine sees them.

use crate::dataset::{sanitize_cell, Row, Value};
use crate::error::{EngineError, Result};
use std::io::Read;
use std::path::Path;

pub fn dataset_from_csv_path(path: impl AsRef<Path>) -> Result<Vec<Row>> {
    let file = std::fs::File::open(path.as_ref())?;
    dataset_from_reader(file)
}

pub fn dataset_from_reader<R: Read>(reader: R) -> Result<Vec<Row>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let headers: Vec<String> = csv_reader
        .headers()
        .map_err(|e| EngineError::Ingest(format!("bad CSV header: {}", e)))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|e| EngineError::Ingest(format!("bad CSV record: {}", e)))?;
        let mut row = Row::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            let value = if field.trim().is_empty() {
                Value::Null
            } else {
                Value::Text(sanitize_cell(field))
            };
            row.insert(header.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}
