//! File parsing for the two ingest formats
//!
//! A file parses as a whole or not at all: any malformed record aborts and
//! no partial row set escapes to the store.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use super::types::{FileFormat, InvoiceRow};

#[derive(Debug)]
pub enum ParseError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    /// A record that deserialized but does not fit the 9-column layout
    Field(String),
}

impl From<std::io::Error> for ParseError {
    fn from(err: std::io::Error) -> Self {
        ParseError::Io(err)
    }
}

impl From<csv::Error> for ParseError {
    fn from(err: csv::Error) -> Self {
        ParseError::Csv(err)
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Io(e) => write!(f, "IO error: {}", e),
            ParseError::Csv(e) => write!(f, "CSV error: {}", e),
            ParseError::Json(e) => write!(f, "JSON error: {}", e),
            ParseError::Field(msg) => write!(f, "Field error: {}", msg),
        }
    }
}

impl std::error::Error for ParseError {}

/// Read the full file content for the declared format.
pub fn parse_file(path: impl AsRef<Path>, format: FileFormat) -> Result<Vec<InvoiceRow>, ParseError> {
    let file = File::open(path.as_ref())?;
    match format {
        FileFormat::Csv => parse_csv(file),
        FileFormat::Json => parse_json(file),
    }
}

/// CSV: header row skipped, remaining records positional in the canonical
/// 9-column order. Empty address fields read as NULL.
fn parse_csv(file: File) -> Result<Vec<InvoiceRow>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(BufReader::new(file));

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.len() != 9 {
            return Err(ParseError::Field(format!(
                "record has {} fields, expected 9",
                record.len()
            )));
        }

        rows.push(InvoiceRow {
            invoice_id: parse_int(&record, 0, "InvoiceId")?,
            customer_id: parse_int(&record, 1, "CustomerId")?,
            invoice_date: record[2].to_string(),
            billing_address: opt(&record[3]),
            billing_city: opt(&record[4]),
            billing_state: opt(&record[5]),
            billing_country: opt(&record[6]),
            billing_postal_code: opt(&record[7]),
            total: parse_float(&record, 8, "Total")?,
        });
    }

    Ok(rows)
}

/// JSON: an array of objects, fields re-projected by name regardless of the
/// source key order.
fn parse_json(file: File) -> Result<Vec<InvoiceRow>, ParseError> {
    let rows: Vec<InvoiceRow> = serde_json::from_reader(BufReader::new(file))?;
    Ok(rows)
}

fn opt(field: &str) -> Option<String> {
    if field.is_empty() {
        None
    } else {
        Some(field.to_string())
    }
}

fn parse_int(record: &csv::StringRecord, idx: usize, name: &str) -> Result<i64, ParseError> {
    record[idx]
        .parse()
        .map_err(|_| ParseError::Field(format!("{} is not an integer: {:?}", name, &record[idx])))
}

fn parse_float(record: &csv::StringRecord, idx: usize, name: &str) -> Result<f64, ParseError> {
    record[idx]
        .parse()
        .map_err(|_| ParseError::Field(format!("{} is not a number: {:?}", name, &record[idx])))
}
