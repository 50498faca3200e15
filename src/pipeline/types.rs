//! Core data structures and the file-task wire codec

use serde::{Deserialize, Serialize};

/// Input file format, a closed set.
///
/// Dispatch is an exhaustive match on the wire tag; adding a format is a
/// compile-time-visible change, not a new substring check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Json,
}

impl FileFormat {
    /// Parse the fixed uppercase wire tag (`CSV` / `JSON`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "CSV" => Some(FileFormat::Csv),
            "JSON" => Some(FileFormat::Json),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::Json => "JSON",
        }
    }

    /// File extension the tag corresponds to, for manifest validation.
    pub fn extension(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
        }
    }
}

#[derive(Debug)]
pub enum TaskDecodeError {
    Utf8(std::str::Utf8Error),
    /// Payload did not split into exactly three fields
    FieldCount(usize),
    UnknownFormat(String),
}

impl std::fmt::Display for TaskDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskDecodeError::Utf8(e) => write!(f, "Task payload is not UTF-8: {}", e),
            TaskDecodeError::FieldCount(n) => {
                write!(f, "Task payload has {} fields, expected 3", n)
            }
            TaskDecodeError::UnknownFormat(t) => write!(f, "Unknown format tag: {}", t),
        }
    }
}

impl std::error::Error for TaskDecodeError {}

impl From<std::str::Utf8Error> for TaskDecodeError {
    fn from(err: std::str::Utf8Error) -> Self {
        TaskDecodeError::Utf8(err)
    }
}

/// A file-ingest task traveling over the file-tasks topic.
///
/// Wire form is flat text, single-space separated:
/// `<normalized-file-path> <FORMAT> <table-name>` as UTF-8 bytes. Paths with
/// embedded spaces are not representable; producers normalize paths first.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTask {
    pub path: String,
    pub format: FileFormat,
    pub table: String,
}

impl FileTask {
    pub fn new(path: impl Into<String>, format: FileFormat, table: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format,
            table: table.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        format!("{} {} {}", self.path, self.format.as_tag(), self.table).into_bytes()
    }

    /// Strict decode: exactly three fields and a known format tag, or the
    /// message is rejected whole.
    pub fn decode(payload: &[u8]) -> Result<Self, TaskDecodeError> {
        let text = std::str::from_utf8(payload)?;
        let fields: Vec<&str> = text.split(' ').collect();
        if fields.len() != 3 {
            return Err(TaskDecodeError::FieldCount(fields.len()));
        }

        let format = FileFormat::from_tag(fields[1])
            .ok_or_else(|| TaskDecodeError::UnknownFormat(fields[1].to_string()))?;

        Ok(Self {
            path: fields[0].to_string(),
            format,
            table: fields[2].to_string(),
        })
    }
}

/// One invoice record in the fixed 9-column canonical order.
///
/// Address fields are nullable; JSON sources carry explicit nulls and CSV
/// sources leave the field empty. `invoice_date` stays text in a sortable
/// lexical form (`YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvoiceRow {
    pub invoice_id: i64,
    pub customer_id: i64,
    pub invoice_date: String,
    pub billing_address: Option<String>,
    pub billing_city: Option<String>,
    pub billing_state: Option<String>,
    pub billing_country: Option<String>,
    pub billing_postal_code: Option<String>,
    pub total: f64,
}

/// The three columns aggregation reads back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceFact {
    pub customer_id: i64,
    pub invoice_date: String,
    pub total: f64,
}

/// Per-month summary row, derived on every aggregation pass, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    /// Year-month period key, `YYYY-MM`
    pub period: String,
    /// Customers seen at least once in the period
    pub distinct_customers: i64,
    /// Revenue over every invoice in the period, duplicates included
    pub total_amount: f64,
}
