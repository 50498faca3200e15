//! SQLite-backed invoice store
//!
//! Sole owner of the row-level write discipline for one database file. Each
//! operation opens, uses, and closes its own connection, so there is no
//! shared handle across stages and no transaction spanning operations. The
//! store never retries; a connect failure comes back to the caller, who may
//! simply call again.
//!
//! Table names arrive from message payloads, so they are untrusted input.
//! Identifiers cannot be bound as SQL parameters; every caller-supplied
//! table name is validated against a strict charset before it is
//! interpolated into a statement. All value positions use bound parameters.

use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use super::types::{InvoiceFact, InvoiceRow};

/// What a duplicate uniqueness key does to an incoming row.
///
/// Fixed once per deployment; the two modes are not interchangeable. Ignore
/// keeps the first row ever written (strict idempotent insert), Replace
/// keeps the latest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    Ignore,
    Replace,
}

impl ConflictPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ignore" => Some(ConflictPolicy::Ignore),
            "replace" => Some(ConflictPolicy::Replace),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Ignore => "ignore",
            ConflictPolicy::Replace => "replace",
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    /// Table name failed identifier validation
    InvalidTable(String),
    Database(rusqlite::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::InvalidTable(t) => write!(f, "Invalid table name: {:?}", t),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Reject anything but `[A-Za-z_][A-Za-z0-9_]*` as a table name.
fn validate_table(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(table.to_string()))
    }
}

pub struct InvoiceStore {
    db_path: PathBuf,
    policy: ConflictPolicy,
}

impl InvoiceStore {
    /// Create a store handle for a database file. No connection is held; the
    /// file itself appears on first use.
    pub fn new(db_path: impl AsRef<Path>, policy: ConflictPolicy) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Ok(Self { db_path, policy })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    fn open(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// Create the table if it does not already exist.
    ///
    /// Idempotent and called from both the ingest and the query path, since
    /// the stages cannot agree on who starts first. Existing rows are never
    /// touched.
    pub fn ensure_schema(&self, table: &str) -> Result<(), StoreError> {
        validate_table(table)?;
        let conn = self.open()?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    InvoiceId INTEGER NOT NULL,
                    CustomerId INTEGER NOT NULL,
                    InvoiceDate TEXT NOT NULL,
                    BillingAddress TEXT,
                    BillingCity TEXT,
                    BillingState TEXT,
                    BillingCountry TEXT,
                    BillingPostalCode TEXT,
                    Total REAL NOT NULL,
                    UNIQUE (InvoiceId, CustomerId)
                )",
                table
            ),
            [],
        )?;

        Ok(())
    }

    /// Insert a batch of rows inside one transaction.
    ///
    /// Rows hitting the uniqueness key are skipped or overwritten per the
    /// configured policy; a skipped duplicate is not a failure. Returns the
    /// number of rows actually applied. The batch commits as a whole - on
    /// any error nothing of it is visible.
    pub fn upsert(&self, table: &str, rows: &[InvoiceRow]) -> Result<usize, StoreError> {
        validate_table(table)?;
        let mut conn = self.open()?;
        let tx = conn.transaction()?;

        let sql = match self.policy {
            ConflictPolicy::Ignore => format!(
                "INSERT OR IGNORE INTO {}
                 (InvoiceId, CustomerId, InvoiceDate, BillingAddress, BillingCity,
                  BillingState, BillingCountry, BillingPostalCode, Total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                table
            ),
            ConflictPolicy::Replace => format!(
                "INSERT INTO {}
                 (InvoiceId, CustomerId, InvoiceDate, BillingAddress, BillingCity,
                  BillingState, BillingCountry, BillingPostalCode, Total)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (InvoiceId, CustomerId) DO UPDATE SET
                    InvoiceDate = excluded.InvoiceDate,
                    BillingAddress = excluded.BillingAddress,
                    BillingCity = excluded.BillingCity,
                    BillingState = excluded.BillingState,
                    BillingCountry = excluded.BillingCountry,
                    BillingPostalCode = excluded.BillingPostalCode,
                    Total = excluded.Total",
                table
            ),
        };

        let mut applied = 0;
        for row in rows {
            applied += tx.execute(
                &sql,
                params![
                    row.invoice_id,
                    row.customer_id,
                    row.invoice_date,
                    row.billing_address,
                    row.billing_city,
                    row.billing_state,
                    row.billing_country,
                    row.billing_postal_code,
                    row.total,
                ],
            )?;
        }

        tx.commit()?;
        log::debug!("✅ Applied {}/{} rows to table {}", applied, rows.len(), table);

        Ok(applied)
    }

    /// Read back the three aggregation columns.
    pub fn fetch_facts(&self, table: &str) -> Result<Vec<InvoiceFact>, StoreError> {
        validate_table(table)?;
        let conn = self.open()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT CustomerId, InvoiceDate, Total FROM {}",
            table
        ))?;
        let facts = stmt
            .query_map([], |row| {
                Ok(InvoiceFact {
                    customer_id: row.get(0)?,
                    invoice_date: row.get(1)?,
                    total: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(facts)
    }

    /// Read back full rows, ordered by the uniqueness key. Diagnostic path.
    pub fn fetch_rows(&self, table: &str) -> Result<Vec<InvoiceRow>, StoreError> {
        validate_table(table)?;
        let conn = self.open()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT InvoiceId, CustomerId, InvoiceDate, BillingAddress, BillingCity,
                    BillingState, BillingCountry, BillingPostalCode, Total
             FROM {} ORDER BY InvoiceId, CustomerId",
            table
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(InvoiceRow {
                    invoice_id: row.get(0)?,
                    customer_id: row.get(1)?,
                    invoice_date: row.get(2)?,
                    billing_address: row.get(3)?,
                    billing_city: row.get(4)?,
                    billing_state: row.get(5)?,
                    billing_country: row.get(6)?,
                    billing_postal_code: row.get(7)?,
                    total: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    pub fn count(&self, table: &str) -> Result<i64, StoreError> {
        validate_table(table)?;
        let conn = self.open()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Delete every row. Administrative/test reset, not a pipeline path.
    pub fn clear(&self, table: &str) -> Result<usize, StoreError> {
        validate_table(table)?;
        let conn = self.open()?;
        let deleted = conn.execute(&format!("DELETE FROM {}", table), [])?;
        log::info!("🗑️  Cleared {} rows from table {}", deleted, table);
        Ok(deleted)
    }

    pub fn drop_table(&self, table: &str) -> Result<(), StoreError> {
        validate_table(table)?;
        let conn = self.open()?;
        conn.execute(&format!("DROP TABLE IF EXISTS {}", table), [])?;
        Ok(())
    }
}
