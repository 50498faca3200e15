//! Runtime configuration from environment variables

use std::env;

use crate::pipeline::store::ConflictPolicy;

/// Configuration for the pipeline runtime
///
/// Loaded from environment variables with sensible defaults. Topic names,
/// table names and the storage location are configuration, not protocol -
/// any value works as long as producer and consumers agree.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file
    pub db_path: String,

    /// Topic carrying file-ingest tasks (producer -> ingest stage)
    pub file_tasks_topic: String,

    /// Topic carrying table-ready notices (ingest stage -> graph stage)
    pub table_ready_topic: String,

    /// Where the rendered chart document is written
    pub chart_output_path: String,

    /// Row conflict handling, fixed once per deployment
    pub conflict_policy: ConflictPolicy,

    /// Per-topic channel buffer size (messages)
    pub channel_buffer: usize,

    /// Pause between published tasks in milliseconds (0 = no pacing)
    pub publish_delay_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `INVOICEFLOW_DB_PATH` (default: data/invoices.db)
    /// - `FILE_TASKS_TOPIC` (default: files_to_database)
    /// - `TABLE_READY_TOPIC` (default: database_to_graph)
    /// - `CHART_OUTPUT_PATH` (default: data/figure.html)
    /// - `CONFLICT_POLICY` (`ignore` or `replace`, default: ignore)
    /// - `TOPIC_CHANNEL_BUFFER` (default: 1000)
    /// - `PUBLISH_DELAY_MS` (default: 0)
    pub fn from_env() -> Self {
        Self {
            db_path: env::var("INVOICEFLOW_DB_PATH")
                .unwrap_or_else(|_| "data/invoices.db".to_string()),

            file_tasks_topic: env::var("FILE_TASKS_TOPIC")
                .unwrap_or_else(|_| "files_to_database".to_string()),

            table_ready_topic: env::var("TABLE_READY_TOPIC")
                .unwrap_or_else(|_| "database_to_graph".to_string()),

            chart_output_path: env::var("CHART_OUTPUT_PATH")
                .unwrap_or_else(|_| "data/figure.html".to_string()),

            conflict_policy: env::var("CONFLICT_POLICY")
                .ok()
                .and_then(|s| ConflictPolicy::from_str(&s))
                .unwrap_or(ConflictPolicy::Ignore),

            channel_buffer: env::var("TOPIC_CHANNEL_BUFFER")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1_000),

            publish_delay_ms: env::var("PUBLISH_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
        }
    }
}
