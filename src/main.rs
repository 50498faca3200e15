//! Pipeline runtime - bus, both consumer stages, and the task producer in
//! one process.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin pipeline_runtime -- \
//!     data/invoices_2009.json:JSON:invoices \
//!     data/invoices_2012.csv:CSV:invoices
//! ```
//!
//! Each argument is `<path>:<FORMAT>:<table>`. The manifest is checked the
//! way the stages never will again: every task must target the same table,
//! the path must exist, and the file extension must match the declared
//! format tag - offending entries are logged and skipped, the rest publish.
//!
//! ## Environment Variables
//!
//! - INVOICEFLOW_DB_PATH - SQLite database path (default: data/invoices.db)
//! - FILE_TASKS_TOPIC - file-task topic name (default: files_to_database)
//! - TABLE_READY_TOPIC - ready-notice topic name (default: database_to_graph)
//! - CHART_OUTPUT_PATH - chart document path (default: data/figure.html)
//! - CONFLICT_POLICY - `ignore` or `replace` (default: ignore)
//! - TOPIC_CHANNEL_BUFFER - per-topic buffer in messages (default: 1000)
//! - PUBLISH_DELAY_MS - pause between tasks, to watch the chart update (default: 0)
//! - RUST_LOG - logging level (optional, default: info)

pub mod bus;
pub mod config;
pub mod pipeline;

pub use bus::{BusError, InMemoryBus, MessageBus, TopicReceiver};
pub use config::Config;

use {
    pipeline::{
        FileFormat, FileTask, GraphStage, HtmlChartRenderer, IngestStage, InvoiceStore,
        TaskPublisher,
    },
    std::env,
    std::path::Path,
    std::sync::Arc,
    tokio::time::{sleep, Duration},
};

/// Parse one `<path>:<FORMAT>:<table>` manifest argument.
///
/// Split from the right so drive letters and other colons in the path
/// survive.
fn parse_manifest_arg(arg: &str) -> Option<FileTask> {
    let mut parts = arg.rsplitn(3, ':');
    let table = parts.next()?;
    let tag = parts.next()?;
    let path = parts.next()?;

    if path.is_empty() || table.is_empty() {
        return None;
    }

    Some(FileTask::new(path, FileFormat::from_tag(tag)?, table))
}

/// Extension-vs-tag check at intake: a `.json` file declared CSV is skipped
/// here instead of failing later inside the stage.
fn extension_matches(task: &FileTask) -> bool {
    Path::new(&task.path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(task.format.extension()))
        .unwrap_or(false)
}

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();

    log::info!("🚀 Starting invoiceflow pipeline runtime...");
    log::info!("📊 Configuration:");
    log::info!("   DB path: {}", config.db_path);
    log::info!(
        "   Topics: {} -> {}",
        config.file_tasks_topic,
        config.table_ready_topic
    );
    log::info!("   Chart output: {}", config.chart_output_path);
    log::info!("   Conflict policy: {}", config.conflict_policy.as_str());

    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("Usage: pipeline_runtime <path>:<FORMAT>:<table> [...]");
        eprintln!("       FORMAT is CSV or JSON; all tasks must target the same table");
        std::process::exit(2);
    }

    let mut tasks = Vec::new();
    for arg in &args {
        match parse_manifest_arg(arg) {
            Some(task) => tasks.push(task),
            None => {
                log::warn!("⚠️  Bad manifest entry {:?}, skipping to next", arg);
            }
        }
    }

    // A manifest mixing tables is a caller mistake worth refusing outright
    // rather than half-running
    if let Some(first) = tasks.first() {
        if !tasks.iter().all(|t| t.table == first.table) {
            log::error!("❌ Not all tasks target the same table, closing app...");
            std::process::exit(2);
        }
    }

    let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(config.channel_buffer));

    // Consumer stages first; topic declaration is idempotent on both sides,
    // so this order is a convenience, not a requirement
    let graph_stage = GraphStage::new(
        bus.clone(),
        InvoiceStore::new(&config.db_path, config.conflict_policy)?,
        Arc::new(HtmlChartRenderer::new(&config.chart_output_path)),
        &config.table_ready_topic,
    );
    tokio::spawn(graph_stage.run());

    let ingest_stage = IngestStage::new(
        bus.clone(),
        InvoiceStore::new(&config.db_path, config.conflict_policy)?,
        &config.file_tasks_topic,
        &config.table_ready_topic,
    );
    tokio::spawn(ingest_stage.run());

    let publisher = TaskPublisher::new(bus.clone(), &config.file_tasks_topic);
    publisher.declare().await?;

    for task in &tasks {
        if !Path::new(&task.path).is_file() {
            log::warn!("⚠️  {} is not a valid path, skipping to next", task.path);
            continue;
        }
        if !extension_matches(task) {
            log::warn!(
                "⚠️  {} does not look like a {} file, skipping to next",
                task.path,
                task.format.as_tag()
            );
            continue;
        }

        publisher.publish(task).await?;

        if config.publish_delay_ms > 0 {
            sleep(Duration::from_millis(config.publish_delay_ms)).await;
        }
    }

    log::info!("✅ All tasks published; stages keep running until Ctrl+C");
    tokio::signal::ctrl_c().await?;
    log::info!("Shutting down");

    Ok(())
}
