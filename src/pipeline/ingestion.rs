//! Ingest stage - file tasks in, persisted rows out, ready notices forward
//!
//! Single-threaded receive loop: one task is fully processed (decode ->
//! parse -> write -> notify) before the next is taken, with no cross-message
//! state.
//!
//! Acknowledgment contract: receiving a payload removes it from the topic
//! queue before any processing happens, so a task that fails to decode,
//! parse, or write is gone for good - recoverable only by re-publishing
//! externally. This fire-and-forget stance is deliberate; the alternative
//! (ack after notify, tolerate redelivery) would lean on the same idempotent
//! schema and upsert paths this stage already uses.

use std::sync::Arc;

use crate::bus::{BusError, MessageBus};

use super::parser::{parse_file, ParseError};
use super::store::{InvoiceStore, StoreError};
use super::types::{FileTask, TaskDecodeError};

#[derive(Debug)]
pub enum IngestError {
    Decode(TaskDecodeError),
    Parse(ParseError),
    Store(StoreError),
    Bus(BusError),
}

impl From<TaskDecodeError> for IngestError {
    fn from(err: TaskDecodeError) -> Self {
        IngestError::Decode(err)
    }
}

impl From<ParseError> for IngestError {
    fn from(err: ParseError) -> Self {
        IngestError::Parse(err)
    }
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        IngestError::Store(err)
    }
}

impl From<BusError> for IngestError {
    fn from(err: BusError) -> Self {
        IngestError::Bus(err)
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Decode(e) => write!(f, "Decode error: {}", e),
            IngestError::Parse(e) => write!(f, "Parse error: {}", e),
            IngestError::Store(e) => write!(f, "Write error: {}", e),
            IngestError::Bus(e) => write!(f, "Notify error: {}", e),
        }
    }
}

impl std::error::Error for IngestError {}

pub struct IngestStage {
    bus: Arc<dyn MessageBus>,
    store: InvoiceStore,
    tasks_topic: String,
    ready_topic: String,
}

impl IngestStage {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: InvoiceStore,
        tasks_topic: impl Into<String>,
        ready_topic: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            store,
            tasks_topic: tasks_topic.into(),
            ready_topic: ready_topic.into(),
        }
    }

    /// Consume file tasks until the topic closes.
    ///
    /// Declares both topics first - this side cannot know whether the
    /// producer or the downstream consumer started before it.
    pub async fn run(self) {
        for topic in [&self.tasks_topic, &self.ready_topic] {
            if let Err(e) = self.bus.declare_topic(topic).await {
                log::error!("❌ Ingest stage cannot declare topic {}: {}", topic, e);
                return;
            }
        }

        let mut rx = match self.bus.subscribe(&self.tasks_topic).await {
            Ok(rx) => rx,
            Err(e) => {
                log::error!("❌ Ingest stage cannot subscribe to {}: {}", self.tasks_topic, e);
                return;
            }
        };

        log::info!(
            "📥 Ingest stage waiting for file tasks on '{}'",
            self.tasks_topic
        );

        while let Some(payload) = rx.recv().await {
            // The message is ours now; any failure below drops it for good
            match self.handle_task(&payload).await {
                Ok((task, written)) => {
                    log::info!(
                        "✅ Ingested {} rows into table {} from {}",
                        written,
                        task.table,
                        task.path
                    );
                }
                Err(e) => {
                    log::error!("❌ Dropped file task: {}", e);
                }
            }
        }

        log::info!("Ingest stage stopped: file-tasks topic closed");
    }

    /// One task through the full state machine: decode, parse, write,
    /// notify. Failing any step aborts the rest, so no partial row set is
    /// written and no notice goes out for a task that did not land.
    async fn handle_task(&self, payload: &[u8]) -> Result<(FileTask, usize), IngestError> {
        let task = FileTask::decode(payload)?;
        log::info!(
            "📄 Ingest received {} task for table {}",
            task.format.as_tag(),
            task.table
        );

        let rows = parse_file(&task.path, task.format)?;

        self.store.ensure_schema(&task.table)?;
        let written = self.store.upsert(&task.table, &rows)?;

        // Bare table name downstream: "fresh data to aggregate", nothing
        // about which file triggered it
        self.bus
            .publish(&self.ready_topic, task.table.clone().into_bytes())
            .await?;

        Ok((task, written))
    }
}
