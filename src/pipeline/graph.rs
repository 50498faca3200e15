//! Aggregation stage - table-ready notices in, rendered series out
//!
//! Stateless between messages and idempotent: every notice triggers a full
//! recompute from current store contents, so aggregating the same table
//! five times is merely four times redundant, never wrong. Which file
//! triggered the refresh is unknowable here by design - the notice only
//! says a refresh is due.

use std::sync::Arc;

use crate::bus::MessageBus;

use super::aggregate::monthly_aggregates;
use super::render::{ChartRenderer, RenderError};
use super::store::{InvoiceStore, StoreError};

#[derive(Debug)]
pub enum GraphError {
    /// Notice payload was not UTF-8
    Notice(std::string::FromUtf8Error),
    Query(StoreError),
    Render(RenderError),
}

impl From<std::string::FromUtf8Error> for GraphError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        GraphError::Notice(err)
    }
}

impl From<StoreError> for GraphError {
    fn from(err: StoreError) -> Self {
        GraphError::Query(err)
    }
}

impl From<RenderError> for GraphError {
    fn from(err: RenderError) -> Self {
        GraphError::Render(err)
    }
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::Notice(e) => write!(f, "Notice error: {}", e),
            GraphError::Query(e) => write!(f, "Query error: {}", e),
            GraphError::Render(e) => write!(f, "Render error: {}", e),
        }
    }
}

impl std::error::Error for GraphError {}

pub struct GraphStage {
    bus: Arc<dyn MessageBus>,
    store: InvoiceStore,
    renderer: Arc<dyn ChartRenderer>,
    ready_topic: String,
}

impl GraphStage {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        store: InvoiceStore,
        renderer: Arc<dyn ChartRenderer>,
        ready_topic: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            store,
            renderer,
            ready_topic: ready_topic.into(),
        }
    }

    /// Consume table-ready notices until the topic closes.
    pub async fn run(self) {
        if let Err(e) = self.bus.declare_topic(&self.ready_topic).await {
            log::error!("❌ Graph stage cannot declare topic {}: {}", self.ready_topic, e);
            return;
        }

        let mut rx = match self.bus.subscribe(&self.ready_topic).await {
            Ok(rx) => rx,
            Err(e) => {
                log::error!("❌ Graph stage cannot subscribe to {}: {}", self.ready_topic, e);
                return;
            }
        };

        log::info!(
            "📥 Graph stage waiting for ready notices on '{}'",
            self.ready_topic
        );

        while let Some(payload) = rx.recv().await {
            match self.handle_notice(payload).await {
                Ok((table, periods)) => {
                    log::info!("✅ Rendered {} periods for table {}", periods, table);
                }
                Err(e) => {
                    log::error!("❌ Dropped ready notice: {}", e);
                }
            }
        }

        log::info!("Graph stage stopped: table-ready topic closed");
    }

    async fn handle_notice(&self, payload: Vec<u8>) -> Result<(String, usize), GraphError> {
        let table = String::from_utf8(payload)?;
        log::info!("📊 Graph stage received ready notice for table {}", table);

        // The notice may outrun the first write on a fresh deployment;
        // creating the empty table beats failing the query
        self.store.ensure_schema(&table)?;

        let facts = self.store.fetch_facts(&table)?;
        let series = monthly_aggregates(&facts);

        self.renderer.render(&table, &series).await?;
        Ok((table, series.len()))
    }
}
