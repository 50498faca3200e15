//! Task publisher - the write side of the file-tasks topic

use std::sync::Arc;

use crate::bus::{BusError, MessageBus};

use super::types::FileTask;

/// Translates a [`FileTask`] into its wire form and hands it to the bus.
///
/// Stateless beyond the bus handle. A successful publish means the bus
/// accepted the payload locally; whether any consumer ever sees it is not
/// this side's business.
pub struct TaskPublisher {
    bus: Arc<dyn MessageBus>,
    topic: String,
}

impl TaskPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, topic: impl Into<String>) -> Self {
        Self {
            bus,
            topic: topic.into(),
        }
    }

    /// Declare the task topic. Idempotent, and also done by the consuming
    /// side, so either process may start first.
    pub async fn declare(&self) -> Result<(), BusError> {
        self.bus.declare_topic(&self.topic).await
    }

    pub async fn publish(&self, task: &FileTask) -> Result<(), BusError> {
        self.bus.publish(&self.topic, task.encode()).await?;
        log::info!(
            "📤 Published {} task: {} -> table {}",
            task.format.as_tag(),
            task.path,
            task.table
        );
        Ok(())
    }
}
