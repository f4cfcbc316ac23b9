use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::LoopStatus;

/// Receives every status the loop emits.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn push(&self, status: LoopStatus) -> Result<()>;
}

/// Fans statuses out to every subscriber (one per connected client).
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<LoopStatus>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopStatus> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl StatusSink for BroadcastSink {
    async fn push(&self, status: LoopStatus) -> Result<()> {
        // No subscribers is not a failure; nobody is watching.
        if self.tx.send(status).is_err() {
            log::debug!("Status dropped, no subscribers");
        }
        Ok(())
    }
}

/// Deliver `status`, logging instead of failing.
pub async fn push_status(sink: &dyn StatusSink, status: LoopStatus) {
    if let Err(err) = sink.push(status).await {
        log::error!("Status sink error: {err:#}");
    }
}
