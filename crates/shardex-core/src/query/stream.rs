use crate::{error::InternalError, model::EntityRef};
use async_trait::async_trait;
use tokio::sync::mpsc;

///
/// ResultObserver
///
/// Push-based consumer of query results. Exactly one of `on_completed` or
/// `on_error` ends the stream.
///

#[async_trait]
pub trait ResultObserver: Send + Sync {
    async fn on_next_batch(&self, items: Vec<EntityRef>);

    async fn on_completed(&self);

    async fn on_error(&self, error: &InternalError);
}

///
/// QueryEvent
///

#[derive(Debug)]
pub enum QueryEvent {
    Batch(Vec<EntityRef>),
    Completed,
    Error(String),
}

///
/// ChannelObserver
///
/// Adapts the push stream to a pull-style `QueryStream`.
///

#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::Sender<QueryEvent>,
}

impl ChannelObserver {
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, QueryStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        (Self { tx }, QueryStream { rx })
    }

    async fn push(&self, event: QueryEvent) {
        // A dropped stream means the consumer stopped listening.
        let _ = self.tx.send(event).await;
    }
}

#[async_trait]
impl ResultObserver for ChannelObserver {
    async fn on_next_batch(&self, items: Vec<EntityRef>) {
        self.push(QueryEvent::Batch(items)).await;
    }

    async fn on_completed(&self) {
        self.push(QueryEvent::Completed).await;
    }

    async fn on_error(&self, error: &InternalError) {
        self.push(QueryEvent::Error(error.display_with_class())).await;
    }
}

///
/// QueryStream
///

#[derive(Debug)]
pub struct QueryStream {
    rx: mpsc::Receiver<QueryEvent>,
}

impl QueryStream {
    pub async fn next_event(&mut self) -> Option<QueryEvent> {
        self.rx.recv().await
    }

    /// Drain the stream into batches; `Err` carries the pushed error text.
    pub async fn collect_batches(mut self) -> Result<Vec<Vec<EntityRef>>, String> {
        let mut batches = Vec::new();

        while let Some(event) = self.next_event().await {
            match event {
                QueryEvent::Batch(items) => batches.push(items),
                QueryEvent::Completed => return Ok(batches),
                QueryEvent::Error(err) => return Err(err),
            }
        }

        Err("query stream closed before completion".to_string())
    }
}
