//! In-process opportunity queue.
//!
//! Any number of producers, exactly one consumer. The consumer pulls one
//! message at a time; nothing is prefetched on its behalf.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{AnalysisError, Result};
use crate::models::OpportunityContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: Uuid,
    pub enqueued_at: DateTime<Utc>,
    /// JSON-encoded `OpportunityContext`.
    pub body: String,
}

impl QueueMessage {
    pub fn decode(&self) -> Result<OpportunityContext> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[derive(Clone)]
pub struct OpportunityQueue {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<QueueMessage>,
}

pub fn channel() -> (OpportunityQueue, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OpportunityQueue { tx }, QueueConsumer { rx })
}

impl OpportunityQueue {
    pub fn send(&self, context: &OpportunityContext) -> Result<Uuid> {
        let message = QueueMessage {
            id: Uuid::new_v4(),
            enqueued_at: Utc::now(),
            body: serde_json::to_string(context)?,
        };
        let id = message.id;

        self.tx
            .send(message)
            .map_err(|_| AnalysisError::Queue("analysis worker is no longer running".to_string()))?;

        tracing::debug!("Queued fixture {} as message {}", context.fixture.id, id);
        Ok(id)
    }
}

impl QueueConsumer {
    /// Next message, or `None` once every producer is gone and the queue is empty.
    pub async fn recv(&mut self) -> Option<QueueMessage> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::sample_record;

    fn context(id: i64) -> OpportunityContext {
        let record = sample_record(id, "2024-05-01T19:00:00-03:00");
        OpportunityContext {
            fixture: record.fixture,
            statistics: "{}".to_string(),
            predictions: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (queue, mut consumer) = channel();
        let first = queue.send(&context(1)).unwrap();
        queue.send(&context(2)).unwrap();

        let message = consumer.recv().await.unwrap();
        assert_eq!(message.id, first);
        assert_eq!(message.decode().unwrap().fixture.id, 1);
        assert_eq!(consumer.recv().await.unwrap().decode().unwrap().fixture.id, 2);
    }

    #[tokio::test]
    async fn test_consumer_drains_then_ends() {
        let (queue, mut consumer) = channel();
        queue.send(&context(1)).unwrap();
        drop(queue);

        assert!(consumer.recv().await.is_some());
        assert!(consumer.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_fails_without_consumer() {
        let (queue, consumer) = channel();
        drop(consumer);
        assert!(matches!(queue.send(&context(1)), Err(AnalysisError::Queue(_))));
    }
}
