//! Transactional outbox.
//!
//! Handlers never publish directly: they enqueue `(cluster, message)` pairs
//! while the database transaction is open and flush only after the commit
//! returns. Dropping the outbox (any early `?`) discards everything, so a
//! rolled-back transaction publishes nothing.

use anyhow::Result;
use async_trait::async_trait;
use gantry_common::messages::Message;
use std::collections::VecDeque;
use uuid::Uuid;

#[async_trait]
pub trait ClusterPublisher: Send + Sync {
    async fn publish_to_cluster(&self, cluster_id: Uuid, message: &Message) -> Result<()>;
}

#[derive(Default)]
pub struct Outbox {
    messages: VecDeque<(Uuid, Message)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, cluster_id: Uuid, message: Message) {
        self.messages.push_back((cluster_id, message));
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Publish everything in order. Call only after the transaction commits.
    ///
    /// A message is removed from the queue only once the broker confirms it,
    /// so a mid-flight failure leaves the remainder queued in order and the
    /// error surfaces to the caller. Already-published messages are not
    /// rolled back; handlers are idempotent.
    pub async fn flush(&mut self, publisher: &dyn ClusterPublisher) -> Result<()> {
        while let Some((cluster_id, message)) = self.messages.front() {
            tracing::info!(
                %cluster_id,
                message_type = message.message_type(),
                "publishing outbox message"
            );
            publisher.publish_to_cluster(*cluster_id, message).await?;
            self.messages.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records published messages; fails every publish once `fail_after`
    /// messages have gone out.
    struct RecordingPublisher {
        published: Mutex<Vec<(Uuid, String)>>,
        fail_after: Option<usize>,
    }

    impl RecordingPublisher {
        fn new(fail_after: Option<usize>) -> Self {
            Self {
                published: Mutex::new(Vec::new()),
                fail_after,
            }
        }
    }

    #[async_trait]
    impl ClusterPublisher for RecordingPublisher {
        async fn publish_to_cluster(&self, cluster_id: Uuid, message: &Message) -> Result<()> {
            let mut published = self.published.lock().unwrap();
            if let Some(limit) = self.fail_after
                && published.len() >= limit
            {
                anyhow::bail!("broker unavailable");
            }
            published.push((cluster_id, message.message_type().to_string()));
            Ok(())
        }
    }

    fn delete_message() -> Message {
        Message::DeleteWorkload {
            workload_id: Uuid::new_v4(),
        }
    }

    fn namespace_message(name: &str) -> Message {
        Message::ProjectNamespaceCreate {
            name: name.into(),
            project_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn flush_preserves_emission_order() {
        let publisher = RecordingPublisher::new(None);
        let cluster = Uuid::new_v4();
        let mut outbox = Outbox::new();
        outbox.enqueue(cluster, namespace_message("test-a"));
        outbox.enqueue(cluster, delete_message());

        outbox.flush(&publisher).await.unwrap();

        let published = publisher.published.lock().unwrap();
        assert_eq!(
            published.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>(),
            vec!["project_namespace_create", "delete_workload"]
        );
        assert!(outbox.is_empty());
    }

    #[tokio::test]
    async fn failed_flush_keeps_the_remainder_queued() {
        let publisher = RecordingPublisher::new(Some(1));
        let cluster = Uuid::new_v4();
        let mut outbox = Outbox::new();
        outbox.enqueue(cluster, namespace_message("a"));
        outbox.enqueue(cluster, namespace_message("b"));
        outbox.enqueue(cluster, namespace_message("c"));

        assert!(outbox.flush(&publisher).await.is_err());

        // One published, two still queued, order intact.
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
        assert_eq!(outbox.len(), 2);
    }

    #[tokio::test]
    async fn dropped_outbox_publishes_nothing() {
        let publisher = RecordingPublisher::new(None);
        {
            // Simulated rollback path: outbox goes out of scope unflushed.
            let mut outbox = Outbox::new();
            outbox.enqueue(Uuid::new_v4(), delete_message());
        }
        assert!(publisher.published.lock().unwrap().is_empty());
    }
}
