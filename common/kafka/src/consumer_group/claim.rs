use rdkafka::message::OwnedMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::Partition;

/// The messages of one partition for the lifetime of a session, in fetch order.
pub struct PartitionClaim {
    partition: Partition,
    messages: mpsc::Receiver<OwnedMessage>,
    done: CancellationToken,
}

impl PartitionClaim {
    /// Creates the claim and the bounded sender the session loop routes into.
    pub fn channel(
        partition: Partition,
        capacity: usize,
        done: CancellationToken,
    ) -> (mpsc::Sender<OwnedMessage>, Self) {
        let (tx, messages) = mpsc::channel(capacity.max(1));
        (
            tx,
            Self {
                partition,
                messages,
                done,
            },
        )
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Next message, or `None` once the session has ended. Messages still
    /// buffered at that point are left for the session loop to rewind.
    pub async fn recv(&mut self) -> Option<OwnedMessage> {
        tokio::select! {
            biased;
            _ = self.done.cancelled() => None,
            message = self.messages.recv() => message,
        }
    }

    /// Removes everything still buffered, oldest first.
    pub(crate) fn take_buffered(&mut self) -> Vec<OwnedMessage> {
        let mut buffered = Vec::new();
        while let Ok(message) = self.messages.try_recv() {
            buffered.push(message);
        }
        buffered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::{Message, Timestamp};

    fn message(offset: i64) -> OwnedMessage {
        OwnedMessage::new(
            None,
            None,
            "comments".to_string(),
            Timestamp::NotAvailable,
            0,
            offset,
            None,
        )
    }

    #[tokio::test]
    async fn test_claim_preserves_order() {
        let done = CancellationToken::new();
        let (tx, mut claim) =
            PartitionClaim::channel(Partition::new("comments".to_string(), 0), 10, done);

        for offset in 0..3 {
            tx.send(message(offset)).await.unwrap();
        }
        drop(tx);

        let mut offsets = Vec::new();
        while let Some(msg) = claim.recv().await {
            offsets.push(msg.offset());
        }
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_claim_stops_when_session_ends() {
        let done = CancellationToken::new();
        let (tx, mut claim) =
            PartitionClaim::channel(Partition::new("comments".to_string(), 0), 10, done.clone());

        tx.send(message(7)).await.unwrap();
        tx.send(message(8)).await.unwrap();
        assert_eq!(claim.recv().await.unwrap().offset(), 7);

        done.cancel();
        assert!(claim.recv().await.is_none());

        let buffered: Vec<i64> = claim.take_buffered().iter().map(|m| m.offset()).collect();
        assert_eq!(buffered, vec![8]);
        assert_eq!(claim.partition().partition_number(), 0);
    }
}
