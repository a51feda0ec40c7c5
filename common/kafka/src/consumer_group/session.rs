use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::KafkaResult;
use rdkafka::Message;
use tokio_util::sync::CancellationToken;

use crate::consumer_group::claim::PartitionClaim;
use crate::types::Partition;

/// Where marked offsets go. Takes the offset of the processed message, the
/// store is responsible for committing the position after it.
pub trait OffsetStore: Send + Sync {
    fn store_offset(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()>;
}

// rd_kafka_offset_store already commits offset + 1
impl<C: ConsumerContext + 'static> OffsetStore for StreamConsumer<C> {
    fn store_offset(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
        Consumer::store_offset(self, topic, partition, offset)
    }
}

/// One generation of group membership: the set of claimed partitions between
/// two rebalances. Cheap to clone, every claim task holds a copy.
#[derive(Clone)]
pub struct GroupSession {
    generation: u64,
    claims: Arc<[Partition]>,
    offsets: Arc<dyn OffsetStore>,
    done: CancellationToken,
}

impl GroupSession {
    pub fn new(
        generation: u64,
        claims: Vec<Partition>,
        offsets: Arc<dyn OffsetStore>,
        done: CancellationToken,
    ) -> Self {
        Self {
            generation,
            claims: claims.into(),
            offsets,
            done,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn claims(&self) -> &[Partition] {
        &self.claims
    }

    /// Marks a message as fully processed. The committed position becomes the
    /// offset after it, so it is not redelivered to the group.
    pub fn mark_message<M: Message>(&self, message: &M) -> KafkaResult<()> {
        self.mark_offset(message.topic(), message.partition(), message.offset())
    }

    pub fn mark_offset(&self, topic: &str, partition: i32, offset: i64) -> KafkaResult<()> {
        self.offsets.store_offset(topic, partition, offset)
    }

    /// Whether the session has ended (rebalance, shutdown or a failed claim)
    pub fn is_done(&self) -> bool {
        self.done.is_cancelled()
    }
}

/// Callbacks driven by [`crate::consumer_group::ConsumerGroup::consume`].
///
/// `setup` runs before any claim starts, `consume_claim` runs once per claimed
/// partition on its own task, and `cleanup` runs after every claim returned.
#[async_trait]
pub trait ConsumerGroupHandler: Send + Sync + 'static {
    async fn setup(&self, _session: &GroupSession) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self, _session: &GroupSession) -> anyhow::Result<()> {
        Ok(())
    }

    /// Should loop on [`PartitionClaim::recv`] until it returns `None`.
    /// Returning early ends the whole session.
    async fn consume_claim(
        &self,
        session: &GroupSession,
        claim: &mut PartitionClaim,
    ) -> anyhow::Result<()>;
}
