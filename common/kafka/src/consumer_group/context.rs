use rdkafka::consumer::{BaseConsumer, ConsumerContext, Rebalance};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::{ClientContext, TopicPartitionList};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::consumer_group::metrics_consts::{
    CONSUMER_ERRORS, REBALANCE_EMPTY_SKIPPED, REBALANCE_EVENTS,
};
use crate::types::{partitions_of, Partition};

/// Assignment changes observed by librdkafka, forwarded to the session loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceEvent {
    /// Partitions are about to be taken away from this member
    Revoke(Vec<Partition>),
    /// Partitions have been handed to this member
    Assign(Vec<Partition>),
}

/// Consumer context that turns rebalance callbacks into [`RebalanceEvent`]s.
///
/// Callbacks run synchronously inside the poll that triggered them, so an event
/// is always in the channel before the poll returns any message fetched for
/// the new assignment.
pub struct GroupContext {
    rebalance_tx: mpsc::UnboundedSender<RebalanceEvent>,
}

impl GroupContext {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RebalanceEvent>) {
        let (rebalance_tx, rebalance_rx) = mpsc::unbounded_channel();
        (Self { rebalance_tx }, rebalance_rx)
    }

    fn forward(
        &self,
        event_type: &'static str,
        partitions: &TopicPartitionList,
        event: fn(Vec<Partition>) -> RebalanceEvent,
    ) {
        if partitions.count() == 0 {
            debug!("Skipping empty {} rebalance", event_type);
            metrics::counter!(REBALANCE_EMPTY_SKIPPED, "event_type" => event_type).increment(1);
            return;
        }

        let partitions = partitions_of(partitions);
        info!(
            "Rebalance {}: {} partitions ({:?})",
            event_type,
            partitions.len(),
            partitions
        );
        metrics::counter!(REBALANCE_EVENTS, "event_type" => event_type).increment(1);

        if let Err(e) = self.rebalance_tx.send(event(partitions)) {
            error!("Failed to forward {} event to session loop: {}", event_type, e);
        }
    }
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(partitions) => self.forward("revoke", partitions, RebalanceEvent::Revoke),
            Rebalance::Assign(partitions) => {
                debug!("Pre-rebalance assign event for {} partitions", partitions.count());
            }
            Rebalance::Error(e) => {
                error!("Rebalance error: {}", e);
                metrics::counter!(CONSUMER_ERRORS, "source" => "rebalance").increment(1);
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Assign(partitions) = rebalance {
            self.forward("assign", partitions, RebalanceEvent::Assign);
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!("Committed offsets for {} partitions", offsets.count()),
            // Nothing was marked since the last commit
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
            Err(e) => {
                warn!("Offset commit failed: {}", e);
                metrics::counter!(CONSUMER_ERRORS, "source" => "commit").increment(1);
            }
        }
    }
}
