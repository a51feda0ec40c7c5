use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::message::OwnedMessage;
use rdkafka::{ClientConfig, Message, Offset};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::consumer_group::claim::PartitionClaim;
use crate::consumer_group::context::{GroupContext, RebalanceEvent};
use crate::consumer_group::metrics_consts::{
    CLAIMS_ACTIVE, CONSUMER_ERRORS, REWOUND_MESSAGES, SESSIONS_STARTED,
};
use crate::consumer_group::session::{ConsumerGroupHandler, GroupSession, OffsetStore};
use crate::types::Partition;

const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(100);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ConsumeError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("session setup failed: {0:#}")]
    Setup(anyhow::Error),
    #[error("rebalance channel closed")]
    RebalanceChannelClosed,
}

type ClaimOutcome = (PartitionClaim, anyhow::Result<()>);

enum SessionEnd {
    Cancelled,
    Rebalanced,
    ClaimExited,
    ChannelClosed,
}

enum Step {
    Cancelled,
    ClaimExited(Result<ClaimOutcome, JoinError>),
    Rebalance(Option<RebalanceEvent>),
    Polled(KafkaResult<OwnedMessage>),
}

/// A subscribed member of a consumer group.
///
/// Each call to [`ConsumerGroup::consume`] runs one session: it waits for an
/// assignment, hands every claimed partition to the handler on its own task and
/// returns once the session ends. Callers loop on it until cancelled.
pub struct ConsumerGroup {
    consumer: Arc<StreamConsumer<GroupContext>>,
    rebalances: mpsc::UnboundedReceiver<RebalanceEvent>,
    assignment: BTreeSet<Partition>,
    generation: u64,
    claim_buffer_size: usize,
}

impl ConsumerGroup {
    pub fn new(
        config: &ClientConfig,
        topics: &[&str],
        claim_buffer_size: usize,
    ) -> Result<Self, KafkaError> {
        let (context, rebalances) = GroupContext::new();
        let consumer: StreamConsumer<GroupContext> = config.create_with_context(context)?;
        consumer.subscribe(topics)?;
        info!("Subscribed to topics {:?}", topics);

        Ok(Self {
            consumer: Arc::new(consumer),
            rebalances,
            assignment: BTreeSet::new(),
            generation: 0,
            claim_buffer_size: claim_buffer_size.max(1),
        })
    }

    /// Number of sessions started so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn assignment(&self) -> Vec<Partition> {
        self.assignment.iter().cloned().collect()
    }

    /// Runs a single session. Returns `Ok(())` when the session ended for a
    /// routine reason (rebalance, cancellation, a claim returning) so the
    /// caller can start the next one.
    pub async fn consume<H: ConsumerGroupHandler>(
        &mut self,
        handler: Arc<H>,
        cancel: &CancellationToken,
    ) -> Result<(), ConsumeError> {
        if !self.wait_for_assignment(cancel).await? {
            return Ok(());
        }

        self.generation += 1;
        counter!(SESSIONS_STARTED).increment(1);

        let done = cancel.child_token();
        let offsets: Arc<dyn OffsetStore> = self.consumer.clone();
        let session = GroupSession::new(self.generation, self.assignment(), offsets, done.clone());
        info!(
            "Session {} started with {} claims",
            session.generation(),
            session.claims().len()
        );

        if let Err(e) = handler.setup(&session).await {
            done.cancel();
            return Err(ConsumeError::Setup(e));
        }

        let mut senders = HashMap::new();
        let mut claims = JoinSet::new();
        for partition in session.claims() {
            let (tx, mut claim) =
                PartitionClaim::channel(partition.clone(), self.claim_buffer_size, done.clone());
            senders.insert(partition.clone(), tx);

            let handler = handler.clone();
            let session = session.clone();
            claims.spawn(async move {
                let result = handler.consume_claim(&session, &mut claim).await;
                (claim, result)
            });
        }
        gauge!(CLAIMS_ACTIVE).set(claims.len() as f64);

        let consumer = self.consumer.clone();
        let mut unrouted = Vec::new();
        let end = loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                Some(joined) = claims.join_next() => Step::ClaimExited(joined),
                event = self.rebalances.recv() => Step::Rebalance(event),
                result = poll_message(&consumer) => Step::Polled(result),
            };

            match step {
                Step::Cancelled => break SessionEnd::Cancelled,
                Step::ClaimExited(joined) => {
                    finish_claim(joined, &mut unrouted);
                    break SessionEnd::ClaimExited;
                }
                Step::Rebalance(Some(event)) => {
                    self.apply(event);
                    self.drain_rebalances();
                    break SessionEnd::Rebalanced;
                }
                Step::Rebalance(None) => break SessionEnd::ChannelClosed,
                Step::Polled(Ok(message)) => {
                    // A callback fired during this poll: the message belongs
                    // to the next assignment, not to this session
                    if self.drain_rebalances() {
                        unrouted.push(message);
                        break SessionEnd::Rebalanced;
                    }

                    let partition = Partition::new(message.topic().to_string(), message.partition());
                    let Some(tx) = senders.get(&partition) else {
                        self.rewind(vec![message]).await;
                        continue;
                    };

                    // A full claim must not block noticing that its task returned
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(None),
                        Some(joined) = claims.join_next() => Err(Some(joined)),
                        permit = tx.reserve() => permit.map_err(|_| None),
                    };
                    match permit {
                        Ok(permit) => permit.send(message),
                        Err(exited) => {
                            unrouted.push(message);
                            if let Some(joined) = exited {
                                finish_claim(joined, &mut unrouted);
                                break SessionEnd::ClaimExited;
                            }
                        }
                    }
                }
                Step::Polled(Err(e)) => {
                    error!("Error receiving message: {:?}", e);
                    counter!(CONSUMER_ERRORS, "source" => "poll").increment(1);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        };

        done.cancel();
        drop(senders);
        while let Some(joined) = claims.join_next().await {
            finish_claim(joined, &mut unrouted);
        }
        gauge!(CLAIMS_ACTIVE).set(0.0);

        self.rewind(unrouted).await;
        self.flush_offsets().await;

        if let Err(e) = handler.cleanup(&session).await {
            warn!("Session {} cleanup failed: {:#}", session.generation(), e);
        }

        match end {
            SessionEnd::Cancelled => info!("Session {} ended: shutting down", session.generation()),
            SessionEnd::Rebalanced => info!("Session {} ended: rebalance", session.generation()),
            SessionEnd::ClaimExited => {
                info!("Session {} ended: claim returned", session.generation())
            }
            SessionEnd::ChannelClosed => return Err(ConsumeError::RebalanceChannelClosed),
        }

        Ok(())
    }

    /// Polls (so rebalance callbacks run) until something is assigned.
    /// Returns `false` if cancelled first.
    async fn wait_for_assignment(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<bool, ConsumeError> {
        let consumer = self.consumer.clone();
        loop {
            self.drain_rebalances();
            if !self.assignment.is_empty() {
                return Ok(true);
            }

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                event = self.rebalances.recv() => Step::Rebalance(event),
                result = poll_message(&consumer) => Step::Polled(result),
            };

            match step {
                Step::Cancelled => return Ok(false),
                Step::Rebalance(Some(event)) => self.apply(event),
                Step::Rebalance(None) => return Err(ConsumeError::RebalanceChannelClosed),
                Step::Polled(Ok(message)) => {
                    self.drain_rebalances();
                    self.rewind(vec![message]).await;
                }
                Step::Polled(Err(e)) => {
                    error!("Error receiving message: {:?}", e);
                    counter!(CONSUMER_ERRORS, "source" => "poll").increment(1);
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
                Step::ClaimExited(_) => {}
            }
        }
    }

    fn apply(&mut self, event: RebalanceEvent) {
        match event {
            RebalanceEvent::Assign(partitions) => self.assignment.extend(partitions),
            RebalanceEvent::Revoke(partitions) => {
                for partition in &partitions {
                    self.assignment.remove(partition);
                }
            }
        }
    }

    /// Applies every queued rebalance event, returns whether there were any
    fn drain_rebalances(&mut self) -> bool {
        let mut applied = false;
        while let Ok(event) = self.rebalances.try_recv() {
            self.apply(event);
            applied = true;
        }
        applied
    }

    /// Seeks each still-assigned partition back to its oldest fetched but
    /// unprocessed message, so it is fetched again for the next session.
    async fn rewind(&self, messages: Vec<OwnedMessage>) {
        if messages.is_empty() {
            return;
        }

        let mut earliest: BTreeMap<Partition, i64> = BTreeMap::new();
        for message in &messages {
            let partition = Partition::new(message.topic().to_string(), message.partition());
            let offset = earliest.entry(partition).or_insert(message.offset());
            *offset = (*offset).min(message.offset());
        }
        // Revoked partitions restart from the committed offset on their next owner
        earliest.retain(|partition, _| self.assignment.contains(partition));

        let consumer = self.consumer.clone();
        let result = tokio::task::spawn_blocking(move || {
            for (partition, offset) in earliest {
                match consumer.seek(
                    partition.topic(),
                    partition.partition_number(),
                    Offset::Offset(offset),
                    SEEK_TIMEOUT,
                ) {
                    Ok(()) => debug!("Rewound {} to offset {}", partition, offset),
                    Err(e) => {
                        warn!("Failed to rewind {} to offset {}: {}", partition, offset, e);
                        counter!(CONSUMER_ERRORS, "source" => "seek").increment(1);
                    }
                }
            }
        })
        .await;

        if let Err(e) = result {
            error!("Rewind task failed: {}", e);
        }
        counter!(REWOUND_MESSAGES).increment(messages.len() as u64);
    }

    /// Best-effort synchronous commit of everything marked so far
    async fn flush_offsets(&self) {
        let consumer = self.consumer.clone();
        let result =
            tokio::task::spawn_blocking(move || consumer.commit_consumer_state(CommitMode::Sync))
                .await;

        match result {
            Ok(Ok(())) => debug!("Flushed marked offsets"),
            Ok(Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset))) => {
                debug!("No marked offsets to flush")
            }
            Ok(Err(e)) => {
                warn!("Failed to flush marked offsets: {}", e);
                counter!(CONSUMER_ERRORS, "source" => "commit").increment(1);
            }
            Err(e) => error!("Offset flush task failed: {}", e),
        }
    }
}

async fn poll_message(consumer: &StreamConsumer<GroupContext>) -> KafkaResult<OwnedMessage> {
    consumer.recv().await.map(|message| message.detach())
}

fn finish_claim(joined: Result<ClaimOutcome, JoinError>, unrouted: &mut Vec<OwnedMessage>) {
    match joined {
        Ok((mut claim, result)) => {
            if let Err(e) = result {
                error!("Claim {} failed: {:#}", claim.partition(), e);
                counter!(CONSUMER_ERRORS, "source" => "claim").increment(1);
            }
            unrouted.extend(claim.take_buffered());
        }
        Err(e) => {
            error!("Claim task panicked: {}", e);
            counter!(CONSUMER_ERRORS, "source" => "claim").increment(1);
        }
    }
}
