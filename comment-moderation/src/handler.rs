use std::sync::Arc;

use async_trait::async_trait;
use common_kafka::consumer_group::{ConsumerGroupHandler, GroupSession, PartitionClaim};
use metrics::counter;
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use rdkafka::message::OwnedMessage;
use rdkafka::Message;
use tracing::field::Empty;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::metrics_consts::RECORDS_PROCESSED;
use crate::moderation::DecisionEngine;
use crate::producer::VerdictProducer;
use crate::propagation::TraceBridge;
use crate::types::Comment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The verdict was acknowledged by the broker, the offset may be marked
    Published,
    /// The payload was not a comment, nothing was published
    Malformed,
    /// A verdict was drawn but not acknowledged
    PublishFailed,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Published => "published",
            RecordOutcome::Malformed => "malformed",
            RecordOutcome::PublishFailed => "publish_failed",
        }
    }
}

/// Moderates every record of a claim and marks the ones whose verdict was published.
pub struct ModerationHandler {
    engine: Arc<DecisionEngine>,
    producer: Arc<dyn VerdictProducer>,
    bridge: TraceBridge,
}

impl ModerationHandler {
    pub fn new(engine: Arc<DecisionEngine>, producer: Arc<dyn VerdictProducer>) -> Self {
        Self {
            engine,
            producer,
            bridge: TraceBridge::new(),
        }
    }

    /// Runs one record through decode, decide and publish inside a
    /// `comment_moderation` span. Never marks offsets.
    pub async fn process_record(&self, message: &OwnedMessage) -> RecordOutcome {
        let parent = self.bridge.extract(message.headers());
        let span = info_span!(
            "comment_moderation",
            topic = message.topic(),
            partition = message.partition(),
            offset = message.offset(),
            outcome = Empty,
        );
        if let Some(parent) = &parent {
            span.set_parent(parent.clone());
        }
        let cx = outgoing_context(&span, parent);

        let outcome = self.moderate(message, &cx).instrument(span.clone()).await;

        span.record("outcome", outcome.as_str());
        counter!(RECORDS_PROCESSED, "outcome" => outcome.as_str()).increment(1);
        outcome
    }

    async fn moderate(&self, message: &OwnedMessage, cx: &Context) -> RecordOutcome {
        let Some(payload) = message.payload() else {
            warn!("Record has no payload, skipping");
            return RecordOutcome::Malformed;
        };

        let comment: Comment = match serde_json::from_slice(payload) {
            Ok(comment) => comment,
            Err(e) => {
                warn!(error = %e, "Failed to decode comment, skipping");
                return RecordOutcome::Malformed;
            }
        };

        let verdict = self.engine.moderate(&comment);
        match self.producer.publish(&verdict, cx).await {
            Ok(()) => {
                debug!(
                    comment_id = verdict.comment_id,
                    status = verdict.status.as_str(),
                    "Verdict published"
                );
                RecordOutcome::Published
            }
            Err(e) => {
                error!(comment_id = verdict.comment_id, error = %e, "Failed to publish verdict");
                RecordOutcome::PublishFailed
            }
        }
    }
}

// Falls back to the remote parent when no OpenTelemetry layer is installed
fn outgoing_context(span: &Span, parent: Option<Context>) -> Context {
    let cx = span.context();
    if cx.span().span_context().is_valid() {
        cx
    } else {
        parent.unwrap_or_default()
    }
}

#[async_trait]
impl ConsumerGroupHandler for ModerationHandler {
    async fn setup(&self, session: &GroupSession) -> anyhow::Result<()> {
        info!(
            generation = session.generation(),
            claims = ?session.claims(),
            "Consumer group session set up"
        );
        Ok(())
    }

    async fn cleanup(&self, session: &GroupSession) -> anyhow::Result<()> {
        info!(
            generation = session.generation(),
            passed = self.engine.passed(),
            failed = self.engine.failed(),
            "Consumer group session cleaned up"
        );
        Ok(())
    }

    async fn consume_claim(
        &self,
        session: &GroupSession,
        claim: &mut PartitionClaim,
    ) -> anyhow::Result<()> {
        let partition = claim.partition().clone();
        info!(%partition, "Claim started");

        while let Some(message) = claim.recv().await {
            debug!(
                topic = message.topic(),
                partition = message.partition(),
                offset = message.offset(),
                "Received comment record"
            );

            if self.process_record(&message).await != RecordOutcome::Published {
                continue;
            }

            if let Err(e) = session.mark_message(&message) {
                warn!(offset = message.offset(), error = %e, "Failed to mark offset");
            }
        }

        info!(%partition, "Claim finished");
        Ok(())
    }
}
