use std::time::Instant;

use async_trait::async_trait;
use common_kafka::kafka_producer::{KafkaContext, KafkaProduceError};
use metrics::histogram;
use opentelemetry::Context;
use rdkafka::message::OwnedHeaders;
use rdkafka::producer::{FutureProducer, FutureRecord};
use tracing::debug;

use crate::metrics_consts::PUBLISH_DURATION;
use crate::propagation::TraceBridge;
use crate::types::ModerationComment;

/// Publishes verdicts. `Ok` means the broker acknowledged the record.
#[async_trait]
pub trait VerdictProducer: Send + Sync {
    async fn publish(
        &self,
        verdict: &ModerationComment,
        cx: &Context,
    ) -> Result<(), KafkaProduceError>;
}

pub struct KafkaVerdictProducer {
    producer: FutureProducer<KafkaContext>,
    topic: String,
    bridge: TraceBridge,
}

impl KafkaVerdictProducer {
    pub fn new(producer: FutureProducer<KafkaContext>, topic: String) -> Self {
        Self {
            producer,
            topic,
            bridge: TraceBridge::new(),
        }
    }
}

#[async_trait]
impl VerdictProducer for KafkaVerdictProducer {
    async fn publish(
        &self,
        verdict: &ModerationComment,
        cx: &Context,
    ) -> Result<(), KafkaProduceError> {
        let payload = serde_json::to_string(verdict)
            .map_err(|e| KafkaProduceError::SerializationError { error: e })?;
        let headers = self.bridge.inject(cx, OwnedHeaders::new());

        let record = FutureRecord::<(), str>::to(&self.topic)
            .payload(&payload)
            .headers(headers);

        let start = Instant::now();
        let delivery = self
            .producer
            .send_result(record)
            .map_err(|(e, _)| KafkaProduceError::KafkaProduceError { error: e })?;

        let result = match delivery.await {
            Ok(Ok(_)) => {
                debug!(
                    topic = %self.topic,
                    comment_id = verdict.comment_id,
                    "Verdict acknowledged"
                );
                Ok(())
            }
            Ok(Err((e, _))) => Err(KafkaProduceError::KafkaProduceError { error: e }),
            Err(_) => Err(KafkaProduceError::KafkaProduceCanceled),
        };

        let outcome = if result.is_ok() { "success" } else { "failure" };
        histogram!(PUBLISH_DURATION, "outcome" => outcome).record(start.elapsed().as_secs_f64());

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use common_kafka::test::create_mock_kafka;
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use rdkafka::consumer::{Consumer, StreamConsumer};
    use rdkafka::message::Headers;
    use rdkafka::{ClientConfig, Message};

    use crate::propagation::TRACEPARENT_HEADER;
    use crate::types::ModerationStatus;

    #[tokio::test]
    async fn test_publish_writes_json_and_trace_headers() {
        let (cluster, producer) = create_mock_kafka().await;
        cluster.create_topic("moderation_comments", 1, 1).unwrap();
        let verdicts = KafkaVerdictProducer::new(producer, "moderation_comments".to_string());

        let trace_id = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
        let cx = Context::new().with_remote_span_context(SpanContext::new(
            trace_id,
            SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ));
        let verdict = ModerationComment {
            comment_id: 7,
            user_id: 3,
            item_id: 9,
            status: ModerationStatus::Passed,
            reason: "By random reason".to_string(),
        };

        verdicts.publish(&verdict, &cx).await.unwrap();

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", cluster.bootstrap_servers())
            .set("group.id", "verdict-reader")
            .set("auto.offset.reset", "earliest")
            .create()
            .unwrap();
        consumer.subscribe(&["moderation_comments"]).unwrap();
        let message = tokio::time::timeout(Duration::from_secs(30), consumer.recv())
            .await
            .unwrap()
            .unwrap();

        let published: ModerationComment =
            serde_json::from_slice(message.payload().unwrap()).unwrap();
        assert_eq!(published, verdict);
        assert!(message.key().is_none());

        let headers = message.headers().unwrap().detach();
        let parent = TraceBridge::new().extract(Some(&headers)).unwrap();
        assert_eq!(parent.span().span_context().trace_id(), trace_id);
        let keys: Vec<&str> = headers.iter().map(|h| h.key).collect();
        assert_eq!(keys, vec![TRACEPARENT_HEADER]);
    }
}
