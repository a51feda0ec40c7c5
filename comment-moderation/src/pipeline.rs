use std::sync::Arc;
use std::time::Duration;

use common_kafka::consumer_group::{ConsumerConfigBuilder, ConsumerGroup};
use common_kafka::kafka_producer::create_kafka_producer;
use metrics::counter;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::ModerationError;
use crate::handler::ModerationHandler;
use crate::metrics_consts::PIPELINE_RESTARTS;
use crate::moderation::DecisionEngine;
use crate::producer::KafkaVerdictProducer;

const RESTART_BACKOFF: Duration = Duration::from_secs(1);

/// Builds the Kafka clients and runs consumer group sessions back to back
/// until `cancel` fires. Only client construction errors are returned, a
/// failed session is logged and retried.
pub async fn run_pipeline(
    config: Config,
    engine: Arc<DecisionEngine>,
    cancel: CancellationToken,
) -> Result<(), ModerationError> {
    let producer = create_kafka_producer(&config.kafka)
        .await
        .map_err(ModerationError::ProducerError)?;
    let producer = Arc::new(KafkaVerdictProducer::new(
        producer,
        config.kafka_producer_topic.clone(),
    ));

    let consumer_config =
        ConsumerConfigBuilder::from_env_config(&config.kafka, &config.consumer).build();
    let mut group = ConsumerGroup::new(
        &consumer_config,
        &[config.consumer.kafka_consumer_topic.as_str()],
        config.claim_buffer_size,
    )
    .map_err(ModerationError::ConsumerError)?;

    let handler = Arc::new(ModerationHandler::new(engine, producer));

    info!(
        input_topic = %config.consumer.kafka_consumer_topic,
        output_topic = %config.kafka_producer_topic,
        group = %config.consumer.kafka_consumer_group,
        "Pipeline started"
    );

    while !cancel.is_cancelled() {
        if let Err(e) = group.consume(handler.clone(), &cancel).await {
            error!("Consumer group session failed: {e:#}");
            counter!(PIPELINE_RESTARTS).increment(1);

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RESTART_BACKOFF) => {}
            }
        }
    }

    info!(sessions = group.generation(), "Pipeline stopped");
    Ok(())
}
