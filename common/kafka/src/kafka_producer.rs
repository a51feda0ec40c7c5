use crate::config::KafkaConfig;

use metrics::gauge;
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, Producer};
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::{debug, error, info};

pub const PRODUCER_QUEUE_DEPTH: &str = "kafka_producer_queue_depth";
pub const PRODUCER_QUEUE_DEPTH_LIMIT: &str = "kafka_producer_queue_depth_limit";
pub const PRODUCER_QUEUE_BYTES: &str = "kafka_producer_queue_bytes";
pub const PRODUCER_QUEUE_BYTES_LIMIT: &str = "kafka_producer_queue_bytes_limit";
pub const PRODUCER_BROKER_REQUESTS_PENDING: &str = "kafka_producer_broker_requests_pending";

#[derive(Default)]
pub struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        // Local queue depths, as seen by the main rdkafka loop
        gauge!(PRODUCER_QUEUE_DEPTH).set(stats.msg_cnt as f64);
        gauge!(PRODUCER_QUEUE_DEPTH_LIMIT).set(stats.msg_max as f64);
        gauge!(PRODUCER_QUEUE_BYTES).set(stats.msg_size as f64);
        gauge!(PRODUCER_QUEUE_BYTES_LIMIT).set(stats.msg_size_max as f64);

        for (_, stats) in stats.brokers {
            gauge!(
                PRODUCER_BROKER_REQUESTS_PENDING,
                "broker" => stats.nodeid.to_string()
            )
            .set(stats.outbuf_cnt as f64);
        }
    }
}

pub fn producer_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000")
        .set("acks", &config.kafka_producer_acks)
        .set(
            "message.send.max.retries",
            config.kafka_producer_retries.to_string(),
        )
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        )
        .set(
            "queue.buffering.max.messages",
            config.kafka_producer_queue_messages.to_string(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    client_config
}

pub async fn create_kafka_producer(
    config: &KafkaConfig,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let client_config = producer_client_config(config);

    debug!("rdkafka configuration: {:?}", client_config);
    let api: FutureProducer<KafkaContext> = client_config.create_with_context(KafkaContext)?;

    // "Ping" the Kafka brokers by requesting metadata
    match api
        .client()
        .fetch_metadata(None, std::time::Duration::from_secs(15))
    {
        Ok(metadata) => {
            info!(
                "Successfully connected to Kafka brokers. Found {} topics.",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(api)
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to serialize: {error}")]
    SerializationError { error: serde_json::Error },
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}
