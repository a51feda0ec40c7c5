use metrics_exporter_prometheus::BuildError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Failures that stop the service from starting or keep it from running
#[derive(Error, Debug)]
pub enum ModerationError {
    #[error("failed to create kafka producer: {0}")]
    ProducerError(KafkaError),
    #[error("failed to create kafka consumer: {0}")]
    ConsumerError(KafkaError),
    #[error("failed to bind metrics endpoint on {address}: {error}")]
    BindError {
        address: String,
        error: std::io::Error,
    },
    #[error("metrics endpoint failed: {0}")]
    ServeError(std::io::Error),
    #[error("failed to install metrics recorder: {0}")]
    RecorderError(#[from] BuildError),
}
