use std::time::Duration;

use envconfig::Envconfig;

pub use common_kafka::config::{ConsumerConfig, KafkaConfig};

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(from = "KAFKA_PRODUCER_TOPIC", default = "moderation_comments")]
    pub kafka_producer_topic: String,

    // Messages fetched ahead for a single partition before polling waits on it
    #[envconfig(from = "CLAIM_BUFFER_SIZE", default = "100")]
    pub claim_buffer_size: usize,

    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub bind_host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub bind_port: u16,

    #[envconfig(from = "METRICS_PATH", default = "/metrics")]
    pub metrics_path: String,

    pub otel_host: Option<String>,

    #[envconfig(from = "OTEL_PORT", default = "4317")]
    pub otel_port: u16,

    #[envconfig(from = "OTEL_SERVICE_NAME", default = "comment-moderation")]
    pub otel_service_name: String,

    #[envconfig(from = "OTEL_SAMPLING_RATE", default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: bool,

    #[envconfig(from = "SHUTDOWN_TIMEOUT_SECS", default = "5")]
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Loads the config from the environment, filling in this service's
    /// consumer group and input topic when they are not set.
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        ConsumerConfig::set_defaults("comment-moderation", "comments");
        Self::init_from_env()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    /// OTLP collector endpoint, if trace export is enabled
    pub fn otel_endpoint(&self) -> Option<String> {
        self.otel_host
            .as_ref()
            .map(|host| format!("http://{}:{}", host, self.otel_port))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
