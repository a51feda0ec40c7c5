use rdkafka::ClientConfig;

use crate::config::{ConsumerConfig, KafkaConfig};

/// Kafka consumer configuration builder for consumer group sessions.
///
/// Offsets are never stored automatically: only messages the handler marks
/// are eligible for commit. Committing itself runs on librdkafka's
/// auto-commit timer, plus a synchronous flush whenever a session ends.
pub struct ConsumerConfigBuilder {
    config: ClientConfig,
}

impl ConsumerConfigBuilder {
    /// Create a config builder for a **group-based consumer**.
    ///
    /// Sets: auto.offset.store=false, auto.commit=true, socket.timeout.ms,
    /// session.timeout.ms, heartbeat.interval.ms, max.poll.interval.ms.
    pub fn for_group_consumer(bootstrap_servers: &str, group_id: &str) -> Self {
        let mut config = ClientConfig::new();

        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id);

        config
            .set("enable.auto.offset.store", "false")
            .set("enable.auto.commit", "true")
            .set("socket.timeout.ms", "10000")
            .set("session.timeout.ms", "45000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000");

        Self { config }
    }

    /// Builds the group consumer settings from the shared env config.
    pub fn from_env_config(kafka: &KafkaConfig, consumer: &ConsumerConfig) -> Self {
        Self::for_group_consumer(&kafka.kafka_hosts, &consumer.kafka_consumer_group)
            .with_tls(kafka.kafka_tls)
            .with_offset_reset(&consumer.kafka_consumer_offset_reset)
            .with_auto_commit_interval_ms(consumer.kafka_consumer_auto_commit_interval_ms)
    }

    /// Enable TLS/SSL for Kafka connection
    pub fn with_tls(mut self, enabled: bool) -> Self {
        if enabled {
            self.config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }
        self
    }

    /// Where to start when the group has no committed offset for a partition
    pub fn with_offset_reset(mut self, policy: &str) -> Self {
        self.config.set("auto.offset.reset", policy);
        self
    }

    pub fn with_auto_commit_interval_ms(mut self, ms: u32) -> Self {
        self.config.set("auto.commit.interval.ms", ms.to_string());
        self
    }

    pub fn with_session_timeout_ms(mut self, ms: u32) -> Self {
        self.config.set("session.timeout.ms", ms.to_string());
        self
    }

    /// Add any custom configuration
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
