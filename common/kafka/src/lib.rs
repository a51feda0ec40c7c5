pub mod config;
pub mod consumer_group;
pub mod kafka_producer;
pub mod types;
