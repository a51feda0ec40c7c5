//! Consumes comments from Kafka, moderates them and publishes the verdicts.
//!
//! Errors crossing task boundaries are logged with `{e:#}` so the whole
//! context chain ends up on one line.

pub mod app;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics_consts;
pub mod moderation;
pub mod pipeline;
pub mod producer;
pub mod propagation;
pub mod signals;
pub mod types;
