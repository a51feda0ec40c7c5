// ==== Consumer group session metrics ====
/// Counter for consumer group sessions started
pub const SESSIONS_STARTED: &str = "kafka_consumer_sessions_total";

/// Gauge for partition claims being consumed in the current session
pub const CLAIMS_ACTIVE: &str = "kafka_consumer_claims_active";

/// Counter for consumer errors, labelled by where they surfaced
pub const CONSUMER_ERRORS: &str = "kafka_consumer_errors_total";

/// Counter for fetched but unprocessed messages handed back to the broker via seek
pub const REWOUND_MESSAGES: &str = "kafka_consumer_rewound_messages_total";

// ==== Rebalance metrics ====
/// Counter for rebalance callbacks forwarded to the session loop
pub const REBALANCE_EVENTS: &str = "kafka_consumer_rebalance_events_total";

/// Counter for rebalance callbacks skipped because the partition list was empty
pub const REBALANCE_EMPTY_SKIPPED: &str = "kafka_consumer_rebalance_empty_skipped_total";
