/// Counter for verdicts handed out, labelled by status
pub const COMMENTS_MODERATED: &str = "moderation_comments_total";

/// Unlabelled per-status counters, kept under their established names for
/// existing dashboards
pub const COMMENTS_PASSED: &str = "moderation_comment_success";
pub const COMMENTS_FAILED: &str = "moderation_comment_failed";

/// Counter for consumed records, labelled by processing outcome
pub const RECORDS_PROCESSED: &str = "moderation_records_total";

/// Histogram for the time from send to broker acknowledgement
pub const PUBLISH_DURATION: &str = "moderation_publish_duration_seconds";

/// Counter for pipeline restarts after a failed consumer group session
pub const PIPELINE_RESTARTS: &str = "moderation_pipeline_restarts_total";
