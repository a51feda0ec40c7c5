// Consumer group runtime - sessions, per-partition claims and manual offset marking
pub mod claim;
pub mod config;
pub mod context;
pub mod group;
pub mod metrics_consts;
pub mod session;

// Public API
pub use claim::PartitionClaim;
pub use config::ConsumerConfigBuilder;
pub use context::{GroupContext, RebalanceEvent};
pub use group::{ConsumeError, ConsumerGroup};
pub use session::{ConsumerGroupHandler, GroupSession, OffsetStore};
