use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use rand::Rng;

use crate::metrics_consts::{COMMENTS_FAILED, COMMENTS_MODERATED, COMMENTS_PASSED};
use crate::types::{Comment, ModerationComment, ModerationStatus};

pub const RANDOM_REASON: &str = "By random reason";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: ModerationStatus,
    pub reason: String,
}

/// Decides whether a comment passes moderation
pub trait ModerationPolicy: Send + Sync {
    fn decide(&self, comment: &Comment) -> Decision;
}

/// Fails half of all comments, independently of their content
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPolicy;

impl ModerationPolicy for RandomPolicy {
    fn decide(&self, _comment: &Comment) -> Decision {
        let status = if rand::thread_rng().gen_range(0..10) < 5 {
            ModerationStatus::Failed
        } else {
            ModerationStatus::Passed
        };

        Decision {
            status,
            reason: RANDOM_REASON.to_string(),
        }
    }
}

pub struct DecisionEngine {
    policy: Box<dyn ModerationPolicy>,
    passed: AtomicU64,
    failed: AtomicU64,
}

impl DecisionEngine {
    pub fn new(policy: Box<dyn ModerationPolicy>) -> Self {
        Self {
            policy,
            passed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Builds the verdict for a comment. Every call draws a fresh decision,
    /// so a redelivered comment may get a different verdict.
    pub fn moderate(&self, comment: &Comment) -> ModerationComment {
        let Decision { status, reason } = self.policy.decide(comment);

        match status {
            ModerationStatus::Passed => {
                self.passed.fetch_add(1, Ordering::Relaxed);
                counter!(COMMENTS_PASSED).increment(1);
            }
            ModerationStatus::Failed => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                counter!(COMMENTS_FAILED).increment(1);
            }
        }
        counter!(COMMENTS_MODERATED, "status" => status.as_str()).increment(1);

        ModerationComment {
            comment_id: comment.id,
            user_id: comment.user_id,
            item_id: comment.item_id,
            status,
            reason,
        }
    }

    pub fn passed(&self) -> u64 {
        self.passed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(Box::new(RandomPolicy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(ModerationStatus);

    impl ModerationPolicy for Always {
        fn decide(&self, _comment: &Comment) -> Decision {
            Decision {
                status: self.0,
                reason: "fixed".to_string(),
            }
        }
    }

    #[test]
    fn test_verdict_copies_ids() {
        let engine = DecisionEngine::default();
        let comment = Comment {
            id: 7,
            user_id: 3,
            item_id: 9,
        };

        let verdict = engine.moderate(&comment);

        assert_eq!(verdict.comment_id, 7);
        assert_eq!(verdict.user_id, 3);
        assert_eq!(verdict.item_id, 9);
        assert_eq!(verdict.reason, RANDOM_REASON);
        assert_eq!(engine.passed() + engine.failed(), 1);
    }

    #[test]
    fn test_exactly_one_counter_moves() {
        let engine = DecisionEngine::new(Box::new(Always(ModerationStatus::Failed)));
        let comment = Comment {
            id: 1,
            user_id: 1,
            item_id: 1,
        };

        for _ in 0..3 {
            assert_eq!(engine.moderate(&comment).status, ModerationStatus::Failed);
        }

        assert_eq!(engine.failed(), 3);
        assert_eq!(engine.passed(), 0);
    }

    #[test]
    fn test_verdicts_are_counted_under_both_metric_names() {
        use metrics_util::debugging::{DebugValue, DebuggingRecorder};

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let engine = DecisionEngine::new(Box::new(Always(ModerationStatus::Failed)));
        let comment = Comment {
            id: 1,
            user_id: 1,
            item_id: 1,
        };

        metrics::with_local_recorder(&recorder, || {
            engine.moderate(&comment);
            engine.moderate(&comment);
        });

        let counters: Vec<(String, Vec<(String, String)>, u64)> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter_map(|(key, _, _, value)| match value {
                DebugValue::Counter(count) => {
                    let labels = key
                        .key()
                        .labels()
                        .map(|l| (l.key().to_string(), l.value().to_string()))
                        .collect();
                    Some((key.key().name().to_string(), labels, count))
                }
                _ => None,
            })
            .collect();

        assert!(counters.contains(&(COMMENTS_FAILED.to_string(), vec![], 2)));
        assert!(counters.contains(&(
            COMMENTS_MODERATED.to_string(),
            vec![("status".to_string(), "failed".to_string())],
            2
        )));
        assert!(!counters.iter().any(|(name, _, _)| name == COMMENTS_PASSED));
    }

    #[test]
    fn test_random_policy_is_fair() {
        const DRAWS: u64 = 10_000;
        let engine = DecisionEngine::default();
        let comment = Comment {
            id: 1,
            user_id: 2,
            item_id: 3,
        };

        for _ in 0..DRAWS {
            engine.moderate(&comment);
        }

        let fraction = engine.passed() as f64 / DRAWS as f64;
        let standard_error = (0.25 / DRAWS as f64).sqrt();
        assert_eq!(engine.passed() + engine.failed(), DRAWS);
        assert!(
            (fraction - 0.5).abs() < 3.0 * standard_error,
            "pass fraction {fraction} too far from 0.5"
        );
    }
}
