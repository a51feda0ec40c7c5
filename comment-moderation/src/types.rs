use serde::{Deserialize, Serialize};

/// A comment as published on the input topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
    Passed,
    Failed,
}

impl ModerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationStatus::Passed => "passed",
            ModerationStatus::Failed => "failed",
        }
    }
}

/// The verdict for one comment, published on the output topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationComment {
    pub comment_id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub status: ModerationStatus,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_ignores_unknown_fields() {
        let comment: Comment =
            serde_json::from_str(r#"{"id":7,"user_id":3,"item_id":9,"text":"hi"}"#).unwrap();
        assert_eq!(
            comment,
            Comment {
                id: 7,
                user_id: 3,
                item_id: 9
            }
        );
    }

    #[test]
    fn test_comment_requires_all_ids() {
        assert!(serde_json::from_str::<Comment>(r#"{"id":7,"user_id":3}"#).is_err());
        assert!(serde_json::from_str::<Comment>(r#"{"id":"7","user_id":3,"item_id":9}"#).is_err());
    }

    #[test]
    fn test_verdict_wire_format() {
        let verdict = ModerationComment {
            comment_id: 7,
            user_id: 3,
            item_id: 9,
            status: ModerationStatus::Failed,
            reason: "By random reason".to_string(),
        };

        let json: serde_json::Value = serde_json::to_value(&verdict).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "comment_id": 7,
                "user_id": 3,
                "item_id": 9,
                "status": "failed",
                "reason": "By random reason",
            })
        );
    }
}
