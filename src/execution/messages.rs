//! Wire messages exchanged with the isolated worker realm
//!
//! Everything that crosses the realm boundary is serialized to a JSON frame;
//! no value is shared by reference between the two sides.

use crate::error::{AiResult, ErrorReport};
use serde::{Deserialize, Serialize};

/// Cross-boundary call record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerTask {
    /// Correlation id; replies carry it back
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: String,
    pub data: serde_json::Value,
    pub timeout_ms: u64,
}

/// Orchestrator → realm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum RealmRequest {
    Task(WorkerTask),
}

/// Realm → orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum RealmReply {
    Completed {
        id: String,
        result: serde_json::Value,
    },
    Failed {
        id: String,
        error: ErrorReport,
    },
}

impl RealmReply {
    pub fn from_result(id: String, result: AiResult<serde_json::Value>) -> Self {
        match result {
            Ok(result) => RealmReply::Completed { id, result },
            Err(error) => RealmReply::Failed {
                id,
                error: error.report(),
            },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RealmReply::Completed { id, .. } | RealmReply::Failed { id, .. } => id,
        }
    }

    pub fn into_result(self) -> AiResult<serde_json::Value> {
        match self {
            RealmReply::Completed { result, .. } => Ok(result),
            RealmReply::Failed { error, .. } => Err(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AiError, AiErrorKind};
    use serde_json::json;

    #[test]
    fn test_task_frame_uses_type_field() {
        let frame = serde_json::to_value(RealmRequest::Task(WorkerTask {
            id: "t-1".to_string(),
            task_type: "provider_call".to_string(),
            data: json!({"text": "hi"}),
            timeout_ms: 500,
        }))
        .unwrap();

        assert_eq!(frame["message"], "task");
        assert_eq!(frame["type"], "provider_call");
        assert_eq!(frame["timeout_ms"], 500);
    }

    #[test]
    fn test_failed_reply_preserves_classification() {
        let reply = RealmReply::from_result("t-2".to_string(), Err(AiError::rate_limited("429")));
        let frame = serde_json::to_string(&reply).unwrap();
        let parsed: RealmReply = serde_json::from_str(&frame).unwrap();

        assert_eq!(parsed.id(), "t-2");
        let error = parsed.into_result().unwrap_err();
        assert_eq!(error.kind(), AiErrorKind::RateLimited);
        assert!(error.is_retryable());
    }
}
