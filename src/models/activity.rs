//! Activity log domain models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::activity::identity;

/// Default severity ("notice").
pub const DEFAULT_SEVERITY: i32 = 20;

/// Severity levels used across the application.
pub mod severity {
    pub const INFO: i32 = 10;
    pub const NOTICE: i32 = 20;
    pub const WARN: i32 = 30;
    pub const ERROR: i32 = 40;
}

/// Stored activity record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActivityEvent {
    pub id: i64,
    pub at: DateTime<Utc>,
    pub request_id: Option<String>,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub action: String,
    pub subject_type: String,
    pub subject_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub severity: i32,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub meta: Value,
    pub diff: Value,
    pub hash_prev: Option<String>,
    pub hash_self: String,
}

impl ActivityEvent {
    /// The hashed content of this record: every field except the store-assigned
    /// `id`/`at` and the two hashes.
    pub fn payload(&self) -> ActivityPayload {
        ActivityPayload {
            request_id: self.request_id.clone(),
            actor_id: self.actor_id.clone(),
            actor_role: self.actor_role.clone(),
            action: self.action.clone(),
            subject_type: self.subject_type.clone(),
            subject_id: self.subject_id.clone(),
            target_type: self.target_type.clone(),
            target_id: self.target_id.clone(),
            severity: self.severity,
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
            meta: self.meta.clone(),
            diff: self.diff.clone(),
        }
    }

    pub fn cursor(&self) -> Cursor {
        Cursor { at: self.at, id: self.id }
    }
}

/// Record content covered by `hash_self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityPayload {
    pub request_id: Option<String>,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub action: String,
    pub subject_type: String,
    pub subject_id: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub severity: i32,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub meta: Value,
    pub diff: Value,
}

/// A record ready to append: normalized, redacted and self-hashed.
/// `hash_prev` is linked by the store inside its atomic append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewActivity {
    pub payload: ActivityPayload,
    pub hash_self: String,
}

/// Ambient request facts attached to every recorded event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Option<String>,
    pub actor_id: Option<String>,
    pub actor_role: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Context for events raised by the service itself (no inbound request).
    pub fn system() -> Self {
        Self {
            actor_role: Some("system".to_string()),
            ..Default::default()
        }
    }
}

/// Input to the recorder; also the body of `POST /activity`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordActivityRequest {
    #[validate(length(min = 1, max = 128, message = "action is required"))]
    pub action: String,
    #[validate(length(min = 1, max = 128, message = "subjectType is required"))]
    pub subject_type: String,
    #[validate(length(min = 1, max = 256, message = "subjectId is required"))]
    pub subject_id: String,
    #[validate(length(max = 128))]
    pub target_type: Option<String>,
    #[validate(length(max = 256))]
    pub target_id: Option<String>,
    #[validate(range(min = 0, max = 100))]
    pub severity: Option<i32>,
    pub meta: Option<Value>,
    pub diff: Option<Value>,
}

impl RecordActivityRequest {
    pub fn new(action: &str, subject_type: &str, subject_id: &str) -> Self {
        Self {
            action: action.to_string(),
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            target_type: None,
            target_id: None,
            severity: None,
            meta: None,
            diff: None,
        }
    }

    pub fn with_target(mut self, target_type: &str, target_id: &str) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn with_severity(mut self, severity: i32) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn with_diff(mut self, before: Value, after: Value) -> Self {
        self.diff = Some(serde_json::json!({ "before": before, "after": after }));
        self
    }
}

/// Returned to the recorder's caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReceipt {
    pub id: i64,
    pub hash_self: String,
}

/// Activity query filters (all optional, combined with AND)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActivityFilters {
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub action: Option<String>,
    pub actor_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ActivityFilters {
    /// 标识符过滤值按写入时的规则归一化，调用方可直接传入原始 id
    pub fn normalized(self) -> Self {
        Self {
            subject_id: self.subject_id.map(|id| identity::normalize(&id)),
            actor_id: self.actor_id.map(|id| identity::normalize(&id)),
            ..self
        }
    }

    /// Whether `event` satisfies every filter that is set.
    pub fn matches(&self, event: &ActivityEvent) -> bool {
        fn eq(filter: &Option<String>, value: Option<&str>) -> bool {
            filter.as_deref().map_or(true, |f| value == Some(f))
        }

        eq(&self.subject_type, Some(&event.subject_type))
            && eq(&self.subject_id, event.subject_id.as_deref())
            && eq(&self.action, Some(&event.action))
            && eq(&self.actor_id, event.actor_id.as_deref())
            && self.from.map_or(true, |from| event.at >= from)
            && self.to.map_or(true, |to| event.at <= to)
    }
}

/// Position in canonical `(at, id)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub at: DateTime<Utc>,
    pub id: i64,
}

/// Result of a chain verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub ok: bool,
    /// Records that passed before the walk stopped.
    pub checked: i64,
    /// Id of the first divergent record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broken_at: Option<i64>,
}
