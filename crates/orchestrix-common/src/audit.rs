use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// Event types
pub const EVENT_WORKFLOW_CREATED: &str = "workflow.created";
pub const EVENT_WORKFLOW_UPDATED: &str = "workflow.updated";
pub const EVENT_WORKFLOW_DELETED: &str = "workflow.deleted";
pub const EVENT_WORKFLOW_EXECUTED: &str = "workflow.executed";
pub const EVENT_ALERT_CREATED: &str = "alert.created";
pub const EVENT_ALERT_ACKNOWLEDGED: &str = "alert.acknowledged";
pub const EVENT_ALERT_RESOLVED: &str = "alert.resolved";
pub const EVENT_ALERT_RULE_CREATED: &str = "alertrule.created";
pub const EVENT_ALERT_RULE_UPDATED: &str = "alertrule.updated";
pub const EVENT_ALERT_RULE_DELETED: &str = "alertrule.deleted";
pub const EVENT_TENANT_MISMATCH: &str = "workflow.tenant_mismatch";

// Resource types
pub const RESOURCE_WORKFLOW: &str = "workflow";
pub const RESOURCE_EXECUTION: &str = "execution";
pub const RESOURCE_ALERT: &str = "alert";
pub const RESOURCE_ALERT_RULE: &str = "alertrule";

// Actions
pub const ACTION_CREATE: &str = "create";
pub const ACTION_UPDATE: &str = "update";
pub const ACTION_DELETE: &str = "delete";
pub const ACTION_EXECUTE: &str = "execute";
pub const ACTION_ACKNOWLEDGE: &str = "acknowledge";
pub const ACTION_RESOLVE: &str = "resolve";

/// Append-only audit trail entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub action: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    pub fn new(
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        event_type: &str,
        resource_type: &str,
        resource_id: Option<Uuid>,
        action: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            event_type: event_type.to_string(),
            resource_type: resource_type.to_string(),
            resource_id,
            action: action.to_string(),
            old_value: None,
            new_value: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_old_value<T: Serialize>(mut self, value: &T) -> Self {
        self.old_value = serde_json::to_value(value).ok();
        self
    }

    pub fn with_new_value<T: Serialize>(mut self, value: &T) -> Self {
        self.new_value = serde_json::to_value(value).ok();
        self
    }
}
