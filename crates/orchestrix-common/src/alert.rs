use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;
use crate::rule::AlertSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Triggered,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertStatus::Open => "open",
            AlertStatus::Triggered => "triggered",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(AlertStatus::Open),
            "triggered" => Ok(AlertStatus::Triggered),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(format!("unknown alert status: {s}")),
        }
    }
}

/// Durable record that a rule fired (or that an alert was raised manually).
///
/// Lifecycle: `triggered|open → acknowledged → resolved`, with
/// `triggered|open → resolved` also permitted. `resolved` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub workflow_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: Option<String>,
    pub status: AlertStatus,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<Uuid>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub triggered_by_rule_id: Option<Uuid>,
    pub triggered_workflow_execution_id: Option<Uuid>,
    pub source: Option<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn can_acknowledge(&self) -> bool {
        matches!(self.status, AlertStatus::Open | AlertStatus::Triggered)
    }

    pub fn can_resolve(&self) -> bool {
        matches!(
            self.status,
            AlertStatus::Open | AlertStatus::Triggered | AlertStatus::Acknowledged
        )
    }

    pub fn acknowledge(&mut self, user_id: Option<Uuid>) -> Result<(), Error> {
        if !self.can_acknowledge() {
            return Err(Error::AlreadyAcknowledged);
        }
        self.status = AlertStatus::Acknowledged;
        self.acknowledged_at = Some(Utc::now());
        self.acknowledged_by = user_id;
        Ok(())
    }

    pub fn resolve(&mut self, user_id: Option<Uuid>) -> Result<(), Error> {
        if !self.can_resolve() {
            return Err(Error::AlreadyResolved);
        }
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = user_id;
        Ok(())
    }
}
