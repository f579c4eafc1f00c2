use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Error;

/// Severity attached to rules and the alerts they create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    High,
    Warning,
    Medium,
    Low,
    Info,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::High => "high",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Medium => "medium",
            AlertSeverity::Low => "low",
            AlertSeverity::Info => "info",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(AlertSeverity::Critical),
            "high" => Ok(AlertSeverity::High),
            "warning" => Ok(AlertSeverity::Warning),
            "medium" => Ok(AlertSeverity::Medium),
            "low" => Ok(AlertSeverity::Low),
            "info" => Ok(AlertSeverity::Info),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Comparison operator of a threshold condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

impl std::str::FromStr for ThresholdOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gt" => Ok(Self::Gt),
            "gte" => Ok(Self::Gte),
            "lt" => Ok(Self::Lt),
            "lte" => Ok(Self::Lte),
            "eq" => Ok(Self::Eq),
            "ne" => Ok(Self::Ne),
            _ => Err(format!("unknown operator: {s}")),
        }
    }
}

impl std::fmt::Display for ThresholdOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
            Self::Ne => "ne",
        };
        write!(f, "{s}")
    }
}

impl ThresholdOp {
    /// Applies the operator. Any comparison involving NaN is false,
    /// including `ne`.
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        if value.is_nan() || threshold.is_nan() {
            return false;
        }
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

/// Parsed form of a `condition_type = "threshold"` condition config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCondition {
    pub metric_name: String,
    pub operator: ThresholdOp,
    pub threshold: f64,
}

#[derive(Deserialize)]
struct RawThresholdCondition {
    metric_name: String,
    operator: String,
    threshold: f64,
}

impl ThresholdCondition {
    /// Parses the opaque condition config of a threshold rule.
    pub fn parse(config: &Value) -> Result<Self, Error> {
        let raw: RawThresholdCondition = serde_json::from_value(config.clone())
            .map_err(|e| Error::Validation(format!("invalid condition config: {e}")))?;
        let operator = raw
            .operator
            .parse::<ThresholdOp>()
            .map_err(Error::Validation)?;
        Ok(Self {
            metric_name: raw.metric_name,
            operator,
            threshold: raw.threshold,
        })
    }
}

/// Condition at the domain boundary.
///
/// The wire representation stays opaque JSON; unknown condition types
/// round-trip without loss but are not evaluatable.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Threshold(ThresholdCondition),
    Unknown { condition_type: String, config: Value },
}

pub const CONDITION_TYPE_THRESHOLD: &str = "threshold";

impl Condition {
    /// Interprets a `(condition_type, condition_config)` pair.
    ///
    /// A threshold config that fails to parse is an error (the evaluator
    /// skips the rule with a warning); any other type is preserved as-is.
    pub fn from_parts(condition_type: &str, config: &Value) -> Result<Self, Error> {
        if condition_type == CONDITION_TYPE_THRESHOLD {
            Ok(Condition::Threshold(ThresholdCondition::parse(config)?))
        } else {
            Ok(Condition::Unknown {
                condition_type: condition_type.to_string(),
                config: config.clone(),
            })
        }
    }
}

/// Threshold-based alert rule owned by a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub condition_type: String,
    pub condition_config: Value,
    pub severity: AlertSeverity,
    pub alert_title_template: String,
    pub alert_message_template: Option<String>,
    pub trigger_workflow_id: Option<Uuid>,
    pub trigger_input_template: Option<Value>,
    pub cooldown_seconds: i32,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// Whether the rule may fire now: it must be enabled and either never
    /// triggered or out of its cooldown window.
    pub fn can_trigger(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_triggered_at {
            None => true,
            Some(last) => now - last >= Duration::seconds(i64::from(self.cooldown_seconds)),
        }
    }

    /// Interprets the rule's condition config (see [`Condition::from_parts`]).
    pub fn condition(&self) -> Result<Condition, Error> {
        Condition::from_parts(&self.condition_type, &self.condition_config)
    }
}
