//! Alert-rule evaluation for ingested metrics.
//!
//! [`evaluate::AlertRuleEvaluator`] sweeps a tenant's enabled threshold
//! rules on every ingested sample, enforces per-rule cooldowns, renders the
//! alert templates, persists the alert, and hands fired rules with a
//! configured remediation workflow to the [`WorkflowBridge`] port.

pub mod evaluate;
pub mod template;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use orchestrix_common::alert::Alert;
use orchestrix_common::metric::MetricSample;
use orchestrix_common::rule::AlertRule;
use orchestrix_common::Result;

/// Driven port the evaluator hands fired rules to.
///
/// Implementations convert the fired rule into a durable execution record
/// and a start request on the external workflow engine. Engine failures are
/// absorbed durably (the execution is marked failed); domain failures such
/// as a tenant mismatch or a broken input template surface as errors.
#[async_trait]
pub trait WorkflowBridge: Send + Sync {
    async fn trigger(
        &self,
        tenant_id: Uuid,
        rule: &AlertRule,
        alert: &Alert,
        sample: &MetricSample,
        context: &Map<String, Value>,
    ) -> Result<()>;
}
