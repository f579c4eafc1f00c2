use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use orchestrix_common::alert::{Alert, AlertStatus};
use orchestrix_common::audit;
use orchestrix_common::audit::AuditLog;
use orchestrix_common::metric::MetricSample;
use orchestrix_common::rule::{AlertRule, Condition, ThresholdCondition};
use orchestrix_common::{Error, Result};
use orchestrix_storage::{AlertRuleStore, AlertStore, AuditStore};

use crate::template;
use crate::WorkflowBridge;

/// Evaluates a tenant's enabled threshold rules against ingested samples.
///
/// One evaluator instance is shared across all tenants; candidate selection
/// is scoped by the tenant id on every call. Cooldown enforcement is
/// best-effort: two racing evaluations of the same rule may both read a
/// stale `last_triggered_at` and both fire.
pub struct AlertRuleEvaluator {
    rules: Arc<dyn AlertRuleStore>,
    alerts: Arc<dyn AlertStore>,
    audit: Arc<dyn AuditStore>,
    bridge: Option<Arc<dyn WorkflowBridge>>,
}

impl AlertRuleEvaluator {
    pub fn new(
        rules: Arc<dyn AlertRuleStore>,
        alerts: Arc<dyn AlertStore>,
        audit: Arc<dyn AuditStore>,
        bridge: Option<Arc<dyn WorkflowBridge>>,
    ) -> Self {
        Self {
            rules,
            alerts,
            audit,
            bridge,
        }
    }

    /// Sweeps all enabled rules for the sample's tenant and metric name.
    ///
    /// Per-rule failures are logged and do not abort the remaining rules.
    pub async fn evaluate(&self, tenant_id: Uuid, sample: &MetricSample) -> Result<()> {
        let rules = self.rules.find_enabled_by_tenant(tenant_id).await?;

        for rule in rules {
            let condition = match rule.condition() {
                Ok(Condition::Threshold(condition)) => condition,
                Ok(Condition::Unknown { condition_type, .. }) => {
                    tracing::debug!(
                        rule_id = %rule.id,
                        condition_type,
                        "skipping non-threshold rule"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(rule_id = %rule.id, error = %e, "skipping rule with invalid condition");
                    continue;
                }
            };

            if condition.metric_name != sample.name {
                continue;
            }

            if !rule.can_trigger(Utc::now()) {
                tracing::debug!(rule_id = %rule.id, "rule on cooldown");
                continue;
            }

            if !condition.operator.check(sample.value, condition.threshold) {
                continue;
            }

            if let Err(e) = self.fire(tenant_id, &rule, &condition, sample).await {
                tracing::error!(rule_id = %rule.id, error = %e, "failed to fire rule");
            }
        }

        Ok(())
    }

    /// Creates the alert, stamps the rule, and hands off to the bridge.
    async fn fire(
        &self,
        tenant_id: Uuid,
        rule: &AlertRule,
        condition: &ThresholdCondition,
        sample: &MetricSample,
    ) -> Result<()> {
        let context = alert_context(rule, condition, sample);

        let title = match template::render(&rule.alert_title_template, &context) {
            Ok(title) => title,
            Err(e) => {
                tracing::warn!(rule_id = %rule.id, error = %e, "title template failed, using raw template");
                rule.alert_title_template.clone()
            }
        };
        let message = rule.alert_message_template.as_ref().map(|tpl| {
            template::render(tpl, &context).unwrap_or_else(|_| tpl.clone())
        });

        let alert = Alert {
            id: Uuid::new_v4(),
            tenant_id,
            workflow_id: None,
            execution_id: None,
            severity: rule.severity,
            title,
            message,
            status: AlertStatus::Triggered,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            triggered_by_rule_id: Some(rule.id),
            triggered_workflow_execution_id: None,
            source: sample.source.clone(),
            metadata: json!({
                "metric": sample,
                "rule_id": rule.id,
                "rule_name": rule.name,
                "condition": condition,
            }),
            created_at: Utc::now(),
        };

        self.alerts.save(&alert).await?;

        tracing::info!(
            alert_id = %alert.id,
            rule_id = %rule.id,
            metric = %sample.name,
            value = sample.value,
            "alert created"
        );

        self.record_audit(
            AuditLog::new(
                tenant_id,
                None,
                audit::EVENT_ALERT_CREATED,
                audit::RESOURCE_ALERT,
                Some(alert.id),
                audit::ACTION_CREATE,
            )
            .with_new_value(&alert),
        )
        .await;

        if let Err(e) = self.rules.update_last_triggered(rule.id).await {
            tracing::warn!(rule_id = %rule.id, error = %e, "failed to update last triggered");
        }

        if rule.trigger_workflow_id.is_some() {
            if let Some(bridge) = &self.bridge {
                match bridge
                    .trigger(tenant_id, rule, &alert, sample, &context)
                    .await
                {
                    Ok(()) => {}
                    Err(Error::TenantMismatch) => {
                        tracing::warn!(
                            rule_id = %rule.id,
                            workflow_id = ?rule.trigger_workflow_id,
                            "workflow tenant mismatch"
                        );
                        self.record_audit(
                            AuditLog::new(
                                tenant_id,
                                None,
                                audit::EVENT_TENANT_MISMATCH,
                                audit::RESOURCE_WORKFLOW,
                                rule.trigger_workflow_id,
                                audit::ACTION_EXECUTE,
                            )
                            .with_new_value(&json!({
                                "rule_id": rule.id,
                                "alert_id": alert.id,
                            })),
                        )
                        .await;
                    }
                    Err(e) => {
                        tracing::error!(
                            rule_id = %rule.id,
                            workflow_id = ?rule.trigger_workflow_id,
                            error = %e,
                            "failed to trigger workflow"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    /// Audit persistence is best-effort; failures are logged at warning
    /// level and do not fail the evaluation.
    async fn record_audit(&self, log: AuditLog) {
        if let Err(e) = self.audit.save(&log).await {
            tracing::warn!(error = %e, event = %log.event_type, "failed to write audit log");
        }
    }
}

/// Context map for title/message/input rendering.
pub fn alert_context(
    rule: &AlertRule,
    condition: &ThresholdCondition,
    sample: &MetricSample,
) -> Map<String, Value> {
    let mut context = Map::new();
    context.insert("metric_name".into(), Value::String(sample.name.clone()));
    context.insert("value".into(), json!(sample.value));
    context.insert("threshold".into(), json!(condition.threshold));
    context.insert(
        "operator".into(),
        Value::String(condition.operator.to_string()),
    );
    context.insert("labels".into(), json!(sample.labels));
    context.insert(
        "source".into(),
        sample
            .source
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
    );
    context.insert(
        "timestamp".into(),
        Value::String(sample.timestamp.to_rfc3339()),
    );
    context.insert("rule_name".into(), Value::String(rule.name.clone()));
    context.insert("severity".into(), Value::String(rule.severity.to_string()));
    context
}
