use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use orchestrix_alert::{template, WorkflowBridge};
use orchestrix_common::alert::Alert;
use orchestrix_common::execution::{Execution, ExecutionStatus};
use orchestrix_common::metric::MetricSample;
use orchestrix_common::rule::AlertRule;
use orchestrix_common::workflow::Workflow;
use orchestrix_common::{Error, Result};
use orchestrix_storage::{AlertStore, ExecutionStore, WorkflowStore};

use crate::client::EngineClient;

/// Converts a fired rule into a durable remediation request on the engine.
///
/// Idempotency: the execution record is keyed on `alert-<alert_id>` as the
/// engine-side workflow id. A second trigger for the same alert finds the
/// existing record and, unless it is still pending, does nothing; the
/// engine deduplicates the start request by the same key.
pub struct TriggerBridge {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    alerts: Arc<dyn AlertStore>,
    engine: Arc<dyn EngineClient>,
    dynamic_entrypoint: String,
    static_entrypoint: String,
}

impl TriggerBridge {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        alerts: Arc<dyn AlertStore>,
        engine: Arc<dyn EngineClient>,
        dynamic_entrypoint: &str,
        static_entrypoint: &str,
    ) -> Self {
        Self {
            workflows,
            executions,
            alerts,
            engine,
            dynamic_entrypoint: dynamic_entrypoint.to_string(),
            static_entrypoint: static_entrypoint.to_string(),
        }
    }

    fn new_execution(
        tenant_id: Uuid,
        workflow: &Workflow,
        rule: &AlertRule,
        engine_workflow_id: &str,
        input: Value,
    ) -> Execution {
        Execution {
            id: Uuid::new_v4(),
            tenant_id,
            workflow_id: workflow.id,
            engine_workflow_id: Some(engine_workflow_id.to_string()),
            engine_run_id: None,
            status: ExecutionStatus::Pending,
            input,
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            triggered_by: Some(format!("alert_rule:{}", rule.id)),
            created_by: None,
            created_at: Utc::now(),
        }
    }

    /// Links the alert to its remediation execution. Once set the link is
    /// never cleared.
    async fn link_alert(&self, alert: &Alert, execution_id: Uuid) {
        let mut updated = alert.clone();
        updated.triggered_workflow_execution_id = Some(execution_id);
        if let Err(e) = self.alerts.update(&updated).await {
            tracing::warn!(
                alert_id = %alert.id,
                execution_id = %execution_id,
                error = %e,
                "failed to link alert to execution"
            );
        }
    }
}

#[async_trait]
impl WorkflowBridge for TriggerBridge {
    async fn trigger(
        &self,
        tenant_id: Uuid,
        rule: &AlertRule,
        alert: &Alert,
        sample: &MetricSample,
        context: &Map<String, Value>,
    ) -> Result<()> {
        let workflow_id = rule
            .trigger_workflow_id
            .ok_or_else(|| Error::Validation("rule has no trigger workflow".into()))?;
        let workflow = self.workflows.find_by_id(workflow_id).await?;

        if workflow.tenant_id != tenant_id {
            return Err(Error::TenantMismatch);
        }

        let engine_workflow_id = format!("alert-{}", alert.id);

        let input = match &rule.trigger_input_template {
            Some(tpl) => match template::render_value(tpl, context) {
                Ok(input) => input,
                Err(e) => {
                    // Fail closed on broken remediation input; the failure
                    // is still recorded durably.
                    let mut execution = Self::new_execution(
                        tenant_id,
                        &workflow,
                        rule,
                        &engine_workflow_id,
                        tpl.clone(),
                    );
                    execution.mark_failed(format!("failed to render workflow input: {e}"));
                    self.executions.save(&execution).await?;
                    self.link_alert(alert, execution.id).await;
                    return Err(e);
                }
            },
            None => json!({
                "alert_id": alert.id,
                "rule_id": rule.id,
                "metric_name": sample.name,
                "value": sample.value,
                "labels": sample.labels,
                "source": sample.source,
            }),
        };

        let mut execution = match self
            .executions
            .find_by_engine_workflow_id(tenant_id, &engine_workflow_id)
            .await?
        {
            Some(existing) => {
                if existing.status != ExecutionStatus::Pending {
                    tracing::debug!(
                        execution_id = %existing.id,
                        status = %existing.status,
                        "execution already resolved for alert"
                    );
                    return Ok(());
                }
                existing
            }
            None => {
                let execution = Self::new_execution(
                    tenant_id,
                    &workflow,
                    rule,
                    &engine_workflow_id,
                    input.clone(),
                );
                self.executions.save(&execution).await?;
                self.link_alert(alert, execution.id).await;
                execution
            }
        };

        let (entrypoint, payload) = if workflow.has_dynamic_definition() {
            (
                self.dynamic_entrypoint.as_str(),
                json!({
                    "workflow_id": workflow.id,
                    "execution_id": execution.id,
                    "definition": workflow.definition,
                    "input": input,
                }),
            )
        } else {
            (
                self.static_entrypoint.as_str(),
                json!({
                    "workflow_id": workflow.id,
                    "execution_id": execution.id,
                    "input": input,
                }),
            )
        };

        match self
            .engine
            .execute(&engine_workflow_id, entrypoint, payload)
            .await
        {
            Ok(run) => {
                execution.engine_run_id = Some(run.engine_run_id);
                execution.mark_running();
                self.executions.update(&execution).await?;
                tracing::info!(
                    alert_id = %alert.id,
                    workflow_id = %workflow.id,
                    execution_id = %execution.id,
                    engine_workflow_id = %engine_workflow_id,
                    "workflow triggered for alert"
                );
                Ok(())
            }
            Err(e) => {
                // No retry here; the failure is durable in the record.
                execution.mark_failed(format!("failed to start workflow: {e}"));
                self.executions.update(&execution).await?;
                tracing::warn!(
                    execution_id = %execution.id,
                    error = %e,
                    "engine start failed"
                );
                Ok(())
            }
        }
    }
}
