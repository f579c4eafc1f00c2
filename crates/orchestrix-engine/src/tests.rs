use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use orchestrix_alert::WorkflowBridge;
use orchestrix_common::alert::{Alert, AlertStatus};
use orchestrix_common::execution::{Execution, ExecutionStatus};
use orchestrix_common::metric::MetricSample;
use orchestrix_common::rule::{AlertRule, AlertSeverity};
use orchestrix_common::workflow::{Workflow, WorkflowStatus};
use orchestrix_common::{Error, Result};
use orchestrix_storage::{AlertStore, ExecutionStore, WorkflowStore};

use crate::bridge::TriggerBridge;
use crate::client::{EngineClient, EngineRun};

#[derive(Default)]
struct MemWorkflowStore {
    workflows: Mutex<Vec<Workflow>>,
}

#[async_trait]
impl WorkflowStore for MemWorkflowStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Workflow> {
        self.workflows
            .lock()
            .unwrap()
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or(Error::NotFound("workflow"))
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<Workflow>> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(self.find_by_tenant(tenant_id, 0, 0).await?.len() as u64)
    }

    async fn save(&self, workflow: &Workflow) -> Result<()> {
        self.workflows.lock().unwrap().push(workflow.clone());
        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> Result<()> {
        let mut workflows = self.workflows.lock().unwrap();
        let slot = workflows
            .iter_mut()
            .find(|w| w.id == workflow.id)
            .ok_or(Error::NotFound("workflow"))?;
        *slot = workflow.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.workflows.lock().unwrap().retain(|w| w.id != id);
        Ok(())
    }
}

#[derive(Default)]
struct MemExecutionStore {
    executions: Mutex<Vec<Execution>>,
}

#[async_trait]
impl ExecutionStore for MemExecutionStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Execution> {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or(Error::NotFound("execution"))
    }

    async fn find_by_engine_workflow_id(
        &self,
        tenant_id: Uuid,
        engine_workflow_id: &str,
    ) -> Result<Option<Execution>> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .find(|e| {
                e.tenant_id == tenant_id
                    && e.engine_workflow_id.as_deref() == Some(engine_workflow_id)
            })
            .cloned())
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<Execution>> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn find_by_workflow(
        &self,
        workflow_id: Uuid,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<Execution>> {
        Ok(self
            .executions
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(self.find_by_tenant(tenant_id, 0, 0).await?.len() as u64)
    }

    async fn count_by_workflow(&self, workflow_id: Uuid) -> Result<u64> {
        Ok(self.find_by_workflow(workflow_id, 0, 0).await?.len() as u64)
    }

    async fn save(&self, execution: &Execution) -> Result<()> {
        self.executions.lock().unwrap().push(execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &Execution) -> Result<()> {
        let mut executions = self.executions.lock().unwrap();
        let slot = executions
            .iter_mut()
            .find(|e| e.id == execution.id)
            .ok_or(Error::NotFound("execution"))?;
        *slot = execution.clone();
        Ok(())
    }
}

#[derive(Default)]
struct MemAlertStore {
    alerts: Mutex<Vec<Alert>>,
}

#[async_trait]
impl AlertStore for MemAlertStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Alert> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(Error::NotFound("alert"))
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<Alert>> {
        Ok(self
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(self.find_by_tenant(tenant_id, 0, 0).await?.len() as u64)
    }

    async fn save(&self, alert: &Alert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn update(&self, alert: &Alert) -> Result<()> {
        let mut alerts = self.alerts.lock().unwrap();
        let slot = alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or(Error::NotFound("alert"))?;
        *slot = alert.clone();
        Ok(())
    }
}

struct FakeEngine {
    calls: AtomicUsize,
    fail: bool,
    last_request: Mutex<Option<(String, String, Value)>>,
}

impl FakeEngine {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
            last_request: Mutex::new(None),
        }
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn execute(
        &self,
        request_id: &str,
        entrypoint: &str,
        payload: Value,
    ) -> Result<EngineRun> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() =
            Some((request_id.to_string(), entrypoint.to_string(), payload));
        if self.fail {
            return Err(Error::Engine("connection refused".into()));
        }
        Ok(EngineRun {
            engine_workflow_id: request_id.to_string(),
            engine_run_id: "run-001".into(),
        })
    }

    async fn cancel(&self, _engine_workflow_id: &str) -> Result<()> {
        Ok(())
    }

    async fn describe(&self, _engine_workflow_id: &str) -> Result<String> {
        Ok("RUNNING".into())
    }
}

struct Fixture {
    tenant_id: Uuid,
    workflows: Arc<MemWorkflowStore>,
    executions: Arc<MemExecutionStore>,
    alerts: Arc<MemAlertStore>,
    engine: Arc<FakeEngine>,
}

impl Fixture {
    fn new(engine_fails: bool) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            workflows: Arc::new(MemWorkflowStore::default()),
            executions: Arc::new(MemExecutionStore::default()),
            alerts: Arc::new(MemAlertStore::default()),
            engine: Arc::new(FakeEngine::new(engine_fails)),
        }
    }

    fn bridge(&self) -> TriggerBridge {
        TriggerBridge::new(
            self.workflows.clone(),
            self.executions.clone(),
            self.alerts.clone(),
            self.engine.clone(),
            "DynamicWorkflow",
            "ProcessWorkflow",
        )
    }

    async fn add_workflow(&self, tenant_id: Uuid, definition: Value) -> Workflow {
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id,
            name: "restart-service".into(),
            description: None,
            definition,
            schedule: None,
            status: WorkflowStatus::Active,
            version: 1,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.workflows.save(&workflow).await.unwrap();
        workflow
    }

    async fn add_alert(&self) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            workflow_id: None,
            execution_id: None,
            severity: AlertSeverity::Critical,
            title: "CPU 95%".into(),
            message: None,
            status: AlertStatus::Triggered,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            triggered_by_rule_id: None,
            triggered_workflow_execution_id: None,
            source: None,
            metadata: json!({}),
            created_at: Utc::now(),
        };
        self.alerts.save(&alert).await.unwrap();
        alert
    }

    fn executions(&self) -> Vec<Execution> {
        self.executions.executions.lock().unwrap().clone()
    }
}

fn make_rule(tenant_id: Uuid, workflow_id: Uuid) -> AlertRule {
    AlertRule {
        id: Uuid::new_v4(),
        tenant_id,
        name: "cpu-high".into(),
        description: None,
        enabled: true,
        condition_type: "threshold".into(),
        condition_config: json!({
            "metric_name": "cpu",
            "operator": "gt",
            "threshold": 90.0
        }),
        severity: AlertSeverity::Critical,
        alert_title_template: "CPU ${value}%".into(),
        alert_message_template: None,
        trigger_workflow_id: Some(workflow_id),
        trigger_input_template: None,
        cooldown_seconds: 60,
        last_triggered_at: None,
        created_by: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn make_sample(tenant_id: Uuid) -> MetricSample {
    MetricSample {
        id: Uuid::new_v4(),
        tenant_id,
        name: "cpu".into(),
        value: 95.0,
        labels: HashMap::new(),
        source: Some("node-agent".into()),
        timestamp: Utc::now(),
        created_at: Utc::now(),
    }
}

fn context() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("alert_id".into(), json!("a-1"));
    map.insert("value".into(), json!(95.0));
    map
}

#[tokio::test]
async fn trigger_starts_workflow_and_links_alert() {
    let fx = Fixture::new(false);
    let workflow = fx
        .add_workflow(fx.tenant_id, json!({"steps": [{"name": "s", "type": "http"}]}))
        .await;
    let alert = fx.add_alert().await;
    let rule = make_rule(fx.tenant_id, workflow.id);

    fx.bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await
        .unwrap();

    let executions = fx.executions();
    assert_eq!(executions.len(), 1);
    let execution = &executions[0];
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert_eq!(execution.engine_run_id.as_deref(), Some("run-001"));
    assert_eq!(
        execution.engine_workflow_id.as_deref(),
        Some(format!("alert-{}", alert.id).as_str())
    );
    assert_eq!(
        execution.triggered_by.as_deref(),
        Some(format!("alert_rule:{}", rule.id).as_str())
    );
    assert!(execution.started_at.is_some());

    let linked = fx.alerts.find_by_id(alert.id).await.unwrap();
    assert_eq!(linked.triggered_workflow_execution_id, Some(execution.id));

    let (request_id, entrypoint, _) = fx.engine.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(request_id, format!("alert-{}", alert.id));
    assert_eq!(entrypoint, "DynamicWorkflow", "step list selects dynamic entrypoint");
}

#[tokio::test]
async fn workflow_without_steps_uses_static_entrypoint() {
    let fx = Fixture::new(false);
    let workflow = fx.add_workflow(fx.tenant_id, Value::Null).await;
    let alert = fx.add_alert().await;
    let rule = make_rule(fx.tenant_id, workflow.id);

    fx.bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await
        .unwrap();

    let (_, entrypoint, payload) = fx.engine.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(entrypoint, "ProcessWorkflow");
    assert!(payload.get("definition").is_none());
}

#[tokio::test]
async fn engine_failure_marks_execution_failed() {
    let fx = Fixture::new(true);
    let workflow = fx.add_workflow(fx.tenant_id, Value::Null).await;
    let alert = fx.add_alert().await;
    let rule = make_rule(fx.tenant_id, workflow.id);

    // The bridge absorbs engine failures: the outcome is durable.
    fx.bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await
        .unwrap();

    let executions = fx.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    let error = executions[0].error.as_deref().unwrap();
    assert!(error.starts_with("failed to start workflow:"), "{error}");
    assert!(executions[0].completed_at.is_some());
}

#[tokio::test]
async fn tenant_mismatch_creates_no_execution() {
    let fx = Fixture::new(false);
    let other_tenant = Uuid::new_v4();
    let workflow = fx.add_workflow(other_tenant, Value::Null).await;
    let alert = fx.add_alert().await;
    let rule = make_rule(fx.tenant_id, workflow.id);

    let result = fx
        .bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await;

    assert!(matches!(result, Err(Error::TenantMismatch)));
    assert!(fx.executions().is_empty());
    assert_eq!(fx.engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_workflow_aborts() {
    let fx = Fixture::new(false);
    let alert = fx.add_alert().await;
    let rule = make_rule(fx.tenant_id, Uuid::new_v4());

    let result = fx
        .bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    assert!(fx.executions().is_empty());
}

#[tokio::test]
async fn second_trigger_for_same_alert_is_idempotent() {
    let fx = Fixture::new(false);
    let workflow = fx.add_workflow(fx.tenant_id, Value::Null).await;
    let alert = fx.add_alert().await;
    let rule = make_rule(fx.tenant_id, workflow.id);
    let bridge = fx.bridge();
    let sample = make_sample(fx.tenant_id);

    bridge
        .trigger(fx.tenant_id, &rule, &alert, &sample, &context())
        .await
        .unwrap();
    bridge
        .trigger(fx.tenant_id, &rule, &alert, &sample, &context())
        .await
        .unwrap();

    assert_eq!(fx.executions().len(), 1, "no duplicate execution records");
    assert_eq!(fx.engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn default_input_is_synthesized_without_template() {
    let fx = Fixture::new(false);
    let workflow = fx.add_workflow(fx.tenant_id, Value::Null).await;
    let alert = fx.add_alert().await;
    let rule = make_rule(fx.tenant_id, workflow.id);

    fx.bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await
        .unwrap();

    let input = &fx.executions()[0].input;
    assert_eq!(input["alert_id"], json!(alert.id));
    assert_eq!(input["rule_id"], json!(rule.id));
    assert_eq!(input["metric_name"], json!("cpu"));
    assert_eq!(input["value"], json!(95.0));
}

#[tokio::test]
async fn input_template_is_rendered_recursively() {
    let fx = Fixture::new(false);
    let workflow = fx.add_workflow(fx.tenant_id, Value::Null).await;
    let alert = fx.add_alert().await;
    let mut rule = make_rule(fx.tenant_id, workflow.id);
    rule.trigger_input_template = Some(json!({
        "target": "${alert_id}",
        "nested": {"cpu": "${value}"}
    }));

    fx.bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await
        .unwrap();

    let input = &fx.executions()[0].input;
    assert_eq!(input["target"], json!("a-1"));
    assert_eq!(input["nested"]["cpu"], json!("95"));
}

#[tokio::test]
async fn broken_input_template_fails_closed() {
    let fx = Fixture::new(false);
    let workflow = fx.add_workflow(fx.tenant_id, Value::Null).await;
    let alert = fx.add_alert().await;
    let mut rule = make_rule(fx.tenant_id, workflow.id);
    rule.trigger_input_template = Some(json!({"target": "${alert_id"}));

    let result = fx
        .bridge()
        .trigger(fx.tenant_id, &rule, &alert, &make_sample(fx.tenant_id), &context())
        .await;

    assert!(matches!(result, Err(Error::Template(_))));
    assert_eq!(fx.engine.calls.load(Ordering::SeqCst), 0, "engine must not start");
    let executions = fx.executions();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
}
