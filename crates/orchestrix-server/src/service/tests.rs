use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use orchestrix_common::alert::{Alert, AlertStatus};
use orchestrix_common::audit::{self, AuditLog};
use orchestrix_common::execution::{Execution, ExecutionStatus};
use orchestrix_common::metric::{
    AggregationType, MetricAggregate, MetricDefinition, MetricQuery, MetricSample, MetricType,
    TimeBucket,
};
use orchestrix_common::rule::{AlertRule, AlertSeverity};
use orchestrix_common::workflow::{Workflow, WorkflowStatus};
use orchestrix_common::{Error, Result};
use orchestrix_engine::{EngineClient, EngineRun};
use orchestrix_storage::{
    AlertRuleStore, AlertStore, AuditStore, DefinitionStore, ExecutionStore, MetricStore,
    TenantGate, WorkflowStore,
};

use crate::service::alert_rule::CreateAlertRuleInput;
use crate::service::metric::{
    reduce_last_seen, CreateDefinitionInput, IngestInput, UpdateDefinitionInput, MAX_BATCH_SIZE,
};
use crate::service::workflow::{CreateWorkflowInput, UpdateWorkflowInput};
use crate::service::{
    AlertRuleService, AlertService, AuditService, ExecutionService, MetricService, WorkflowService,
};

// ---- mocks ----

#[derive(Default)]
struct RecordingGate {
    bound: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl TenantGate for RecordingGate {
    async fn bind(&self, tenant_id: Uuid) -> Result<()> {
        self.bound.lock().unwrap().push(tenant_id);
        Ok(())
    }
}

#[derive(Default)]
struct MemMetricStore {
    samples: Mutex<Vec<MetricSample>>,
}

#[async_trait]
impl MetricStore for MemMetricStore {
    async fn save(&self, sample: &MetricSample) -> Result<()> {
        self.samples.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn save_batch(&self, samples: &[MetricSample]) -> Result<usize> {
        self.samples.lock().unwrap().extend_from_slice(samples);
        Ok(samples.len())
    }

    async fn find_by_query(&self, query: &MetricQuery) -> Result<Vec<MetricSample>> {
        let mut matched: Vec<MetricSample> = self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.tenant_id == query.tenant_id && s.name == query.name)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let offset = query.offset.max(0) as usize;
        let limit = query.effective_limit() as usize;
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_by_query(&self, query: &MetricQuery) -> Result<u64> {
        Ok(self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.tenant_id == query.tenant_id && s.name == query.name)
            .count() as u64)
    }

    async fn find_latest(
        &self,
        tenant_id: Uuid,
        name: &str,
        _labels: Option<&HashMap<String, String>>,
    ) -> Result<MetricSample> {
        self.samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.tenant_id == tenant_id && s.name == name)
            .max_by_key(|s| s.timestamp)
            .cloned()
            .ok_or(Error::NotFound("metric"))
    }

    async fn get_aggregate(&self, _query: &MetricQuery) -> Result<MetricAggregate> {
        unimplemented!("not exercised in service tests")
    }

    async fn get_series(&self, _query: &MetricQuery, _bucket: Duration) -> Result<Vec<TimeBucket>> {
        unimplemented!("not exercised in service tests")
    }

    async fn list_names(&self, tenant_id: Uuid, _prefix: Option<&str>) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .samples
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.tenant_id == tenant_id)
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[derive(Default)]
struct MemDefinitionStore {
    definitions: Mutex<Vec<MetricDefinition>>,
}

#[async_trait]
impl DefinitionStore for MemDefinitionStore {
    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> Result<MetricDefinition> {
        self.definitions
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.tenant_id == tenant_id && d.name == name)
            .cloned()
            .ok_or(Error::NotFound("metric definition"))
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<MetricDefinition>> {
        Ok(self
            .definitions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(self.find_by_tenant(tenant_id, 0, 0).await?.len() as u64)
    }

    async fn save(&self, definition: &MetricDefinition) -> Result<()> {
        let mut definitions = self.definitions.lock().unwrap();
        if definitions
            .iter()
            .any(|d| d.tenant_id == definition.tenant_id && d.name == definition.name)
        {
            return Err(Error::Conflict(format!(
                "metric definition '{}' already exists",
                definition.name
            )));
        }
        definitions.push(definition.clone());
        Ok(())
    }

    async fn update(&self, definition: &MetricDefinition) -> Result<()> {
        let mut definitions = self.definitions.lock().unwrap();
        let slot = definitions
            .iter_mut()
            .find(|d| d.id == definition.id)
            .ok_or(Error::NotFound("metric definition"))?;
        *slot = definition.clone();
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, name: &str) -> Result<()> {
        let mut definitions = self.definitions.lock().unwrap();
        let before = definitions.len();
        definitions.retain(|d| !(d.tenant_id == tenant_id && d.name == name));
        if definitions.len() == before {
            return Err(Error::NotFound("metric definition"));
        }
        Ok(())
    }
}

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

#[derive(Default)]
struct MemAuditStore {
    logs: Mutex<Vec<AuditLog>>,
}

#[async_trait]
impl AuditStore for MemAuditStore {
    async fn find_by_id(&self, id: Uuid) -> Result<AuditLog> {
        self.logs
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or(Error::NotFound("audit log"))
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<AuditLog>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(self.find_by_tenant(tenant_id, 0, 0).await?.len() as u64)
    }

    async fn save(&self, log: &AuditLog) -> Result<()> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }
}

struct FakeEngine {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeEngine {
    fn new(fail: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail,
        }
    }
}

#[async_trait]
impl EngineClient for FakeEngine {
    async fn execute(
        &self,
        request_id: &str,
        _entrypoint: &str,
        _payload: Value,
    ) -> Result<EngineRun> {
        self.calls.fetch_add(1, Ordering::SeqCst);
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

// ---- fixtures ----

struct Fixture {
    tenant_id: Uuid,
    gate: Arc<RecordingGate>,
    metrics: Arc<MemMetricStore>,
    definitions: Arc<MemDefinitionStore>,
    workflows: Arc<MemWorkflowStore>,
    executions: Arc<MemExecutionStore>,
    alerts: Arc<MemAlertStore>,
    audit_logs: Arc<MemAuditStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            gate: Arc::new(RecordingGate::default()),
            metrics: Arc::new(MemMetricStore::default()),
            definitions: Arc::new(MemDefinitionStore::default()),
            workflows: Arc::new(MemWorkflowStore::default()),
            executions: Arc::new(MemExecutionStore::default()),
            alerts: Arc::new(MemAlertStore::default()),
            audit_logs: Arc::new(MemAuditStore::default()),
        }
    }

    fn audit_service(&self) -> Arc<AuditService> {
        Arc::new(AuditService::new(self.audit_logs.clone(), self.gate.clone()))
    }

    fn metric_service(&self) -> MetricService {
        MetricService::new(
            self.metrics.clone(),
            self.definitions.clone(),
            self.gate.clone(),
            None,
            StdDuration::from_secs(5),
            StdDuration::from_secs(30),
        )
    }

    fn workflow_service(&self, engine: Arc<FakeEngine>) -> WorkflowService {
        WorkflowService::new(
            self.workflows.clone(),
            self.executions.clone(),
            engine,
            self.audit_service(),
            self.gate.clone(),
            "DynamicWorkflow",
            "ProcessWorkflow",
        )
    }

    fn execution_service(&self, engine: Arc<FakeEngine>) -> ExecutionService {
        ExecutionService::new(self.executions.clone(), engine, self.gate.clone())
    }

    fn alert_service(&self) -> AlertService {
        AlertService::new(self.alerts.clone(), self.audit_service(), self.gate.clone())
    }

    fn rule_service(&self, rules: Arc<dyn AlertRuleStore>) -> AlertRuleService {
        AlertRuleService::new(rules, self.audit_service(), self.gate.clone())
    }

    async fn active_workflow(&self) -> Workflow {
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            name: "restart".into(),
            description: None,
            definition: json!({"steps": [{"name": "s", "type": "http"}]}),
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
}

fn ingest_input(name: &str, value: f64) -> IngestInput {
    IngestInput {
        name: name.to_string(),
        value,
        labels: HashMap::new(),
        source: None,
        timestamp: None,
    }
}

// ---- metric service ----

#[tokio::test]
async fn ingest_assigns_server_side_fields() {
    let fx = Fixture::new();
    let service = fx.metric_service();

    let sample = service
        .ingest(fx.tenant_id, ingest_input("cpu", 42.0))
        .await
        .unwrap();

    assert!(!sample.id.is_nil());
    assert_eq!(sample.tenant_id, fx.tenant_id);
    assert!(Utc::now() - sample.timestamp < Duration::seconds(5));
    assert_eq!(fx.metrics.samples.lock().unwrap().len(), 1);
    assert_eq!(fx.gate.bound.lock().unwrap().as_slice(), &[fx.tenant_id]);
}

#[tokio::test]
async fn ingest_preserves_client_timestamp() {
    let fx = Fixture::new();
    let service = fx.metric_service();
    let ts = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();

    let mut input = ingest_input("cpu", 42.0);
    input.timestamp = Some(ts);
    let sample = service.ingest(fx.tenant_id, input).await.unwrap();

    assert_eq!(sample.timestamp, ts);
}

#[tokio::test]
async fn ingest_rejects_empty_name() {
    let fx = Fixture::new();
    let service = fx.metric_service();

    let result = service.ingest(fx.tenant_id, ingest_input("", 1.0)).await;
    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(fx.metrics.samples.lock().unwrap().is_empty());
}

#[tokio::test]
async fn batch_over_cap_is_rejected_without_persisting() {
    let fx = Fixture::new();
    let service = fx.metric_service();

    let inputs: Vec<IngestInput> = (0..=MAX_BATCH_SIZE)
        .map(|i| ingest_input("cpu", i as f64))
        .collect();
    let result = service.ingest_batch(fx.tenant_id, inputs).await;

    assert!(matches!(result, Err(Error::BatchTooLarge { .. })));
    assert!(fx.metrics.samples.lock().unwrap().is_empty());
    assert!(
        fx.gate.bound.lock().unwrap().is_empty(),
        "cap check precedes any store work"
    );
}

#[tokio::test]
async fn batch_persists_all_samples() {
    let fx = Fixture::new();
    let service = fx.metric_service();

    let outcome = service
        .ingest_batch(
            fx.tenant_id,
            vec![
                ingest_input("cpu", 1.0),
                ingest_input("cpu", 2.0),
                ingest_input("mem", 3.0),
            ],
        )
        .await
        .unwrap();

    assert_eq!(outcome.ingested, 3);
    assert_eq!(outcome.failed, 0);
    assert!(outcome.errors.is_empty());
    assert_eq!(fx.metrics.samples.lock().unwrap().len(), 3);
}

#[test]
fn batch_reduction_keeps_last_value_per_name() {
    let tenant_id = Uuid::new_v4();
    let make = |name: &str, value: f64| MetricSample {
        id: Uuid::new_v4(),
        tenant_id,
        name: name.to_string(),
        value,
        labels: HashMap::new(),
        source: None,
        timestamp: Utc::now(),
        created_at: Utc::now(),
    };

    let reduced = reduce_last_seen(&[
        make("cpu", 95.0),
        make("mem", 10.0),
        make("cpu", 50.0),
        make("cpu", 60.0),
    ]);

    assert_eq!(reduced.len(), 2);
    let cpu = reduced.iter().find(|s| s.name == "cpu").unwrap();
    assert_eq!(cpu.value, 60.0, "arrival order, last wins");
}

#[tokio::test]
async fn query_computes_page_from_offset() {
    let fx = Fixture::new();
    let service = fx.metric_service();
    for i in 0..5 {
        service
            .ingest(fx.tenant_id, ingest_input("cpu", i as f64))
            .await
            .unwrap();
    }

    let page = service
        .query(MetricQuery {
            tenant_id: fx.tenant_id,
            name: "cpu".into(),
            limit: 2,
            offset: 4,
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(page.total, 5);
    assert_eq!(page.page, 3);
    assert_eq!(page.limit, 2);
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn latest_returns_not_found_for_other_tenant() {
    let fx = Fixture::new();
    let service = fx.metric_service();
    service
        .ingest(fx.tenant_id, ingest_input("cpu", 100.0))
        .await
        .unwrap();

    let other_tenant = Uuid::new_v4();
    let result = service.get_latest(other_tenant, "cpu", None).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

// ---- definitions ----

#[tokio::test]
async fn definition_create_conflicts_on_duplicate_name() {
    let fx = Fixture::new();
    let service = fx.metric_service();
    let input = CreateDefinitionInput {
        name: "cpu".into(),
        metric_type: MetricType::Gauge,
        aggregation: AggregationType::Avg,
        retention_days: 30,
        ..Default::default()
    };

    service
        .create_definition(fx.tenant_id, input.clone())
        .await
        .unwrap();
    let result = service.create_definition(fx.tenant_id, input).await;

    assert!(matches!(result, Err(Error::Conflict(_))));
}

#[tokio::test]
async fn definition_update_applies_only_provided_fields() {
    let fx = Fixture::new();
    let service = fx.metric_service();
    service
        .create_definition(
            fx.tenant_id,
            CreateDefinitionInput {
                name: "cpu".into(),
                display_name: Some("CPU".into()),
                unit: Some("percent".into()),
                metric_type: MetricType::Gauge,
                aggregation: AggregationType::Avg,
                retention_days: 30,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let updated = service
        .update_definition(
            fx.tenant_id,
            "cpu",
            UpdateDefinitionInput {
                retention_days: Some(90),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.retention_days, 90);
    assert_eq!(updated.display_name.as_deref(), Some("CPU"));
    assert_eq!(updated.unit.as_deref(), Some("percent"));
}

#[tokio::test]
async fn definition_delete_reports_not_found() {
    let fx = Fixture::new();
    let service = fx.metric_service();

    let result = service.delete_definition(fx.tenant_id, "nope").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

// ---- workflows ----

#[tokio::test]
async fn execute_rejects_inactive_workflow() {
    let fx = Fixture::new();
    let engine = Arc::new(FakeEngine::new(false));
    let service = fx.workflow_service(engine.clone());

    let workflow = service
        .create(
            fx.tenant_id,
            None,
            CreateWorkflowInput {
                name: "restart".into(),
                description: None,
                definition: json!({"steps": []}),
                schedule: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(workflow.status, WorkflowStatus::Draft);

    let result = service
        .execute(fx.tenant_id, workflow.id, None, json!({}))
        .await;

    assert!(matches!(result, Err(Error::CannotExecute)));
    assert!(fx.executions.executions.lock().unwrap().is_empty());
    assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn execute_reconciles_engine_identifiers() {
    let fx = Fixture::new();
    let engine = Arc::new(FakeEngine::new(false));
    let service = fx.workflow_service(engine);
    let workflow = fx.active_workflow().await;
    let user_id = Uuid::new_v4();

    let execution = service
        .execute(fx.tenant_id, workflow.id, Some(user_id), json!({"host": "web-01"}))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Running);
    assert_eq!(
        execution.engine_workflow_id.as_deref(),
        Some(format!("workflow-{}-1", workflow.id).as_str())
    );
    assert_eq!(execution.engine_run_id.as_deref(), Some("run-001"));
    assert!(execution.started_at.is_some());
    assert_eq!(
        execution.triggered_by.as_deref(),
        Some(format!("user:{user_id}").as_str())
    );

    let logs = fx.audit_logs.logs.lock().unwrap();
    assert!(logs
        .iter()
        .any(|l| l.event_type == audit::EVENT_WORKFLOW_EXECUTED));
}

#[tokio::test]
async fn execute_engine_failure_persists_failed_execution() {
    let fx = Fixture::new();
    let engine = Arc::new(FakeEngine::new(true));
    let service = fx.workflow_service(engine);
    let workflow = fx.active_workflow().await;

    let result = service
        .execute(fx.tenant_id, workflow.id, None, json!({}))
        .await;

    assert!(matches!(result, Err(Error::Engine(_))));
    let executions = fx.executions.executions.lock().unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0].status, ExecutionStatus::Failed);
    assert!(executions[0]
        .error
        .as_deref()
        .unwrap()
        .starts_with("failed to start workflow:"));

    // The executed event is audited even though the start failed
    let logs = fx.audit_logs.logs.lock().unwrap();
    assert!(logs
        .iter()
        .any(|l| l.event_type == audit::EVENT_WORKFLOW_EXECUTED));
}

#[tokio::test]
async fn update_to_active_requires_steps() {
    let fx = Fixture::new();
    let engine = Arc::new(FakeEngine::new(false));
    let service = fx.workflow_service(engine);

    let workflow = service
        .create(
            fx.tenant_id,
            None,
            CreateWorkflowInput {
                name: "restart".into(),
                description: None,
                definition: json!({"steps": []}),
                schedule: None,
            },
        )
        .await
        .unwrap();

    let result = service
        .update(
            fx.tenant_id,
            workflow.id,
            None,
            UpdateWorkflowInput {
                status: Some(WorkflowStatus::Active),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(Error::Validation(_))));

    let activated = service
        .update(
            fx.tenant_id,
            workflow.id,
            None,
            UpdateWorkflowInput {
                definition: Some(json!({"steps": [{"name": "s", "type": "http"}]})),
                status: Some(WorkflowStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(activated.status, WorkflowStatus::Active);
}

#[tokio::test]
async fn list_executions_reports_full_workflow_total() {
    let fx = Fixture::new();
    let engine = Arc::new(FakeEngine::new(false));
    let service = fx.workflow_service(engine);
    let workflow = fx.active_workflow().await;

    for _ in 0..3 {
        service
            .execute(fx.tenant_id, workflow.id, None, json!({}))
            .await
            .unwrap();
    }

    let page = service
        .list_executions(fx.tenant_id, workflow.id, 1, 2)
        .await
        .unwrap();
    assert_eq!(page.total, 3, "total spans all pages, not the current one");
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, 2);
}

// ---- executions ----

#[tokio::test]
async fn cancel_transitions_and_rejects_terminal() {
    let fx = Fixture::new();
    let engine = Arc::new(FakeEngine::new(false));
    let workflow_service = fx.workflow_service(engine.clone());
    let execution_service = fx.execution_service(engine);
    let workflow = fx.active_workflow().await;

    let execution = workflow_service
        .execute(fx.tenant_id, workflow.id, None, json!({}))
        .await
        .unwrap();

    let cancelled = execution_service
        .cancel(fx.tenant_id, execution.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, ExecutionStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    let result = execution_service.cancel(fx.tenant_id, execution.id).await;
    assert!(matches!(result, Err(Error::CannotCancel)));
}

// ---- alerts ----

async fn seed_alert(fx: &Fixture) -> Alert {
    let alert = Alert {
        id: Uuid::new_v4(),
        tenant_id: fx.tenant_id,
        workflow_id: None,
        execution_id: None,
        severity: AlertSeverity::High,
        title: "disk almost full".into(),
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
    fx.alerts.save(&alert).await.unwrap();
    alert
}

#[tokio::test]
async fn acknowledge_then_resolve_with_audit() {
    let fx = Fixture::new();
    let service = fx.alert_service();
    let alert = seed_alert(&fx).await;
    let user_id = Uuid::new_v4();

    let acknowledged = service
        .acknowledge(fx.tenant_id, alert.id, Some(user_id))
        .await
        .unwrap();
    assert_eq!(acknowledged.status, AlertStatus::Acknowledged);

    let resolved = service
        .resolve(fx.tenant_id, alert.id, Some(user_id))
        .await
        .unwrap();
    assert_eq!(resolved.status, AlertStatus::Resolved);

    let logs = fx.audit_logs.logs.lock().unwrap();
    assert!(logs
        .iter()
        .any(|l| l.event_type == audit::EVENT_ALERT_ACKNOWLEDGED));
    assert!(logs
        .iter()
        .any(|l| l.event_type == audit::EVENT_ALERT_RESOLVED));
}

#[tokio::test]
async fn acknowledge_resolved_alert_fails_without_mutation() {
    let fx = Fixture::new();
    let service = fx.alert_service();
    let alert = seed_alert(&fx).await;

    service.resolve(fx.tenant_id, alert.id, None).await.unwrap();
    let result = service.acknowledge(fx.tenant_id, alert.id, None).await;

    assert!(matches!(result, Err(Error::AlreadyAcknowledged)));
    let stored = fx.alerts.find_by_id(alert.id).await.unwrap();
    assert_eq!(stored.status, AlertStatus::Resolved);
    assert!(stored.acknowledged_at.is_none());
}

// ---- alert rules ----

#[tokio::test]
async fn rule_create_validates_threshold_condition() {
    let fx = Fixture::new();
    let rules: Arc<dyn AlertRuleStore> = Arc::new(MemRuleStore::default());
    let service = fx.rule_service(rules);

    let result = service
        .create(
            fx.tenant_id,
            None,
            CreateAlertRuleInput {
                name: "cpu-high".into(),
                description: None,
                condition_type: "threshold".into(),
                condition_config: json!({"metric_name": "cpu", "operator": "between", "threshold": 1.0}),
                severity: AlertSeverity::Critical,
                alert_title_template: "CPU ${value}%".into(),
                alert_message_template: None,
                trigger_workflow_id: None,
                trigger_input_template: None,
                cooldown_seconds: 60,
            },
        )
        .await;

    assert!(matches!(result, Err(Error::Validation(_))));
}

#[derive(Default)]
struct MemRuleStore {
    rules: Mutex<Vec<AlertRule>>,
}

#[async_trait]
impl AlertRuleStore for MemRuleStore {
    async fn find_by_id(&self, id: Uuid) -> Result<AlertRule> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(Error::NotFound("alert rule"))
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        _limit: u64,
        _offset: u64,
    ) -> Result<Vec<AlertRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn find_enabled_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<AlertRule>> {
        Ok(self
            .rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.tenant_id == tenant_id && r.enabled)
            .cloned()
            .collect())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(self.find_by_tenant(tenant_id, 0, 0).await?.len() as u64)
    }

    async fn save(&self, rule: &AlertRule) -> Result<()> {
        self.rules.lock().unwrap().push(rule.clone());
        Ok(())
    }

    async fn update(&self, rule: &AlertRule) -> Result<()> {
        let mut rules = self.rules.lock().unwrap();
        let slot = rules
            .iter_mut()
            .find(|r| r.id == rule.id)
            .ok_or(Error::NotFound("alert rule"))?;
        *slot = rule.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.rules.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn update_last_triggered(&self, id: Uuid) -> Result<()> {
        let mut rules = self.rules.lock().unwrap();
        if let Some(rule) = rules.iter_mut().find(|r| r.id == id) {
            rule.last_triggered_at = Some(Utc::now());
        }
        Ok(())
    }
}
