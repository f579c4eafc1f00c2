use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use orchestrix_common::alert::{Alert, AlertStatus};
use orchestrix_common::audit::{self, AuditLog};
use orchestrix_common::metric::MetricSample;
use orchestrix_common::rule::{AlertRule, AlertSeverity};
use orchestrix_common::{Error, Result};
use orchestrix_storage::{AlertRuleStore, AlertStore, AuditStore};

use crate::evaluate::AlertRuleEvaluator;
use crate::template;
use crate::WorkflowBridge;

// ---- in-memory stores ----

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

struct RecordingBridge {
    calls: AtomicUsize,
    fail_with_mismatch: bool,
}

impl RecordingBridge {
    fn new(fail_with_mismatch: bool) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_with_mismatch,
        }
    }
}

#[async_trait]
impl WorkflowBridge for RecordingBridge {
    async fn trigger(
        &self,
        _tenant_id: Uuid,
        _rule: &AlertRule,
        _alert: &Alert,
        _sample: &MetricSample,
        _context: &Map<String, Value>,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_with_mismatch {
            Err(Error::TenantMismatch)
        } else {
            Ok(())
        }
    }
}

// ---- helpers ----

struct Fixture {
    tenant_id: Uuid,
    rules: Arc<MemRuleStore>,
    alerts: Arc<MemAlertStore>,
    audit: Arc<MemAuditStore>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            rules: Arc::new(MemRuleStore::default()),
            alerts: Arc::new(MemAlertStore::default()),
            audit: Arc::new(MemAuditStore::default()),
        }
    }

    fn evaluator(&self, bridge: Option<Arc<dyn WorkflowBridge>>) -> AlertRuleEvaluator {
        AlertRuleEvaluator::new(
            self.rules.clone(),
            self.alerts.clone(),
            self.audit.clone(),
            bridge,
        )
    }

    async fn add_rule(&self, rule: AlertRule) {
        self.rules.save(&rule).await.unwrap();
    }

    fn alerts_for_tenant(&self) -> Vec<Alert> {
        self.alerts
            .alerts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.tenant_id == self.tenant_id)
            .cloned()
            .collect()
    }
}

fn make_rule(tenant_id: Uuid, cooldown_seconds: i32) -> AlertRule {
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
        alert_message_template: Some("${metric_name} on ${source} crossed ${threshold}".into()),
        trigger_workflow_id: None,
        trigger_input_template: None,
        cooldown_seconds,
        last_triggered_at: None,
        created_by: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn make_sample(tenant_id: Uuid, name: &str, value: f64) -> MetricSample {
    MetricSample {
        id: Uuid::new_v4(),
        tenant_id,
        name: name.to_string(),
        value,
        labels: HashMap::from([("host".to_string(), "web-01".to_string())]),
        source: Some("node-agent".into()),
        timestamp: Utc::now(),
        created_at: Utc::now(),
    }
}

// ---- evaluator ----

#[tokio::test]
async fn threshold_fires_once_under_cooldown() {
    let fx = Fixture::new();
    fx.add_rule(make_rule(fx.tenant_id, 60)).await;
    let evaluator = fx.evaluator(None);

    evaluator
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 95.0))
        .await
        .unwrap();
    evaluator
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 96.0))
        .await
        .unwrap();

    let alerts = fx.alerts_for_tenant();
    assert_eq!(alerts.len(), 1, "cooldown must suppress the second firing");
    assert_eq!(alerts[0].title, "CPU 95%");
    assert!(fx.rules.rules.lock().unwrap()[0].last_triggered_at.is_some());
}

#[tokio::test]
async fn threshold_fires_again_after_cooldown() {
    let fx = Fixture::new();
    let mut rule = make_rule(fx.tenant_id, 60);
    rule.last_triggered_at = Some(Utc::now() - Duration::seconds(70));
    fx.add_rule(rule).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 91.0))
        .await
        .unwrap();

    let alerts = fx.alerts_for_tenant();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].title, "CPU 91%");
}

#[tokio::test]
async fn below_threshold_does_not_fire() {
    let fx = Fixture::new();
    fx.add_rule(make_rule(fx.tenant_id, 60)).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 50.0))
        .await
        .unwrap();

    assert!(fx.alerts_for_tenant().is_empty());
}

#[tokio::test]
async fn nan_value_never_fires() {
    let fx = Fixture::new();
    fx.add_rule(make_rule(fx.tenant_id, 60)).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", f64::NAN))
        .await
        .unwrap();

    assert!(fx.alerts_for_tenant().is_empty());
}

#[tokio::test]
async fn other_metric_name_is_ignored() {
    let fx = Fixture::new();
    fx.add_rule(make_rule(fx.tenant_id, 60)).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "memory", 95.0))
        .await
        .unwrap();

    assert!(fx.alerts_for_tenant().is_empty());
}

#[tokio::test]
async fn unknown_operator_skips_rule_without_failing() {
    let fx = Fixture::new();
    let mut broken = make_rule(fx.tenant_id, 60);
    broken.condition_config = json!({
        "metric_name": "cpu",
        "operator": "between",
        "threshold": 90.0
    });
    fx.add_rule(broken).await;
    fx.add_rule(make_rule(fx.tenant_id, 60)).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 95.0))
        .await
        .unwrap();

    assert_eq!(fx.alerts_for_tenant().len(), 1, "valid rule still fires");
}

#[tokio::test]
async fn non_threshold_rule_is_skipped() {
    let fx = Fixture::new();
    let mut rule = make_rule(fx.tenant_id, 60);
    rule.condition_type = "anomaly".into();
    fx.add_rule(rule).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 95.0))
        .await
        .unwrap();

    assert!(fx.alerts_for_tenant().is_empty());
}

#[tokio::test]
async fn broken_title_template_falls_back_to_raw() {
    let fx = Fixture::new();
    let mut rule = make_rule(fx.tenant_id, 60);
    rule.alert_title_template = "CPU ${value".into();
    fx.add_rule(rule).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 95.0))
        .await
        .unwrap();

    let alerts = fx.alerts_for_tenant();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].title, "CPU ${value");
}

#[tokio::test]
async fn alert_carries_rule_severity_and_metadata() {
    let fx = Fixture::new();
    let rule = make_rule(fx.tenant_id, 60);
    let rule_id = rule.id;
    fx.add_rule(rule).await;

    fx.evaluator(None)
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 95.0))
        .await
        .unwrap();

    let alerts = fx.alerts_for_tenant();
    assert_eq!(alerts[0].severity, AlertSeverity::Critical);
    assert_eq!(alerts[0].status, AlertStatus::Triggered);
    assert_eq!(alerts[0].triggered_by_rule_id, Some(rule_id));
    assert_eq!(alerts[0].metadata["rule_name"], json!("cpu-high"));
    assert_eq!(alerts[0].metadata["metric"]["value"], json!(95.0));
    assert_eq!(
        alerts[0].message.as_deref(),
        Some("cpu on node-agent crossed 90")
    );
}

#[tokio::test]
async fn bridge_invoked_only_with_trigger_workflow() {
    let fx = Fixture::new();
    fx.add_rule(make_rule(fx.tenant_id, 60)).await;
    let mut with_workflow = make_rule(fx.tenant_id, 60);
    with_workflow.trigger_workflow_id = Some(Uuid::new_v4());
    fx.add_rule(with_workflow).await;

    let bridge = Arc::new(RecordingBridge::new(false));
    fx.evaluator(Some(bridge.clone()))
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 95.0))
        .await
        .unwrap();

    assert_eq!(fx.alerts_for_tenant().len(), 2);
    assert_eq!(bridge.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn tenant_mismatch_records_audit_entry() {
    let fx = Fixture::new();
    let mut rule = make_rule(fx.tenant_id, 60);
    rule.trigger_workflow_id = Some(Uuid::new_v4());
    fx.add_rule(rule).await;

    let bridge = Arc::new(RecordingBridge::new(true));
    fx.evaluator(Some(bridge))
        .evaluate(fx.tenant_id, &make_sample(fx.tenant_id, "cpu", 95.0))
        .await
        .unwrap();

    // Alert still exists even though the workflow hand-off was rejected
    assert_eq!(fx.alerts_for_tenant().len(), 1);
    let logs = fx.audit.logs.lock().unwrap();
    assert!(logs
        .iter()
        .any(|l| l.event_type == audit::EVENT_TENANT_MISMATCH));
}

// ---- template grammar ----

fn ctx(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn empty_template_renders_empty() {
    assert_eq!(template::render("", &Map::new()).unwrap(), "");
}

#[test]
fn template_without_placeholders_is_unchanged() {
    let raw = "disk usage is fine";
    assert_eq!(template::render(raw, &Map::new()).unwrap(), raw);
}

#[test]
fn placeholders_substitute_from_context() {
    let context = ctx(&[
        ("metric_name", json!("cpu")),
        ("value", json!(97.25)),
        ("threshold", json!(90.0)),
    ]);
    assert_eq!(
        template::render("${metric_name} at ${value} (limit ${threshold})", &context).unwrap(),
        "cpu at 97.25 (limit 90)"
    );
}

#[test]
fn absent_keys_render_empty() {
    assert_eq!(
        template::render("v=${missing}!", &Map::new()).unwrap(),
        "v=!"
    );
}

#[test]
fn dollar_escape_and_literal_dollar() {
    let context = ctx(&[("value", json!(5))]);
    assert_eq!(
        template::render("$$${value} costs $5", &context).unwrap(),
        "$5 costs $5"
    );
}

#[test]
fn unterminated_placeholder_is_error() {
    assert!(template::render("CPU ${value", &Map::new()).is_err());
}

#[test]
fn render_value_walks_string_leaves() {
    let context = ctx(&[("alert_id", json!("a-1")), ("value", json!(95.0))]);
    let input = json!({
        "target": "${alert_id}",
        "limits": {"cpu": "${value}"},
        "steps": ["${alert_id}", 42],
        "retries": 3
    });
    let rendered = template::render_value(&input, &context).unwrap();
    assert_eq!(
        rendered,
        json!({
            "target": "a-1",
            "limits": {"cpu": "95"},
            "steps": ["a-1", 42],
            "retries": 3
        })
    );
}

#[test]
fn render_value_fails_closed_on_bad_template() {
    let input = json!({"target": "${alert_id"});
    assert!(template::render_value(&input, &Map::new()).is_err());
}
