use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::ServerConfig;
use crate::service::{
    AlertRuleService, AlertService, AuditService, ExecutionService, MetricService, WorkflowService,
};

#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricService>,
    pub workflows: Arc<WorkflowService>,
    pub executions: Arc<ExecutionService>,
    pub alerts: Arc<AlertService>,
    pub alert_rules: Arc<AlertRuleService>,
    pub audit: Arc<AuditService>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}
