use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use orchestrix_common::audit::{self, AuditLog};
use orchestrix_common::execution::{Execution, ExecutionStatus};
use orchestrix_common::workflow::{Workflow, WorkflowStatus};
use orchestrix_common::{Error, Result};
use orchestrix_engine::EngineClient;
use orchestrix_storage::{ExecutionStore, TenantGate, WorkflowStore};

use crate::service::{page_offset, AuditService, Page};

#[derive(Debug, Clone)]
pub struct CreateWorkflowInput {
    pub name: String,
    pub description: Option<String>,
    pub definition: Value,
    pub schedule: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateWorkflowInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub definition: Option<Value>,
    pub schedule: Option<String>,
    pub status: Option<WorkflowStatus>,
}

pub struct WorkflowService {
    workflows: Arc<dyn WorkflowStore>,
    executions: Arc<dyn ExecutionStore>,
    engine: Arc<dyn EngineClient>,
    audit: Arc<AuditService>,
    gate: Arc<dyn TenantGate>,
    dynamic_entrypoint: String,
    static_entrypoint: String,
}

impl WorkflowService {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        executions: Arc<dyn ExecutionStore>,
        engine: Arc<dyn EngineClient>,
        audit: Arc<AuditService>,
        gate: Arc<dyn TenantGate>,
        dynamic_entrypoint: &str,
        static_entrypoint: &str,
    ) -> Self {
        Self {
            workflows,
            executions,
            engine,
            audit,
            gate,
            dynamic_entrypoint: dynamic_entrypoint.to_string(),
            static_entrypoint: static_entrypoint.to_string(),
        }
    }

    pub async fn list(&self, tenant_id: Uuid, page: u64, limit: u64) -> Result<Page<Workflow>> {
        self.gate.bind(tenant_id).await?;
        let offset = page_offset(page, limit);
        let items = self
            .workflows
            .find_by_tenant(tenant_id, limit, offset)
            .await?;
        let total = self.workflows.count_by_tenant(tenant_id).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Workflow> {
        self.gate.bind(tenant_id).await?;
        self.workflows.find_by_id(id).await
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        input: CreateWorkflowInput,
    ) -> Result<Workflow> {
        if input.name.is_empty() {
            return Err(Error::Validation("workflow name is required".into()));
        }
        self.gate.bind(tenant_id).await?;

        let now = Utc::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id,
            name: input.name,
            description: input.description,
            definition: input.definition,
            schedule: input.schedule,
            status: WorkflowStatus::Draft,
            version: 1,
            created_by: user_id,
            created_at: now,
            updated_at: now,
        };
        self.workflows.save(&workflow).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_WORKFLOW_CREATED,
                    audit::RESOURCE_WORKFLOW,
                    Some(workflow.id),
                    audit::ACTION_CREATE,
                )
                .with_new_value(&workflow),
            )
            .await;

        Ok(workflow)
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        user_id: Option<Uuid>,
        input: UpdateWorkflowInput,
    ) -> Result<Workflow> {
        self.gate.bind(tenant_id).await?;

        let mut workflow = self.workflows.find_by_id(id).await?;
        let old_workflow = workflow.clone();

        if let Some(name) = input.name {
            workflow.name = name;
        }
        if input.description.is_some() {
            workflow.description = input.description;
        }
        if let Some(definition) = input.definition {
            workflow.definition = definition;
        }
        if input.schedule.is_some() {
            workflow.schedule = input.schedule;
        }
        if let Some(status) = input.status {
            match status {
                WorkflowStatus::Active => workflow.activate()?,
                WorkflowStatus::Inactive => workflow.deactivate(),
                WorkflowStatus::Draft => workflow.status = WorkflowStatus::Draft,
            }
        }
        workflow.updated_at = Utc::now();

        self.workflows.update(&workflow).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_WORKFLOW_UPDATED,
                    audit::RESOURCE_WORKFLOW,
                    Some(workflow.id),
                    audit::ACTION_UPDATE,
                )
                .with_old_value(&old_workflow)
                .with_new_value(&workflow),
            )
            .await;

        Ok(workflow)
    }

    pub async fn delete(&self, tenant_id: Uuid, id: Uuid, user_id: Option<Uuid>) -> Result<()> {
        self.gate.bind(tenant_id).await?;

        let workflow = self.workflows.find_by_id(id).await?;
        self.workflows.delete(id).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_WORKFLOW_DELETED,
                    audit::RESOURCE_WORKFLOW,
                    Some(id),
                    audit::ACTION_DELETE,
                )
                .with_old_value(&workflow),
            )
            .await;

        Ok(())
    }

    /// Starts an execution on the engine. Only `active` workflows run; on
    /// engine failure the execution is persisted as failed and the error
    /// surfaces to the caller.
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        user_id: Option<Uuid>,
        input: Value,
    ) -> Result<Execution> {
        self.gate.bind(tenant_id).await?;

        let workflow = self.workflows.find_by_id(id).await?;
        if !workflow.can_execute() {
            return Err(Error::CannotExecute);
        }

        let engine_workflow_id = format!("workflow-{}-{}", workflow.id, workflow.version);
        let triggered_by = user_id
            .map(|u| format!("user:{u}"))
            .unwrap_or_else(|| "user:api".to_string());

        let mut execution = Execution {
            id: Uuid::new_v4(),
            tenant_id,
            workflow_id: workflow.id,
            engine_workflow_id: Some(engine_workflow_id.clone()),
            engine_run_id: None,
            status: ExecutionStatus::Pending,
            input: input.clone(),
            output: None,
            error: None,
            started_at: None,
            completed_at: None,
            triggered_by: Some(triggered_by),
            created_by: user_id,
            created_at: Utc::now(),
        };
        self.executions.save(&execution).await?;

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

        let start_result = self
            .engine
            .execute(&engine_workflow_id, entrypoint, payload)
            .await;
        match &start_result {
            Ok(run) => {
                execution.engine_workflow_id = Some(run.engine_workflow_id.clone());
                execution.engine_run_id = Some(run.engine_run_id.clone());
                execution.mark_running();
            }
            Err(e) => {
                execution.mark_failed(format!("failed to start workflow: {e}"));
            }
        }
        self.executions.update(&execution).await?;

        // Executed events are recorded whether or not the start succeeded
        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_WORKFLOW_EXECUTED,
                    audit::RESOURCE_WORKFLOW,
                    Some(workflow.id),
                    audit::ACTION_EXECUTE,
                )
                .with_new_value(&execution),
            )
            .await;

        start_result?;
        Ok(execution)
    }

    pub async fn list_executions(
        &self,
        tenant_id: Uuid,
        workflow_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<Page<Execution>> {
        self.gate.bind(tenant_id).await?;
        let offset = page_offset(page, limit);
        let items = self
            .executions
            .find_by_workflow(workflow_id, limit, offset)
            .await?;
        let total = self.executions.count_by_workflow(workflow_id).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }
}
