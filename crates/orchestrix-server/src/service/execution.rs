use std::sync::Arc;

use uuid::Uuid;

use orchestrix_common::execution::Execution;
use orchestrix_common::{Error, Result};
use orchestrix_engine::EngineClient;
use orchestrix_storage::{ExecutionStore, TenantGate};

use crate::service::{page_offset, Page};

pub struct ExecutionService {
    executions: Arc<dyn ExecutionStore>,
    engine: Arc<dyn EngineClient>,
    gate: Arc<dyn TenantGate>,
}

impl ExecutionService {
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        engine: Arc<dyn EngineClient>,
        gate: Arc<dyn TenantGate>,
    ) -> Self {
        Self {
            executions,
            engine,
            gate,
        }
    }

    pub async fn list(&self, tenant_id: Uuid, page: u64, limit: u64) -> Result<Page<Execution>> {
        self.gate.bind(tenant_id).await?;
        let offset = page_offset(page, limit);
        let items = self
            .executions
            .find_by_tenant(tenant_id, limit, offset)
            .await?;
        let total = self.executions.count_by_tenant(tenant_id).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Execution> {
        self.gate.bind(tenant_id).await?;
        self.executions.find_by_id(id).await
    }

    /// Cancels a pending or running execution, requesting engine-side
    /// cancellation when a run was started.
    pub async fn cancel(&self, tenant_id: Uuid, id: Uuid) -> Result<Execution> {
        self.gate.bind(tenant_id).await?;

        let mut execution = self.executions.find_by_id(id).await?;
        if !execution.can_cancel() {
            return Err(Error::CannotCancel);
        }

        if let Some(engine_workflow_id) = &execution.engine_workflow_id {
            self.engine.cancel(engine_workflow_id).await?;
        }

        execution.mark_cancelled();
        self.executions.update(&execution).await?;
        Ok(execution)
    }
}
