use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use orchestrix_common::execution::Execution;
use orchestrix_common::{Error, Result};

use crate::entities::execution::{self, Column, Entity};
use crate::store::{store_err, PgStore};
use crate::ExecutionStore;

fn to_domain(m: execution::Model) -> Result<Execution> {
    Ok(Execution {
        id: m.id,
        tenant_id: m.tenant_id,
        workflow_id: m.workflow_id,
        engine_workflow_id: m.engine_workflow_id,
        engine_run_id: m.engine_run_id,
        status: m.status.parse().map_err(Error::Internal)?,
        input: m.input,
        output: m.output,
        error: m.error,
        started_at: m.started_at.map(|t| t.with_timezone(&Utc)),
        completed_at: m.completed_at.map(|t| t.with_timezone(&Utc)),
        triggered_by: m.triggered_by,
        created_by: m.created_by,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

fn to_active_model(e: &Execution) -> execution::ActiveModel {
    execution::ActiveModel {
        id: Set(e.id),
        tenant_id: Set(e.tenant_id),
        workflow_id: Set(e.workflow_id),
        engine_workflow_id: Set(e.engine_workflow_id.clone()),
        engine_run_id: Set(e.engine_run_id.clone()),
        status: Set(e.status.to_string()),
        input: Set(e.input.clone()),
        output: Set(e.output.clone()),
        error: Set(e.error.clone()),
        started_at: Set(e.started_at.map(|t| t.fixed_offset())),
        completed_at: Set(e.completed_at.map(|t| t.fixed_offset())),
        triggered_by: Set(e.triggered_by.clone()),
        created_by: Set(e.created_by),
        created_at: Set(e.created_at.fixed_offset()),
    }
}

#[async_trait]
impl ExecutionStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Execution> {
        let model = Entity::find_by_id(id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("execution"))?;
        to_domain(model)
    }

    async fn find_by_engine_workflow_id(
        &self,
        tenant_id: Uuid,
        engine_workflow_id: &str,
    ) -> Result<Option<Execution>> {
        let model = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::EngineWorkflowId.eq(engine_workflow_id))
            .one(self.db())
            .await.map_err(store_err)?;
        model.map(to_domain).transpose()
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Execution>> {
        let models = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await.map_err(store_err)?;
        models.into_iter().map(to_domain).collect()
    }

    async fn find_by_workflow(
        &self,
        workflow_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Execution>> {
        let models = Entity::find()
            .filter(Column::WorkflowId.eq(workflow_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await.map_err(store_err)?;
        models.into_iter().map(to_domain).collect()
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .count(self.db())
            .await.map_err(store_err)?)
    }

    async fn count_by_workflow(&self, workflow_id: Uuid) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::WorkflowId.eq(workflow_id))
            .count(self.db())
            .await.map_err(store_err)?)
    }

    async fn save(&self, execution: &Execution) -> Result<()> {
        Entity::insert(to_active_model(execution))
            .exec(self.db())
            .await.map_err(store_err)?;
        Ok(())
    }

    async fn update(&self, execution: &Execution) -> Result<()> {
        let model = Entity::find_by_id(execution.id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("execution"))?;
        let mut am = to_active_model(execution);
        am.created_at = Set(model.created_at);
        sea_orm::ActiveModelTrait::update(am, self.db()).await.map_err(store_err)?;
        Ok(())
    }
}
