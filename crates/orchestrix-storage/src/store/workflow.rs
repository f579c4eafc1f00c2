use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use orchestrix_common::workflow::Workflow;
use orchestrix_common::{Error, Result};

use crate::entities::workflow::{self, Column, Entity};
use crate::store::{store_err, PgStore};
use crate::WorkflowStore;

fn to_domain(m: workflow::Model) -> Result<Workflow> {
    Ok(Workflow {
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        description: m.description,
        definition: m.definition,
        schedule: m.schedule,
        status: m.status.parse().map_err(Error::Internal)?,
        version: m.version,
        created_by: m.created_by,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn to_active_model(w: &Workflow) -> workflow::ActiveModel {
    workflow::ActiveModel {
        id: Set(w.id),
        tenant_id: Set(w.tenant_id),
        name: Set(w.name.clone()),
        description: Set(w.description.clone()),
        definition: Set(w.definition.clone()),
        schedule: Set(w.schedule.clone()),
        status: Set(w.status.to_string()),
        version: Set(w.version),
        created_by: Set(w.created_by),
        created_at: Set(w.created_at.fixed_offset()),
        updated_at: Set(w.updated_at.fixed_offset()),
    }
}

#[async_trait]
impl WorkflowStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Workflow> {
        let model = Entity::find_by_id(id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("workflow"))?;
        to_domain(model)
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Workflow>> {
        let models = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
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

    async fn save(&self, workflow: &Workflow) -> Result<()> {
        Entity::insert(to_active_model(workflow))
            .exec(self.db())
            .await.map_err(store_err)?;
        Ok(())
    }

    async fn update(&self, workflow: &Workflow) -> Result<()> {
        let model = Entity::find_by_id(workflow.id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("workflow"))?;
        let mut am = to_active_model(workflow);
        am.created_at = Set(model.created_at);
        sea_orm::ActiveModelTrait::update(am, self.db()).await.map_err(store_err)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let res = Entity::delete_by_id(id).exec(self.db()).await.map_err(store_err)?;
        if res.rows_affected == 0 {
            return Err(Error::NotFound("workflow"));
        }
        Ok(())
    }
}
