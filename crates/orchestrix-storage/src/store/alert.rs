use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use orchestrix_common::alert::Alert;
use orchestrix_common::{Error, Result};

use crate::entities::alert::{self, Column, Entity};
use crate::store::{store_err, PgStore};
use crate::AlertStore;

fn to_domain(m: alert::Model) -> Result<Alert> {
    Ok(Alert {
        id: m.id,
        tenant_id: m.tenant_id,
        workflow_id: m.workflow_id,
        execution_id: m.execution_id,
        severity: m.severity.parse().map_err(Error::Internal)?,
        title: m.title,
        message: m.message,
        status: m.status.parse().map_err(Error::Internal)?,
        acknowledged_at: m.acknowledged_at.map(|t| t.with_timezone(&Utc)),
        acknowledged_by: m.acknowledged_by,
        resolved_at: m.resolved_at.map(|t| t.with_timezone(&Utc)),
        resolved_by: m.resolved_by,
        triggered_by_rule_id: m.triggered_by_rule_id,
        triggered_workflow_execution_id: m.triggered_workflow_execution_id,
        source: m.source,
        metadata: m.metadata,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

fn to_active_model(a: &Alert) -> alert::ActiveModel {
    alert::ActiveModel {
        id: Set(a.id),
        tenant_id: Set(a.tenant_id),
        workflow_id: Set(a.workflow_id),
        execution_id: Set(a.execution_id),
        severity: Set(a.severity.to_string()),
        title: Set(a.title.clone()),
        message: Set(a.message.clone()),
        status: Set(a.status.to_string()),
        acknowledged_at: Set(a.acknowledged_at.map(|t| t.fixed_offset())),
        acknowledged_by: Set(a.acknowledged_by),
        resolved_at: Set(a.resolved_at.map(|t| t.fixed_offset())),
        resolved_by: Set(a.resolved_by),
        triggered_by_rule_id: Set(a.triggered_by_rule_id),
        triggered_workflow_execution_id: Set(a.triggered_workflow_execution_id),
        source: Set(a.source.clone()),
        metadata: Set(a.metadata.clone()),
        created_at: Set(a.created_at.fixed_offset()),
    }
}

#[async_trait]
impl AlertStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Alert> {
        let model = Entity::find_by_id(id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("alert"))?;
        to_domain(model)
    }

    async fn find_by_tenant(&self, tenant_id: Uuid, limit: u64, offset: u64) -> Result<Vec<Alert>> {
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

    async fn save(&self, alert: &Alert) -> Result<()> {
        Entity::insert(to_active_model(alert))
            .exec(self.db())
            .await.map_err(store_err)?;
        Ok(())
    }

    async fn update(&self, alert: &Alert) -> Result<()> {
        let model = Entity::find_by_id(alert.id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("alert"))?;
        let mut am = to_active_model(alert);
        am.created_at = Set(model.created_at);
        sea_orm::ActiveModelTrait::update(am, self.db()).await.map_err(store_err)?;
        Ok(())
    }
}
