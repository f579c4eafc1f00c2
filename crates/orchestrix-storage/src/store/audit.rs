use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use orchestrix_common::audit::AuditLog;
use orchestrix_common::{Error, Result};

use crate::entities::audit_log::{self, Column, Entity};
use crate::store::{store_err, PgStore};
use crate::AuditStore;

fn to_domain(m: audit_log::Model) -> AuditLog {
    AuditLog {
        id: m.id,
        tenant_id: m.tenant_id,
        user_id: m.user_id,
        event_type: m.event_type,
        resource_type: m.resource_type,
        resource_id: m.resource_id,
        action: m.action,
        old_value: m.old_value,
        new_value: m.new_value,
        ip_address: m.ip_address,
        user_agent: m.user_agent,
        created_at: m.created_at.with_timezone(&Utc),
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<AuditLog> {
        let model = Entity::find_by_id(id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("audit log"))?;
        Ok(to_domain(model))
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AuditLog>> {
        let models = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await.map_err(store_err)?;
        Ok(models.into_iter().map(to_domain).collect())
    }

    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64> {
        Ok(Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .count(self.db())
            .await.map_err(store_err)?)
    }

    async fn save(&self, log: &AuditLog) -> Result<()> {
        let am = audit_log::ActiveModel {
            id: Set(log.id),
            tenant_id: Set(log.tenant_id),
            user_id: Set(log.user_id),
            event_type: Set(log.event_type.clone()),
            resource_type: Set(log.resource_type.clone()),
            resource_id: Set(log.resource_id),
            action: Set(log.action.clone()),
            old_value: Set(log.old_value.clone()),
            new_value: Set(log.new_value.clone()),
            ip_address: Set(log.ip_address.clone()),
            user_agent: Set(log.user_agent.clone()),
            created_at: Set(log.created_at.fixed_offset()),
        };
        Entity::insert(am).exec(self.db()).await.map_err(store_err)?;
        Ok(())
    }
}
