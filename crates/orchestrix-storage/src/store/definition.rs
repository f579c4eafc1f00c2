use async_trait::async_trait;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use orchestrix_common::metric::MetricDefinition;
use orchestrix_common::{Error, Result};

use crate::entities::metric_definition::{self, Column, Entity};
use crate::store::{store_err, PgStore};
use crate::DefinitionStore;

fn to_domain(m: metric_definition::Model) -> Result<MetricDefinition> {
    let alert_threshold = match m.alert_threshold {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| Error::Internal(format!("invalid alert threshold: {e}")))?,
        None => None,
    };
    Ok(MetricDefinition {
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        display_name: m.display_name,
        description: m.description,
        unit: m.unit,
        metric_type: m.metric_type.parse().map_err(Error::Internal)?,
        aggregation: m.aggregation.parse().map_err(Error::Internal)?,
        alert_threshold,
        retention_days: m.retention_days,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn to_active_model(def: &MetricDefinition) -> Result<metric_definition::ActiveModel> {
    let alert_threshold = match &def.alert_threshold {
        Some(threshold) => Some(
            serde_json::to_value(threshold)
                .map_err(|e| Error::Internal(format!("serialize alert threshold: {e}")))?,
        ),
        None => None,
    };
    Ok(metric_definition::ActiveModel {
        id: Set(def.id),
        tenant_id: Set(def.tenant_id),
        name: Set(def.name.clone()),
        display_name: Set(def.display_name.clone()),
        description: Set(def.description.clone()),
        unit: Set(def.unit.clone()),
        metric_type: Set(def.metric_type.to_string()),
        aggregation: Set(def.aggregation.to_string()),
        alert_threshold: Set(alert_threshold),
        retention_days: Set(def.retention_days),
        created_at: Set(def.created_at.fixed_offset()),
        updated_at: Set(def.updated_at.fixed_offset()),
    })
}

#[async_trait]
impl DefinitionStore for PgStore {
    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> Result<MetricDefinition> {
        let model = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Name.eq(name))
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("metric definition"))?;
        to_domain(model)
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<MetricDefinition>> {
        let models = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by(Column::Name, Order::Asc)
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

    async fn save(&self, definition: &MetricDefinition) -> Result<()> {
        let existing = Entity::find()
            .filter(Column::TenantId.eq(definition.tenant_id))
            .filter(Column::Name.eq(definition.name.clone()))
            .one(self.db())
            .await.map_err(store_err)?;
        if existing.is_some() {
            return Err(Error::Conflict(format!(
                "metric definition '{}' already exists",
                definition.name
            )));
        }
        Entity::insert(to_active_model(definition)?)
            .exec(self.db())
            .await.map_err(store_err)?;
        Ok(())
    }

    async fn update(&self, definition: &MetricDefinition) -> Result<()> {
        let model = Entity::find_by_id(definition.id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("metric definition"))?;
        let mut am = to_active_model(definition)?;
        am.id = Set(model.id);
        am.created_at = Set(model.created_at);
        sea_orm::ActiveModelTrait::update(am, self.db()).await.map_err(store_err)?;
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, name: &str) -> Result<()> {
        let res = Entity::delete_many()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Name.eq(name))
            .exec(self.db())
            .await.map_err(store_err)?;
        if res.rows_affected == 0 {
            return Err(Error::NotFound("metric definition"));
        }
        Ok(())
    }
}
