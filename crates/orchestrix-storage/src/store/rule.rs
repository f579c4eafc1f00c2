use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ColumnTrait, EntityTrait, Order, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use orchestrix_common::rule::AlertRule;
use orchestrix_common::{Error, Result};

use crate::entities::alert_rule::{self, Column, Entity};
use crate::store::{store_err, PgStore};
use crate::AlertRuleStore;

fn to_domain(m: alert_rule::Model) -> Result<AlertRule> {
    Ok(AlertRule {
        id: m.id,
        tenant_id: m.tenant_id,
        name: m.name,
        description: m.description,
        enabled: m.enabled,
        condition_type: m.condition_type,
        condition_config: m.condition_config,
        severity: m.severity.parse().map_err(Error::Internal)?,
        alert_title_template: m.alert_title_template,
        alert_message_template: m.alert_message_template,
        trigger_workflow_id: m.trigger_workflow_id,
        trigger_input_template: m.trigger_input_template,
        cooldown_seconds: m.cooldown_seconds,
        last_triggered_at: m.last_triggered_at.map(|t| t.with_timezone(&Utc)),
        created_by: m.created_by,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

fn to_active_model(rule: &AlertRule) -> alert_rule::ActiveModel {
    alert_rule::ActiveModel {
        id: Set(rule.id),
        tenant_id: Set(rule.tenant_id),
        name: Set(rule.name.clone()),
        description: Set(rule.description.clone()),
        enabled: Set(rule.enabled),
        condition_type: Set(rule.condition_type.clone()),
        condition_config: Set(rule.condition_config.clone()),
        severity: Set(rule.severity.to_string()),
        alert_title_template: Set(rule.alert_title_template.clone()),
        alert_message_template: Set(rule.alert_message_template.clone()),
        trigger_workflow_id: Set(rule.trigger_workflow_id),
        trigger_input_template: Set(rule.trigger_input_template.clone()),
        cooldown_seconds: Set(rule.cooldown_seconds),
        last_triggered_at: Set(rule.last_triggered_at.map(|t| t.fixed_offset())),
        created_by: Set(rule.created_by),
        created_at: Set(rule.created_at.fixed_offset()),
        updated_at: Set(rule.updated_at.fixed_offset()),
    }
}

#[async_trait]
impl AlertRuleStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<AlertRule> {
        let model = Entity::find_by_id(id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("alert rule"))?;
        to_domain(model)
    }

    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AlertRule>> {
        let models = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .order_by(Column::CreatedAt, Order::Desc)
            .limit(limit)
            .offset(offset)
            .all(self.db())
            .await.map_err(store_err)?;
        models.into_iter().map(to_domain).collect()
    }

    async fn find_enabled_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<AlertRule>> {
        let models = Entity::find()
            .filter(Column::TenantId.eq(tenant_id))
            .filter(Column::Enabled.eq(true))
            .order_by(Column::CreatedAt, Order::Asc)
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

    async fn save(&self, rule: &AlertRule) -> Result<()> {
        Entity::insert(to_active_model(rule)).exec(self.db()).await.map_err(store_err)?;
        Ok(())
    }

    async fn update(&self, rule: &AlertRule) -> Result<()> {
        let model = Entity::find_by_id(rule.id)
            .one(self.db())
            .await.map_err(store_err)?
            .ok_or(Error::NotFound("alert rule"))?;
        let mut am = to_active_model(rule);
        am.created_at = Set(model.created_at);
        // last_triggered_at is owned by update_last_triggered
        am.last_triggered_at = Set(model.last_triggered_at);
        sea_orm::ActiveModelTrait::update(am, self.db()).await.map_err(store_err)?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let res = Entity::delete_by_id(id).exec(self.db()).await.map_err(store_err)?;
        if res.rows_affected == 0 {
            return Err(Error::NotFound("alert rule"));
        }
        Ok(())
    }

    async fn update_last_triggered(&self, id: Uuid) -> Result<()> {
        Entity::update_many()
            .col_expr(Column::LastTriggeredAt, Expr::current_timestamp().into())
            .filter(Column::Id.eq(id))
            .exec(self.db())
            .await.map_err(store_err)?;
        Ok(())
    }
}
