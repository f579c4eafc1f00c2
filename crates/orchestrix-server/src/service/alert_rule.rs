use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use orchestrix_common::audit::{self, AuditLog};
use orchestrix_common::rule::{AlertRule, AlertSeverity, ThresholdCondition, CONDITION_TYPE_THRESHOLD};
use orchestrix_common::{Error, Result};
use orchestrix_storage::{AlertRuleStore, TenantGate};

use crate::service::{page_offset, AuditService, Page};

#[derive(Debug, Clone)]
pub struct CreateAlertRuleInput {
    pub name: String,
    pub description: Option<String>,
    pub condition_type: String,
    pub condition_config: Value,
    pub severity: AlertSeverity,
    pub alert_title_template: String,
    pub alert_message_template: Option<String>,
    pub trigger_workflow_id: Option<Uuid>,
    pub trigger_input_template: Option<Value>,
    pub cooldown_seconds: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateAlertRuleInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub condition_type: Option<String>,
    pub condition_config: Option<Value>,
    pub severity: Option<AlertSeverity>,
    pub alert_title_template: Option<String>,
    pub alert_message_template: Option<String>,
    pub trigger_workflow_id: Option<Uuid>,
    pub trigger_input_template: Option<Value>,
    pub cooldown_seconds: Option<i32>,
}

pub struct AlertRuleService {
    rules: Arc<dyn AlertRuleStore>,
    audit: Arc<AuditService>,
    gate: Arc<dyn TenantGate>,
}

impl AlertRuleService {
    pub fn new(
        rules: Arc<dyn AlertRuleStore>,
        audit: Arc<AuditService>,
        gate: Arc<dyn TenantGate>,
    ) -> Self {
        Self { rules, audit, gate }
    }

    pub async fn list(&self, tenant_id: Uuid, page: u64, limit: u64) -> Result<Page<AlertRule>> {
        self.gate.bind(tenant_id).await?;
        let offset = page_offset(page, limit);
        let items = self.rules.find_by_tenant(tenant_id, limit, offset).await?;
        let total = self.rules.count_by_tenant(tenant_id).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<AlertRule> {
        self.gate.bind(tenant_id).await?;
        self.rules.find_by_id(id).await
    }

    pub async fn create(
        &self,
        tenant_id: Uuid,
        user_id: Option<Uuid>,
        input: CreateAlertRuleInput,
    ) -> Result<AlertRule> {
        if input.name.is_empty() {
            return Err(Error::Validation("rule name is required".into()));
        }
        if input.alert_title_template.is_empty() {
            return Err(Error::Validation("alert title template is required".into()));
        }
        if input.condition_type == CONDITION_TYPE_THRESHOLD {
            ThresholdCondition::parse(&input.condition_config)?;
        }
        self.gate.bind(tenant_id).await?;

        let now = Utc::now();
        let rule = AlertRule {
            id: Uuid::new_v4(),
            tenant_id,
            name: input.name,
            description: input.description,
            enabled: true,
            condition_type: input.condition_type,
            condition_config: input.condition_config,
            severity: input.severity,
            alert_title_template: input.alert_title_template,
            alert_message_template: input.alert_message_template,
            trigger_workflow_id: input.trigger_workflow_id,
            trigger_input_template: input.trigger_input_template,
            cooldown_seconds: input.cooldown_seconds,
            last_triggered_at: None,
            created_by: user_id,
            created_at: now,
            updated_at: now,
        };
        self.rules.save(&rule).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_ALERT_RULE_CREATED,
                    audit::RESOURCE_ALERT_RULE,
                    Some(rule.id),
                    audit::ACTION_CREATE,
                )
                .with_new_value(&rule),
            )
            .await;

        Ok(rule)
    }

    pub async fn update(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        user_id: Option<Uuid>,
        input: UpdateAlertRuleInput,
    ) -> Result<AlertRule> {
        self.gate.bind(tenant_id).await?;

        let mut rule = self.rules.find_by_id(id).await?;
        let old_rule = rule.clone();

        if let Some(name) = input.name {
            rule.name = name;
        }
        if input.description.is_some() {
            rule.description = input.description;
        }
        if let Some(enabled) = input.enabled {
            rule.enabled = enabled;
        }
        if let Some(condition_type) = input.condition_type {
            rule.condition_type = condition_type;
        }
        if let Some(condition_config) = input.condition_config {
            rule.condition_config = condition_config;
        }
        if rule.condition_type == CONDITION_TYPE_THRESHOLD {
            ThresholdCondition::parse(&rule.condition_config)?;
        }
        if let Some(severity) = input.severity {
            rule.severity = severity;
        }
        if let Some(template) = input.alert_title_template {
            rule.alert_title_template = template;
        }
        if input.alert_message_template.is_some() {
            rule.alert_message_template = input.alert_message_template;
        }
        if input.trigger_workflow_id.is_some() {
            rule.trigger_workflow_id = input.trigger_workflow_id;
        }
        if input.trigger_input_template.is_some() {
            rule.trigger_input_template = input.trigger_input_template;
        }
        if let Some(cooldown_seconds) = input.cooldown_seconds {
            rule.cooldown_seconds = cooldown_seconds;
        }
        rule.updated_at = Utc::now();

        self.rules.update(&rule).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_ALERT_RULE_UPDATED,
                    audit::RESOURCE_ALERT_RULE,
                    Some(rule.id),
                    audit::ACTION_UPDATE,
                )
                .with_old_value(&old_rule)
                .with_new_value(&rule),
            )
            .await;

        Ok(rule)
    }

    pub async fn delete(&self, tenant_id: Uuid, id: Uuid, user_id: Option<Uuid>) -> Result<()> {
        self.gate.bind(tenant_id).await?;

        let rule = self.rules.find_by_id(id).await?;
        self.rules.delete(id).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_ALERT_RULE_DELETED,
                    audit::RESOURCE_ALERT_RULE,
                    Some(id),
                    audit::ACTION_DELETE,
                )
                .with_old_value(&rule),
            )
            .await;

        Ok(())
    }
}
