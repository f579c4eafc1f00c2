use std::sync::Arc;

use uuid::Uuid;

use orchestrix_common::alert::Alert;
use orchestrix_common::audit::{self, AuditLog};
use orchestrix_common::Result;
use orchestrix_storage::{AlertStore, TenantGate};

use crate::service::{page_offset, AuditService, Page};

pub struct AlertService {
    alerts: Arc<dyn AlertStore>,
    audit: Arc<AuditService>,
    gate: Arc<dyn TenantGate>,
}

impl AlertService {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        audit: Arc<AuditService>,
        gate: Arc<dyn TenantGate>,
    ) -> Self {
        Self {
            alerts,
            audit,
            gate,
        }
    }

    pub async fn list(&self, tenant_id: Uuid, page: u64, limit: u64) -> Result<Page<Alert>> {
        self.gate.bind(tenant_id).await?;
        let offset = page_offset(page, limit);
        let items = self.alerts.find_by_tenant(tenant_id, limit, offset).await?;
        let total = self.alerts.count_by_tenant(tenant_id).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<Alert> {
        self.gate.bind(tenant_id).await?;
        self.alerts.find_by_id(id).await
    }

    /// Applies the acknowledge transition; rejected transitions do not
    /// mutate the stored alert.
    pub async fn acknowledge(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Alert> {
        self.gate.bind(tenant_id).await?;

        let mut alert = self.alerts.find_by_id(id).await?;
        alert.acknowledge(user_id)?;
        self.alerts.update(&alert).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_ALERT_ACKNOWLEDGED,
                    audit::RESOURCE_ALERT,
                    Some(alert.id),
                    audit::ACTION_ACKNOWLEDGE,
                )
                .with_new_value(&alert),
            )
            .await;

        Ok(alert)
    }

    pub async fn resolve(&self, tenant_id: Uuid, id: Uuid, user_id: Option<Uuid>) -> Result<Alert> {
        self.gate.bind(tenant_id).await?;

        let mut alert = self.alerts.find_by_id(id).await?;
        alert.resolve(user_id)?;
        self.alerts.update(&alert).await?;

        self.audit
            .log(
                AuditLog::new(
                    tenant_id,
                    user_id,
                    audit::EVENT_ALERT_RESOLVED,
                    audit::RESOURCE_ALERT,
                    Some(alert.id),
                    audit::ACTION_RESOLVE,
                )
                .with_new_value(&alert),
            )
            .await;

        Ok(alert)
    }
}
