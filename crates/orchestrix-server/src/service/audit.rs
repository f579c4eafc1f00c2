use std::sync::Arc;

use uuid::Uuid;

use orchestrix_common::audit::AuditLog;
use orchestrix_common::Result;
use orchestrix_storage::{AuditStore, TenantGate};

use crate::service::{page_offset, Page};

pub struct AuditService {
    store: Arc<dyn AuditStore>,
    gate: Arc<dyn TenantGate>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>, gate: Arc<dyn TenantGate>) -> Self {
        Self { store, gate }
    }

    pub async fn list(&self, tenant_id: Uuid, page: u64, limit: u64) -> Result<Page<AuditLog>> {
        self.gate.bind(tenant_id).await?;
        let offset = page_offset(page, limit);
        let items = self.store.find_by_tenant(tenant_id, limit, offset).await?;
        let total = self.store.count_by_tenant(tenant_id).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get(&self, tenant_id: Uuid, id: Uuid) -> Result<AuditLog> {
        self.gate.bind(tenant_id).await?;
        self.store.find_by_id(id).await
    }

    /// Best-effort append. Audit failures never fail the surrounding
    /// operation; they are logged at warning level.
    pub async fn log(&self, entry: AuditLog) {
        if let Err(e) = self.store.save(&entry).await {
            tracing::warn!(
                event = %entry.event_type,
                error = %e,
                "failed to write audit log"
            );
        }
    }
}
