//! Driven ports and the Postgres store for the Orchestrix control plane.
//!
//! The traits in this module are the only way the rest of the workspace
//! talks to persistence. [`store::PgStore`] implements all of them over a
//! single SeaORM connection pool; entity CRUD goes through SeaORM models,
//! while the time-series paths (range scans, aggregates, bucketed series)
//! are hand-written SQL. Tenant isolation is enforced by the store's
//! row-level-security policies once [`TenantGate::bind`] has stamped the
//! session variable.

pub mod entities;
pub mod store;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use uuid::Uuid;

use orchestrix_common::alert::Alert;
use orchestrix_common::audit::AuditLog;
use orchestrix_common::execution::Execution;
use orchestrix_common::metric::{
    MetricAggregate, MetricDefinition, MetricQuery, MetricSample, TimeBucket,
};
use orchestrix_common::rule::AlertRule;
use orchestrix_common::workflow::Workflow;
use orchestrix_common::Result;

pub use store::PgStore;

/// Stamps the per-request tenant identity onto the store session so
/// row-level isolation applies to every subsequent statement.
///
/// Binding is idempotent; callers re-apply it at each service entrypoint.
#[async_trait]
pub trait TenantGate: Send + Sync {
    async fn bind(&self, tenant_id: Uuid) -> Result<()>;
}

/// Persistence for metric samples and the time-series query paths.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn save(&self, sample: &MetricSample) -> Result<()>;

    /// Persists all samples as one atomic unit. Either every sample is
    /// durable after return or the call fails.
    async fn save_batch(&self, samples: &[MetricSample]) -> Result<usize>;

    /// Range query: exact name, label-subset containment, `timestamp`
    /// descending, paginated.
    async fn find_by_query(&self, query: &MetricQuery) -> Result<Vec<MetricSample>>;

    async fn count_by_query(&self, query: &MetricQuery) -> Result<u64>;

    /// Sample with the greatest timestamp, or `NotFound`.
    async fn find_latest(
        &self,
        tenant_id: Uuid,
        name: &str,
        labels: Option<&HashMap<String, String>>,
    ) -> Result<MetricSample>;

    async fn get_aggregate(&self, query: &MetricQuery) -> Result<MetricAggregate>;

    /// Epoch-aligned fixed-width buckets, newest bucket first, empty
    /// buckets omitted.
    async fn get_series(&self, query: &MetricQuery, bucket: Duration) -> Result<Vec<TimeBucket>>;

    async fn list_names(&self, tenant_id: Uuid, prefix: Option<&str>) -> Result<Vec<String>>;
}

/// Persistence for per-tenant metric metadata, unique per `(tenant, name)`.
#[async_trait]
pub trait DefinitionStore: Send + Sync {
    async fn find_by_name(&self, tenant_id: Uuid, name: &str) -> Result<MetricDefinition>;
    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<MetricDefinition>>;
    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64>;
    /// Fails with `Conflict` when the `(tenant, name)` key already exists.
    async fn save(&self, definition: &MetricDefinition) -> Result<()>;
    async fn update(&self, definition: &MetricDefinition) -> Result<()>;
    async fn delete(&self, tenant_id: Uuid, name: &str) -> Result<()>;
}

#[async_trait]
pub trait AlertRuleStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<AlertRule>;
    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AlertRule>>;
    async fn find_enabled_by_tenant(&self, tenant_id: Uuid) -> Result<Vec<AlertRule>>;
    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64>;
    async fn save(&self, rule: &AlertRule) -> Result<()>;
    async fn update(&self, rule: &AlertRule) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    /// Sets `last_triggered_at` to now at store resolution. The only
    /// operation that mutates that field.
    async fn update_last_triggered(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Alert>;
    async fn find_by_tenant(&self, tenant_id: Uuid, limit: u64, offset: u64) -> Result<Vec<Alert>>;
    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64>;
    async fn save(&self, alert: &Alert) -> Result<()>;
    async fn update(&self, alert: &Alert) -> Result<()>;
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Workflow>;
    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Workflow>>;
    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64>;
    async fn save(&self, workflow: &Workflow) -> Result<()>;
    async fn update(&self, workflow: &Workflow) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
}

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Execution>;
    /// Lookup by the engine-side dedup key; `None` when no execution has
    /// claimed it yet.
    async fn find_by_engine_workflow_id(
        &self,
        tenant_id: Uuid,
        engine_workflow_id: &str,
    ) -> Result<Option<Execution>>;
    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Execution>>;
    async fn find_by_workflow(
        &self,
        workflow_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Execution>>;
    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64>;
    async fn count_by_workflow(&self, workflow_id: Uuid) -> Result<u64>;
    async fn save(&self, execution: &Execution) -> Result<()>;
    async fn update(&self, execution: &Execution) -> Result<()>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<AuditLog>;
    async fn find_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<AuditLog>>;
    async fn count_by_tenant(&self, tenant_id: Uuid) -> Result<u64>;
    async fn save(&self, log: &AuditLog) -> Result<()>;
}
