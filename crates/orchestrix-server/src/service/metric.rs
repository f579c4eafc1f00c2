use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use orchestrix_alert::evaluate::AlertRuleEvaluator;
use orchestrix_common::metric::{
    AggregationType, AlertThreshold, MetricAggregate, MetricDefinition, MetricQuery, MetricSample,
    MetricType, TimeBucket,
};
use orchestrix_common::{Error, Result};
use orchestrix_storage::{DefinitionStore, MetricStore, TenantGate};

use crate::service::{page_offset, Page};

/// Maximum number of samples accepted in a single batch.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// One sample as submitted by a client; ids and `created_at` are assigned
/// server-side.
#[derive(Debug, Clone)]
pub struct IngestInput {
    pub name: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub source: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct IngestBatchOutcome {
    pub ingested: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateDefinitionInput {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub metric_type: MetricType,
    pub aggregation: AggregationType,
    pub alert_threshold: Option<AlertThreshold>,
    pub retention_days: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateDefinitionInput {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub metric_type: Option<MetricType>,
    pub aggregation: Option<AggregationType>,
    pub alert_threshold: Option<AlertThreshold>,
    pub retention_days: Option<i32>,
}

/// Orchestrates ingest → persist → evaluate, plus the query surface and
/// definition CRUD.
pub struct MetricService {
    metrics: Arc<dyn MetricStore>,
    definitions: Arc<dyn DefinitionStore>,
    gate: Arc<dyn TenantGate>,
    evaluator: Option<Arc<AlertRuleEvaluator>>,
    sample_deadline: StdDuration,
    batch_deadline: StdDuration,
}

impl MetricService {
    pub fn new(
        metrics: Arc<dyn MetricStore>,
        definitions: Arc<dyn DefinitionStore>,
        gate: Arc<dyn TenantGate>,
        evaluator: Option<Arc<AlertRuleEvaluator>>,
        sample_deadline: StdDuration,
        batch_deadline: StdDuration,
    ) -> Self {
        Self {
            metrics,
            definitions,
            gate,
            evaluator,
            sample_deadline,
            batch_deadline,
        }
    }

    fn build_sample(tenant_id: Uuid, input: IngestInput, now: DateTime<Utc>) -> MetricSample {
        MetricSample {
            id: Uuid::new_v4(),
            tenant_id,
            name: input.name,
            value: input.value,
            labels: input.labels,
            source: input.source,
            timestamp: input.timestamp.unwrap_or(now),
            created_at: now,
        }
    }

    /// Persists one sample and schedules rule evaluation as a detached
    /// background task. Returns once the sample is durable; the caller
    /// never waits for evaluation.
    pub async fn ingest(&self, tenant_id: Uuid, input: IngestInput) -> Result<MetricSample> {
        if input.name.is_empty() {
            return Err(Error::Validation("metric name is required".into()));
        }
        self.gate.bind(tenant_id).await?;

        let sample = Self::build_sample(tenant_id, input, Utc::now());
        self.metrics.save(&sample).await?;

        if let Some(evaluator) = &self.evaluator {
            let evaluator = evaluator.clone();
            let sample = sample.clone();
            let deadline = self.sample_deadline;
            tokio::spawn(async move {
                if tokio::time::timeout(deadline, evaluator.evaluate(tenant_id, &sample))
                    .await
                    .is_err()
                {
                    tracing::warn!(metric = %sample.name, "alert evaluation timed out");
                }
            });
        }

        Ok(sample)
    }

    /// Persists a batch atomically, then evaluates once per unique metric
    /// name with the last-seen value in arrival order.
    pub async fn ingest_batch(
        &self,
        tenant_id: Uuid,
        inputs: Vec<IngestInput>,
    ) -> Result<IngestBatchOutcome> {
        if inputs.len() > MAX_BATCH_SIZE {
            return Err(Error::BatchTooLarge {
                max: MAX_BATCH_SIZE,
                got: inputs.len(),
            });
        }
        self.gate.bind(tenant_id).await?;

        let now = Utc::now();
        let samples: Vec<MetricSample> = inputs
            .into_iter()
            .map(|input| Self::build_sample(tenant_id, input, now))
            .collect();

        let ingested = self.metrics.save_batch(&samples).await?;

        if let Some(evaluator) = &self.evaluator {
            let evaluator = evaluator.clone();
            let reduced = reduce_last_seen(&samples);
            let deadline = self.batch_deadline;
            tokio::spawn(async move {
                let sweep = async {
                    for sample in &reduced {
                        let _ = evaluator.evaluate(tenant_id, sample).await;
                    }
                };
                if tokio::time::timeout(deadline, sweep).await.is_err() {
                    tracing::warn!("batch alert evaluation timed out");
                }
            });
        }

        Ok(IngestBatchOutcome {
            ingested,
            failed: 0,
            errors: Vec::new(),
        })
    }

    pub async fn query(&self, query: MetricQuery) -> Result<Page<MetricSample>> {
        query.validate()?;
        self.gate.bind(query.tenant_id).await?;

        let items = self.metrics.find_by_query(&query).await?;
        let total = self.metrics.count_by_query(&query).await?;

        let limit = query.effective_limit() as u64;
        let page = if query.offset > 0 && limit > 0 {
            (query.offset as u64 / limit) + 1
        } else {
            1
        };

        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get_latest(
        &self,
        tenant_id: Uuid,
        name: &str,
        labels: Option<&HashMap<String, String>>,
    ) -> Result<MetricSample> {
        if name.is_empty() {
            return Err(Error::Validation("metric name is required".into()));
        }
        self.gate.bind(tenant_id).await?;
        self.metrics.find_latest(tenant_id, name, labels).await
    }

    pub async fn get_aggregate(&self, query: MetricQuery) -> Result<MetricAggregate> {
        query.validate()?;
        self.gate.bind(query.tenant_id).await?;
        self.metrics.get_aggregate(&query).await
    }

    pub async fn get_series(&self, query: MetricQuery, bucket: Duration) -> Result<Vec<TimeBucket>> {
        query.validate()?;
        if bucket <= Duration::zero() {
            return Err(Error::Validation("bucket must be positive".into()));
        }
        self.gate.bind(query.tenant_id).await?;
        self.metrics.get_series(&query, bucket).await
    }

    pub async fn list_names(&self, tenant_id: Uuid, prefix: Option<&str>) -> Result<Vec<String>> {
        self.gate.bind(tenant_id).await?;
        self.metrics.list_names(tenant_id, prefix).await
    }

    // ---- definitions ----

    pub async fn list_definitions(
        &self,
        tenant_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<Page<MetricDefinition>> {
        self.gate.bind(tenant_id).await?;
        let offset = page_offset(page, limit);
        let items = self
            .definitions
            .find_by_tenant(tenant_id, limit, offset)
            .await?;
        let total = self.definitions.count_by_tenant(tenant_id).await?;
        Ok(Page {
            items,
            total,
            page,
            limit,
        })
    }

    pub async fn get_definition(&self, tenant_id: Uuid, name: &str) -> Result<MetricDefinition> {
        self.gate.bind(tenant_id).await?;
        self.definitions.find_by_name(tenant_id, name).await
    }

    pub async fn create_definition(
        &self,
        tenant_id: Uuid,
        input: CreateDefinitionInput,
    ) -> Result<MetricDefinition> {
        if input.name.is_empty() {
            return Err(Error::Validation("metric name is required".into()));
        }
        self.gate.bind(tenant_id).await?;

        match self.definitions.find_by_name(tenant_id, &input.name).await {
            Ok(_) => {
                return Err(Error::Conflict(format!(
                    "metric definition '{}' already exists",
                    input.name
                )))
            }
            Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let now = Utc::now();
        let definition = MetricDefinition {
            id: Uuid::new_v4(),
            tenant_id,
            name: input.name,
            display_name: input.display_name,
            description: input.description,
            unit: input.unit,
            metric_type: input.metric_type,
            aggregation: input.aggregation,
            alert_threshold: input.alert_threshold,
            retention_days: input.retention_days,
            created_at: now,
            updated_at: now,
        };
        self.definitions.save(&definition).await?;
        Ok(definition)
    }

    /// Applies only the provided fields.
    pub async fn update_definition(
        &self,
        tenant_id: Uuid,
        name: &str,
        input: UpdateDefinitionInput,
    ) -> Result<MetricDefinition> {
        self.gate.bind(tenant_id).await?;

        let mut definition = self.definitions.find_by_name(tenant_id, name).await?;
        if input.display_name.is_some() {
            definition.display_name = input.display_name;
        }
        if input.description.is_some() {
            definition.description = input.description;
        }
        if input.unit.is_some() {
            definition.unit = input.unit;
        }
        if let Some(metric_type) = input.metric_type {
            definition.metric_type = metric_type;
        }
        if let Some(aggregation) = input.aggregation {
            definition.aggregation = aggregation;
        }
        if input.alert_threshold.is_some() {
            definition.alert_threshold = input.alert_threshold;
        }
        if let Some(retention_days) = input.retention_days {
            definition.retention_days = retention_days;
        }
        definition.updated_at = Utc::now();

        self.definitions.update(&definition).await?;
        Ok(definition)
    }

    pub async fn delete_definition(&self, tenant_id: Uuid, name: &str) -> Result<()> {
        self.gate.bind(tenant_id).await?;
        // Verify existence first so NotFound is reported precisely
        self.definitions.find_by_name(tenant_id, name).await?;
        self.definitions.delete(tenant_id, name).await
    }
}

/// Reduces a batch to its last-seen sample per metric name, in arrival
/// order. Intermediate values are deliberately dropped; the goal is alert
/// liveness, not completeness.
pub(crate) fn reduce_last_seen(samples: &[MetricSample]) -> Vec<MetricSample> {
    let mut last: HashMap<String, &MetricSample> = HashMap::new();
    for sample in samples {
        last.insert(sample.name.clone(), sample);
    }
    let mut reduced: Vec<MetricSample> = last.into_values().cloned().collect();
    reduced.sort_by(|a, b| a.name.cmp(&b.name));
    reduced
}
