use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::Error;

/// Default page size when a query does not set a limit.
pub const DEFAULT_QUERY_LIMIT: i64 = 100;

/// Hard cap on a single query's page size.
pub const MAX_QUERY_LIMIT: i64 = 10_000;

/// One timestamped observation of a named metric.
///
/// Samples are append-only; two samples with the same
/// `(tenant, name, timestamp)` are allowed and stored independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    #[default]
    Gauge,
    Counter,
    Histogram,
    Summary,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricType::Gauge => write!(f, "gauge"),
            MetricType::Counter => write!(f, "counter"),
            MetricType::Histogram => write!(f, "histogram"),
            MetricType::Summary => write!(f, "summary"),
        }
    }
}

impl std::str::FromStr for MetricType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            "histogram" => Ok(MetricType::Histogram),
            "summary" => Ok(MetricType::Summary),
            _ => Err(format!("unknown metric type: {s}")),
        }
    }
}

/// How a metric's samples are rolled up by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationType {
    #[default]
    Avg,
    Sum,
    Min,
    Max,
    Last,
    Count,
    P50,
    P95,
    P99,
}

impl std::fmt::Display for AggregationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AggregationType::Avg => "avg",
            AggregationType::Sum => "sum",
            AggregationType::Min => "min",
            AggregationType::Max => "max",
            AggregationType::Last => "last",
            AggregationType::Count => "count",
            AggregationType::P50 => "p50",
            AggregationType::P95 => "p95",
            AggregationType::P99 => "p99",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for AggregationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" => Ok(AggregationType::Avg),
            "sum" => Ok(AggregationType::Sum),
            "min" => Ok(AggregationType::Min),
            "max" => Ok(AggregationType::Max),
            "last" => Ok(AggregationType::Last),
            "count" => Ok(AggregationType::Count),
            "p50" => Ok(AggregationType::P50),
            "p95" => Ok(AggregationType::P95),
            "p99" => Ok(AggregationType::P99),
            _ => Err(format!("unknown aggregation type: {s}")),
        }
    }
}

/// Optional warning/critical levels attached to a metric definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertThreshold {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
}

/// Per-tenant metadata about a metric name. Unique per `(tenant_id, name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub metric_type: MetricType,
    pub aggregation: AggregationType,
    pub alert_threshold: Option<AlertThreshold>,
    pub retention_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregated statistics over a query range.
///
/// Percentile fields stay `None` unless the store supports percentile
/// operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricAggregate {
    pub count: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p50: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p99: Option<f64>,
}

/// One fixed-width, epoch-aligned bucket of a series query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucket {
    pub bucket_start: DateTime<Utc>,
    pub count: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

/// Parameters for range, count, aggregate, and series queries.
#[derive(Debug, Clone, Default)]
pub struct MetricQuery {
    pub tenant_id: Uuid,
    pub name: String,
    pub labels: Option<HashMap<String, String>>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl MetricQuery {
    /// Checks tenant, name, and time-range coherence.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tenant_id.is_nil() {
            return Err(Error::Validation("tenant id is required".into()));
        }
        if self.name.is_empty() {
            return Err(Error::Validation("metric name is required".into()));
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(Error::Validation(
                    "start must not be after end".into(),
                ));
            }
        }
        Ok(())
    }

    /// Limit with the default applied and the hard cap enforced.
    pub fn effective_limit(&self) -> i64 {
        if self.limit <= 0 {
            DEFAULT_QUERY_LIMIT
        } else {
            self.limit.min(MAX_QUERY_LIMIT)
        }
    }
}
