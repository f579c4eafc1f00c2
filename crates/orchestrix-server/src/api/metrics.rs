use std::collections::HashMap;

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use orchestrix_common::metric::{MetricAggregate, MetricQuery, MetricSample, TimeBucket};
use orchestrix_common::Error;

use crate::api::{domain_error_response, ErrorBody, Paginated};
use crate::logging::TraceId;
use crate::middleware::Principal;
use crate::service::metric::IngestInput;
use crate::state::AppState;

/// One metric sample in API form.
#[derive(Serialize, ToSchema)]
pub struct SampleResponse {
    pub id: Uuid,
    pub name: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<MetricSample> for SampleResponse {
    fn from(sample: MetricSample) -> Self {
        Self {
            id: sample.id,
            name: sample.name,
            value: sample.value,
            labels: sample.labels,
            source: sample.source,
            timestamp: sample.timestamp,
            created_at: sample.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestRequest {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    pub source: Option<String>,
    /// Sample time; server time is used when absent
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<IngestRequest> for IngestInput {
    fn from(req: IngestRequest) -> Self {
        Self {
            name: req.name,
            value: req.value,
            labels: req.labels,
            source: req.source,
            timestamp: req.timestamp,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestBatchRequest {
    pub metrics: Vec<IngestRequest>,
}

#[derive(Serialize, ToSchema)]
pub struct IngestBatchResponse {
    pub ingested: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MetricsQueryParams {
    /// Metric name (required)
    pub name: String,
    /// Range start (RFC 3339)
    pub start: Option<DateTime<Utc>>,
    /// Range end (RFC 3339)
    pub end: Option<DateTime<Utc>>,
    /// 1-based page number
    pub page: Option<i64>,
    /// Page size
    pub limit: Option<i64>,
    /// JSON-encoded label map; matches samples containing every pair
    pub labels: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RangeParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SeriesParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Bucket width such as `30s`, `5m`, `1h` (default `5m`)
    pub bucket: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LatestParams {
    /// JSON-encoded label map filter
    pub labels: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NamesParams {
    pub prefix: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct AggregateResponse {
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

impl From<MetricAggregate> for AggregateResponse {
    fn from(a: MetricAggregate) -> Self {
        Self {
            count: a.count,
            avg: a.avg,
            min: a.min,
            max: a.max,
            sum: a.sum,
            p50: a.p50,
            p95: a.p95,
            p99: a.p99,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BucketResponse {
    pub bucket_start: DateTime<Utc>,
    pub count: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl From<TimeBucket> for BucketResponse {
    fn from(b: TimeBucket) -> Self {
        Self {
            bucket_start: b.bucket_start,
            count: b.count,
            avg: b.avg,
            min: b.min,
            max: b.max,
            sum: b.sum,
        }
    }
}

fn parse_labels(raw: Option<&str>) -> Result<Option<HashMap<String, String>>, Error> {
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|e| Error::Validation(format!("invalid labels parameter: {e}"))),
    }
}

/// Parses bucket widths like `30s`, `5m`, `2h`, `1d`. A bare integer is
/// taken as seconds.
fn parse_bucket(raw: &str) -> Result<Duration, Error> {
    let raw = raw.trim();
    let (number, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], Some(c)),
        _ => (raw, None),
    };
    let n: i64 = number
        .parse()
        .map_err(|_| Error::Validation(format!("invalid bucket duration: {raw}")))?;
    if n <= 0 {
        return Err(Error::Validation("bucket must be positive".into()));
    }
    let duration = match unit {
        None | Some('s') => Duration::seconds(n),
        Some('m') => Duration::minutes(n),
        Some('h') => Duration::hours(n),
        Some('d') => Duration::days(n),
        Some(other) => {
            return Err(Error::Validation(format!(
                "unknown bucket unit '{other}'"
            )))
        }
    };
    Ok(duration)
}

/// Ingests a single metric sample.
#[utoipa::path(
    post,
    path = "/metrics/ingest",
    tag = "Metrics",
    request_body = IngestRequest,
    responses(
        (status = 201, description = "Sample durably persisted", body = SampleResponse),
        (status = 400, description = "Validation failure", body = ErrorBody),
        (status = 503, description = "Store unavailable", body = ErrorBody)
    )
)]
async fn ingest_metric(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Json(body): Json<IngestRequest>,
) -> Response {
    match state.metrics.ingest(principal.tenant_id, body.into()).await {
        Ok(sample) => (
            StatusCode::CREATED,
            Json(SampleResponse::from(sample)),
        )
            .into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Ingests up to 10 000 samples as one atomic batch.
#[utoipa::path(
    post,
    path = "/metrics/ingest/batch",
    tag = "Metrics",
    request_body = IngestBatchRequest,
    responses(
        (status = 201, description = "Batch durably persisted", body = IngestBatchResponse),
        (status = 400, description = "Batch too large or invalid", body = ErrorBody),
        (status = 503, description = "Store unavailable", body = ErrorBody)
    )
)]
async fn ingest_metric_batch(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Json(body): Json<IngestBatchRequest>,
) -> Response {
    let submitted = body.metrics.len();
    let inputs: Vec<IngestInput> = body.metrics.into_iter().map(Into::into).collect();

    match state.metrics.ingest_batch(principal.tenant_id, inputs).await {
        Ok(outcome) => (
            StatusCode::CREATED,
            Json(IngestBatchResponse {
                ingested: outcome.ingested,
                failed: outcome.failed,
                errors: outcome.errors,
            }),
        )
            .into_response(),
        Err(e @ Error::Store(_)) => {
            // Nothing was persisted; report the whole batch as failed
            tracing::error!(trace_id = %trace_id, error = %e, "batch ingest failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorBody {
                    code: e.code().to_string(),
                    message: e.to_string(),
                    details: Some(json!({
                        "ingested": 0,
                        "failed": submitted,
                        "errors": [e.to_string()],
                    })),
                }),
            )
                .into_response()
        }
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Queries samples in a time range, newest first.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Metrics",
    params(MetricsQueryParams),
    responses(
        (status = 200, description = "Matching samples, newest first", body = Vec<SampleResponse>),
        (status = 400, description = "Invalid query", body = ErrorBody)
    )
)]
async fn query_metrics(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<MetricsQueryParams>,
) -> Response {
    let labels = match parse_labels(params.labels.as_deref()) {
        Ok(labels) => labels,
        Err(e) => return domain_error_response(&trace_id, &e),
    };

    let limit = params.limit.unwrap_or(0);
    let page = params.page.unwrap_or(1).max(1);
    let offset = (page - 1) * limit.max(0);

    let query = MetricQuery {
        tenant_id: principal.tenant_id,
        name: params.name,
        labels,
        start: params.start,
        end: params.end,
        limit,
        offset,
    };

    match state.metrics.query(query).await {
        Ok(page) => Json(Paginated::from_page(page, SampleResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Returns the most recent sample for a metric.
#[utoipa::path(
    get,
    path = "/metrics/latest/{name}",
    tag = "Metrics",
    params(
        ("name" = String, Path, description = "Metric name"),
        LatestParams
    ),
    responses(
        (status = 200, description = "Latest sample", body = SampleResponse),
        (status = 404, description = "No sample recorded", body = ErrorBody)
    )
)]
async fn latest_metric(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<LatestParams>,
) -> Response {
    let labels = match parse_labels(params.labels.as_deref()) {
        Ok(labels) => labels,
        Err(e) => return domain_error_response(&trace_id, &e),
    };

    match state
        .metrics
        .get_latest(principal.tenant_id, &name, labels.as_ref())
        .await
    {
        Ok(sample) => Json(SampleResponse::from(sample)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Returns aggregate statistics over a time range.
#[utoipa::path(
    get,
    path = "/metrics/aggregate/{name}",
    tag = "Metrics",
    params(
        ("name" = String, Path, description = "Metric name"),
        RangeParams
    ),
    responses(
        (status = 200, description = "Aggregate statistics", body = AggregateResponse),
        (status = 400, description = "Invalid query", body = ErrorBody)
    )
)]
async fn aggregate_metric(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<RangeParams>,
) -> Response {
    let query = MetricQuery {
        tenant_id: principal.tenant_id,
        name,
        start: params.start,
        end: params.end,
        ..Default::default()
    };

    match state.metrics.get_aggregate(query).await {
        Ok(aggregate) => Json(AggregateResponse::from(aggregate)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Returns time-bucketed series data, newest bucket first.
#[utoipa::path(
    get,
    path = "/metrics/series/{name}",
    tag = "Metrics",
    params(
        ("name" = String, Path, description = "Metric name"),
        SeriesParams
    ),
    responses(
        (status = 200, description = "Non-empty buckets, newest first", body = Vec<BucketResponse>),
        (status = 400, description = "Invalid query", body = ErrorBody)
    )
)]
async fn series_metric(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<SeriesParams>,
) -> Response {
    let bucket = match parse_bucket(params.bucket.as_deref().unwrap_or("5m")) {
        Ok(bucket) => bucket,
        Err(e) => return domain_error_response(&trace_id, &e),
    };

    let query = MetricQuery {
        tenant_id: principal.tenant_id,
        name,
        start: params.start,
        end: params.end,
        ..Default::default()
    };

    match state.metrics.get_series(query, bucket).await {
        Ok(buckets) => Json(
            buckets
                .into_iter()
                .map(BucketResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Lists distinct metric names for the tenant.
#[utoipa::path(
    get,
    path = "/metrics/names",
    tag = "Metrics",
    params(NamesParams),
    responses(
        (status = 200, description = "Sorted metric names", body = Vec<String>)
    )
)]
async fn metric_names(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<NamesParams>,
) -> Response {
    match state
        .metrics
        .list_names(principal.tenant_id, params.prefix.as_deref())
        .await
    {
        Ok(names) => Json(names).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(ingest_metric))
        .routes(routes!(ingest_metric_batch))
        .routes(routes!(query_metrics))
        .routes(routes!(latest_metric))
        .routes(routes!(aggregate_metric))
        .routes(routes!(series_metric))
        .routes(routes!(metric_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_parsing_accepts_common_units() {
        assert_eq!(parse_bucket("30s").unwrap(), Duration::seconds(30));
        assert_eq!(parse_bucket("5m").unwrap(), Duration::minutes(5));
        assert_eq!(parse_bucket("2h").unwrap(), Duration::hours(2));
        assert_eq!(parse_bucket("1d").unwrap(), Duration::days(1));
        assert_eq!(parse_bucket("45").unwrap(), Duration::seconds(45));
    }

    #[test]
    fn bucket_parsing_rejects_garbage() {
        assert!(parse_bucket("").is_err());
        assert!(parse_bucket("-5m").is_err());
        assert!(parse_bucket("0m").is_err());
        assert!(parse_bucket("5w").is_err());
        assert!(parse_bucket("five").is_err());
    }
}
