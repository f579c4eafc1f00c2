use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use orchestrix_common::metric::{AlertThreshold, MetricDefinition};
use orchestrix_common::Error;

use crate::api::pagination::PageParams;
use crate::api::{domain_error_response, ErrorBody, Paginated};
use crate::logging::TraceId;
use crate::middleware::Principal;
use crate::service::metric::{CreateDefinitionInput, UpdateDefinitionInput};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ThresholdBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical: Option<f64>,
}

impl From<ThresholdBody> for AlertThreshold {
    fn from(body: ThresholdBody) -> Self {
        Self {
            warning: body.warning,
            critical: body.critical,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DefinitionResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// gauge / counter / histogram / summary
    #[serde(rename = "type")]
    pub metric_type: String,
    /// avg / sum / min / max / last / count / p50 / p95 / p99
    pub aggregation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_threshold: Option<ThresholdBody>,
    pub retention_days: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MetricDefinition> for DefinitionResponse {
    fn from(def: MetricDefinition) -> Self {
        Self {
            id: def.id,
            name: def.name,
            display_name: def.display_name,
            description: def.description,
            unit: def.unit,
            metric_type: def.metric_type.to_string(),
            aggregation: def.aggregation.to_string(),
            alert_threshold: def.alert_threshold.map(|t| ThresholdBody {
                warning: t.warning,
                critical: t.critical,
            }),
            retention_days: def.retention_days,
            created_at: def.created_at,
            updated_at: def.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDefinitionRequest {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    /// gauge / counter / histogram / summary
    #[serde(rename = "type")]
    pub metric_type: String,
    /// avg / sum / min / max / last / count / p50 / p95 / p99
    pub aggregation: String,
    pub alert_threshold: Option<ThresholdBody>,
    #[serde(default = "default_retention_days")]
    pub retention_days: i32,
}

fn default_retention_days() -> i32 {
    30
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDefinitionRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    #[serde(rename = "type")]
    pub metric_type: Option<String>,
    pub aggregation: Option<String>,
    pub alert_threshold: Option<ThresholdBody>,
    pub retention_days: Option<i32>,
}

/// Lists metric definitions for the tenant.
#[utoipa::path(
    get,
    path = "/metrics/definitions",
    tag = "Metric Definitions",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated definitions", body = Vec<DefinitionResponse>)
    )
)]
async fn list_definitions(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, limit) = params.resolve();
    match state
        .metrics
        .list_definitions(principal.tenant_id, page, limit)
        .await
    {
        Ok(page) => Json(Paginated::from_page(page, DefinitionResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Fetches one definition by metric name.
#[utoipa::path(
    get,
    path = "/metrics/definitions/{name}",
    tag = "Metric Definitions",
    params(("name" = String, Path, description = "Metric name")),
    responses(
        (status = 200, description = "The definition", body = DefinitionResponse),
        (status = 404, description = "Unknown definition", body = ErrorBody)
    )
)]
async fn get_definition(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state.metrics.get_definition(principal.tenant_id, &name).await {
        Ok(def) => Json(DefinitionResponse::from(def)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Creates a metric definition; the `(tenant, name)` pair must be unique.
#[utoipa::path(
    post,
    path = "/metrics/definitions",
    tag = "Metric Definitions",
    request_body = CreateDefinitionRequest,
    responses(
        (status = 201, description = "Definition created", body = DefinitionResponse),
        (status = 409, description = "Name already defined", body = ErrorBody)
    )
)]
async fn create_definition(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Json(body): Json<CreateDefinitionRequest>,
) -> Response {
    let metric_type = match body.metric_type.parse() {
        Ok(t) => t,
        Err(e) => return domain_error_response(&trace_id, &Error::Validation(e)),
    };
    let aggregation = match body.aggregation.parse() {
        Ok(a) => a,
        Err(e) => return domain_error_response(&trace_id, &Error::Validation(e)),
    };

    let input = CreateDefinitionInput {
        name: body.name,
        display_name: body.display_name,
        description: body.description,
        unit: body.unit,
        metric_type,
        aggregation,
        alert_threshold: body.alert_threshold.map(Into::into),
        retention_days: body.retention_days,
    };

    match state
        .metrics
        .create_definition(principal.tenant_id, input)
        .await
    {
        Ok(def) => (
            StatusCode::CREATED,
            Json(DefinitionResponse::from(def)),
        )
            .into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Updates the provided fields of a definition.
#[utoipa::path(
    put,
    path = "/metrics/definitions/{name}",
    tag = "Metric Definitions",
    params(("name" = String, Path, description = "Metric name")),
    request_body = UpdateDefinitionRequest,
    responses(
        (status = 200, description = "Updated definition", body = DefinitionResponse),
        (status = 404, description = "Unknown definition", body = ErrorBody)
    )
)]
async fn update_definition(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<UpdateDefinitionRequest>,
) -> Response {
    let metric_type = match body.metric_type.as_deref().map(str::parse).transpose() {
        Ok(t) => t,
        Err(e) => return domain_error_response(&trace_id, &Error::Validation(e)),
    };
    let aggregation = match body.aggregation.as_deref().map(str::parse).transpose() {
        Ok(a) => a,
        Err(e) => return domain_error_response(&trace_id, &Error::Validation(e)),
    };

    let input = UpdateDefinitionInput {
        display_name: body.display_name,
        description: body.description,
        unit: body.unit,
        metric_type,
        aggregation,
        alert_threshold: body.alert_threshold.map(Into::into),
        retention_days: body.retention_days,
    };

    match state
        .metrics
        .update_definition(principal.tenant_id, &name, input)
        .await
    {
        Ok(def) => Json(DefinitionResponse::from(def)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Deletes a definition by metric name.
#[utoipa::path(
    delete,
    path = "/metrics/definitions/{name}",
    tag = "Metric Definitions",
    params(("name" = String, Path, description = "Metric name")),
    responses(
        (status = 204, description = "Definition deleted"),
        (status = 404, description = "Unknown definition", body = ErrorBody)
    )
)]
async fn delete_definition(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match state
        .metrics
        .delete_definition(principal.tenant_id, &name)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_definitions, create_definition))
        .routes(routes!(get_definition, update_definition, delete_definition))
}
