use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use orchestrix_common::execution::Execution;

use crate::api::pagination::PageParams;
use crate::api::{domain_error_response, ErrorBody, Paginated};
use crate::logging::TraceId;
use crate::middleware::Principal;
use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct ExecutionResponse {
    pub id: Uuid,
    pub workflow_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_workflow_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_run_id: Option<String>,
    /// pending / running / completed / failed / cancelled
    pub status: String,
    #[schema(value_type = Object)]
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Execution> for ExecutionResponse {
    fn from(execution: Execution) -> Self {
        Self {
            id: execution.id,
            workflow_id: execution.workflow_id,
            engine_workflow_id: execution.engine_workflow_id,
            engine_run_id: execution.engine_run_id,
            status: execution.status.to_string(),
            input: execution.input,
            output: execution.output,
            error: execution.error,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            triggered_by: execution.triggered_by,
            created_at: execution.created_at,
        }
    }
}

/// Lists executions for the tenant, newest first.
#[utoipa::path(
    get,
    path = "/executions",
    tag = "Executions",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated executions", body = Vec<ExecutionResponse>)
    )
)]
async fn list_executions(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, limit) = params.resolve();
    match state.executions.list(principal.tenant_id, page, limit).await {
        Ok(page) => Json(Paginated::from_page(page, ExecutionResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Fetches one execution.
#[utoipa::path(
    get,
    path = "/executions/{id}",
    tag = "Executions",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "The execution", body = ExecutionResponse),
        (status = 404, description = "Unknown execution", body = ErrorBody)
    )
)]
async fn get_execution(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.executions.get(principal.tenant_id, id).await {
        Ok(execution) => Json(ExecutionResponse::from(execution)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Cancels a pending or running execution.
#[utoipa::path(
    post,
    path = "/executions/{id}/cancel",
    tag = "Executions",
    params(("id" = Uuid, Path, description = "Execution id")),
    responses(
        (status = 200, description = "Cancelled execution", body = ExecutionResponse),
        (status = 400, description = "Execution is terminal", body = ErrorBody),
        (status = 404, description = "Unknown execution", body = ErrorBody),
        (status = 503, description = "Engine unavailable", body = ErrorBody)
    )
)]
async fn cancel_execution(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.executions.cancel(principal.tenant_id, id).await {
        Ok(execution) => Json(ExecutionResponse::from(execution)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_executions))
        .routes(routes!(get_execution))
        .routes(routes!(cancel_execution))
}
