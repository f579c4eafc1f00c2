use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use orchestrix_common::workflow::Workflow;
use orchestrix_common::Error;

use crate::api::executions::ExecutionResponse;
use crate::api::pagination::PageParams;
use crate::api::{domain_error_response, ErrorBody, Paginated};
use crate::logging::TraceId;
use crate::middleware::Principal;
use crate::service::workflow::{CreateWorkflowInput, UpdateWorkflowInput};
use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct WorkflowResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[schema(value_type = Object)]
    pub definition: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// draft / active / inactive
    pub status: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Workflow> for WorkflowResponse {
    fn from(workflow: Workflow) -> Self {
        Self {
            id: workflow.id,
            name: workflow.name,
            description: workflow.description,
            definition: workflow.definition,
            schedule: workflow.schedule,
            status: workflow.status.to_string(),
            version: workflow.version,
            created_at: workflow.created_at,
            updated_at: workflow.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub definition: Value,
    pub schedule: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWorkflowRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[schema(value_type = Object)]
    pub definition: Option<Value>,
    pub schedule: Option<String>,
    /// draft / active / inactive; activating requires a step list
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ExecuteWorkflowRequest {
    #[serde(default)]
    #[schema(value_type = Object)]
    pub input: Value,
}

/// Lists workflows for the tenant, newest first.
#[utoipa::path(
    get,
    path = "/workflows",
    tag = "Workflows",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated workflows", body = Vec<WorkflowResponse>)
    )
)]
async fn list_workflows(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, limit) = params.resolve();
    match state.workflows.list(principal.tenant_id, page, limit).await {
        Ok(page) => Json(Paginated::from_page(page, WorkflowResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Fetches one workflow.
#[utoipa::path(
    get,
    path = "/workflows/{id}",
    tag = "Workflows",
    params(("id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 200, description = "The workflow", body = WorkflowResponse),
        (status = 404, description = "Unknown workflow", body = ErrorBody)
    )
)]
async fn get_workflow(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.workflows.get(principal.tenant_id, id).await {
        Ok(workflow) => Json(WorkflowResponse::from(workflow)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Creates a workflow in draft status.
#[utoipa::path(
    post,
    path = "/workflows",
    tag = "Workflows",
    request_body = CreateWorkflowRequest,
    responses(
        (status = 201, description = "Workflow created", body = WorkflowResponse),
        (status = 400, description = "Invalid workflow", body = ErrorBody)
    )
)]
async fn create_workflow(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Json(body): Json<CreateWorkflowRequest>,
) -> Response {
    let input = CreateWorkflowInput {
        name: body.name,
        description: body.description,
        definition: body.definition,
        schedule: body.schedule,
    };

    match state
        .workflows
        .create(principal.tenant_id, principal.user_id, input)
        .await
    {
        Ok(workflow) => (
            StatusCode::CREATED,
            Json(WorkflowResponse::from(workflow)),
        )
            .into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Updates the provided fields of a workflow.
#[utoipa::path(
    put,
    path = "/workflows/{id}",
    tag = "Workflows",
    params(("id" = Uuid, Path, description = "Workflow id")),
    request_body = UpdateWorkflowRequest,
    responses(
        (status = 200, description = "Updated workflow", body = WorkflowResponse),
        (status = 400, description = "Invalid update", body = ErrorBody),
        (status = 404, description = "Unknown workflow", body = ErrorBody)
    )
)]
async fn update_workflow(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateWorkflowRequest>,
) -> Response {
    let status = match body.status.as_deref().map(str::parse).transpose() {
        Ok(status) => status,
        Err(e) => return domain_error_response(&trace_id, &Error::Validation(e)),
    };

    let input = UpdateWorkflowInput {
        name: body.name,
        description: body.description,
        definition: body.definition,
        schedule: body.schedule,
        status,
    };

    match state
        .workflows
        .update(principal.tenant_id, id, principal.user_id, input)
        .await
    {
        Ok(workflow) => Json(WorkflowResponse::from(workflow)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Deletes a workflow.
#[utoipa::path(
    delete,
    path = "/workflows/{id}",
    tag = "Workflows",
    params(("id" = Uuid, Path, description = "Workflow id")),
    responses(
        (status = 204, description = "Workflow deleted"),
        (status = 404, description = "Unknown workflow", body = ErrorBody)
    )
)]
async fn delete_workflow(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state
        .workflows
        .delete(principal.tenant_id, id, principal.user_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Starts an execution of an active workflow on the engine.
#[utoipa::path(
    post,
    path = "/workflows/{id}/execute",
    tag = "Workflows",
    params(("id" = Uuid, Path, description = "Workflow id")),
    request_body = ExecuteWorkflowRequest,
    responses(
        (status = 202, description = "Execution started", body = ExecutionResponse),
        (status = 400, description = "Workflow is not active", body = ErrorBody),
        (status = 404, description = "Unknown workflow", body = ErrorBody),
        (status = 503, description = "Engine unavailable", body = ErrorBody)
    )
)]
async fn execute_workflow(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ExecuteWorkflowRequest>,
) -> Response {
    match state
        .workflows
        .execute(principal.tenant_id, id, principal.user_id, body.input)
        .await
    {
        Ok(execution) => (
            StatusCode::ACCEPTED,
            Json(ExecutionResponse::from(execution)),
        )
            .into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Lists executions of one workflow, newest first.
#[utoipa::path(
    get,
    path = "/workflows/{id}/executions",
    tag = "Workflows",
    params(
        ("id" = Uuid, Path, description = "Workflow id"),
        PageParams
    ),
    responses(
        (status = 200, description = "Paginated executions", body = Vec<ExecutionResponse>)
    )
)]
async fn list_workflow_executions(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, limit) = params.resolve();
    match state
        .workflows
        .list_executions(principal.tenant_id, id, page, limit)
        .await
    {
        Ok(page) => Json(Paginated::from_page(page, ExecutionResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_workflows, create_workflow))
        .routes(routes!(get_workflow, update_workflow, delete_workflow))
        .routes(routes!(execute_workflow))
        .routes(routes!(list_workflow_executions))
}
