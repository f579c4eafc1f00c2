use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use orchestrix_common::alert::Alert;

use crate::api::pagination::PageParams;
use crate::api::{domain_error_response, ErrorBody, Paginated};
use crate::logging::TraceId;
use crate::middleware::Principal;
use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    /// critical / high / warning / medium / low / info
    pub severity: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// open / triggered / acknowledged / resolved
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acknowledged_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_by_rule_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triggered_workflow_execution_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl From<Alert> for AlertResponse {
    fn from(alert: Alert) -> Self {
        Self {
            id: alert.id,
            workflow_id: alert.workflow_id,
            execution_id: alert.execution_id,
            severity: alert.severity.to_string(),
            title: alert.title,
            message: alert.message,
            status: alert.status.to_string(),
            acknowledged_at: alert.acknowledged_at,
            acknowledged_by: alert.acknowledged_by,
            resolved_at: alert.resolved_at,
            resolved_by: alert.resolved_by,
            triggered_by_rule_id: alert.triggered_by_rule_id,
            triggered_workflow_execution_id: alert.triggered_workflow_execution_id,
            source: alert.source,
            metadata: alert.metadata,
            created_at: alert.created_at,
        }
    }
}

/// Lists alerts for the tenant, newest first.
#[utoipa::path(
    get,
    path = "/alerts",
    tag = "Alerts",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated alerts", body = Vec<AlertResponse>)
    )
)]
async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, limit) = params.resolve();
    match state.alerts.list(principal.tenant_id, page, limit).await {
        Ok(page) => Json(Paginated::from_page(page, AlertResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Fetches one alert.
#[utoipa::path(
    get,
    path = "/alerts/{id}",
    tag = "Alerts",
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 200, description = "The alert", body = AlertResponse),
        (status = 404, description = "Unknown alert", body = ErrorBody)
    )
)]
async fn get_alert(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.alerts.get(principal.tenant_id, id).await {
        Ok(alert) => Json(AlertResponse::from(alert)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Acknowledges an open or triggered alert.
#[utoipa::path(
    post,
    path = "/alerts/{id}/acknowledge",
    tag = "Alerts",
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Acknowledged alert", body = AlertResponse),
        (status = 400, description = "Alert is not acknowledgeable", body = ErrorBody),
        (status = 404, description = "Unknown alert", body = ErrorBody)
    )
)]
async fn acknowledge_alert(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state
        .alerts
        .acknowledge(principal.tenant_id, id, principal.user_id)
        .await
    {
        Ok(alert) => Json(AlertResponse::from(alert)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Resolves an alert; permitted from open, triggered, or acknowledged.
#[utoipa::path(
    post,
    path = "/alerts/{id}/resolve",
    tag = "Alerts",
    params(("id" = Uuid, Path, description = "Alert id")),
    responses(
        (status = 200, description = "Resolved alert", body = AlertResponse),
        (status = 400, description = "Alert is not resolvable", body = ErrorBody),
        (status = 404, description = "Unknown alert", body = ErrorBody)
    )
)]
async fn resolve_alert(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state
        .alerts
        .resolve(principal.tenant_id, id, principal.user_id)
        .await
    {
        Ok(alert) => Json(AlertResponse::from(alert)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_alerts))
        .routes(routes!(get_alert))
        .routes(routes!(acknowledge_alert))
        .routes(routes!(resolve_alert))
}
