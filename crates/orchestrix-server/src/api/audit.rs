use axum::extract::{Extension, Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};
use uuid::Uuid;

use orchestrix_common::audit::AuditLog;

use crate::api::pagination::PageParams;
use crate::api::{domain_error_response, ErrorBody, Paginated};
use crate::logging::TraceId;
use crate::middleware::Principal;
use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub event_type: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Uuid>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub new_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLog> for AuditLogResponse {
    fn from(log: AuditLog) -> Self {
        Self {
            id: log.id,
            user_id: log.user_id,
            event_type: log.event_type,
            resource_type: log.resource_type,
            resource_id: log.resource_id,
            action: log.action,
            old_value: log.old_value,
            new_value: log.new_value,
            ip_address: log.ip_address,
            user_agent: log.user_agent,
            created_at: log.created_at,
        }
    }
}

/// Lists the tenant's audit trail, newest first.
#[utoipa::path(
    get,
    path = "/audit-logs",
    tag = "Audit",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated audit entries", body = Vec<AuditLogResponse>)
    )
)]
async fn list_audit_logs(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, limit) = params.resolve();
    match state.audit.list(principal.tenant_id, page, limit).await {
        Ok(page) => Json(Paginated::from_page(page, AuditLogResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Fetches one audit entry.
#[utoipa::path(
    get,
    path = "/audit-logs/{id}",
    tag = "Audit",
    params(("id" = Uuid, Path, description = "Audit entry id")),
    responses(
        (status = 200, description = "The audit entry", body = AuditLogResponse),
        (status = 404, description = "Unknown audit entry", body = ErrorBody)
    )
)]
async fn get_audit_log(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.audit.get(principal.tenant_id, id).await {
        Ok(log) => Json(AuditLogResponse::from(log)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_audit_logs))
        .routes(routes!(get_audit_log))
}
