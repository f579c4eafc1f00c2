pub mod alert_rules;
pub mod alerts;
pub mod audit;
pub mod definitions;
pub mod executions;
pub mod metrics;
pub mod pagination;
pub mod workflows;

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use orchestrix_common::Error;

use crate::logging::TraceId;
use crate::state::AppState;

/// Error body returned by every failing endpoint.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Optional structured data, e.g. `{field: reason}` for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<Value>,
}

/// Page envelope for list endpoints.
#[derive(Serialize)]
pub struct Paginated<T>
where
    T: Serialize,
{
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
}

impl<T: Serialize> Paginated<T> {
    pub fn from_page<U>(page: crate::service::Page<U>, map: impl Fn(U) -> T) -> Self {
        Self {
            items: page.items.into_iter().map(map).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
        }
    }
}

pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }),
    )
        .into_response()
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Validation(_)
        | Error::BatchTooLarge { .. }
        | Error::AlreadyAcknowledged
        | Error::AlreadyResolved
        | Error::CannotExecute
        | Error::CannotCancel
        | Error::Template(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized => StatusCode::UNAUTHORIZED,
        Error::Forbidden(_) | Error::TenantMismatch => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Cooldown => StatusCode::TOO_MANY_REQUESTS,
        Error::Store(_) | Error::Engine(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Renders a domain error as the standard error body; server-side failures
/// are logged with the request's trace id.
pub fn domain_error_response(trace_id: &str, err: &Error) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(trace_id = %trace_id, error = %err, "request failed");
    }

    let details = match err {
        Error::BatchTooLarge { max, got } => Some(json!({ "max": max, "got": got })),
        _ => None,
    };

    (
        status,
        Json(ErrorBody {
            code: err.code().to_string(),
            message: err.to_string(),
            details,
        }),
    )
        .into_response()
}

/// Service health and build information.
#[derive(Serialize, ToSchema)]
struct HealthResponse {
    version: String,
    uptime_secs: i64,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health", body = HealthResponse)
    )
)]
async fn health(
    Extension(_trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let uptime = (Utc::now() - state.start_time).num_seconds();
    Json(HealthResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: uptime,
    })
}

/// Routes served without a tenant principal.
pub fn public_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(health))
}

/// Tenant-scoped routes; the principal middleware runs in front of these.
pub fn protected_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(metrics::routes())
        .merge(definitions::routes())
        .merge(alert_rules::routes())
        .merge(alerts::routes())
        .merge(workflows::routes())
        .merge(executions::routes())
        .merge(audit::routes())
}
