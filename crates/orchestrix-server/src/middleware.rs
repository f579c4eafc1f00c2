use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::api::error_response;
use crate::logging::TraceId;

/// Tenant header injected by the identity layer in front of this service.
static TENANT_ID_HEADER: HeaderName = HeaderName::from_static("x-tenant-id");

/// Optional acting-user header injected by the identity layer.
static USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Authenticated principal resolved from request headers.
///
/// Identity validation itself is external; this service trusts the headers
/// the gateway stamps after authentication and scopes every operation to
/// the principal's tenant.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
}

fn parse_uuid_header(headers: &HeaderMap, name: &HeaderName) -> Option<Uuid> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
}

/// Middleware resolving the [`Principal`] for all tenant-scoped routes.
///
/// Requests without a valid `x-tenant-id` are rejected with 401.
pub async fn principal_middleware(mut req: Request<Body>, next: Next) -> Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let tenant_id = match parse_uuid_header(req.headers(), &TENANT_ID_HEADER) {
        Some(id) if !id.is_nil() => id,
        _ => {
            tracing::warn!(
                trace_id = %trace_id,
                "request rejected: missing or invalid x-tenant-id header"
            );
            return error_response(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "missing or invalid tenant identity",
            );
        }
    };

    let user_id = parse_uuid_header(req.headers(), &USER_ID_HEADER);

    req.extensions_mut().insert(Principal { tenant_id, user_id });
    next.run(req).await
}
