use crate::state::AppState;
use crate::{api, logging, middleware as request_middleware};
use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Orchestrix API",
        description = "Multi-tenant observability and auto-remediation control plane",
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Metrics", description = "Metric ingestion and time-series queries"),
        (name = "Metric Definitions", description = "Per-tenant metric metadata"),
        (name = "Alert Rules", description = "Threshold alert rules"),
        (name = "Alerts", description = "Alert lifecycle"),
        (name = "Workflows", description = "Remediation workflows"),
        (name = "Executions", description = "Workflow executions"),
        (name = "Audit", description = "Append-only audit trail")
    )
)]
struct ApiDoc;

pub fn build_http_app(state: AppState) -> Router {
    let (public_router, public_spec) = api::public_routes().split_for_parts();
    let (protected_router, protected_spec) = api::protected_routes().split_for_parts();

    let mut merged_spec = ApiDoc::openapi();
    merged_spec.merge(public_spec);
    merged_spec.merge(protected_spec);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    public_router
        .merge(protected_router.layer(middleware::from_fn(
            request_middleware::principal_middleware,
        )))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", merged_spec))
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
