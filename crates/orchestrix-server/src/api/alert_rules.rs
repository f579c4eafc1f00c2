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

use orchestrix_common::rule::AlertRule;
use orchestrix_common::Error;

use crate::api::pagination::PageParams;
use crate::api::{domain_error_response, ErrorBody, Paginated};
use crate::logging::TraceId;
use crate::middleware::Principal;
use crate::service::alert_rule::{CreateAlertRuleInput, UpdateAlertRuleInput};
use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct AlertRuleResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub enabled: bool,
    pub condition_type: String,
    #[schema(value_type = Object)]
    pub condition_config: Value,
    /// critical / high / warning / medium / low / info
    pub severity: String,
    pub alert_title_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_message_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_workflow_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub trigger_input_template: Option<Value>,
    pub cooldown_seconds: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AlertRule> for AlertRuleResponse {
    fn from(rule: AlertRule) -> Self {
        Self {
            id: rule.id,
            name: rule.name,
            description: rule.description,
            enabled: rule.enabled,
            condition_type: rule.condition_type,
            condition_config: rule.condition_config,
            severity: rule.severity.to_string(),
            alert_title_template: rule.alert_title_template,
            alert_message_template: rule.alert_message_template,
            trigger_workflow_id: rule.trigger_workflow_id,
            trigger_input_template: rule.trigger_input_template,
            cooldown_seconds: rule.cooldown_seconds,
            last_triggered_at: rule.last_triggered_at,
            created_at: rule.created_at,
            updated_at: rule.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateAlertRuleRequest {
    pub name: String,
    pub description: Option<String>,
    /// Only `threshold` rules are evaluatable; other types round-trip
    pub condition_type: String,
    #[schema(value_type = Object)]
    pub condition_config: Value,
    /// critical / high / warning / medium / low / info
    pub severity: String,
    pub alert_title_template: String,
    pub alert_message_template: Option<String>,
    pub trigger_workflow_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub trigger_input_template: Option<Value>,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: i32,
}

fn default_cooldown_seconds() -> i32 {
    300
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAlertRuleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub enabled: Option<bool>,
    pub condition_type: Option<String>,
    #[schema(value_type = Object)]
    pub condition_config: Option<Value>,
    pub severity: Option<String>,
    pub alert_title_template: Option<String>,
    pub alert_message_template: Option<String>,
    pub trigger_workflow_id: Option<Uuid>,
    #[schema(value_type = Object)]
    pub trigger_input_template: Option<Value>,
    pub cooldown_seconds: Option<i32>,
}

/// Lists alert rules for the tenant, newest first.
#[utoipa::path(
    get,
    path = "/alert-rules",
    tag = "Alert Rules",
    params(PageParams),
    responses(
        (status = 200, description = "Paginated alert rules", body = Vec<AlertRuleResponse>)
    )
)]
async fn list_alert_rules(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Response {
    let (page, limit) = params.resolve();
    match state
        .alert_rules
        .list(principal.tenant_id, page, limit)
        .await
    {
        Ok(page) => Json(Paginated::from_page(page, AlertRuleResponse::from)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Fetches one alert rule.
#[utoipa::path(
    get,
    path = "/alert-rules/{id}",
    tag = "Alert Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 200, description = "The rule", body = AlertRuleResponse),
        (status = 404, description = "Unknown rule", body = ErrorBody)
    )
)]
async fn get_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.alert_rules.get(principal.tenant_id, id).await {
        Ok(rule) => Json(AlertRuleResponse::from(rule)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Creates an alert rule (enabled by default).
#[utoipa::path(
    post,
    path = "/alert-rules",
    tag = "Alert Rules",
    request_body = CreateAlertRuleRequest,
    responses(
        (status = 201, description = "Rule created", body = AlertRuleResponse),
        (status = 400, description = "Invalid rule", body = ErrorBody)
    )
)]
async fn create_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Json(body): Json<CreateAlertRuleRequest>,
) -> Response {
    let severity = match body.severity.parse() {
        Ok(severity) => severity,
        Err(e) => return domain_error_response(&trace_id, &Error::Validation(e)),
    };

    let input = CreateAlertRuleInput {
        name: body.name,
        description: body.description,
        condition_type: body.condition_type,
        condition_config: body.condition_config,
        severity,
        alert_title_template: body.alert_title_template,
        alert_message_template: body.alert_message_template,
        trigger_workflow_id: body.trigger_workflow_id,
        trigger_input_template: body.trigger_input_template,
        cooldown_seconds: body.cooldown_seconds,
    };

    match state
        .alert_rules
        .create(principal.tenant_id, principal.user_id, input)
        .await
    {
        Ok(rule) => (
            StatusCode::CREATED,
            Json(AlertRuleResponse::from(rule)),
        )
            .into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Updates the provided fields of an alert rule.
#[utoipa::path(
    put,
    path = "/alert-rules/{id}",
    tag = "Alert Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    request_body = UpdateAlertRuleRequest,
    responses(
        (status = 200, description = "Updated rule", body = AlertRuleResponse),
        (status = 404, description = "Unknown rule", body = ErrorBody)
    )
)]
async fn update_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateAlertRuleRequest>,
) -> Response {
    let severity = match body.severity.as_deref().map(str::parse).transpose() {
        Ok(severity) => severity,
        Err(e) => return domain_error_response(&trace_id, &Error::Validation(e)),
    };

    let input = UpdateAlertRuleInput {
        name: body.name,
        description: body.description,
        enabled: body.enabled,
        condition_type: body.condition_type,
        condition_config: body.condition_config,
        severity,
        alert_title_template: body.alert_title_template,
        alert_message_template: body.alert_message_template,
        trigger_workflow_id: body.trigger_workflow_id,
        trigger_input_template: body.trigger_input_template,
        cooldown_seconds: body.cooldown_seconds,
    };

    match state
        .alert_rules
        .update(principal.tenant_id, id, principal.user_id, input)
        .await
    {
        Ok(rule) => Json(AlertRuleResponse::from(rule)).into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

/// Deletes an alert rule.
#[utoipa::path(
    delete,
    path = "/alert-rules/{id}",
    tag = "Alert Rules",
    params(("id" = Uuid, Path, description = "Rule id")),
    responses(
        (status = 204, description = "Rule deleted"),
        (status = 404, description = "Unknown rule", body = ErrorBody)
    )
)]
async fn delete_alert_rule(
    Extension(trace_id): Extension<TraceId>,
    Extension(principal): Extension<Principal>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state
        .alert_rules
        .delete(principal.tenant_id, id, principal.user_id)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => domain_error_response(&trace_id, &e),
    }
}

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(list_alert_rules, create_alert_rule))
        .routes(routes!(get_alert_rule, update_alert_rule, delete_alert_rule))
}
