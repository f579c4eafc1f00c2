use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use orchestrix_alert::evaluate::AlertRuleEvaluator;
use orchestrix_alert::WorkflowBridge;
use orchestrix_engine::{EngineClient, HttpEngineClient, TriggerBridge};
use orchestrix_storage::{
    AlertRuleStore, AlertStore, AuditStore, DefinitionStore, ExecutionStore, MetricStore, PgStore,
    TenantGate, WorkflowStore,
};

use orchestrix_server::app;
use orchestrix_server::config::ServerConfig;
use orchestrix_server::service::{
    AlertRuleService, AlertService, AuditService, ExecutionService, MetricService, WorkflowService,
};
use orchestrix_server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("orchestrix=info".parse()?),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/server.toml".to_string());
    let config = Arc::new(ServerConfig::load_or_default(&config_path)?);

    let store = Arc::new(PgStore::connect(&config.database.url).await?);

    let gate: Arc<dyn TenantGate> = store.clone();
    let metric_store: Arc<dyn MetricStore> = store.clone();
    let definition_store: Arc<dyn DefinitionStore> = store.clone();
    let rule_store: Arc<dyn AlertRuleStore> = store.clone();
    let alert_store: Arc<dyn AlertStore> = store.clone();
    let workflow_store: Arc<dyn WorkflowStore> = store.clone();
    let execution_store: Arc<dyn ExecutionStore> = store.clone();
    let audit_store: Arc<dyn AuditStore> = store.clone();

    let engine: Arc<dyn EngineClient> = Arc::new(HttpEngineClient::new(
        &config.engine.base_url,
        &config.engine.task_queue,
        config.engine.start_timeout_secs,
    )?);

    let bridge: Arc<dyn WorkflowBridge> = Arc::new(TriggerBridge::new(
        workflow_store.clone(),
        execution_store.clone(),
        alert_store.clone(),
        engine.clone(),
        &config.engine.dynamic_entrypoint,
        &config.engine.static_entrypoint,
    ));

    let evaluator = Arc::new(AlertRuleEvaluator::new(
        rule_store.clone(),
        alert_store.clone(),
        audit_store.clone(),
        Some(bridge),
    ));

    let audit = Arc::new(AuditService::new(audit_store, gate.clone()));
    let metrics = Arc::new(MetricService::new(
        metric_store,
        definition_store,
        gate.clone(),
        Some(evaluator),
        Duration::from_secs(config.evaluator.sample_timeout_secs),
        Duration::from_secs(config.evaluator.batch_timeout_secs),
    ));
    let workflows = Arc::new(WorkflowService::new(
        workflow_store,
        execution_store.clone(),
        engine.clone(),
        audit.clone(),
        gate.clone(),
        &config.engine.dynamic_entrypoint,
        &config.engine.static_entrypoint,
    ));
    let executions = Arc::new(ExecutionService::new(execution_store, engine, gate.clone()));
    let alerts = Arc::new(AlertService::new(alert_store, audit.clone(), gate.clone()));
    let alert_rules = Arc::new(AlertRuleService::new(rule_store, audit.clone(), gate));

    let state = AppState {
        metrics,
        workflows,
        executions,
        alerts,
        alert_rules,
        audit,
        start_time: Utc::now(),
        config: config.clone(),
    };

    let router = app::build_http_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "orchestrix server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
