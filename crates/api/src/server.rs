//! Application state, router and server lifecycle

use agent_hub_common::{Result, SystemConfig};
use agent_hub_orchestrator::{
    AgentRegistry, ChatCompletionsClient, CompletionBackend, Dispatcher, EmailIntake, EventHub,
    Orchestrator, TaskService,
};
use agent_hub_storage::TaskStore;
use anyhow::Context;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::middleware::{get_tracing_layer, logging_middleware, require_api_key};
use crate::routes::{agents, audit, health, tasks, webhook, ws};

/// Shared handles for every request handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SystemConfig>,
    pub store: Arc<dyn TaskStore>,
    pub registry: Arc<AgentRegistry>,
    pub events: Arc<EventHub>,
    pub dispatcher: Arc<Dispatcher>,
    pub service: Arc<TaskService>,
    pub intake: Arc<EmailIntake>,
}

impl AppState {
    /// Wire the pipeline around an existing store and completion backend.
    /// Starts the dispatcher workers, so it must run inside a tokio runtime.
    pub fn new(
        config: SystemConfig,
        store: Arc<dyn TaskStore>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Result<Self> {
        let registry = Arc::new(AgentRegistry::from_profiles(config.agents.clone())?);
        let events = Arc::new(EventHub::new(config.dispatcher.event_buffer));

        let orchestrator = Arc::new(
            Orchestrator::new(
                Arc::clone(&store),
                Arc::clone(&registry),
                backend,
                Arc::clone(&events),
            )
            .with_max_context_chars(config.llm.max_context_chars),
        );
        let dispatcher = Arc::new(Dispatcher::start(orchestrator, &config.dispatcher));
        let service = Arc::new(TaskService::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            Arc::clone(&dispatcher),
        ));
        let intake = Arc::new(EmailIntake::new(&config.intake, Arc::clone(&service)));

        Ok(Self {
            config: Arc::new(config),
            store,
            registry,
            events,
            dispatcher,
            service,
            intake,
        })
    }

    /// Connect storage and the LLM client described by `config`
    pub async fn initialize(config: SystemConfig) -> Result<Self> {
        let store = agent_hub_storage::initialize_storage(&config.storage).await?;
        let backend = Arc::new(ChatCompletionsClient::new(&config.llm)?);
        info!(
            provider = %config.llm.provider,
            agents = config.agents.len(),
            "LLM backend ready"
        );
        Self::new(config, store, backend)
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/agents", get(agents::list_agents))
        .route("/tasks", post(tasks::create_task).get(tasks::list_tasks))
        .route("/tasks/:id", get(tasks::get_task))
        .route("/tasks/:id/messages", get(tasks::list_messages))
        .route("/audit", get(audit::list_audit))
        .route("/audit/export.csv", get(audit::export_audit_csv))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let cors = if state.config.server.cors_permissive {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhooks/email", post(webhook::inbound_email))
        .route("/ws", get(ws::websocket_handler))
        .nest("/api", api)
        .layer(middleware::from_fn(logging_middleware))
        .layer(get_tracing_layer())
        .layer(cors)
        .with_state(state)
}

/// Bind, serve until Ctrl-C / SIGTERM, then drain queued tasks
pub async fn serve(config: SystemConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::initialize(config).await?;
    let dispatcher = Arc::clone(&state.dispatcher);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("agent-hub listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failed")?;

    info!("HTTP server stopped, draining task queue");
    dispatcher.shutdown().await;
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
