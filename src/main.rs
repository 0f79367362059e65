//! Thread agent - tool-using chat agent over HTTP
//!
//! Each chat request runs a respond/act graph against a language model and
//! persists the thread so later requests resume the same conversation.

mod api;
mod config;
mod llm;
mod runtime;
mod service;
mod state_machine;
mod store;
mod tools;

use api::{create_app, AppState};
use clap::Parser;
use config::ServerArgs;
use llm::LlmConfig;
use runtime::{
    GraphRunner, LlmClient, ProductionRunner, RunLimits, ServiceLlmClient, ToolExecutor,
    ToolRegistryExecutor,
};
use service::ChatService;
use std::net::SocketAddr;
use std::sync::Arc;
use tools::ToolRegistry;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "thread_agent=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let args = ServerArgs::parse();

    // Missing credentials abort startup; an unreachable database does not
    let opened = store::open_store(args.persistence_mode).await?;
    let persistence = opened.status();
    tracing::info!(persistence, "Thread store selected");

    let llm_service = LlmConfig::from_env().build()?;
    match &llm_service {
        Some(service) => tracing::info!(model = %service.model_id(), "LLM initialized"),
        None => tracing::warn!("No LLM configured. Set OPENAI_API_KEY or LLM_GATEWAY."),
    }

    let llm: Arc<dyn LlmClient> = Arc::new(ServiceLlmClient::new(llm_service));
    let tools: Arc<dyn ToolExecutor> =
        Arc::new(ToolRegistryExecutor::new(ToolRegistry::standard()));
    let limits = RunLimits {
        max_cycles: args.max_cycles,
        model_timeout: args.model_timeout(),
        tool_timeout: args.tool_timeout(),
    };
    let runner: ProductionRunner = GraphRunner::new(llm, tools, args.system_prompt.clone(), limits);
    let state = AppState::new(ChatService::new(opened.store.clone(), runner), persistence);

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    tracing::info!("Thread agent listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(postgres) = opened.postgres {
        tracing::info!("Closing PostgreSQL pool");
        postgres.close().await;
    }

    Ok(())
}

/// Returns once the process is asked to stop
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        () = interrupt => tracing::info!("Received SIGINT - shutting down"),
        () = terminate => tracing::info!("Received SIGTERM - shutting down"),
    }
}
