mod api;
mod middleware;
mod scheduler;

use std::net::SocketAddr;
use std::sync::Arc;

use pricewatch_core::{Environment, JobRegistry};
use pricewatch_db::{RpcJobLock, StoreClient};
use pricewatch_jobs::{CircuitBreakerRegistry, CircuitDefaults, JobDeps, Orchestrator};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, rate_limit_state, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Arc::new(pricewatch_core::load_app_config()?);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = match &config.jobs_path {
        Some(path) => JobRegistry::load(path)?,
        None => JobRegistry::builtin(),
    };
    tracing::info!(
        jobs = registry.get_all_job_configs().len(),
        env = %config.env,
        "job registry loaded"
    );

    let store = StoreClient::from_app_config(&config)?;
    let orchestrator = Orchestrator::new(
        Arc::new(registry),
        Arc::new(CircuitBreakerRegistry::new(CircuitDefaults::from_app_config(
            &config,
        ))),
        Arc::new(RpcJobLock::new(store.clone())),
        Arc::new(JobDeps::new(store.clone())),
    );

    let _scheduler = if config.scheduler_enabled {
        Some(scheduler::build_scheduler(orchestrator.clone()).await?)
    } else {
        tracing::info!("scheduler disabled; jobs run only on request");
        None
    };

    let auth = AuthState::from_env(matches!(config.env, Environment::Development))?;
    let app = build_app(
        AppState {
            orchestrator,
            store,
        },
        auth,
        rate_limit_state(&config),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
