//! keel scheduler
//!
//! Runs the plan engine for one stateful service. Offers and task statuses
//! are fed to a single worker; the HTTP API exposes the plans and lets an
//! operator steer them.

use std::sync::Arc;

use anyhow::{Context, Result};
use keel_id::FrameworkId;
use keel_scheduler::{
    api, config,
    driver::RecordingDriver,
    spec::ServiceSpec,
    state::AppState,
    store::{MemoryStateStore, SqliteStateStore, StateStore},
    worker::{SchedulerEvent, SchedulerWorker, EVENT_BUFFER},
    Scheduler,
};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to KEEL_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(framework = %config.framework_name, "Starting keel scheduler");
    info!(listen_addr = %config.listen_addr, dev_mode = config.dev_mode, "Configuration loaded");

    let spec_path = config
        .service_spec
        .as_ref()
        .context("KEEL_SERVICE_SPEC must point to a service spec")?;
    let spec = ServiceSpec::load(spec_path)
        .with_context(|| format!("failed to load service spec {}", spec_path.display()))?;

    let store: Arc<dyn StateStore> = match &config.data_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join("state.db");
            info!(path = %path.display(), "Opening state store");
            Arc::new(SqliteStateStore::open(&path)?)
        }
        None => {
            warn!("KEEL_DATA_DIR not set, scheduler state will not survive a restart");
            Arc::new(MemoryStateStore::new())
        }
    };

    let framework_id = match store.fetch_framework_id()? {
        Some(id) => {
            info!(framework_id = %id, "Re-registering with stored framework ID");
            id
        }
        None => FrameworkId::new(),
    };

    let driver = Arc::new(RecordingDriver::new());
    let scheduler = Scheduler::new(spec, store, driver, config.scheduler_options())?;
    let scheduler = Arc::new(Mutex::new(scheduler));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

    let worker = SchedulerWorker::new(scheduler.clone(), events_rx, config.tick_interval);
    let mut worker_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { worker.run(shutdown_rx).await }
    });

    events_tx
        .send(SchedulerEvent::Registered(framework_id))
        .await
        .context("scheduler worker exited before registration")?;

    let state = AppState::new(scheduler, events_tx, config.dev_mode);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    let mut fatal = None;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = &mut worker_handle => {
            match result {
                Ok(Ok(())) => info!("Scheduler worker exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "Scheduler worker failed");
                    fatal = Some(e);
                }
                Err(e) => error!(error = %e, "Scheduler worker panicked"),
            }
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    if !worker_handle.is_finished() {
        info!("Waiting for scheduler worker to shut down...");
        let shutdown_timeout = std::time::Duration::from_secs(10);
        if let Err(e) = tokio::time::timeout(shutdown_timeout, worker_handle).await {
            warn!(error = %e, "Scheduler worker did not shut down in time");
        }
    }

    if let Some(e) = fatal {
        return Err(e.into());
    }
    info!("Scheduler shutdown complete");
    Ok(())
}
