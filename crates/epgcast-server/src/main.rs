// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use epgcast_server::{build_router, fetcher_for, AppState, ServerConfig, UpdateCoordinator, UpdateScheduler};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.log_json);
    config.validate()?;

    std::fs::create_dir_all(&config.data_root)
        .map_err(|e| format!("create {}: {e}", config.data_root.display()))?;
    let fetcher = fetcher_for(&config.feed_source, config.fetch_timeout, config.retry.clone())
        .map_err(|e| e.to_string())?;
    let coordinator = Arc::new(
        UpdateCoordinator::new(fetcher, config.pipeline_options(), config.feed_cache_path())
            .with_lock_timeout(config.lock_timeout),
    );
    let scheduler = UpdateScheduler::start(
        coordinator.clone(),
        config.update_interval,
        config.run_on_start,
    );

    let app = build_router(AppState::new(coordinator));
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| format!("bind {} failed: {e}", config.bind))?;
    info!(
        bind = %config.bind,
        data_root = %config.data_root.display(),
        public_prefix = %config.public_prefix,
        "epgcast-server listening"
    );
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| format!("server failed: {e}"));

    info!("waiting for in-flight update before exit");
    scheduler.stop().await;
    served
}
