//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::config::runtime::SharedConfig;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

/// Completes when SIGTERM or SIGINT (Ctrl+C) arrives.
pub async fn shutdown_signal() {
    let sigterm = async {
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

    tokio::select! {
        _ = sigterm => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for SIGINT");
            }
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP and reloads the configuration.
///
/// The check-in signing key, royalty split, gateway endpoint and listen
/// address are only read at startup. Returns a Notify that stops the task.
pub fn spawn_config_reload_handler(
    config: SharedConfig,
    config_loader: Arc<ConfigLoader>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded_config) => {
                            loaded_config.apply_to(&config).await;
                            tracing::info!("Configuration reloaded successfully");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload configuration");
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Config reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
