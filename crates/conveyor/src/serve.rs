// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `conveyor serve` command implementation.
//!
//! Wires the configured driver, SQLite store, channel registry, dispatcher,
//! and title generator into the gateway server. Supports graceful shutdown
//! via signal handlers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use conveyor_channel::{ChannelRegistry, DuplexChannel, ForgeChannel, ForgeChannelConfig};
use conveyor_config::model::{ConveyorConfig, DriverKind, WorkspaceStorage};
use conveyor_core::{ConveyorError, Driver};
use conveyor_dispatch::{Dispatcher, SkillLibrary, TitleGenerator};
use conveyor_driver::{
    DockerDriver, DockerDriverConfig, KubeDriver, KubeDriverConfig, StaticDriver,
    WorkspaceBacking,
};
use conveyor_gateway::AppState;
use conveyor_store::Store;
use conveyor_worker::WorkerClient;

use crate::shutdown;

/// Runs the `conveyor serve` command.
pub async fn run_serve(config: ConveyorConfig) -> Result<(), ConveyorError> {
    init_tracing(&config.server.log_level);

    info!("starting conveyor serve");

    let store = Arc::new(Store::open(&config.store.database_path).await?);
    info!(path = config.store.database_path.as_str(), "store opened");

    let driver = build_driver(&config).await?;

    let skills = Arc::new(SkillLibrary::new(&config.worker.skills_dir));
    let dispatcher = Arc::new(Dispatcher::new(store.clone(), driver.clone(), skills));

    let mut registry = ChannelRegistry::new();
    registry.register(Arc::new(DuplexChannel::new()));
    if let Some(secret) = &config.forge.webhook_secret {
        registry.register(Arc::new(ForgeChannel::new(ForgeChannelConfig {
            webhook_secret: secret.clone(),
            api_token: config.forge.api_token.clone(),
            default_skills: config.forge.default_skills.clone(),
        })));
        info!("forge channel enabled");
    } else {
        info!("forge channel skipped (no webhook_secret configured)");
    }

    let titles = match &config.titles.api_key {
        Some(api_key) => {
            info!(model = config.titles.model.as_str(), "title generator enabled");
            Some(Arc::new(TitleGenerator::new(
                api_key.clone(),
                config.titles.base_url.clone(),
                config.titles.model.clone(),
            )))
        }
        None => {
            info!("title generator disabled (no api key configured)");
            None
        }
    };

    let cancel = shutdown::install_signal_handler();

    let state = AppState {
        store: store.clone(),
        dispatcher,
        registry: Arc::new(registry),
        driver: driver.clone(),
        worker: WorkerClient::new(),
        titles,
    };

    conveyor_gateway::start_server(&config.server.host, config.server.port, state, cancel)
        .await?;

    // Tear down process-wide resources: reaper/containers, then the WAL.
    if let Err(e) = driver.shutdown().await {
        warn!(error = %e, "driver shutdown failed");
    }
    store.close().await?;

    info!("conveyor serve shutdown complete");
    Ok(())
}

/// Build the configured driver shape.
async fn build_driver(config: &ConveyorConfig) -> Result<Arc<dyn Driver>, ConveyorError> {
    let driver_config = &config.driver;
    let readiness_timeout = Duration::from_secs(driver_config.readiness_timeout_secs);

    let driver: Arc<dyn Driver> = match driver_config.kind {
        DriverKind::Static => {
            info!(url = driver_config.static_worker_url.as_str(), "static driver");
            Arc::new(StaticDriver::new(
                &driver_config.static_worker_url,
                readiness_timeout,
            ))
        }
        DriverKind::Docker => {
            info!(image = driver_config.worker_image.as_str(), "docker driver");
            Arc::new(DockerDriver::new(DockerDriverConfig {
                worker_image: driver_config.worker_image.clone(),
                worker_port: driver_config.worker_port,
                workspace_root: driver_config.workspace_root.clone().into(),
                worker_env: config.worker.env.clone(),
                readiness_timeout,
            })?)
        }
        DriverKind::Kube => {
            info!(
                namespace = driver_config.namespace.as_str(),
                image = driver_config.worker_image.as_str(),
                "kubernetes driver"
            );
            let workspace = match driver_config.workspace_storage {
                WorkspaceStorage::Ephemeral => WorkspaceBacking::Ephemeral,
                WorkspaceStorage::Persistent => WorkspaceBacking::Persistent {
                    storage_class: driver_config.storage_class.clone(),
                },
            };
            let kube = Arc::new(
                KubeDriver::connect(KubeDriverConfig {
                    namespace: driver_config.namespace.clone(),
                    worker_image: driver_config.worker_image.clone(),
                    worker_port: driver_config.worker_port,
                    workspace,
                    cpu_request: driver_config.cpu_request.clone(),
                    cpu_limit: driver_config.cpu_limit.clone(),
                    memory_request: driver_config.memory_request.clone(),
                    memory_limit: driver_config.memory_limit.clone(),
                    idle_ttl: Duration::from_secs(driver_config.idle_ttl_secs),
                    readiness_timeout,
                    worker_env: config.worker.env.clone(),
                })
                .await?,
            );
            kube.spawn_reaper();
            kube
        }
    };
    Ok(driver)
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("conveyor={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
