// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local container driver: one Docker container per session.
//!
//! Each session gets a container running the worker image with its workspace
//! directory bind-mounted from the host. The worker port is published on an
//! ephemeral loopback port discovered via container inspect.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions};
use bollard::models::{HostConfig, PortBinding, PortMap};
use bollard::Docker;
use dashmap::DashMap;
use tracing::{debug, info, warn};

use conveyor_core::{ConveyorError, Driver, Endpoint};
use conveyor_worker::WorkerClient;

use crate::{names, wait_until_healthy};

/// Settings for the Docker driver.
#[derive(Debug, Clone)]
pub struct DockerDriverConfig {
    /// Worker image to run.
    pub worker_image: String,
    /// Port the worker listens on inside the container.
    pub worker_port: u16,
    /// Host directory holding per-session workspace bind mounts.
    pub workspace_root: PathBuf,
    /// Environment propagated into each container.
    pub worker_env: HashMap<String, String>,
    /// Cold-create readiness timeout.
    pub readiness_timeout: Duration,
}

pub struct DockerDriver {
    docker: Arc<Docker>,
    config: DockerDriverConfig,
    endpoints: DashMap<String, Endpoint>,
    worker: WorkerClient,
}

impl DockerDriver {
    /// Connect to the local Docker daemon.
    pub fn new(config: DockerDriverConfig) -> Result<Self, ConveyorError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| ConveyorError::Driver {
            message: format!("failed to connect to Docker: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(Self {
            docker: Arc::new(docker),
            config,
            endpoints: DashMap::new(),
            worker: WorkerClient::new(),
        })
    }

    async fn create_container(&self, session_id: &str) -> Result<Endpoint, ConveyorError> {
        let name = names::worker_name(session_id);

        // A stale container under the same name blocks creation; clear it.
        let _ = self
            .docker
            .remove_container(
                &name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        let workspace = self.config.workspace_root.join(session_id);
        std::fs::create_dir_all(&workspace).map_err(|e| ConveyorError::Driver {
            message: format!("failed to create workspace dir: {e}"),
            source: Some(Box::new(e)),
        })?;
        let workspace = workspace.canonicalize().map_err(|e| ConveyorError::Driver {
            message: format!("failed to resolve workspace dir: {e}"),
            source: Some(Box::new(e)),
        })?;

        let mut env: Vec<String> = self
            .config
            .worker_env
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        env.push("WORKSPACE_DIR=/workspace".to_string());

        let container_port = format!("{}/tcp", self.config.worker_port);
        let port_bindings: PortMap = HashMap::from([(
            container_port.clone(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(String::new()), // ephemeral
            }]),
        )]);

        let config = Config {
            image: Some(self.config.worker_image.clone()),
            env: Some(env),
            exposed_ports: Some(HashMap::from([(container_port.clone(), HashMap::new())])),
            labels: Some(HashMap::from([
                ("conveyor.session".to_string(), names::label_value(session_id)),
            ])),
            host_config: Some(HostConfig {
                binds: Some(vec![format!("{}:/workspace", workspace.display())]),
                port_bindings: Some(port_bindings),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ConveyorError::Driver {
                message: format!("failed to create container: {e}"),
                source: Some(Box::new(e)),
            })?;

        self.docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ConveyorError::Driver {
                message: format!("failed to start container: {e}"),
                source: Some(Box::new(e)),
            })?;

        // Discover the ephemeral host port Docker assigned.
        let inspect = self
            .docker
            .inspect_container(&response.id, None)
            .await
            .map_err(|e| ConveyorError::Driver {
                message: format!("failed to inspect container: {e}"),
                source: Some(Box::new(e)),
            })?;
        let ports = inspect
            .network_settings
            .and_then(|ns| ns.ports)
            .unwrap_or_default();
        let host_port = host_port_for(&ports, &container_port).ok_or_else(|| {
            ConveyorError::Driver {
                message: format!("no host port bound for {container_port}"),
                source: None,
            }
        })?;

        let endpoint = Endpoint {
            url: format!("http://127.0.0.1:{host_port}"),
            container_id: response.id,
        };
        info!(session_id, url = %endpoint.url, "worker container started");
        Ok(endpoint)
    }

    async fn remove(&self, endpoint: &Endpoint) {
        let result = self
            .docker
            .remove_container(
                &endpoint.container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = result {
            warn!(container_id = %endpoint.container_id, error = %e, "container remove failed");
        }
    }
}

/// Extract the first bound host port for a container port from inspect output.
fn host_port_for(ports: &PortMap, container_port: &str) -> Option<String> {
    ports
        .get(container_port)?
        .as_ref()?
        .iter()
        .find_map(|binding| binding.host_port.clone())
        .filter(|p| !p.is_empty())
}

#[async_trait]
impl Driver for DockerDriver {
    async fn acquire(&self, session_id: &str) -> Result<Endpoint, ConveyorError> {
        if let Some(cached) = self.endpoints.get(session_id) {
            let endpoint = cached.clone();
            drop(cached);
            if self.worker.health(&endpoint).await {
                debug!(session_id, "reusing healthy worker container");
                return Ok(endpoint);
            }
            self.endpoints.remove(session_id);
            self.remove(&endpoint).await;
        }

        let endpoint = self.create_container(session_id).await?;
        if let Err(e) =
            wait_until_healthy(&self.worker, &endpoint, self.config.readiness_timeout).await
        {
            self.remove(&endpoint).await;
            return Err(e);
        }
        self.endpoints
            .insert(session_id.to_string(), endpoint.clone());
        Ok(endpoint)
    }

    async fn release(&self, session_id: &str) -> Result<(), ConveyorError> {
        if let Some((_, endpoint)) = self.endpoints.remove(session_id) {
            self.remove(&endpoint).await;
        }
        Ok(())
    }

    async fn health(&self, endpoint: &Endpoint) -> bool {
        self.worker.health(endpoint).await
    }

    async fn shutdown(&self) -> Result<(), ConveyorError> {
        for entry in self.endpoints.iter() {
            self.remove(entry.value()).await;
        }
        self.endpoints.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(host_port: &str) -> PortBinding {
        PortBinding {
            host_ip: Some("127.0.0.1".to_string()),
            host_port: Some(host_port.to_string()),
        }
    }

    #[test]
    fn host_port_extraction_finds_the_binding() {
        let ports: PortMap =
            HashMap::from([("8080/tcp".to_string(), Some(vec![binding("49152")]))]);
        assert_eq!(host_port_for(&ports, "8080/tcp").as_deref(), Some("49152"));
    }

    #[test]
    fn host_port_extraction_handles_missing_bindings() {
        let ports: PortMap = HashMap::from([("8080/tcp".to_string(), None)]);
        assert!(host_port_for(&ports, "8080/tcp").is_none());
        assert!(host_port_for(&ports, "9090/tcp").is_none());

        let empty: PortMap =
            HashMap::from([("8080/tcp".to_string(), Some(vec![binding("")]))]);
        assert!(host_port_for(&empty, "8080/tcp").is_none());
    }
}
