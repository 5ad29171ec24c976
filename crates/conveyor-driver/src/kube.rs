// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Orchestrated driver: one pod + cluster-local service per session.
//!
//! `acquire` reconciles the session's worker: reuses a cached healthy
//! endpoint, adopts a running pod, recreates pods stuck in a terminal phase,
//! and waits for readiness before returning. Workspaces are backed by pod
//! scratch or a per-session PVC. An idle reaper deletes workers whose
//! endpoints have not been used within the configured TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Service};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use conveyor_core::{ConveyorError, Driver, Endpoint};
use conveyor_worker::WorkerClient;

use crate::{names, wait_until_healthy};

/// How often the idle reaper scans the endpoint cache.
const REAPER_INTERVAL: Duration = Duration::from_secs(300);
/// How often pod state is polled while waiting for readiness or deletion.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Workspace backing for orchestrated workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceBacking {
    /// Pod-local scratch, lost on pod deletion.
    Ephemeral,
    /// Per-session persistent volume claim.
    Persistent { storage_class: Option<String> },
}

/// Settings for the orchestrated driver.
///
/// Mirrors the driver section of `conveyor-config` to avoid a dependency on
/// the config crate from the driver crate.
#[derive(Debug, Clone)]
pub struct KubeDriverConfig {
    pub namespace: String,
    pub worker_image: String,
    pub worker_port: u16,
    pub workspace: WorkspaceBacking,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    /// Idle endpoint TTL; zero disables the reaper.
    pub idle_ttl: Duration,
    pub readiness_timeout: Duration,
    /// Environment propagated into each worker pod.
    pub worker_env: HashMap<String, String>,
}

struct CachedEndpoint {
    endpoint: Endpoint,
    last_used_at: Instant,
}

impl CachedEndpoint {
    fn is_stale(&self, ttl: Duration) -> bool {
        !ttl.is_zero() && self.last_used_at.elapsed() > ttl
    }
}

pub struct KubeDriver {
    client: Client,
    config: KubeDriverConfig,
    endpoints: Arc<DashMap<String, CachedEndpoint>>,
    worker: WorkerClient,
    reaper_cancel: CancellationToken,
}

impl KubeDriver {
    /// Connect using in-cluster config or the local kubeconfig.
    pub async fn connect(config: KubeDriverConfig) -> Result<Self, ConveyorError> {
        let client = Client::try_default().await.map_err(|e| ConveyorError::Driver {
            message: format!("failed to build Kubernetes client: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(Self {
            client,
            config,
            endpoints: Arc::new(DashMap::new()),
            worker: WorkerClient::new(),
            reaper_cancel: CancellationToken::new(),
        })
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn pvcs(&self) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Spawn the background idle reaper. No-op when `idle_ttl` is zero.
    pub fn spawn_reaper(self: &Arc<Self>) {
        if self.config.idle_ttl.is_zero() {
            info!("idle reaper disabled (ttl = 0)");
            return;
        }
        let driver = Arc::clone(self);
        let cancel = self.reaper_cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAPER_INTERVAL);
            interval.tick().await; // skip the immediate tick
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        driver.reap_idle().await;
                    }
                    _ = cancel.cancelled() => {
                        debug!("idle reaper shutting down");
                        break;
                    }
                }
            }
        });
        info!(ttl_secs = self.config.idle_ttl.as_secs(), "idle reaper started");
    }

    /// Delete workers whose endpoints have been idle past the TTL.
    async fn reap_idle(&self) {
        let stale: Vec<String> = self
            .endpoints
            .iter()
            .filter(|entry| entry.value().is_stale(self.config.idle_ttl))
            .map(|entry| entry.key().clone())
            .collect();

        for session_id in stale {
            info!(session_id, "reaping idle worker");
            if let Err(e) = self.delete_worker(&session_id).await {
                warn!(session_id, error = %e, "idle reap failed");
                continue;
            }
            self.endpoints.remove(&session_id);
        }
    }

    /// Delete the session's pod and service, keeping any PVC.
    async fn delete_worker(&self, session_id: &str) -> Result<(), ConveyorError> {
        let name = names::worker_name(session_id);
        delete_ignore_missing(&self.pods(), &name).await?;
        delete_ignore_missing(&self.services(), &name).await?;
        Ok(())
    }

    async fn ensure_service(&self, name: &str) -> Result<(), ConveyorError> {
        let services = self.services();
        let existing = services.get_opt(name).await.map_err(kube_err)?;
        if existing.is_none() {
            let service = build_service(name, self.config.worker_port)?;
            services
                .create(&PostParams::default(), &service)
                .await
                .map_err(kube_err)?;
            debug!(name, "service created");
        }
        Ok(())
    }

    async fn ensure_pvc(&self, session_id: &str) -> Result<(), ConveyorError> {
        let WorkspaceBacking::Persistent { storage_class } = &self.config.workspace else {
            return Ok(());
        };
        let name = names::volume_name(session_id);
        let pvcs = self.pvcs();
        if pvcs.get_opt(&name).await.map_err(kube_err)?.is_none() {
            let pvc = build_pvc(&name, storage_class.as_deref())?;
            pvcs.create(&PostParams::default(), &pvc)
                .await
                .map_err(kube_err)?;
            debug!(name, "workspace PVC created");
        }
        Ok(())
    }

    async fn create_pod(&self, session_id: &str, name: &str) -> Result<(), ConveyorError> {
        let pod = build_pod(name, session_id, &self.config)?;
        self.pods()
            .create(&PostParams::default(), &pod)
            .await
            .map_err(kube_err)?;
        info!(name, session_id, "worker pod created");
        Ok(())
    }

    /// Poll until the named pod no longer exists.
    async fn wait_for_deletion(&self, name: &str, deadline: Instant) -> Result<(), ConveyorError> {
        let pods = self.pods();
        loop {
            if pods.get_opt(name).await.map_err(kube_err)?.is_none() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ConveyorError::WorkerUnavailable {
                    message: format!("pod {name} stuck terminating"),
                    source: None,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll until the pod is running with all containers ready.
    async fn wait_for_ready(&self, name: &str, deadline: Instant) -> Result<(), ConveyorError> {
        let pods = self.pods();
        loop {
            if let Some(pod) = pods.get_opt(name).await.map_err(kube_err)? {
                if pod_is_ready(&pod) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(ConveyorError::WorkerUnavailable {
                    message: format!(
                        "pod {name} not ready within {:?}",
                        self.config.readiness_timeout
                    ),
                    source: None,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Driver for KubeDriver {
    async fn acquire(&self, session_id: &str) -> Result<Endpoint, ConveyorError> {
        // Fast path: cached endpoint that still answers its health probe.
        if let Some(cached) = self.endpoints.get(session_id) {
            let endpoint = cached.endpoint.clone();
            drop(cached);
            if self.worker.health(&endpoint).await {
                if let Some(mut entry) = self.endpoints.get_mut(session_id) {
                    entry.last_used_at = Instant::now();
                }
                debug!(session_id, "reusing healthy worker endpoint");
                return Ok(endpoint);
            }
            self.endpoints.remove(session_id);
        }

        let name = names::worker_name(session_id);
        let deadline = Instant::now() + self.config.readiness_timeout;
        let pods = self.pods();

        match pods.get_opt(&name).await.map_err(kube_err)? {
            Some(pod) if pod_is_terminal(&pod) => {
                // A finished or failed pod cannot be restarted; replace it.
                info!(name, phase = pod_phase(&pod).unwrap_or_default(), "replacing terminal pod");
                self.delete_worker(session_id).await?;
                self.wait_for_deletion(&name, deadline).await?;
                self.ensure_pvc(session_id).await?;
                self.create_pod(session_id, &name).await?;
                self.ensure_service(&name).await?;
            }
            Some(_) => {
                // Running or pending: adopt it, make sure its service exists.
                self.ensure_service(&name).await?;
            }
            None => {
                self.ensure_pvc(session_id).await?;
                self.create_pod(session_id, &name).await?;
                self.ensure_service(&name).await?;
            }
        }

        self.wait_for_ready(&name, deadline).await?;

        let endpoint = Endpoint {
            url: format!(
                "http://{name}.{}.svc.cluster.local:{}",
                self.config.namespace, self.config.worker_port
            ),
            container_id: name,
        };

        // Pod readiness gates on the /health probe, but service DNS may lag;
        // keep probing until the endpoint actually answers.
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .max(Duration::from_secs(10));
        wait_until_healthy(&self.worker, &endpoint, remaining).await?;

        self.endpoints.insert(
            session_id.to_string(),
            CachedEndpoint {
                endpoint: endpoint.clone(),
                last_used_at: Instant::now(),
            },
        );
        Ok(endpoint)
    }

    async fn release(&self, session_id: &str) -> Result<(), ConveyorError> {
        self.endpoints.remove(session_id);
        self.delete_worker(session_id).await
    }

    async fn health(&self, endpoint: &Endpoint) -> bool {
        self.worker.health(endpoint).await
    }

    async fn shutdown(&self) -> Result<(), ConveyorError> {
        self.reaper_cancel.cancel();
        Ok(())
    }
}

fn kube_err(e: kube::Error) -> ConveyorError {
    ConveyorError::Driver {
        message: format!("orchestrator API error: {e}"),
        source: Some(Box::new(e)),
    }
}

fn manifest_err(e: serde_json::Error) -> ConveyorError {
    ConveyorError::Internal(format!("invalid manifest: {e}"))
}

async fn delete_ignore_missing<K>(api: &Api<K>, name: &str) -> Result<(), ConveyorError>
where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + serde::de::DeserializeOwned
        + std::fmt::Debug,
{
    match api.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(kube_err(e)),
    }
}

fn pod_phase(pod: &Pod) -> Option<String> {
    pod.status.as_ref().and_then(|s| s.phase.clone())
}

fn pod_is_terminal(pod: &Pod) -> bool {
    matches!(
        pod_phase(pod).as_deref(),
        Some("Succeeded") | Some("Failed") | Some("Unknown")
    )
}

fn pod_is_ready(pod: &Pod) -> bool {
    if pod_phase(pod).as_deref() != Some("Running") {
        return false;
    }
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| !statuses.is_empty() && statuses.iter().all(|cs| cs.ready))
        .unwrap_or(false)
}

/// Build the worker pod manifest.
fn build_pod(name: &str, session_id: &str, config: &KubeDriverConfig) -> Result<Pod, ConveyorError> {
    let env: Vec<serde_json::Value> = config
        .worker_env
        .iter()
        .map(|(k, v)| serde_json::json!({"name": k, "value": v}))
        .chain(std::iter::once(
            serde_json::json!({"name": "WORKSPACE_DIR", "value": "/workspace"}),
        ))
        .collect();

    let workspace_volume = match &config.workspace {
        WorkspaceBacking::Ephemeral => serde_json::json!({
            "name": "workspace",
            "emptyDir": {}
        }),
        WorkspaceBacking::Persistent { .. } => serde_json::json!({
            "name": "workspace",
            "persistentVolumeClaim": {"claimName": names::volume_name(session_id)}
        }),
    };

    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "labels": {
                "app": "conveyor-worker",
                "worker-name": name,
                "conveyor-session": names::label_value(session_id),
            },
        },
        "spec": {
            "restartPolicy": "Never",
            "containers": [{
                "name": "worker",
                "image": config.worker_image,
                "ports": [{"containerPort": config.worker_port}],
                "env": env,
                "volumeMounts": [{"name": "workspace", "mountPath": "/workspace"}],
                "readinessProbe": {
                    "httpGet": {"path": "/health", "port": config.worker_port},
                    "initialDelaySeconds": 2,
                    "periodSeconds": 3,
                },
                "livenessProbe": {
                    "httpGet": {"path": "/health", "port": config.worker_port},
                    "initialDelaySeconds": 10,
                    "periodSeconds": 15,
                },
                "resources": {
                    "requests": {
                        "cpu": config.cpu_request,
                        "memory": config.memory_request,
                    },
                    "limits": {
                        "cpu": config.cpu_limit,
                        "memory": config.memory_limit,
                    },
                },
            }],
            "volumes": [workspace_volume],
        },
    }))
    .map_err(manifest_err)
}

/// Build the cluster-local service, selector pinned to the pod-name label.
fn build_service(name: &str, port: u16) -> Result<Service, ConveyorError> {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "labels": {"app": "conveyor-worker"},
        },
        "spec": {
            "selector": {"worker-name": name},
            "ports": [{"port": port, "targetPort": port}],
        },
    }))
    .map_err(manifest_err)
}

/// Build the per-session workspace PVC.
fn build_pvc(name: &str, storage_class: Option<&str>) -> Result<PersistentVolumeClaim, ConveyorError> {
    let mut spec = serde_json::json!({
        "accessModes": ["ReadWriteOnce"],
        "resources": {"requests": {"storage": "1Gi"}},
    });
    if let Some(class) = storage_class {
        spec["storageClassName"] = serde_json::Value::String(class.to_string());
    }
    serde_json::from_value(serde_json::json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": {"name": name},
        "spec": spec,
    }))
    .map_err(manifest_err)
}
