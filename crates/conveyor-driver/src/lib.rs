// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker drivers for the Conveyor control plane.
//!
//! Three shapes of the [`Driver`] façade over the container substrate:
//! - [`StaticDriver`]: one pre-existing endpoint shared by all sessions.
//! - [`DockerDriver`]: one local container per session.
//! - [`KubeDriver`]: one pod + cluster-local service per session, with
//!   reconciliation and an idle reaper.

pub mod docker;
pub mod kube;
pub mod names;
pub mod static_url;

use std::time::Duration;

use conveyor_core::{ConveyorError, Endpoint};
use conveyor_worker::WorkerClient;

pub use docker::{DockerDriver, DockerDriverConfig};
pub use kube::{KubeDriver, KubeDriverConfig, WorkspaceBacking};
pub use static_url::StaticDriver;

/// How often an endpoint is re-probed while waiting for it to come up.
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Block until the endpoint's health probe succeeds, bounded by `timeout`.
pub(crate) async fn wait_until_healthy(
    worker: &WorkerClient,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<(), ConveyorError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if worker.health(endpoint).await {
            return Ok(());
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Err(ConveyorError::WorkerUnavailable {
                message: format!(
                    "worker at {} not healthy within {timeout:?}",
                    endpoint.url
                ),
                source: None,
            });
        }
        tokio::time::sleep(HEALTH_POLL_INTERVAL.min(deadline - now)).await;
    }
}
