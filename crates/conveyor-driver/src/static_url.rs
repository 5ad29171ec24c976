// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static driver: one pre-existing worker endpoint shared by all sessions.
//!
//! The simplest shape, used for local development and tests. `acquire`
//! returns the configured URL after a health gate; `release` is a no-op
//! because nothing here owns the worker's lifetime.

use std::time::Duration;

use async_trait::async_trait;
use conveyor_core::{ConveyorError, Driver, Endpoint};
use conveyor_worker::WorkerClient;

use crate::wait_until_healthy;

pub struct StaticDriver {
    endpoint: Endpoint,
    worker: WorkerClient,
    readiness_timeout: Duration,
}

impl StaticDriver {
    pub fn new(url: &str, readiness_timeout: Duration) -> Self {
        Self {
            endpoint: Endpoint {
                url: url.trim_end_matches('/').to_string(),
                container_id: "static".to_string(),
            },
            worker: WorkerClient::new(),
            readiness_timeout,
        }
    }
}

#[async_trait]
impl Driver for StaticDriver {
    async fn acquire(&self, _session_id: &str) -> Result<Endpoint, ConveyorError> {
        wait_until_healthy(&self.worker, &self.endpoint, self.readiness_timeout).await?;
        Ok(self.endpoint.clone())
    }

    async fn release(&self, _session_id: &str) -> Result<(), ConveyorError> {
        Ok(())
    }

    async fn health(&self, endpoint: &Endpoint) -> bool {
        self.worker.health(endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn acquire_returns_the_configured_endpoint_when_healthy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let driver = StaticDriver::new(&server.uri(), Duration::from_secs(5));
        let a = driver.acquire("session-a").await.unwrap();
        let b = driver.acquire("session-b").await.unwrap();
        assert_eq!(a, b, "all sessions share the static endpoint");
        assert_eq!(a.container_id, "static");
    }

    #[tokio::test]
    async fn acquire_times_out_against_a_dead_worker() {
        let driver = StaticDriver::new("http://127.0.0.1:1", Duration::from_millis(200));
        let err = driver.acquire("s1").await.unwrap_err();
        assert!(matches!(err, ConveyorError::WorkerUnavailable { .. }));
    }

    #[tokio::test]
    async fn release_is_a_no_op() {
        let driver = StaticDriver::new("http://127.0.0.1:1", Duration::from_millis(50));
        driver.release("unknown").await.unwrap();
    }
}
