// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete control plane with a temp SQLite
//! store, a mock worker behind a static driver, and registered channels.
//! The gateway can be bound on an ephemeral port to drive the full HTTP/WS
//! surface from tests.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use conveyor_channel::{ChannelRegistry, DuplexChannel};
use conveyor_core::{Channel, ConveyorError, Driver, Subscriber, Task, TaskRequest, WorkerEvent};
use conveyor_dispatch::{Dispatcher, SkillLibrary};
use conveyor_driver::StaticDriver;
use conveyor_gateway::AppState;
use conveyor_store::Store;
use conveyor_worker::WorkerClient;

use crate::mock_worker::MockWorker;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    chat_events: Option<Vec<WorkerEvent>>,
    extra_channels: Vec<Arc<dyn Channel>>,
    skills: Vec<(String, Vec<(String, String)>)>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            chat_events: None,
            extra_channels: Vec::new(),
            skills: Vec::new(),
        }
    }

    /// Events the mock worker streams from `/chat`.
    pub fn with_chat_events(mut self, events: Vec<WorkerEvent>) -> Self {
        self.chat_events = Some(events);
        self
    }

    /// Register an additional channel beside the duplex one.
    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.extra_channels.push(channel);
        self
    }

    /// Seed a skill bundle into the harness skill library.
    pub fn with_skill(mut self, name: &str, files: &[(&str, &str)]) -> Self {
        self.skills.push((
            name.to_string(),
            files
                .iter()
                .map(|(f, c)| (f.to_string(), c.to_string()))
                .collect(),
        ));
        self
    }

    /// Build the harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, ConveyorError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| ConveyorError::Storage {
            source: Box::new(e),
        })?;

        let db_path = temp_dir.path().join("test.db");
        let store = Arc::new(Store::open(db_path.to_str().unwrap()).await?);

        let skills_dir = temp_dir.path().join("skills");
        for (name, files) in &self.skills {
            for (file, content) in files {
                let path = skills_dir.join(name).join(file);
                std::fs::create_dir_all(path.parent().unwrap()).map_err(|e| {
                    ConveyorError::Internal(format!("skill seed failed: {e}"))
                })?;
                std::fs::write(&path, content).map_err(|e| {
                    ConveyorError::Internal(format!("skill seed failed: {e}"))
                })?;
            }
        }

        let worker = MockWorker::start().await;
        if let Some(events) = &self.chat_events {
            worker.mount_chat(events).await;
        }

        let driver: Arc<dyn Driver> =
            Arc::new(StaticDriver::new(&worker.uri(), Duration::from_secs(5)));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            driver.clone(),
            Arc::new(SkillLibrary::new(&skills_dir)),
        ));

        let mut registry = ChannelRegistry::new();
        registry.register(Arc::new(DuplexChannel::new()));
        for channel in self.extra_channels {
            registry.register(channel);
        }

        Ok(TestHarness {
            store,
            dispatcher,
            registry: Arc::new(registry),
            driver,
            worker,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock worker and temp storage.
pub struct TestHarness {
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<ChannelRegistry>,
    pub driver: Arc<dyn Driver>,
    pub worker: MockWorker,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Persist a pending task for a (possibly new) session.
    pub async fn seed_task(
        &self,
        session_id: &str,
        channel_type: &str,
        request: TaskRequest,
    ) -> Result<String, ConveyorError> {
        self.store.create_session(session_id, channel_type).await?;
        let task_id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let task = Task::pending(&task_id, session_id, channel_type, request, &now);
        self.store.create_task(&task).await?;
        Ok(task_id)
    }

    /// Seed a task and run it through the dispatcher, returning the final record.
    pub async fn run_task(
        &self,
        session_id: &str,
        channel: Arc<dyn Channel>,
        request: TaskRequest,
        subscriber: Option<Arc<dyn Subscriber>>,
    ) -> Result<Task, ConveyorError> {
        let task_id = self
            .seed_task(session_id, channel.channel_type(), request)
            .await?;
        self.dispatcher
            .run_task(&task_id, channel, subscriber)
            .await;
        self.store
            .get_task(&task_id)
            .await?
            .ok_or_else(|| ConveyorError::Internal("task vanished".into()))
    }

    /// Bind the full gateway on an ephemeral port.
    ///
    /// Returns the base URL and a token that stops the server.
    pub async fn serve_gateway(&self) -> Result<(String, CancellationToken), ConveyorError> {
        let state = AppState {
            store: self.store.clone(),
            dispatcher: self.dispatcher.clone(),
            registry: self.registry.clone(),
            driver: self.driver.clone(),
            worker: WorkerClient::new(),
            titles: None,
        };
        let app = conveyor_gateway::router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| ConveyorError::Internal(format!("bind failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| ConveyorError::Internal(format!("no local addr: {e}")))?;

        let cancel = CancellationToken::new();
        let shutdown = cancel.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
        });

        Ok((format!("http://{addr}"), cancel))
    }
}
