// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for both ingress shapes and
//! the REST read surface.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use conveyor_channel::ChannelRegistry;
use conveyor_core::{ConveyorError, Driver};
use conveyor_dispatch::{Dispatcher, TitleGenerator};
use conveyor_store::Store;
use conveyor_worker::WorkerClient;

use crate::{handlers, webhook, ws};

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: Arc<ChannelRegistry>,
    pub driver: Arc<dyn Driver>,
    pub worker: WorkerClient,
    pub titles: Option<Arc<TitleGenerator>>,
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route(
            "/api/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/api/sessions/{id}",
            get(handlers::get_session)
                .patch(handlers::patch_session)
                .delete(handlers::delete_session),
        )
        .route("/api/sessions/{id}/messages", get(handlers::session_messages))
        .route("/api/tasks/{id}", get(handlers::get_task))
        .route("/api/tasks/{id}/logs", get(handlers::get_task_logs))
        .route("/api/tasks/{id}/cancel", post(handlers::cancel_task))
        .route(
            "/api/workspace/{file}",
            get(handlers::get_workspace_file).put(handlers::put_workspace_file),
        )
        .route("/api/channel/{channel_type}/webhook", post(webhook::webhook))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the gateway server, shutting down when `cancel` fires.
pub async fn start_server(
    host: &str,
    port: u16,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), ConveyorError> {
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ConveyorError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| ConveyorError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
