// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Forge webhook channel: source-hosting issue-comment events.
//!
//! Inbound webhooks are verified with HMAC-SHA256 over the raw body
//! (`X-Hub-Signature-256: sha256=<hex>`). Freshly created comments become
//! tasks; every other event is ignored. On completion the task result is
//! posted back as a comment through the payload's comments API URL.

use async_trait::async_trait;
use hmac::Mac;
use serde::Deserialize;
use sha2::Sha256;
use tracing::{debug, warn};

use conveyor_core::{
    Channel, ChannelDefaults, ConveyorError, InboundRequest, Task, TaskRequest, TaskStatus,
};

type HmacSha256 = hmac::Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Settings for the forge channel.
#[derive(Debug, Clone)]
pub struct ForgeChannelConfig {
    /// HMAC secret shared with the forge's webhook configuration.
    pub webhook_secret: String,
    /// Token used to authenticate result comments. `None` skips delivery.
    pub api_token: Option<String>,
    /// Default skills merged into every forge task.
    pub default_skills: Vec<String>,
}

/// Relevant subset of a forge issue-comment payload.
#[derive(Debug, Deserialize)]
struct CommentEvent {
    #[serde(default)]
    action: String,
    comment: Option<Comment>,
    issue: Option<Issue>,
    repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
struct Comment {
    body: String,
}

#[derive(Debug, Deserialize)]
struct Issue {
    number: i64,
    comments_url: String,
}

#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
}

pub struct ForgeChannel {
    config: ForgeChannelConfig,
    http: reqwest::Client,
}

impl ForgeChannel {
    pub fn new(config: ForgeChannelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Compute the expected `sha256=<hex>` signature for a body.
    fn expected_signature(&self, body: &[u8]) -> Option<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.as_bytes()).ok()?;
        mac.update(body);
        Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
    }
}

/// Constant-time string comparison.
fn signatures_match(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }
    provided
        .as_bytes()
        .iter()
        .zip(expected.as_bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[async_trait]
impl Channel for ForgeChannel {
    fn channel_type(&self) -> &str {
        "forge"
    }

    fn defaults(&self) -> ChannelDefaults {
        ChannelDefaults {
            skills: self.config.default_skills.clone(),
            bridge_configs: Vec::new(),
        }
    }

    fn verify(&self, request: &InboundRequest) -> bool {
        let Some(provided) = request.header(SIGNATURE_HEADER) else {
            return false;
        };
        let Some(expected) = self.expected_signature(&request.body) else {
            return false;
        };
        signatures_match(provided, &expected)
    }

    fn translate(&self, request: &InboundRequest) -> Result<Option<TaskRequest>, ConveyorError> {
        let event: CommentEvent = serde_json::from_slice(&request.body)
            .map_err(|e| ConveyorError::BadRequest(format!("invalid webhook payload: {e}")))?;

        if event.action != "created" {
            debug!(action = event.action, "ignoring forge event");
            return Ok(None);
        }
        let (Some(comment), Some(issue), Some(repository)) =
            (event.comment, event.issue, event.repository)
        else {
            return Ok(None);
        };
        if comment.body.trim().is_empty() {
            return Ok(None);
        }

        // One session per issue thread so follow-up comments share a worker.
        let session_id = format!(
            "forge-{}-{}",
            repository.full_name.replace('/', "-"),
            issue.number
        );

        Ok(Some(TaskRequest {
            session_id: Some(session_id),
            message: comment.body,
            channel_meta: serde_json::json!({
                "repo": repository.full_name,
                "issue_number": issue.number,
                "comments_url": issue.comments_url,
            }),
            ..TaskRequest::default()
        }))
    }

    async fn deliver(&self, task: &Task) -> Result<(), ConveyorError> {
        if task.status != TaskStatus::Completed {
            return Ok(());
        }
        let Some(token) = &self.config.api_token else {
            warn!(task_id = %task.id, "forge delivery skipped: no api token configured");
            return Ok(());
        };
        let Some(comments_url) = task.channel_meta.get("comments_url").and_then(|u| u.as_str())
        else {
            return Err(ConveyorError::Deliver {
                channel: "forge".into(),
                message: "task metadata missing comments_url".into(),
            });
        };

        let body = task.result.clone().unwrap_or_default();
        let response = self
            .http
            .post(comments_url)
            .header("authorization", format!("token {token}"))
            .timeout(std::time::Duration::from_secs(10))
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .map_err(|e| ConveyorError::Deliver {
                channel: "forge".into(),
                message: format!("comment post failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConveyorError::Deliver {
                channel: "forge".into(),
                message: format!("forge returned {status}"),
            });
        }
        debug!(task_id = %task.id, "result comment delivered");
        Ok(())
    }
}
