// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fire-and-forget session title generation.
//!
//! Runs concurrently with the first task of a new duplex session and emits a
//! side-channel `session_title` frame. Must never block or fail the task.

use std::time::Duration;

use conveyor_core::ConveyorError;
use serde::Deserialize;
use tracing::debug;

const TITLE_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_TITLE_CHARS: usize = 80;

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Client for the title model's messages API.
#[derive(Debug, Clone)]
pub struct TitleGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl TitleGenerator {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    /// Generate a short human title for a session opened with `message`.
    pub async fn generate(&self, message: &str) -> Result<String, ConveyorError> {
        let prompt = format!(
            "Write a concise title (at most six words) for a conversation that \
             starts with this message:\n\n{message}\n\nReply with the title only."
        );
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 32,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .timeout(TITLE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| ConveyorError::Internal(format!("title request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConveyorError::Internal(format!(
                "title model returned {status}: {body}"
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ConveyorError::Internal(format!("title response parse failed: {e}")))?;

        let title = parsed
            .content
            .first()
            .map(|block| clean_title(&block.text))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConveyorError::Internal("title model returned no text".into()))?;

        debug!(title, "session title generated");
        Ok(title)
    }
}

/// Strip quoting and clamp length; models love to over-decorate titles.
fn clean_title(raw: &str) -> String {
    let mut title = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim()
        .to_string();
    if let Some(first_line) = title.lines().next() {
        title = first_line.trim().to_string();
    }
    title.chars().take(MAX_TITLE_CHARS).collect()
}
