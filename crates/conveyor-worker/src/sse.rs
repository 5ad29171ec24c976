// SPDX-FileCopyrightText: 2026 Conveyor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for worker `/chat` responses.
//!
//! Converts a reqwest response byte stream into [`WorkerEvent`]s using the
//! `eventsource-stream` crate for SSE protocol compliance. Unknown event
//! types are NOT skipped: the dispatcher persists and forwards them
//! verbatim, so they pass through here with their tag intact.

use std::pin::Pin;

use conveyor_core::{ConveyorError, WorkerEvent};
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;

/// Stream of worker events until the worker closes the response.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<WorkerEvent, ConveyorError>> + Send>>;

/// Wire shape of the SSE `data:` payload.
#[derive(Debug, Deserialize)]
struct EventData {
    #[serde(default)]
    content: String,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// Parse a streaming response into worker events.
///
/// A malformed `data:` payload is a stream error -- the dispatcher fails the
/// task rather than guessing at partial frames.
pub fn parse_event_stream(response: reqwest::Response) -> EventStream {
    let event_stream = response.bytes_stream().eventsource();

    let mapped = event_stream.map(|result| match result {
        Ok(event) => {
            let data: EventData =
                serde_json::from_str(&event.data).map_err(|e| ConveyorError::Stream {
                    message: format!("malformed event data for '{}': {e}", event.event),
                    source: Some(Box::new(e)),
                })?;
            Ok(WorkerEvent {
                event_type: event.event,
                content: data.content,
                metadata: data.metadata,
            })
        }
        Err(e) => Err(ConveyorError::Stream {
            message: format!("event stream error: {e}"),
            source: Some(Box::new(e)),
        }),
    });

    Box::pin(mapped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    /// Serve raw SSE text through wiremock to get a real reqwest::Response.
    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;

        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn parses_text_events_in_order() {
        let sse = "event: text\ndata: {\"content\":\"Hel\",\"metadata\":{}}\n\n\
                   event: text\ndata: {\"content\":\"lo\",\"metadata\":{}}\n\n";
        let mut stream = parse_event_stream(mock_sse_response(sse).await);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event_type, "text");
        assert_eq!(first.content, "Hel");

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.content, "lo");
    }

    #[tokio::test]
    async fn parses_done_with_stats_metadata() {
        let sse = "event: done\ndata: {\"content\":\"\",\"metadata\":{\"cost_usd\":0.0123,\"num_turns\":3,\"duration_ms\":4500}}\n\n";
        let mut stream = parse_event_stream(mock_sse_response(sse).await);

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, "done");
        assert_eq!(event.metadata["num_turns"], 3);
    }

    #[tokio::test]
    async fn unknown_event_types_pass_through_verbatim() {
        let sse = "event: thinking\ndata: {\"content\":\"hmm\"}\n\n";
        let mut stream = parse_event_stream(mock_sse_response(sse).await);

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, "thinking");
        assert_eq!(event.content, "hmm");
    }

    #[tokio::test]
    async fn missing_fields_default() {
        let sse = "event: done\ndata: {}\n\n";
        let mut stream = parse_event_stream(mock_sse_response(sse).await);

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.content, "");
        assert!(event.metadata.is_null());
    }

    #[tokio::test]
    async fn malformed_data_is_a_stream_error() {
        let sse = "event: text\ndata: not-json\n\n";
        let mut stream = parse_event_stream(mock_sse_response(sse).await);

        let result = stream.next().await.unwrap();
        assert!(matches!(result, Err(ConveyorError::Stream { .. })));
    }
}
