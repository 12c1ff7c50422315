//! OpenAI-compatible endpoints.
//!
//! `POST /v1/chat/completions` drives the adapter in buffered or
//! streaming mode. Streaming responses follow the OpenAI SSE framing:
//! one `data: <json>` frame per chunk, a final `data: [DONE]`, and an
//! `event: error` frame if the upstream fails after headers are out.

use std::convert::Infallible;
use std::pin::pin;
use std::time::Duration;

use async_stream::stream;
use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::time::interval;
use tracing::{debug, error};

use crate::AppState;
use crate::adapter;
use crate::constants::MODELS;
use crate::error::RelayError;
use crate::schema::openai::{ChatCompletionChunk, ChatCompletionRequest};

/// Keep-alive interval for SSE streams (prevents proxy/load balancer timeouts).
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// SSE comment frame, ignored by clients.
const KEEP_ALIVE_COMMENT: &str = ": keep-alive\n\n";

/// The upstream models endpoint does not accept OAuth tokens, so a static
/// list backs model pickers in OpenAI clients.
pub async fn list_models() -> Json<Value> {
    let models: Vec<Value> = MODELS
        .iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "owned_by": "anthropic"
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": models
    }))
}

pub async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return decode_error(rejection).into_response(),
    };

    if req.stream.unwrap_or(false) {
        stream_response(state, req).await
    } else {
        write_response(state, req).await
    }
}

/// Map body-decode rejections onto the error taxonomy. Size-limit
/// rejections keep their 413 status with the documented message.
fn decode_error(rejection: JsonRejection) -> RelayError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayError::BodyTooLarge
    } else {
        RelayError::BadRequest(rejection.body_text())
    }
}

async fn write_response(state: AppState, req: ChatCompletionRequest) -> Response {
    match adapter::process_request(&state.upstream, req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            error!(error = %e, "chat completion failed");
            e.into_response()
        }
    }
}

async fn stream_response(state: AppState, req: ChatCompletionRequest) -> Response {
    match adapter::process_streaming_request(&state.upstream, req).await {
        // Nothing sent yet: a full JSON envelope with the right status
        Err(e) => {
            error!(error = %e, "streaming chat completion failed");
            e.into_response()
        }
        Ok(chunks) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(sse_frames(chunks)))
            .unwrap(),
    }
}

/// Frame a chunk sequence as OpenAI SSE.
///
/// Every frame is flushed as its own body chunk. A mid-stream error
/// becomes an `event: error` frame and ends the stream with no `[DONE]`;
/// client disconnects drop the whole pipeline, releasing the upstream
/// response.
fn sse_frames(
    chunks: impl Stream<Item = Result<ChatCompletionChunk, RelayError>> + Send + 'static,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    stream! {
        let mut chunks = pin!(chunks);
        let mut keep_alive = interval(KEEP_ALIVE_INTERVAL);
        keep_alive.reset();

        loop {
            tokio::select! {
                biased;

                next = chunks.next() => {
                    let Some(item) = next else {
                        break;
                    };
                    match item {
                        Ok(chunk) => match serde_json::to_string(&chunk) {
                            Ok(data) => yield Ok(Bytes::from(format!("data: {data}\n\n"))),
                            Err(e) => {
                                error!(error = %e, "failed to encode chunk");
                                return;
                            }
                        },
                        Err(e) => {
                            debug!(error = %e, "stream error after headers");
                            let data = encode_envelope(&e);
                            yield Ok(Bytes::from(format!("event: error\ndata: {data}\n\n")));
                            return;
                        }
                    }
                }

                _ = keep_alive.tick() => {
                    yield Ok(Bytes::from(KEEP_ALIVE_COMMENT));
                }
            }
        }

        // OpenAI streaming protocol termination marker
        yield Ok(Bytes::from("data: [DONE]\n\n"));
    }
}

fn encode_envelope(e: &RelayError) -> String {
    serde_json::to_string(&e.envelope())
        .unwrap_or_else(|_| r#"{"error":{"message":"internal error","type":"api_error"}}"#.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::schema::openai::{ChunkChoice, ChunkDelta, FinishReason};
    use futures_util::stream;

    fn chunk(content: &str, finish: Option<FinishReason>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: "u1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 1,
            model: "m".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(content.to_string()),
                    tool_calls: None,
                },
                finish_reason: finish,
            }],
            usage: None,
        }
    }

    async fn collect(
        items: Vec<Result<ChatCompletionChunk, RelayError>>,
    ) -> String {
        let frames: Vec<_> = sse_frames(stream::iter(items)).collect().await;
        frames
            .into_iter()
            .map(|f| String::from_utf8(f.unwrap().to_vec()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn frames_chunks_and_terminates_with_done() {
        let out = collect(vec![
            Ok(chunk("he", None)),
            Ok(chunk("llo", Some(FinishReason::Stop))),
        ])
        .await;

        let frames: Vec<&str> = out.split("\n\n").filter(|s| !s.is_empty()).collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].starts_with("data: {"));
        assert!(frames[0].contains(r#""content":"he""#));
        assert!(frames[1].contains(r#""finish_reason":"stop""#));
        assert_eq!(frames[2], "data: [DONE]");
    }

    #[tokio::test]
    async fn mid_stream_error_emits_error_event_without_done() {
        let out = collect(vec![
            Ok(chunk("partial", None)),
            Err(RelayError::Upstream {
                kind: ErrorKind::ServerError,
                message: "busy".to_string(),
            }),
        ])
        .await;

        assert!(out.ends_with(
            "event: error\ndata: {\"error\":{\"message\":\"busy\",\"type\":\"server_error\"}}\n\n"
        ));
        assert!(!out.contains("[DONE]"));
    }

    #[tokio::test]
    async fn empty_stream_still_emits_done() {
        let out = collect(vec![]).await;
        assert_eq!(out, "data: [DONE]\n\n");
    }
}
