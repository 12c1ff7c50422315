//! Anthropic → OpenAI buffered response translation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use uuid::Uuid;

use crate::schema::anthropic::{ContentBlock, MessagesResponse, StopReason, UsageInfo};
use crate::schema::openai::{
    ChatCompletionResponse, Choice, FinishReason, PromptTokensDetails, ResponseFunction,
    ResponseMessage, ResponseToolCall, Usage,
};

use super::now_secs;

/// Translate an upstream Messages response into a chat completion.
pub fn translate_response(resp: MessagesResponse) -> ChatCompletionResponse {
    let mut content = String::new();
    let mut tool_calls: Vec<ResponseToolCall> = Vec::new();

    for block in resp.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ResponseToolCall {
                    id: if id.is_empty() { new_tool_call_id() } else { id },
                    r#type: "function".to_string(),
                    function: ResponseFunction {
                        name,
                        arguments: if input.is_null() {
                            "{}".to_string()
                        } else {
                            serde_json::to_string(&input).unwrap_or_else(|_| "{}".to_string())
                        },
                    },
                });
            }
            // Thinking has no client-side field; server-side block kinds
            // would break conversation round-trips if surfaced.
            ContentBlock::Thinking { .. } | ContentBlock::Unknown => {}
        }
    }

    ChatCompletionResponse {
        id: resp
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_response_id),
        object: "chat.completion".to_string(),
        created: now_secs(),
        model: resp.model,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content,
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: map_stop_reason(resp.stop_reason),
        }],
        usage: map_usage(&resp.usage),
    }
}

/// Map upstream stop reasons to finish reasons.
///
/// Refusals stay in content (upstream embeds them there) and surface as
/// `content_filter`. `pause_turn` has no client-side resume mechanism and
/// maps to `stop`, as does anything unrecognized.
pub fn map_stop_reason(stop_reason: Option<StopReason>) -> FinishReason {
    match stop_reason {
        Some(StopReason::EndTurn) => FinishReason::Stop,
        Some(StopReason::MaxTokens) => FinishReason::Length,
        Some(StopReason::StopSequence) => FinishReason::Stop,
        Some(StopReason::ToolUse) => FinishReason::ToolCalls,
        Some(StopReason::Refusal) => FinishReason::ContentFilter,
        Some(StopReason::PauseTurn) | Some(StopReason::Other) | None => FinishReason::Stop,
    }
}

pub fn map_usage(usage: &UsageInfo) -> Usage {
    Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: usage.input_tokens + usage.output_tokens,
        prompt_tokens_details: usage
            .cache_read_input_tokens
            .filter(|&cached| cached > 0)
            .map(|cached| PromptTokensDetails {
                cached_tokens: cached,
            }),
    }
}

/// Fallback response id: `chatcmpl-` + 24 random bytes as URL-safe base64
/// (32 characters, no padding).
pub fn new_response_id() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill_bytes(&mut bytes);
    format!("chatcmpl-{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Fallback tool-call id: `call_` + first 8 chars of a UUID.
pub fn new_tool_call_id() -> String {
    format!("call_{}", &Uuid::new_v4().to_string()[..8])
}
