//! Anthropic Messages wire types.
//!
//! Request types serialize what the upstream Messages endpoint accepts;
//! response and SSE event types deserialize what it returns. The mapping
//! layer works exclusively against these shapes so upstream SDK or API
//! revisions stay mechanical to absorb. Unknown block and event kinds
//! deserialize into catch-all variants instead of failing the stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<MessageParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolParam>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoiceParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageParam {
    pub role: MessageRole,
    pub content: Vec<ContentBlockParam>,
}

/// Conversation roles accepted upstream. System text travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlockParam {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    Document {
        source: DocumentSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentSource {
    /// Base64 PDF payload.
    Base64 { media_type: String, data: String },
    /// Plain-text document contents.
    Text { media_type: String, data: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolParam {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: ToolInputSchema,
}

/// Upstream splits `properties`/`required` out of the flat JSON Schema;
/// the remaining draft keywords ride along via the flattened map.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(flatten)]
    pub additional: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoiceParam {
    Auto,
    Any,
    None,
    Tool { name: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThinkingConfig {
    Enabled { budget_tokens: u32 },
    Disabled,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub model: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    pub usage: UsageInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    /// Block kinds with no client-side mapping (server tool use, search
    /// results, ...) are tolerated and skipped.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
    Refusal,
    PauseTurn,
    Other,
}

// Hand-rolled so unrecognized future stop reasons fold into `Other`
// instead of failing the whole response.
impl<'de> Deserialize<'de> for StopReason {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(match value.as_str() {
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            "tool_use" => StopReason::ToolUse,
            "refusal" => StopReason::Refusal,
            "pause_turn" => StopReason::PauseTurn,
            _ => StopReason::Other,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u32>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u32>,
}

/// Error body shared by HTTP error responses and the SSE `error` event.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

/// Buffered error envelope: `{"type":"error","error":{...}}`.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

// ============================================================================
// SSE Event Types
// ============================================================================

/// One decoded upstream SSE event.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {
        message: MessageHeader,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ContentDelta,
    },
    ContentBlockStop {
        #[serde(default)]
        #[allow(dead_code)]
        index: usize,
    },
    MessageDelta {
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<UsageInfo>,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorBody,
    },
    #[serde(other)]
    Unknown,
}

/// Message metadata carried by `message_start`.
#[derive(Debug, Deserialize)]
pub struct MessageHeader {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentDelta {
    TextDelta {
        text: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    ThinkingDelta {
        #[serde(default)]
        #[allow(dead_code)]
        thinking: String,
    },
    /// signature_delta, citations_delta, ...
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
pub struct MessageDeltaBody {
    #[serde(default)]
    pub stop_reason: Option<StopReason>,
    #[serde(default)]
    #[allow(dead_code)]
    pub stop_sequence: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_message_start() {
        let data = r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4-5","usage":{"input_tokens":12,"output_tokens":0,"cache_read_input_tokens":4}}}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        let StreamEvent::MessageStart { message } = event else {
            panic!("expected message_start");
        };
        assert_eq!(message.id.as_deref(), Some("msg_1"));
        assert_eq!(message.usage.input_tokens, 12);
        assert_eq!(message.usage.cache_read_input_tokens, Some(4));
    }

    #[test]
    fn parse_content_block_start_tool_use() {
        let data = r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather","input":{}}}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        let StreamEvent::ContentBlockStart {
            index,
            content_block: ContentBlock::ToolUse { id, name, .. },
        } = event
        else {
            panic!("expected tool_use block start");
        };
        assert_eq!(index, 1);
        assert_eq!(id, "toolu_1");
        assert_eq!(name, "get_weather");
    }

    #[test]
    fn parse_deltas() {
        let text: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"hi"}}"#,
        )
        .unwrap();
        assert!(matches!(
            text,
            StreamEvent::ContentBlockDelta {
                delta: ContentDelta::TextDelta { .. },
                ..
            }
        ));

        let json: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"a\":"}}"#,
        )
        .unwrap();
        assert!(matches!(
            json,
            StreamEvent::ContentBlockDelta {
                delta: ContentDelta::InputJsonDelta { .. },
                ..
            }
        ));
    }

    #[test]
    fn parse_message_delta_with_usage() {
        let data = r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":42}}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        let StreamEvent::MessageDelta { delta, usage } = event else {
            panic!("expected message_delta");
        };
        assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(usage.unwrap().output_tokens, 42);
    }

    #[test]
    fn parse_error_event() {
        let data = r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#;
        let event: StreamEvent = serde_json::from_str(data).unwrap();
        let StreamEvent::Error { error } = event else {
            panic!("expected error event");
        };
        assert_eq!(error.error_type, "overloaded_error");
        assert_eq!(error.message, "busy");
    }

    #[test]
    fn unknown_events_and_blocks_tolerated() {
        let event: StreamEvent =
            serde_json::from_str(r#"{"type":"content_block_heartbeat"}"#).unwrap();
        assert!(matches!(event, StreamEvent::Unknown));

        let block: ContentBlock = serde_json::from_str(
            r#"{"type":"server_tool_use","id":"srvtoolu_1","name":"web_search"}"#,
        )
        .unwrap();
        assert!(matches!(block, ContentBlock::Unknown));

        let reason: StopReason = serde_json::from_str(r#""model_context_window_exceeded""#).unwrap();
        assert_eq!(reason, StopReason::Other);
    }

    #[test]
    fn serialize_request_skips_absent_fields() {
        let req = MessagesRequest {
            model: "claude-sonnet-4-5".to_string(),
            max_tokens: 1024,
            messages: vec![MessageParam {
                role: MessageRole::User,
                content: vec![ContentBlockParam::Text {
                    text: "hi".to_string(),
                }],
            }],
            system: None,
            temperature: None,
            top_p: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
            thinking: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "claude-sonnet-4-5",
                "max_tokens": 1024,
                "messages": [{"role":"user","content":[{"type":"text","text":"hi"}]}]
            })
        );
    }

    #[test]
    fn serialize_tool_choice_and_thinking() {
        assert_eq!(
            serde_json::to_value(ToolChoiceParam::Any).unwrap(),
            serde_json::json!({"type":"any"})
        );
        assert_eq!(
            serde_json::to_value(ToolChoiceParam::Tool {
                name: "f".to_string()
            })
            .unwrap(),
            serde_json::json!({"type":"tool","name":"f"})
        );
        assert_eq!(
            serde_json::to_value(ThinkingConfig::Enabled {
                budget_tokens: 8192
            })
            .unwrap(),
            serde_json::json!({"type":"enabled","budget_tokens":8192})
        );
    }
}
