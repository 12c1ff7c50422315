//! OpenAI Chat Completions wire types.
//!
//! Request types deserialize what OpenAI SDK clients send; response and
//! chunk types serialize what they expect back. Unions are discriminated
//! by their tag field (`role` for messages, `type` for content parts and
//! tools), never by structural guessing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stop: Option<StopSequences>,
    /// Escape hatch for provider-specific parameters (e.g. `thinking`).
    #[serde(default)]
    pub extra_body: Option<Map<String, Value>>,
}

/// A conversation message, discriminated by `role`.
#[derive(Debug, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: MessageContent,
    },
    Developer {
        content: MessageContent,
    },
    User {
        content: MessageContent,
    },
    Assistant {
        #[serde(default)]
        content: Option<MessageContent>,
        #[serde(default)]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        content: MessageContent,
        tool_call_id: String,
    },
}

/// Message content: either a bare string or a list of typed parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    InputAudio {
        #[allow(dead_code)]
        input_audio: Value,
    },
    File {
        file: FilePayload,
    },
    Refusal {
        refusal: String,
    },
}

#[derive(Debug, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    /// Detail level ("low"/"high"/"auto") has no upstream equivalent.
    #[serde(default)]
    #[allow(dead_code)]
    pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FilePayload {
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub file_data: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub function: FunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function {
        function: FunctionDefinition,
    },
    Custom {
        #[allow(dead_code)]
        custom: Value,
    },
}

#[derive(Debug, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Flat JSON-Schema object.
    #[serde(default)]
    pub parameters: Option<Map<String, Value>>,
}

/// `tool_choice`: a mode string or a named/allowed-tools object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    Mode(ToolChoiceMode),
    Named(NamedToolChoice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
    None,
    Auto,
    Required,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NamedToolChoice {
    Function {
        function: ToolChoiceFunction,
    },
    Custom {
        #[allow(dead_code)]
        custom: Value,
    },
    AllowedTools {
        #[allow(dead_code)]
        allowed_tools: Value,
    },
}

#[derive(Debug, Deserialize)]
pub struct ToolChoiceFunction {
    pub name: String,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct Choice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseToolCall {
    pub id: String,
    pub r#type: String,
    pub function: ResponseFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseFunction {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptTokensDetails {
    pub cached_tokens: u32,
}

// ============================================================================
// Streaming Chunk Types
// ============================================================================

/// One SSE frame of a streamed chat completion.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<FinishReason>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkToolCall {
    /// Tool-call index, counting tool calls only (not content blocks).
    pub index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    pub function: ChunkFunction,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkFunction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// `stop`: a single sequence or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_request() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"model":"claude-sonnet-4-5","messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(req.model.as_deref(), Some("claude-sonnet-4-5"));
        assert!(matches!(
            req.messages[0],
            ChatMessage::User {
                content: MessageContent::Text(_)
            }
        ));
    }

    #[test]
    fn parse_role_discriminated_messages() {
        let req: ChatCompletionRequest = serde_json::from_str(
            r#"{"messages":[
                {"role":"system","content":"a"},
                {"role":"developer","content":"b"},
                {"role":"assistant","content":null,"tool_calls":[
                    {"id":"call_1","type":"function","function":{"name":"f","arguments":"{}"}}]},
                {"role":"tool","content":"ok","tool_call_id":"call_1"}
            ]}"#,
        )
        .unwrap();
        assert!(matches!(req.messages[0], ChatMessage::System { .. }));
        assert!(matches!(req.messages[1], ChatMessage::Developer { .. }));
        let ChatMessage::Assistant {
            content,
            tool_calls,
        } = &req.messages[2]
        else {
            panic!("expected assistant message");
        };
        assert!(content.is_none());
        assert_eq!(tool_calls.as_ref().unwrap()[0].id, "call_1");
        let ChatMessage::Tool { tool_call_id, .. } = &req.messages[3] else {
            panic!("expected tool message");
        };
        assert_eq!(tool_call_id, "call_1");
    }

    #[test]
    fn parse_content_parts() {
        let content: MessageContent = serde_json::from_str(
            r#"[{"type":"text","text":"t"},
                {"type":"image_url","image_url":{"url":"https://example.com/a.png"}},
                {"type":"refusal","refusal":"no"}]"#,
        )
        .unwrap();
        let MessageContent::Parts(parts) = content else {
            panic!("expected parts");
        };
        assert!(matches!(parts[0], ContentPart::Text { .. }));
        assert!(matches!(parts[1], ContentPart::ImageUrl { .. }));
        assert!(matches!(parts[2], ContentPart::Refusal { .. }));
    }

    #[test]
    fn parse_tool_choice_variants() {
        let auto: ToolChoice = serde_json::from_str(r#""auto""#).unwrap();
        assert!(matches!(auto, ToolChoice::Mode(ToolChoiceMode::Auto)));

        let named: ToolChoice =
            serde_json::from_str(r#"{"type":"function","function":{"name":"f"}}"#).unwrap();
        assert!(matches!(
            named,
            ToolChoice::Named(NamedToolChoice::Function { .. })
        ));

        let allowed: ToolChoice = serde_json::from_str(
            r#"{"type":"allowed_tools","allowed_tools":{"mode":"auto","tools":[]}}"#,
        )
        .unwrap();
        assert!(matches!(
            allowed,
            ToolChoice::Named(NamedToolChoice::AllowedTools { .. })
        ));
    }

    #[test]
    fn chunk_delta_skips_absent_fields() {
        let delta = ChunkDelta {
            content: Some("hi".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json, serde_json::json!({"content": "hi"}));
    }

    #[test]
    fn finish_reason_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&FinishReason::ToolCalls).unwrap(),
            r#""tool_calls""#
        );
        assert_eq!(
            serde_json::to_string(&FinishReason::ContentFilter).unwrap(),
            r#""content_filter""#
        );
    }

    #[test]
    fn stop_sequences_normalize() {
        let one: StopSequences = serde_json::from_str(r#""END""#).unwrap();
        assert_eq!(one.into_vec(), vec!["END"]);
        let many: StopSequences = serde_json::from_str(r#"["a","b"]"#).unwrap();
        assert_eq!(many.into_vec(), vec!["a", "b"]);
    }
}
