//! OpenAI → Anthropic request translation.
//!
//! A pure mapping from the client dialect to the upstream dialect:
//! - system/developer messages are hoisted into the single `system` string
//! - consecutive tool-result messages merge into one user message
//! - assistant text precedes its tool_use blocks
//! - content parts map to upstream blocks, or fail loudly when the
//!   upstream has no equivalent (audio, file_id references, custom tools)

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};

use crate::constants::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::error::TranslateError;
use crate::schema::anthropic::{
    ContentBlockParam, DocumentSource, ImageSource, MessageParam, MessageRole, MessagesRequest,
    ThinkingConfig, ToolChoiceParam, ToolInputSchema, ToolParam,
};
use crate::schema::openai::{
    ChatCompletionRequest, ChatMessage, ContentPart, FilePayload, MessageContent, NamedToolChoice,
    StopSequences, ToolCall, ToolChoice, ToolChoiceMode, ToolDefinition,
};

/// Thinking budgets for OpenAI's coarse reasoning_effort levels.
const BUDGET_LOW: u32 = 1024;
const BUDGET_MEDIUM: u32 = 8192;
const BUDGET_HIGH: u32 = 24576;

/// Translate a chat completion request into an upstream Messages request.
///
/// The `stream` field is left unset; the orchestrator decides the mode.
pub fn translate_request(req: ChatCompletionRequest) -> Result<MessagesRequest, TranslateError> {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages: Vec<MessageParam> = Vec::new();
    let mut pending_tool_results: Vec<ContentBlockParam> = Vec::new();

    for msg in req.messages {
        match msg {
            ChatMessage::System { content } => {
                let text = text_only_content(&content, "system")?;
                if !text.is_empty() {
                    system_parts.push(text);
                }
            }
            ChatMessage::Developer { content } => {
                let text = text_only_content(&content, "developer")?;
                if !text.is_empty() {
                    system_parts.push(text);
                }
            }
            ChatMessage::User { content } => {
                flush_tool_results(&mut messages, &mut pending_tool_results);
                messages.push(MessageParam {
                    role: MessageRole::User,
                    content: user_blocks(content)?,
                });
            }
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                flush_tool_results(&mut messages, &mut pending_tool_results);
                messages.push(MessageParam {
                    role: MessageRole::Assistant,
                    content: assistant_blocks(content, tool_calls)?,
                });
            }
            ChatMessage::Tool {
                content,
                tool_call_id,
            } => {
                // Merged into a single user message when the run ends;
                // upstream requires strict user/assistant alternation.
                pending_tool_results.push(ContentBlockParam::ToolResult {
                    tool_use_id: tool_call_id,
                    content: text_only_content(&content, "tool")?,
                });
            }
        }
    }
    flush_tool_results(&mut messages, &mut pending_tool_results);

    let tools = match req.tools {
        Some(tools) if !tools.is_empty() => Some(map_tools(tools)?),
        _ => None,
    };
    let tool_choice = map_tool_choice(req.tool_choice, tools.is_some())?;
    let thinking = build_thinking(req.reasoning_effort.as_deref(), req.extra_body.as_ref())?;

    Ok(MessagesRequest {
        model: req.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: (!system_parts.is_empty()).then(|| system_parts.join("\n")),
        temperature: req.temperature,
        top_p: req.top_p,
        stop_sequences: req
            .stop
            .map(StopSequences::into_vec)
            .filter(|s| !s.is_empty()),
        stream: None,
        tools,
        tool_choice,
        thinking,
    })
}

fn flush_tool_results(messages: &mut Vec<MessageParam>, pending: &mut Vec<ContentBlockParam>) {
    if !pending.is_empty() {
        messages.push(MessageParam {
            role: MessageRole::User,
            content: std::mem::take(pending),
        });
    }
}

/// Extract plain text from a message whose role only supports text parts.
fn text_only_content(content: &MessageContent, role: &str) -> Result<String, TranslateError> {
    match content {
        MessageContent::Text(text) => Ok(text.clone()),
        MessageContent::Parts(parts) => {
            let mut texts = Vec::with_capacity(parts.len());
            for (i, part) in parts.iter().enumerate() {
                match part {
                    ContentPart::Text { text } => texts.push(text.as_str()),
                    other => {
                        return Err(TranslateError::UnsupportedFeature(format!(
                            "content part type {} not supported in {role} messages (part {i})",
                            part_name(other)
                        )));
                    }
                }
            }
            Ok(texts.join("\n"))
        }
    }
}

fn part_name(part: &ContentPart) -> &'static str {
    match part {
        ContentPart::Text { .. } => "text",
        ContentPart::ImageUrl { .. } => "image_url",
        ContentPart::InputAudio { .. } => "input_audio",
        ContentPart::File { .. } => "file",
        ContentPart::Refusal { .. } => "refusal",
    }
}

/// User messages support text, images and inline files.
fn user_blocks(content: MessageContent) -> Result<Vec<ContentBlockParam>, TranslateError> {
    let mut blocks = Vec::new();
    match content {
        MessageContent::Text(text) => {
            if !text.is_empty() {
                blocks.push(ContentBlockParam::Text { text });
            }
        }
        MessageContent::Parts(parts) => {
            for (i, part) in parts.into_iter().enumerate() {
                match part {
                    ContentPart::Text { text } => {
                        if !text.is_empty() {
                            blocks.push(ContentBlockParam::Text { text });
                        }
                    }
                    ContentPart::ImageUrl { image_url } => {
                        blocks.push(image_block(&image_url.url)?);
                    }
                    ContentPart::File { file } => {
                        blocks.push(file_block(file)?);
                    }
                    ContentPart::InputAudio { .. } => {
                        return Err(TranslateError::UnsupportedFeature(format!(
                            "audio content not supported in user content part {i}"
                        )));
                    }
                    ContentPart::Refusal { .. } => {
                        return Err(TranslateError::UnsupportedFeature(format!(
                            "content part type refusal not supported in user messages (part {i})"
                        )));
                    }
                }
            }
        }
    }
    ensure_non_empty(&mut blocks);
    Ok(blocks)
}

/// Assistant messages: text (and refusals, preserved as text) first, then
/// one tool_use block per tool call.
fn assistant_blocks(
    content: Option<MessageContent>,
    tool_calls: Option<Vec<ToolCall>>,
) -> Result<Vec<ContentBlockParam>, TranslateError> {
    let mut blocks = Vec::new();

    match content {
        Some(MessageContent::Text(text)) => {
            if !text.is_empty() {
                blocks.push(ContentBlockParam::Text { text });
            }
        }
        Some(MessageContent::Parts(parts)) => {
            for (i, part) in parts.into_iter().enumerate() {
                match part {
                    ContentPart::Text { text } => {
                        if !text.is_empty() {
                            blocks.push(ContentBlockParam::Text { text });
                        }
                    }
                    // Refusals are model-generated safety responses; they
                    // survive round-trips as conversational text.
                    ContentPart::Refusal { refusal } => {
                        if !refusal.is_empty() {
                            blocks.push(ContentBlockParam::Text { text: refusal });
                        }
                    }
                    other => {
                        return Err(TranslateError::UnsupportedFeature(format!(
                            "content part type {} not supported in assistant messages (part {i})",
                            part_name(&other)
                        )));
                    }
                }
            }
        }
        None => {}
    }

    for call in tool_calls.into_iter().flatten() {
        blocks.push(ContentBlockParam::ToolUse {
            id: call.id,
            name: call.function.name,
            input: parse_tool_arguments(&call.function.arguments)?,
        });
    }

    ensure_non_empty(&mut blocks);
    Ok(blocks)
}

/// The upstream rejects empty content arrays.
fn ensure_non_empty(blocks: &mut Vec<ContentBlockParam>) {
    if blocks.is_empty() {
        blocks.push(ContentBlockParam::Text {
            text: String::new(),
        });
    }
}

fn parse_tool_arguments(arguments: &str) -> Result<Value, TranslateError> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(arguments).map_err(|e| {
        TranslateError::MalformedContent(format!("tool call arguments are not valid JSON: {e}"))
    })
}

fn image_block(url: &str) -> Result<ContentBlockParam, TranslateError> {
    if let Some(rest) = url.strip_prefix("data:") {
        let Some((header, data)) = rest.split_once(',') else {
            return Err(TranslateError::MalformedContent(
                "invalid data URL format, expected data:mime/type;base64,data".to_string(),
            ));
        };

        let media_type = match header.split(';').next() {
            Some(mime) if !mime.is_empty() => mime.to_string(),
            _ => "image/jpeg".to_string(),
        };

        if STANDARD.decode(data).is_err() {
            return Err(TranslateError::MalformedContent(
                "invalid base64 image data".to_string(),
            ));
        }

        Ok(ContentBlockParam::Image {
            source: ImageSource::Base64 {
                media_type,
                data: data.to_string(),
            },
        })
    } else if url.starts_with("http://") || url.starts_with("https://") {
        Ok(ContentBlockParam::Image {
            source: ImageSource::Url {
                url: url.to_string(),
            },
        })
    } else {
        Err(TranslateError::MalformedContent(
            "invalid image URL format: must be http(s):// or data: URI".to_string(),
        ))
    }
}

/// Inline files become upstream document blocks. Only PDF and text
/// payloads have an upstream representation; `file_id` references would
/// need a file-storage layer this proxy does not have.
fn file_block(file: FilePayload) -> Result<ContentBlockParam, TranslateError> {
    if file.file_id.as_deref().is_some_and(|id| !id.is_empty()) {
        return Err(TranslateError::UnsupportedFeature(
            "file_id references not supported (requires file upload system), only inline file_data is supported".to_string(),
        ));
    }

    let Some(file_data) = file.file_data.filter(|d| !d.is_empty()) else {
        return Err(TranslateError::MissingField(
            "file content requires file_data field (inline base64)".to_string(),
        ));
    };

    let decoded = STANDARD.decode(&file_data).map_err(|e| {
        TranslateError::MalformedContent(format!("decode base64 file data: {e}"))
    })?;

    let mime_type = detect_mime_type(&decoded, file.filename.as_deref());

    if mime_type == "application/pdf" {
        Ok(ContentBlockParam::Document {
            source: DocumentSource::Base64 {
                media_type: "application/pdf".to_string(),
                data: file_data,
            },
            title: file.filename,
        })
    } else if mime_type.starts_with("text/") {
        let text = String::from_utf8(decoded).map_err(|_| {
            TranslateError::MalformedContent("text file data is not valid UTF-8".to_string())
        })?;
        Ok(ContentBlockParam::Document {
            source: DocumentSource::Text {
                media_type: "text/plain".to_string(),
                data: text,
            },
            title: file.filename,
        })
    } else {
        Err(TranslateError::UnsupportedFeature(format!(
            "unsupported file type: {mime_type} (only PDF and text files supported)"
        )))
    }
}

/// MIME detection chain: content sniffing, then filename extension, then
/// the octet-stream fallback.
fn detect_mime_type(data: &[u8], filename: Option<&str>) -> String {
    if data.starts_with(b"%PDF-") {
        return "application/pdf".to_string();
    }
    if looks_like_text(data) {
        return "text/plain".to_string();
    }

    if let Some(name) = filename {
        let ext = name.rsplit('.').next().unwrap_or("").to_lowercase();
        match ext.as_str() {
            "pdf" => return "application/pdf".to_string(),
            "txt" | "md" | "markdown" | "csv" | "log" | "json" | "xml" | "html" => {
                return "text/plain".to_string();
            }
            _ => {}
        }
    }

    "application/octet-stream".to_string()
}

fn looks_like_text(data: &[u8]) -> bool {
    let Ok(text) = std::str::from_utf8(data) else {
        return false;
    };
    !text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
}

fn map_tools(tools: Vec<ToolDefinition>) -> Result<Vec<ToolParam>, TranslateError> {
    let mut mapped = Vec::with_capacity(tools.len());
    for (i, tool) in tools.into_iter().enumerate() {
        match tool {
            ToolDefinition::Function { function } => {
                let input_schema = match function.parameters {
                    Some(params) => split_input_schema(params),
                    None => ToolInputSchema {
                        schema_type: "object".to_string(),
                        properties: None,
                        required: None,
                        additional: Map::new(),
                    },
                };
                mapped.push(ToolParam {
                    name: function.name,
                    description: function.description,
                    input_schema,
                });
            }
            ToolDefinition::Custom { .. } => {
                return Err(TranslateError::UnsupportedFeature(format!(
                    "custom tool not supported at index {i}"
                )));
            }
        }
    }
    Ok(mapped)
}

/// The upstream schema separates `properties`/`required` into dedicated
/// fields; every other JSON-Schema keyword is preserved alongside them.
fn split_input_schema(mut params: Map<String, Value>) -> ToolInputSchema {
    let properties = params.remove("properties");
    let required = params.remove("required").and_then(|r| match r {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        _ => None,
    });
    params.remove("type");

    ToolInputSchema {
        schema_type: "object".to_string(),
        properties,
        required,
        additional: params,
    }
}

fn map_tool_choice(
    choice: Option<ToolChoice>,
    has_tools: bool,
) -> Result<Option<ToolChoiceParam>, TranslateError> {
    let Some(choice) = choice else {
        // OpenAI defaults to auto when tools are provided but no choice
        // is specified.
        return Ok(has_tools.then_some(ToolChoiceParam::Auto));
    };

    match choice {
        ToolChoice::Mode(ToolChoiceMode::None) => Ok(Some(ToolChoiceParam::None)),
        ToolChoice::Mode(ToolChoiceMode::Auto) => Ok(Some(ToolChoiceParam::Auto)),
        ToolChoice::Mode(ToolChoiceMode::Required) => Ok(Some(ToolChoiceParam::Any)),
        ToolChoice::Named(NamedToolChoice::Function { function }) => {
            Ok(Some(ToolChoiceParam::Tool {
                name: function.name,
            }))
        }
        ToolChoice::Named(NamedToolChoice::Custom { .. }) => Err(
            TranslateError::UnsupportedFeature("custom tool choice not supported".to_string()),
        ),
        // allowed_tools restricts to a tool subset; upstream can only
        // restrict to a single named tool.
        ToolChoice::Named(NamedToolChoice::AllowedTools { .. }) => {
            Err(TranslateError::UnsupportedFeature(
                "allowed_tools choice not supported (only single tool restriction via named choice)"
                    .to_string(),
            ))
        }
    }
}

/// Map `reasoning_effort` to an explicit thinking budget, then apply any
/// `extra_body.thinking` override.
fn build_thinking(
    effort: Option<&str>,
    extra_body: Option<&Map<String, Value>>,
) -> Result<Option<ThinkingConfig>, TranslateError> {
    let mut thinking = match effort {
        Some("low") => Some(ThinkingConfig::Enabled {
            budget_tokens: BUDGET_LOW,
        }),
        Some("medium") => Some(ThinkingConfig::Enabled {
            budget_tokens: BUDGET_MEDIUM,
        }),
        Some("high") => Some(ThinkingConfig::Enabled {
            budget_tokens: BUDGET_HIGH,
        }),
        // Unknown effort levels are ignored
        _ => None,
    };

    if let Some(config) = extra_body.and_then(|body| body.get("thinking")) {
        match config.get("type").and_then(|t| t.as_str()) {
            Some("enabled") => {
                if let Some(budget) = config.get("budget_tokens").and_then(|b| b.as_u64()) {
                    thinking = Some(ThinkingConfig::Enabled {
                        budget_tokens: budget as u32,
                    });
                } else if !matches!(thinking, Some(ThinkingConfig::Enabled { .. })) {
                    return Err(TranslateError::MissingField(
                        "extra_body.thinking.type is \"enabled\" but budget_tokens is not specified and no reasoning_effort set".to_string(),
                    ));
                }
            }
            Some("disabled") => thinking = Some(ThinkingConfig::Disabled),
            // Unknown thinking.type values are ignored
            _ => {}
        }
    }

    Ok(thinking)
}
