//! Anthropic SSE events → OpenAI chat completion chunks.
//!
//! `StreamTranslator` is a synchronous fold over the upstream event
//! sequence: one event in, zero or more chunks out. All per-stream state
//! lives here — nothing is shared across streams — so the chunk sequence
//! is a pure function of the event sequence.
//!
//! Index remapping is the tricky part: upstream indexes content blocks
//! (text at 0, tool at 1, ...) while clients index tool calls only
//! (tool at 0, tool at 1, ...). The fold keeps a sparse map from upstream
//! block index to client tool-call index.

use std::collections::HashMap;

use tracing::warn;

use crate::error::RelayError;
use crate::schema::anthropic::{ContentBlock, ContentDelta, StopReason, StreamEvent, UsageInfo};
use crate::schema::openai::{
    ChatCompletionChunk, ChunkChoice, ChunkDelta, ChunkFunction, ChunkToolCall, FinishReason,
    Usage,
};

use super::response::{map_stop_reason, map_usage, new_response_id};

/// Kind of the currently open upstream content block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActiveBlock {
    None,
    Text,
    /// Dropped: thinking has no client-side analog.
    Thinking,
    ToolUse {
        tool_index: u32,
    },
}

/// Per-stream fold state.
pub struct StreamTranslator {
    id: String,
    model: String,
    created: u64,
    tool_index_by_block: HashMap<usize, u32>,
    next_tool_index: u32,
    active_block: ActiveBlock,
    usage: UsageInfo,
    final_stop_reason: Option<StopReason>,
    role_emitted: bool,
}

impl StreamTranslator {
    /// `fallback_model` and `created` seed the chunk metadata until (and
    /// unless) `message_start` supplies upstream values.
    pub fn new(fallback_model: &str, created: u64) -> Self {
        Self {
            id: new_response_id(),
            model: fallback_model.to_string(),
            created,
            tool_index_by_block: HashMap::new(),
            next_tool_index: 0,
            active_block: ActiveBlock::None,
            usage: UsageInfo::default(),
            final_stop_reason: None,
            role_emitted: false,
        }
    }

    /// Fold one upstream event, returning the chunks it produces.
    ///
    /// An upstream `error` event terminates the fold with a typed error;
    /// malformed events degrade to no-ops rather than panicking.
    pub fn handle(&mut self, event: StreamEvent) -> Result<Vec<ChatCompletionChunk>, RelayError> {
        match event {
            StreamEvent::MessageStart { message } => {
                if let Some(id) = message.id.filter(|id| !id.is_empty()) {
                    self.id = id;
                }
                if let Some(model) = message.model.filter(|m| !m.is_empty()) {
                    self.model = model;
                }
                self.accumulate_usage(&message.usage);

                if self.role_emitted {
                    return Ok(vec![]);
                }
                self.role_emitted = true;
                Ok(vec![self.chunk(
                    ChunkDelta {
                        role: Some("assistant".to_string()),
                        content: Some(String::new()),
                        tool_calls: None,
                    },
                    None,
                    None,
                )])
            }

            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::Text { .. } => {
                    self.active_block = ActiveBlock::Text;
                    Ok(vec![])
                }
                ContentBlock::Thinking { .. } => {
                    self.active_block = ActiveBlock::Thinking;
                    Ok(vec![])
                }
                ContentBlock::ToolUse { id, name, .. } => {
                    let tool_index = self.next_tool_index;
                    self.next_tool_index += 1;
                    self.tool_index_by_block.insert(index, tool_index);
                    self.active_block = ActiveBlock::ToolUse { tool_index };

                    Ok(vec![self.chunk(
                        ChunkDelta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ChunkToolCall {
                                index: tool_index,
                                id: Some(id),
                                r#type: Some("function".to_string()),
                                function: ChunkFunction {
                                    name: Some(name),
                                    arguments: Some(String::new()),
                                },
                            }]),
                        },
                        None,
                        None,
                    )])
                }
                ContentBlock::Unknown => {
                    self.active_block = ActiveBlock::None;
                    Ok(vec![])
                }
            },

            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } => Ok(vec![self.chunk(
                    ChunkDelta {
                        role: None,
                        content: Some(text),
                        tool_calls: None,
                    },
                    None,
                    None,
                )]),
                ContentDelta::InputJsonDelta { partial_json } => {
                    // Usually the active block; the index map covers
                    // fine-grained streaming that interleaves blocks.
                    let tool_index = match self.active_block {
                        ActiveBlock::ToolUse { tool_index } => Some(tool_index),
                        _ => self.tool_index_by_block.get(&index).copied(),
                    };
                    let Some(tool_index) = tool_index else {
                        warn!(block_index = index, "input_json_delta for unknown block");
                        return Ok(vec![]);
                    };
                    Ok(vec![self.chunk(
                        ChunkDelta {
                            role: None,
                            content: None,
                            tool_calls: Some(vec![ChunkToolCall {
                                index: tool_index,
                                id: None,
                                r#type: None,
                                function: ChunkFunction {
                                    name: None,
                                    arguments: Some(partial_json),
                                },
                            }]),
                        },
                        None,
                        None,
                    )])
                }
                ContentDelta::ThinkingDelta { .. } | ContentDelta::Unknown => Ok(vec![]),
            },

            StreamEvent::ContentBlockStop { .. } => {
                self.active_block = ActiveBlock::None;
                Ok(vec![])
            }

            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(stop_reason) = delta.stop_reason {
                    self.final_stop_reason = Some(stop_reason);
                }
                if let Some(usage) = usage {
                    self.accumulate_usage(&usage);
                }
                Ok(vec![])
            }

            StreamEvent::MessageStop => {
                let finish = map_stop_reason(self.final_stop_reason);
                Ok(vec![self.chunk(
                    ChunkDelta::default(),
                    Some(finish),
                    Some(map_usage(&self.usage)),
                )])
            }

            StreamEvent::Error { error } => Err(RelayError::from_stream_error(error)),

            StreamEvent::Ping | StreamEvent::Unknown => Ok(vec![]),
        }
    }

    fn accumulate_usage(&mut self, usage: &UsageInfo) {
        self.usage.input_tokens += usage.input_tokens;
        self.usage.output_tokens += usage.output_tokens;
        if let Some(cached) = usage.cache_read_input_tokens {
            *self.usage.cache_read_input_tokens.get_or_insert(0) += cached;
        }
        if let Some(created) = usage.cache_creation_input_tokens {
            *self.usage.cache_creation_input_tokens.get_or_insert(0) += created;
        }
    }

    fn chunk(
        &self,
        delta: ChunkDelta,
        finish_reason: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn event(json: &str) -> StreamEvent {
        serde_json::from_str(json).unwrap()
    }

    fn drive(events: &[&str]) -> Vec<ChatCompletionChunk> {
        let mut fold = StreamTranslator::new("claude-fallback", 1700000000);
        let mut chunks = Vec::new();
        for e in events {
            chunks.extend(fold.handle(event(e)).unwrap());
        }
        chunks
    }

    const TEXT_STREAM: &[&str] = &[
        r#"{"type":"message_start","message":{"id":"u2","model":"claude-x","usage":{"input_tokens":2,"output_tokens":0}}}"#,
        r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"he"}}"#,
        r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"llo"}}"#,
        r#"{"type":"content_block_stop","index":0}"#,
        r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
        r#"{"type":"message_stop"}"#,
    ];

    #[test]
    fn streaming_text() {
        let chunks = drive(TEXT_STREAM);
        assert_eq!(chunks.len(), 4);

        // Role chunk first, exactly once
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[0].choices[0].delta.content.as_deref(), Some(""));
        assert!(
            chunks[1..]
                .iter()
                .all(|c| c.choices[0].delta.role.is_none())
        );

        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("he"));
        assert_eq!(chunks[2].choices[0].delta.content.as_deref(), Some("llo"));

        // Terminal chunk carries the only finish_reason plus usage
        let terminal = &chunks[3];
        assert_eq!(
            terminal.choices[0].finish_reason,
            Some(FinishReason::Stop)
        );
        let usage = terminal.usage.as_ref().unwrap();
        assert_eq!(usage.prompt_tokens, 2);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 7);

        // Shared metadata from message_start
        for chunk in &chunks {
            assert_eq!(chunk.id, "u2");
            assert_eq!(chunk.model, "claude-x");
            assert_eq!(chunk.created, 1700000000);
            assert_eq!(chunk.object, "chat.completion.chunk");
        }
    }

    #[test]
    fn exactly_one_finish_reason_on_last_chunk() {
        let chunks = drive(TEXT_STREAM);
        let with_finish: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.choices[0].finish_reason.is_some())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(with_finish, vec![chunks.len() - 1]);
    }

    #[test]
    fn streaming_tool_use_reindexes_blocks() {
        let chunks = drive(&[
            r#"{"type":"message_start","message":{"id":"u3","model":"claude-x","usage":{"input_tokens":1,"output_tokens":0}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"ok"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"t1","name":"f","input":{}}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"a\":"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"1}"}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":9}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(chunks.len(), 6);

        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("ok"));

        // Upstream block index 1 becomes client tool-call index 0
        let open = chunks[2].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(open[0].index, 0);
        assert_eq!(open[0].id.as_deref(), Some("t1"));
        assert_eq!(open[0].r#type.as_deref(), Some("function"));
        assert_eq!(open[0].function.name.as_deref(), Some("f"));
        assert_eq!(open[0].function.arguments.as_deref(), Some(""));

        let frag1 = chunks[3].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(frag1[0].index, 0);
        assert!(frag1[0].id.is_none());
        assert_eq!(frag1[0].function.arguments.as_deref(), Some("{\"a\":"));
        let frag2 = chunks[4].choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(frag2[0].function.arguments.as_deref(), Some("1}"));

        assert_eq!(
            chunks[5].choices[0].finish_reason,
            Some(FinishReason::ToolCalls)
        );
    }

    #[test]
    fn tool_indices_are_dense_and_ascending() {
        let chunks = drive(&[
            r#"{"type":"message_start","message":{"id":"u4","model":"m","usage":{"input_tokens":1,"output_tokens":0}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"t1","name":"f","input":{}}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
            r#"{"type":"content_block_start","index":2,"content_block":{"type":"tool_use","id":"t2","name":"g","input":{}}}"#,
            r#"{"type":"content_block_delta","index":2,"delta":{"type":"input_json_delta","partial_json":"{}"}}"#,
            r#"{"type":"content_block_stop","index":2}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":3}}"#,
            r#"{"type":"message_stop"}"#,
        ]);

        let mut first_seen = Vec::new();
        for chunk in &chunks {
            for call in chunk.choices[0].delta.tool_calls.iter().flatten() {
                if !first_seen.contains(&call.index) {
                    first_seen.push(call.index);
                }
            }
        }
        assert_eq!(first_seen, vec![0, 1]);

        // The fragment for block 2 lands on tool index 1
        let frag = chunks
            .iter()
            .filter_map(|c| c.choices[0].delta.tool_calls.as_ref())
            .find(|calls| calls[0].function.arguments.as_deref() == Some("{}"))
            .unwrap();
        assert_eq!(frag[0].index, 1);
    }

    #[test]
    fn thinking_and_ping_produce_no_chunks() {
        let chunks = drive(&[
            r#"{"type":"message_start","message":{"id":"u5","model":"m","usage":{"input_tokens":1,"output_tokens":0}}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"let me think"}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"abc"}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":2}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        // Only the role chunk and the terminal chunk
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn error_event_surfaces_as_typed_error() {
        let mut fold = StreamTranslator::new("m", 0);
        fold.handle(event(
            r#"{"type":"message_start","message":{"id":"u6","model":"m","usage":{"input_tokens":1,"output_tokens":0}}}"#,
        ))
        .unwrap();

        let err = fold
            .handle(event(
                r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#,
            ))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServerError);
        assert_eq!(err.to_string(), "busy");
    }

    #[test]
    fn generates_fallback_id_and_model() {
        let chunks = drive(&[
            r#"{"type":"message_start","message":{"usage":{"input_tokens":0,"output_tokens":0}}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert!(chunks[0].id.starts_with("chatcmpl-"));
        assert_eq!(chunks[0].model, "claude-fallback");
        // Same id on every chunk
        assert_eq!(chunks[0].id, chunks[1].id);
    }

    #[test]
    fn orphan_json_delta_is_dropped_not_panicked() {
        let chunks = drive(&[
            r#"{"type":"message_start","message":{"id":"u7","model":"m","usage":{"input_tokens":1,"output_tokens":0}}}"#,
            r#"{"type":"content_block_delta","index":9,"delta":{"type":"input_json_delta","partial_json":"{"}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].choices[0].delta.tool_calls.is_none());
    }

    #[test]
    fn usage_accumulates_across_start_and_delta() {
        let chunks = drive(&[
            r#"{"type":"message_start","message":{"id":"u8","model":"m","usage":{"input_tokens":150,"output_tokens":0,"cache_read_input_tokens":80}}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":75}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        let usage = chunks.last().unwrap().usage.as_ref().unwrap();
        assert_eq!(usage.prompt_tokens, 150);
        assert_eq!(usage.completion_tokens, 75);
        assert_eq!(usage.total_tokens, 225);
        assert_eq!(usage.prompt_tokens_details.as_ref().unwrap().cached_tokens, 80);
    }

    #[test]
    fn deterministic_for_fixed_event_sequence() {
        let a = drive(TEXT_STREAM);
        let b = drive(TEXT_STREAM);
        assert_eq!(
            serde_json::to_value(&a[1..]).unwrap(),
            serde_json::to_value(&b[1..]).unwrap()
        );
        // Chunk 0 included too: id comes from message_start, so the whole
        // sequence matches
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }
}
