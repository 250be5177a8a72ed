//! Anthropic Messages API stream events.
//!
//! Tool calls are keyed by content block index; the id and name arrive on
//! `content_block_start`, arguments as `input_json_delta.partial_json`.

use serde::Deserialize;

use super::{position_out_of_range, skipped, DecoderState};
use crate::model::FinishReason;
use crate::stream::event::{PendingKey, StreamEvent, ToolCallFragment};

// ===== Anthropic wire types (streaming Messages API) =====

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AEvent {
    MessageStart {
        message: AMessageStart,
    },
    ContentBlockStart {
        index: usize,
        content_block: AContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: ABlockDelta,
    },
    MessageDelta {
        #[serde(default)]
        delta: Option<AMessageDelta>,
        #[serde(default)]
        usage: Option<AUsage>,
    },
    MessageStop,
    Error {
        error: AError,
    },
    // ping, content_block_stop, and anything newer
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
pub(super) struct AMessageStart {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<AUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum AContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum ABlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
pub(super) struct AMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub(super) struct AUsage {
    #[serde(default)]
    pub(super) input_tokens: Option<u64>,
    #[serde(default)]
    pub(super) output_tokens: Option<u64>,
}

#[derive(Deserialize)]
pub(super) struct AError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

pub(super) fn map_stop(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "pause_turn" => FinishReason::EndTurn,
        "stop_sequence" => FinishReason::StopSequence,
        "max_tokens" => FinishReason::MaxTokens,
        "tool_use" => FinishReason::ToolUse,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::EndTurn,
    }
}

fn block_position(state: &mut DecoderState, index: usize) -> Option<usize> {
    let pos = state.block_base.checked_add(index)?;
    state.explicit_position(pos)
}

pub(super) fn decode(doc: &str, state: &mut DecoderState) -> Vec<StreamEvent> {
    match serde_json::from_str::<AEvent>(doc) {
        Ok(ev) => decode_event(ev, state, true),
        Err(e) => skipped(e),
    }
}

/// `top_level` is false when the events are relayed inside another dialect,
/// where `message_stop` ends one message rather than the stream.
pub(super) fn decode_event(ev: AEvent, state: &mut DecoderState, top_level: bool) -> Vec<StreamEvent> {
    let mut out = Vec::new();
    match ev {
        AEvent::MessageStart { message } => {
            state.block_base = state.next_position;
            out.extend(StreamEvent::metadata(message.id.as_deref(), message.model.as_deref()));
            if let Some(u) = message.usage {
                out.extend(StreamEvent::usage(u.input_tokens, u.output_tokens));
            }
        }
        AEvent::ContentBlockStart { index, content_block } => match content_block {
            AContentBlock::Text { text } if !text.is_empty() => out.push(StreamEvent::TextDelta(text)),
            AContentBlock::ToolUse { id, name } => {
                // `input` on the start block is always an empty placeholder.
                let Some(pos) = block_position(state, index) else {
                    out.push(position_out_of_range());
                    return out;
                };
                state.remember_id(&id, pos);
                out.push(StreamEvent::ToolCallFragment(
                    ToolCallFragment::new(pos).id(id).name(name),
                ));
            }
            _ => {}
        },
        AEvent::ContentBlockDelta { index, delta } => match delta {
            ABlockDelta::TextDelta { text } if !text.is_empty() => out.push(StreamEvent::TextDelta(text)),
            ABlockDelta::InputJsonDelta { partial_json } => {
                let Some(pos) = block_position(state, index) else {
                    out.push(position_out_of_range());
                    return out;
                };
                out.push(StreamEvent::ToolCallFragment(ToolCallFragment {
                    key: PendingKey(pos),
                    id: None,
                    name: None,
                    arguments: partial_json,
                }));
            }
            _ => {}
        },
        AEvent::MessageDelta { delta, usage } => {
            if let Some(reason) = delta.and_then(|d| d.stop_reason) {
                let mapped = map_stop(&reason);
                state.last_stop = Some(mapped);
                out.push(StreamEvent::FinishReason(mapped));
            }
            if let Some(u) = usage {
                out.extend(StreamEvent::usage(u.input_tokens, u.output_tokens));
            }
        }
        AEvent::MessageStop => {
            if top_level {
                out.push(StreamEvent::StreamDone);
            }
        }
        AEvent::Error { error } => {
            let msg = match error.kind {
                Some(kind) => format!("{kind}: {}", error.message),
                None => error.message,
            };
            out.push(StreamEvent::UpstreamError(msg));
        }
        AEvent::Other => {}
    }
    out
}
