//! Coding-agent CLI `stream-json` output (one JSON object per stdout line).
//!
//! Whole `assistant` messages carry complete content blocks. When the CLI is
//! run with partial messages, `stream_event` lines relay raw Anthropic stream
//! events as well; once one is seen, whole messages are ignored so text and
//! tool calls are not counted twice. The `result` line ends the stream.

use serde::Deserialize;

use super::anthropic::{self, AEvent, AUsage};
use super::{argument_text, position_out_of_range, skipped, DecoderState};
use crate::model::FinishReason;
use crate::stream::event::{StreamEvent, ToolCallFragment};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliLine {
    System {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    Assistant {
        message: CliMessage,
    },
    StreamEvent {
        event: AEvent,
    },
    Result {
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        usage: Option<AUsage>,
    },
    // user (tool results echoed back), and anything newer
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct CliMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<CliBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CliBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Option<serde_json::Value>,
    },
    #[serde(other)]
    Other,
}

pub(super) fn decode(doc: &str, state: &mut DecoderState) -> Vec<StreamEvent> {
    let line: CliLine = match serde_json::from_str(doc) {
        Ok(l) => l,
        Err(e) => return skipped(e),
    };

    let mut out = Vec::new();
    match line {
        CliLine::System { session_id, model } => {
            out.extend(StreamEvent::metadata(session_id.as_deref(), model.as_deref()));
        }
        CliLine::StreamEvent { event } => {
            state.saw_partial_events = true;
            out.extend(anthropic::decode_event(event, state, false));
        }
        CliLine::Assistant { message } => {
            if state.saw_partial_events {
                return out;
            }
            out.extend(StreamEvent::metadata(message.id.as_deref(), message.model.as_deref()));
            for block in message.content {
                match block {
                    CliBlock::Text { text } if !text.is_empty() => out.push(StreamEvent::TextDelta(text)),
                    CliBlock::ToolUse { id, name, input } => {
                        let Some(pos) = state.fresh_position() else {
                            out.push(position_out_of_range());
                            continue;
                        };
                        state.remember_id(&id, pos);
                        out.push(StreamEvent::ToolCallFragment(
                            ToolCallFragment::new(pos)
                                .id(id)
                                .name(name)
                                .arguments(argument_text(input.as_ref())),
                        ));
                    }
                    _ => {}
                }
            }
            if let Some(reason) = message.stop_reason.as_deref() {
                state.last_stop = Some(anthropic::map_stop(reason));
            }
        }
        CliLine::Result { is_error, subtype, result, usage } => {
            if is_error {
                let msg = result
                    .or(subtype)
                    .unwrap_or_else(|| "cli reported an error".to_string());
                out.push(StreamEvent::UpstreamError(msg));
                return out;
            }
            out.push(StreamEvent::FinishReason(
                state.last_stop.unwrap_or(FinishReason::EndTurn),
            ));
            if let Some(u) = usage {
                out.extend(StreamEvent::usage(u.input_tokens, u.output_tokens));
            }
            out.push(StreamEvent::StreamDone);
        }
        CliLine::Other => {}
    }
    out
}
