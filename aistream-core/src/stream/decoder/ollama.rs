//! Ollama `/api/chat` NDJSON. The terminal line carries `"done": true`.

use serde::Deserialize;

use super::{argument_text, position_out_of_range, skipped, DecoderState};
use crate::model::FinishReason;
use crate::stream::event::{StreamEvent, ToolCallFragment};

#[derive(Deserialize)]
struct OChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<OMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct OMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OToolCall>>,
}

#[derive(Deserialize)]
struct OToolCall {
    function: OFunction,
}

#[derive(Deserialize)]
struct OFunction {
    name: String,
    #[serde(default)]
    arguments: Option<serde_json::Value>,
}

pub(super) fn map_done(reason: Option<&str>, saw_tool_call: bool) -> FinishReason {
    match reason {
        Some("length") => FinishReason::MaxTokens,
        _ if saw_tool_call => FinishReason::ToolUse,
        _ => FinishReason::EndTurn,
    }
}

pub(super) fn decode(doc: &str, state: &mut DecoderState) -> Vec<StreamEvent> {
    let chunk: OChunk = match serde_json::from_str(doc) {
        Ok(c) => c,
        Err(e) => return skipped(e),
    };
    if let Some(err) = chunk.error {
        return vec![StreamEvent::UpstreamError(err)];
    }

    let mut out = Vec::new();
    out.extend(StreamEvent::metadata(None, chunk.model.as_deref()));

    if let Some(message) = chunk.message {
        if let Some(text) = message.content.filter(|t| !t.is_empty()) {
            out.push(StreamEvent::TextDelta(text));
        }
        for call in message.tool_calls.unwrap_or_default() {
            let Some(pos) = state.fresh_position() else {
                out.push(position_out_of_range());
                continue;
            };
            out.push(StreamEvent::ToolCallFragment(
                ToolCallFragment::new(pos)
                    .name(call.function.name)
                    .arguments(argument_text(call.function.arguments.as_ref())),
            ));
        }
    }

    if chunk.done {
        out.push(StreamEvent::FinishReason(map_done(
            chunk.done_reason.as_deref(),
            state.saw_tool_call,
        )));
        out.extend(StreamEvent::usage(chunk.prompt_eval_count, chunk.eval_count));
        out.push(StreamEvent::StreamDone);
    }
    out
}
