//! Gemini `streamGenerateContent?alt=sse` chunks. No terminator: EOF ends the stream.

use serde::Deserialize;

use super::{argument_text, error_message, position_out_of_range, skipped, DecoderState};
use crate::model::FinishReason;
use crate::stream::event::{StreamEvent, ToolCallFragment};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GChunk {
    #[serde(default)]
    candidates: Option<Vec<GCandidate>>,
    #[serde(default)]
    usage_metadata: Option<GUsage>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    response_id: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GCandidate {
    #[serde(default)]
    content: Option<GContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GContent {
    #[serde(default)]
    parts: Vec<GPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GPart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    #[serde(default)]
    function_call: Option<GFunctionCall>,
}

#[derive(Deserialize)]
struct GFunctionCall {
    #[serde(default)]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GUsage {
    #[serde(default)]
    prompt_token_count: Option<u64>,
    #[serde(default)]
    candidates_token_count: Option<u64>,
}

pub(super) fn map_finish(reason: &str, saw_tool_call: bool) -> FinishReason {
    match reason {
        "STOP" if saw_tool_call => FinishReason::ToolUse,
        "STOP" => FinishReason::EndTurn,
        "MAX_TOKENS" => FinishReason::MaxTokens,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" | "IMAGE_SAFETY" => {
            FinishReason::ContentFilter
        }
        "MALFORMED_FUNCTION_CALL" | "OTHER" => FinishReason::Error,
        _ => FinishReason::None,
    }
}

pub(super) fn decode(doc: &str, state: &mut DecoderState) -> Vec<StreamEvent> {
    let chunk: GChunk = match serde_json::from_str(doc) {
        Ok(c) => c,
        Err(e) => return skipped(e),
    };
    if let Some(err) = chunk.error.as_ref() {
        return vec![StreamEvent::UpstreamError(error_message(err))];
    }

    let mut out = Vec::new();
    out.extend(StreamEvent::metadata(
        chunk.response_id.as_deref(),
        chunk.model_version.as_deref(),
    ));

    if let Some(candidate) = chunk.candidates.and_then(|c| c.into_iter().next()) {
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if part.thought == Some(true) {
                continue;
            }
            if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                out.push(StreamEvent::TextDelta(text));
            }
            if let Some(call) = part.function_call {
                // Calls arrive whole, each at a fresh position.
                let Some(pos) = state.fresh_position() else {
                    out.push(position_out_of_range());
                    continue;
                };
                let mut fragment = ToolCallFragment::new(pos)
                    .name(call.name)
                    .arguments(argument_text(call.args.as_ref()));
                if let Some(id) = call.id.filter(|i| !i.is_empty()) {
                    state.remember_id(&id, pos);
                    fragment = fragment.id(id);
                }
                out.push(StreamEvent::ToolCallFragment(fragment));
            }
        }
        if let Some(reason) = candidate.finish_reason.as_deref() {
            let mapped = map_finish(reason, state.saw_tool_call);
            if mapped != FinishReason::None {
                out.push(StreamEvent::FinishReason(mapped));
            }
        }
    }

    if let Some(u) = chunk.usage_metadata {
        out.extend(StreamEvent::usage(u.prompt_token_count, u.candidates_token_count));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::{PendingKey, UsageReport};

    fn run(lines: &[&str]) -> Vec<StreamEvent> {
        let mut st = DecoderState::default();
        lines.iter().flat_map(|l| decode(l, &mut st)).collect()
    }

    #[test]
    fn text_finish_and_usage() {
        let ev = run(&[
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}],"role":"model"}}],"modelVersion":"gemini-2.0-flash","responseId":"resp-1"}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"lo"}],"role":"model"},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":4,"candidatesTokenCount":2,"totalTokenCount":6}}"#,
        ]);
        assert_eq!(
            ev,
            vec![
                StreamEvent::Metadata { id: Some("resp-1".into()), model: Some("gemini-2.0-flash".into()) },
                StreamEvent::TextDelta("Hel".into()),
                StreamEvent::TextDelta("lo".into()),
                StreamEvent::FinishReason(FinishReason::EndTurn),
                StreamEvent::UsageReport(UsageReport { prompt: Some(4), completion: Some(2) }),
            ]
        );
    }

    #[test]
    fn thought_parts_are_not_text() {
        let ev = run(&[r#"{"candidates":[{"content":{"parts":[{"text":"thinking...","thought":true},{"text":"answer"}]}}]}"#]);
        assert_eq!(ev, vec![StreamEvent::TextDelta("answer".into())]);
    }

    #[test]
    fn function_calls_get_fresh_positions_and_tool_use_finish() {
        let ev = run(&[
            r#"{"candidates":[{"content":{"parts":[{"functionCall":{"name":"a","args":{"x":1}}},{"functionCall":{"name":"b","args":{}}}]}}]}"#,
            r#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP"}]}"#,
        ]);
        let fragments: Vec<&ToolCallFragment> = ev
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallFragment(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].key, PendingKey(0));
        assert_eq!(fragments[0].arguments, "{\"x\":1}");
        assert_eq!(fragments[1].key, PendingKey(1));
        assert_eq!(ev.last(), Some(&StreamEvent::FinishReason(FinishReason::ToolUse)));
    }

    #[test]
    fn finish_vocabulary() {
        assert_eq!(map_finish("MAX_TOKENS", false), FinishReason::MaxTokens);
        assert_eq!(map_finish("SAFETY", false), FinishReason::ContentFilter);
        assert_eq!(map_finish("MALFORMED_FUNCTION_CALL", false), FinishReason::Error);
        assert_eq!(map_finish("FINISH_REASON_UNSPECIFIED", false), FinishReason::None);
    }

    #[test]
    fn error_payload() {
        let ev = run(&[r#"{"error":{"code":429,"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#]);
        assert_eq!(ev, vec![StreamEvent::UpstreamError("Resource has been exhausted".into())]);
    }
}
