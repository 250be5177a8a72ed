//! OpenAI-compatible chat completion chunks (`data: {...}` + `data: [DONE]`).

use serde::Deserialize;

use super::{error_message, position_out_of_range, skipped, DecoderState};
use crate::model::FinishReason;
use crate::stream::event::{PendingKey, StreamEvent, ToolCallFragment};

// ---- Wire structs (minimal) ----
#[derive(Deserialize)]
struct OAChunk {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Option<Vec<OAChoice>>,
    #[serde(default)]
    usage: Option<OAUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct OAChoice {
    #[serde(default)]
    delta: Option<OADelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OADelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OAToolCallDelta>>,
}

#[derive(Deserialize)]
struct OAToolCallDelta {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<OAFunctionDelta>,
}

#[derive(Deserialize)]
struct OAFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct OAUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

pub(super) fn map_finish(s: &str) -> FinishReason {
    match s {
        "stop" => FinishReason::EndTurn,
        "length" => FinishReason::MaxTokens,
        "tool_calls" | "function_call" => FinishReason::ToolUse,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::EndTurn,
    }
}

pub(super) fn decode(doc: &str, state: &mut DecoderState) -> Vec<StreamEvent> {
    let chunk: OAChunk = match serde_json::from_str(doc) {
        Ok(c) => c,
        Err(e) => return skipped(e),
    };
    if let Some(err) = chunk.error.as_ref() {
        return vec![StreamEvent::UpstreamError(error_message(err))];
    }

    let mut out = Vec::new();
    out.extend(StreamEvent::metadata(chunk.id.as_deref(), chunk.model.as_deref()));

    // Only the first choice is aggregated.
    if let Some(choice) = chunk.choices.and_then(|c| c.into_iter().next()) {
        if let Some(delta) = choice.delta {
            if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                out.push(StreamEvent::TextDelta(text));
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let Some(pos) = state.resolve(call.index, call.id.as_deref()) else {
                    out.push(position_out_of_range());
                    continue;
                };
                let (name, arguments) = match call.function {
                    Some(f) => (f.name.filter(|n| !n.is_empty()), f.arguments.unwrap_or_default()),
                    None => (None, String::new()),
                };
                out.push(StreamEvent::ToolCallFragment(ToolCallFragment {
                    key: PendingKey(pos),
                    id: call.id.filter(|i| !i.is_empty()),
                    name,
                    arguments,
                }));
            }
        }
        if let Some(reason) = choice.finish_reason.as_deref() {
            out.push(StreamEvent::FinishReason(map_finish(reason)));
        }
    }

    if let Some(u) = chunk.usage {
        out.extend(StreamEvent::usage(u.prompt_tokens, u.completion_tokens));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::event::UsageReport;

    fn run(lines: &[&str]) -> Vec<StreamEvent> {
        let mut st = DecoderState::default();
        lines.iter().flat_map(|l| decode(l, &mut st)).collect()
    }

    #[test]
    fn text_delta_and_identity() {
        let ev = run(&[r#"{"id":"chatcmpl-1","model":"gpt-4o","choices":[{"delta":{"role":"assistant","content":"Hi"}}]}"#]);
        assert_eq!(
            ev,
            vec![
                StreamEvent::Metadata { id: Some("chatcmpl-1".into()), model: Some("gpt-4o".into()) },
                StreamEvent::TextDelta("Hi".into()),
            ]
        );
    }

    #[test]
    fn empty_content_is_not_a_delta() {
        let ev = run(&[r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#]);
        assert!(ev.is_empty());
    }

    #[test]
    fn finish_and_usage_in_one_chunk() {
        let ev = run(&[r#"{"choices":[{"delta":{},"finish_reason":"length"}],"usage":{"prompt_tokens":5,"completion_tokens":9}}"#]);
        assert_eq!(
            ev,
            vec![
                StreamEvent::FinishReason(FinishReason::MaxTokens),
                StreamEvent::UsageReport(UsageReport { prompt: Some(5), completion: Some(9) }),
            ]
        );
    }

    #[test]
    fn usage_only_chunk_with_empty_choices() {
        let ev = run(&[r#"{"choices":[],"usage":{"prompt_tokens":1,"completion_tokens":2}}"#]);
        assert_eq!(ev.len(), 1);
        assert!(matches!(ev[0], StreamEvent::UsageReport(_)));
    }

    #[test]
    fn finish_vocabulary() {
        assert_eq!(map_finish("stop"), FinishReason::EndTurn);
        assert_eq!(map_finish("length"), FinishReason::MaxTokens);
        assert_eq!(map_finish("tool_calls"), FinishReason::ToolUse);
        assert_eq!(map_finish("function_call"), FinishReason::ToolUse);
        assert_eq!(map_finish("content_filter"), FinishReason::ContentFilter);
        assert_eq!(map_finish("weird_reason"), FinishReason::EndTurn);
    }

    #[test]
    fn tool_fragments_keep_index_and_first_id() {
        let ev = run(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"lookup","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"a\":"}}]}}]}"#,
        ]);
        assert_eq!(
            ev,
            vec![
                StreamEvent::ToolCallFragment(ToolCallFragment {
                    key: PendingKey(0),
                    id: Some("call_a".into()),
                    name: Some("lookup".into()),
                    arguments: String::new(),
                }),
                StreamEvent::ToolCallFragment(ToolCallFragment {
                    key: PendingKey(0),
                    id: None,
                    name: None,
                    arguments: "{\"a\":".into(),
                }),
            ]
        );
    }

    #[test]
    fn index_less_fragments_resolve_by_id() {
        let ev = run(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"id":"x","function":{"name":"a","arguments":"{"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"id":"y","function":{"name":"b","arguments":"{"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"id":"x","function":{"arguments":"}"}}]}}]}"#,
        ]);
        let keys: Vec<usize> = ev
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallFragment(f) => Some(f.key.0),
                _ => None,
            })
            .collect();
        assert_eq!(keys, vec![0, 1, 0]);
    }

    #[test]
    fn in_band_error_object() {
        let ev = run(&[r#"{"error":{"message":"overloaded","type":"server_error"}}"#]);
        assert_eq!(ev, vec![StreamEvent::UpstreamError("overloaded".into())]);
    }

    #[test]
    fn huge_tool_call_index_is_skipped_not_wrapped() {
        let ev = run(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":18446744073709551615,"id":"call_x","function":{"name":"f","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"g","arguments":"{}"}}]}}]}"#,
        ]);
        assert!(matches!(&ev[0], StreamEvent::DecodeSkipped(msg) if msg.contains("out of range")), "{ev:?}");
        match &ev[1] {
            StreamEvent::ToolCallFragment(f) => {
                assert_eq!(f.key, PendingKey(0));
                assert_eq!(f.id.as_deref(), Some("call_a"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ev.len(), 2);
    }
}
