//! Response aggregator: the per-request state machine.
//!
//! `Idle → Streaming → Finalizing → Complete`, or `→ Failed` from any
//! non-terminal phase. Phases are never revisited.

use crate::error::{AiStreamError, CoreResult};
use crate::model::{AggregatedResponse, ContentBlock, FinishReason, Usage};
use crate::stream::assembler::{ToolArgumentPolicy, ToolCallAssembler};
use crate::stream::event::{StreamEvent, UsageReport};
use crate::stream::observer::StreamObserver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Streaming,
    Finalizing,
    Complete,
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Whether the caller should keep feeding events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

#[derive(Debug)]
pub struct ResponseAggregator {
    phase: Phase,
    provider: String,
    policy: ToolArgumentPolicy,
    id: Option<String>,
    model: Option<String>,
    text: String,
    finish_reason: FinishReason,
    usage: Option<Usage>,
    tools: ToolCallAssembler,
    skipped: usize,
    dropped_tool_calls: usize,
}

impl ResponseAggregator {
    pub fn new(provider: impl Into<String>, policy: ToolArgumentPolicy) -> Self {
        Self {
            phase: Phase::Idle,
            provider: provider.into(),
            policy,
            id: None,
            model: None,
            text: String::new(),
            finish_reason: FinishReason::None,
            usage: None,
            tools: ToolCallAssembler::new(),
            skipped: 0,
            dropped_tool_calls: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped
    }

    pub fn dropped_tool_calls(&self) -> usize {
        self.dropped_tool_calls
    }

    fn begin(&mut self, observer: &mut dyn StreamObserver) {
        if self.phase == Phase::Idle {
            self.phase = Phase::Streaming;
            observer.on_start();
        }
    }

    /// Fold one event. Returns `Flow::Done` on `StreamDone`; an upstream error
    /// is returned as `Err` and the caller is expected to `fail` with it.
    pub fn apply(
        &mut self,
        event: StreamEvent,
        observer: &mut dyn StreamObserver,
    ) -> CoreResult<Flow> {
        if self.phase.is_terminal() || self.phase == Phase::Finalizing {
            return Ok(Flow::Done);
        }
        if let StreamEvent::DecodeSkipped(reason) = &event {
            self.skipped += 1;
            tracing::debug!(%reason, "skipping undecodable line");
            return Ok(Flow::Continue);
        }
        self.begin(observer);

        match event {
            StreamEvent::Metadata { id, model } => {
                if self.id.is_none() {
                    self.id = id;
                }
                if self.model.is_none() {
                    self.model = model;
                }
            }
            StreamEvent::TextDelta(text) => {
                observer.on_delta(&text);
                self.text.push_str(&text);
            }
            StreamEvent::ToolCallFragment(fragment) => self.tools.apply(fragment),
            StreamEvent::FinishReason(reason) => {
                if reason != FinishReason::None {
                    self.finish_reason = reason;
                }
            }
            StreamEvent::UsageReport(report) => self.merge_usage(report),
            StreamEvent::UpstreamError(message) => {
                return Err(AiStreamError::Provider {
                    provider: self.provider.clone(),
                    message,
                });
            }
            StreamEvent::StreamDone => return Ok(Flow::Done),
            StreamEvent::DecodeSkipped(_) => {}
        }
        Ok(Flow::Continue)
    }

    /// Latest reported value wins per counter; counters are never summed.
    fn merge_usage(&mut self, report: UsageReport) {
        let usage = self.usage.get_or_insert_with(Usage::default);
        if let Some(p) = report.prompt {
            usage.prompt_tokens = p;
        }
        if let Some(c) = report.completion {
            usage.completion_tokens = c;
        }
    }

    /// Finalize pending tool calls and freeze the response.
    pub fn finalize(&mut self, observer: &mut dyn StreamObserver) -> CoreResult<AggregatedResponse> {
        if self.phase.is_terminal() || self.phase == Phase::Finalizing {
            return Err(AiStreamError::Validation(format!(
                "cannot finalize a session in phase {:?}",
                self.phase
            )));
        }
        self.begin(observer);
        self.phase = Phase::Finalizing;

        let finalized = std::mem::take(&mut self.tools).finalize();
        for rejected in &finalized.rejected {
            tracing::warn!(
                call_id = %rejected.id,
                name = rejected.name.as_deref().unwrap_or(""),
                reason = %rejected.reason,
                "dropping tool call with unusable arguments"
            );
            if self.policy == ToolArgumentPolicy::Fail {
                return Err(AiStreamError::ToolArgumentParse {
                    call_id: rejected.id.clone(),
                    message: rejected.reason.clone(),
                });
            }
        }
        self.dropped_tool_calls = finalized.rejected.len();

        let mut content = Vec::with_capacity(finalized.completed.len() + 1);
        if !self.text.is_empty() {
            content.push(ContentBlock::Text {
                text: std::mem::take(&mut self.text),
            });
        }
        for call in finalized.completed {
            observer.on_tool_use(&call);
            content.push(ContentBlock::ToolUse(call));
        }

        let response = AggregatedResponse {
            id: self.id.clone().unwrap_or_default(),
            model: self.model.clone().unwrap_or_default(),
            content,
            finish_reason: self.finish_reason,
            usage: self.usage,
        };
        self.phase = Phase::Complete;
        observer.on_end(&response);
        Ok(response)
    }

    /// Move to `Failed`. Notifies `on_error` unless the error is a cancellation.
    /// Returns the error for propagation.
    pub fn fail(&mut self, err: AiStreamError, observer: &mut dyn StreamObserver) -> AiStreamError {
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed;
            if !err.is_cancelled() {
                observer.on_error(err.kind(), &err.to_string());
            }
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::ToolInvocation;
    use crate::stream::event::ToolCallFragment;
    use crate::stream::observer::{LifecycleEvent, Recorder};
    use serde_json::json;

    fn agg() -> ResponseAggregator {
        ResponseAggregator::new("test", ToolArgumentPolicy::Drop)
    }

    #[test]
    fn start_fires_once_before_first_delta() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::DecodeSkipped("junk".into()), &mut rec).unwrap();
        assert_eq!(a.phase(), Phase::Idle);
        assert!(rec.events.is_empty());

        a.apply(StreamEvent::TextDelta("a".into()), &mut rec).unwrap();
        a.apply(StreamEvent::TextDelta("b".into()), &mut rec).unwrap();
        assert_eq!(a.phase(), Phase::Streaming);
        assert_eq!(
            rec.events,
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Delta("a".into()),
                LifecycleEvent::Delta("b".into()),
            ]
        );
        assert_eq!(a.skipped_lines(), 1);
    }

    #[test]
    fn text_concatenates_in_arrival_order() {
        let mut a = agg();
        let mut rec = Recorder::default();
        for f in ["f1", "f2", "f3", "f4"] {
            a.apply(StreamEvent::TextDelta(f.into()), &mut rec).unwrap();
        }
        assert_eq!(a.apply(StreamEvent::StreamDone, &mut rec).unwrap(), Flow::Done);
        let resp = a.finalize(&mut rec).unwrap();
        assert_eq!(resp.text(), "f1f2f3f4");
        assert_eq!(a.phase(), Phase::Complete);
    }

    #[test]
    fn identity_is_set_once() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::Metadata { id: None, model: Some("m1".into()) }, &mut rec).unwrap();
        a.apply(StreamEvent::Metadata { id: Some("r1".into()), model: Some("m2".into()) }, &mut rec).unwrap();
        a.apply(StreamEvent::Metadata { id: Some("r2".into()), model: None }, &mut rec).unwrap();
        let resp = a.finalize(&mut rec).unwrap();
        assert_eq!(resp.id, "r1");
        assert_eq!(resp.model, "m1");
    }

    #[test]
    fn usage_takes_latest_value_per_counter() {
        let mut a = agg();
        let mut rec = Recorder::default();
        let report = |p, c| StreamEvent::UsageReport(UsageReport { prompt: p, completion: c });
        a.apply(report(Some(10), Some(1)), &mut rec).unwrap();
        a.apply(report(None, Some(5)), &mut rec).unwrap();
        a.apply(report(None, Some(7)), &mut rec).unwrap();
        let resp = a.finalize(&mut rec).unwrap();
        assert_eq!(resp.usage, Some(Usage { prompt_tokens: 10, completion_tokens: 7 }));
    }

    #[test]
    fn finish_none_does_not_clear_a_reported_reason() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::FinishReason(FinishReason::MaxTokens), &mut rec).unwrap();
        a.apply(StreamEvent::FinishReason(FinishReason::None), &mut rec).unwrap();
        assert_eq!(a.finalize(&mut rec).unwrap().finish_reason, FinishReason::MaxTokens);
    }

    #[test]
    fn text_block_leads_then_tools_and_notifications_order() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::TextDelta("Let me check.".into()), &mut rec).unwrap();
        a.apply(
            StreamEvent::ToolCallFragment(ToolCallFragment::new(0).id("c1").name("f").arguments("{\"a\":")),
            &mut rec,
        )
        .unwrap();
        a.apply(StreamEvent::ToolCallFragment(ToolCallFragment::new(0).arguments("1}")), &mut rec).unwrap();
        let resp = a.finalize(&mut rec).unwrap();

        let call = ToolInvocation { id: "c1".into(), name: "f".into(), arguments: json!({"a": 1}) };
        assert_eq!(
            resp.content,
            vec![
                ContentBlock::Text { text: "Let me check.".into() },
                ContentBlock::ToolUse(call.clone()),
            ]
        );
        assert_eq!(
            rec.events,
            vec![
                LifecycleEvent::Start,
                LifecycleEvent::Delta("Let me check.".into()),
                LifecycleEvent::ToolUse(call),
                LifecycleEvent::End(resp.clone()),
            ]
        );
    }

    #[test]
    fn empty_text_has_no_text_block() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::ToolCallFragment(ToolCallFragment::new(0).name("f").arguments("{}")), &mut rec)
            .unwrap();
        let resp = a.finalize(&mut rec).unwrap();
        assert_eq!(resp.content.len(), 1);
        assert!(matches!(resp.content[0], ContentBlock::ToolUse(_)));
    }

    #[test]
    fn bad_arguments_dropped_by_default() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::TextDelta("hi".into()), &mut rec).unwrap();
        a.apply(StreamEvent::ToolCallFragment(ToolCallFragment::new(0).name("f").arguments("{\"a\":")), &mut rec)
            .unwrap();
        let resp = a.finalize(&mut rec).unwrap();
        assert_eq!(resp.text(), "hi");
        assert_eq!(resp.tool_calls().count(), 0);
        assert_eq!(a.dropped_tool_calls(), 1);
        assert!(!rec.events.iter().any(|e| matches!(e, LifecycleEvent::ToolUse(_))));
    }

    #[test]
    fn bad_arguments_fail_under_strict_policy() {
        let mut a = ResponseAggregator::new("test", ToolArgumentPolicy::Fail);
        let mut rec = Recorder::default();
        a.apply(StreamEvent::ToolCallFragment(ToolCallFragment::new(0).name("f").arguments("nope")), &mut rec)
            .unwrap();
        let err = a.finalize(&mut rec).unwrap_err();
        let err = a.fail(err, &mut rec);
        assert!(matches!(err, AiStreamError::ToolArgumentParse { .. }));
        assert_eq!(a.phase(), Phase::Failed);
        assert!(matches!(
            rec.events.last(),
            Some(LifecycleEvent::Error { kind: ErrorKind::ToolArgumentParseError, .. })
        ));
    }

    #[test]
    fn upstream_error_fails_without_end() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::TextDelta("partial".into()), &mut rec).unwrap();
        let err = a.apply(StreamEvent::UpstreamError("overloaded".into()), &mut rec).unwrap_err();
        a.fail(err, &mut rec);
        assert_eq!(a.phase(), Phase::Failed);
        assert!(!rec.events.iter().any(|e| matches!(e, LifecycleEvent::End(_))));
        assert!(matches!(
            rec.events.last(),
            Some(LifecycleEvent::Error { kind: ErrorKind::ProviderError, .. })
        ));
        // Terminal: further events are ignored and finalize is refused.
        assert_eq!(a.apply(StreamEvent::TextDelta("x".into()), &mut rec).unwrap(), Flow::Done);
        assert!(a.finalize(&mut rec).is_err());
    }

    #[test]
    fn cancellation_is_silent() {
        let mut a = agg();
        let mut rec = Recorder::default();
        a.apply(StreamEvent::TextDelta("a".into()), &mut rec).unwrap();
        a.fail(AiStreamError::Cancelled, &mut rec);
        assert_eq!(a.phase(), Phase::Failed);
        assert_eq!(rec.events, vec![LifecycleEvent::Start, LifecycleEvent::Delta("a".into())]);
        // A second failure after the terminal phase is a no-op.
        a.fail(AiStreamError::Transport("late".into()), &mut rec);
        assert_eq!(rec.events.len(), 2);
    }

    #[test]
    fn finalize_from_idle_still_starts_first() {
        let mut a = agg();
        let mut rec = Recorder::default();
        let resp = a.finalize(&mut rec).unwrap();
        assert!(resp.content.is_empty());
        assert_eq!(rec.events, vec![LifecycleEvent::Start, LifecycleEvent::End(resp)]);
    }
}
