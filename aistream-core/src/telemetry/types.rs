use serde::Serialize;

use crate::error::AiStreamError;
use crate::model::AggregatedResponse;

/// Outcome of one finished stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Complete,
    Failed,
    Cancelled,
}

/// Structured, provider-agnostic record emitted once per finished session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionLog {
    pub provider: String,
    pub dialect: String,
    pub outcome: Outcome,
    pub model: Option<String>,
    pub response_id: Option<String>,
    pub finish_reason: Option<String>,
    pub tokens_prompt: Option<u64>,
    pub tokens_completion: Option<u64>,
    pub tool_calls: usize,
    pub dropped_tool_calls: usize,
    pub skipped_lines: usize,
    pub latency_ms: u64,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl CompletionLog {
    pub fn new(provider: &str, dialect: &str) -> Self {
        Self {
            provider: provider.to_string(),
            dialect: dialect.to_string(),
            outcome: Outcome::Complete,
            model: None,
            response_id: None,
            finish_reason: None,
            tokens_prompt: None,
            tokens_completion: None,
            tool_calls: 0,
            dropped_tool_calls: 0,
            skipped_lines: 0,
            latency_ms: 0,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn response(mut self, resp: &AggregatedResponse) -> Self {
        self.outcome = Outcome::Complete;
        self.model = Some(resp.model.clone()).filter(|m| !m.is_empty());
        self.response_id = Some(resp.id.clone()).filter(|i| !i.is_empty());
        self.finish_reason = Some(resp.finish_reason.as_str().to_string());
        if let Some(u) = resp.usage {
            self.tokens_prompt = Some(u.prompt_tokens);
            self.tokens_completion = Some(u.completion_tokens);
        }
        self.tool_calls = resp.tool_calls().count();
        self
    }

    pub fn error(mut self, err: &AiStreamError) -> Self {
        self.outcome = if err.is_cancelled() {
            Outcome::Cancelled
        } else {
            Outcome::Failed
        };
        self.error_kind = Some(err.kind().as_str().to_string());
        self.error_message = Some(err.to_string());
        self
    }

    pub fn model_opt(mut self, v: Option<&str>) -> Self {
        if self.model.is_none() {
            self.model = v.map(|s| s.to_string());
        }
        self
    }
    pub fn counters(mut self, skipped: usize, dropped: usize) -> Self {
        self.skipped_lines = skipped;
        self.dropped_tool_calls = dropped;
        self
    }
    pub fn latency_ms(mut self, v: u64) -> Self {
        self.latency_ms = v;
        self
    }
}
