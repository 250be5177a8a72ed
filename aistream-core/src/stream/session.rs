//! Session driver: framer → classifier → decoder → aggregator, in one task.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::StreamCfg;
use crate::error::{AiStreamError, CoreResult};
use crate::model::AggregatedResponse;
use crate::stream::aggregator::{Flow, ResponseAggregator};
use crate::stream::assembler::ToolArgumentPolicy;
use crate::stream::classifier::{classify, Chunk};
use crate::stream::decoder::{Decoder, Dialect};
use crate::stream::event::StreamEvent;
use crate::stream::framer::{Frame, LineFramer};
use crate::stream::observer::{NoopObserver, StreamObserver};
use crate::telemetry::{self, keys, CompletionLog};
use crate::transport::ByteStream;

/// What EOF means when the dialect expects an explicit terminator.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EofPolicy {
    /// Finalize with whatever was accumulated and log a warning.
    #[default]
    Complete,
    /// Fail with `ProtocolViolation`.
    Fail,
}

/// One active request: a byte source bound to a dialect.
pub struct StreamSession {
    decoder: Decoder,
    framer: LineFramer,
    cancel: CancellationToken,
    tool_policy: ToolArgumentPolicy,
    eof_policy: EofPolicy,
    provider: String,
    model_hint: Option<String>,
}

impl StreamSession {
    pub fn new(dialect: Dialect, source: ByteStream) -> Self {
        Self {
            decoder: Decoder::new(dialect),
            framer: LineFramer::new(source),
            cancel: CancellationToken::new(),
            tool_policy: ToolArgumentPolicy::default(),
            eof_policy: EofPolicy::default(),
            provider: "unknown".into(),
            model_hint: None,
        }
    }

    /// Share a cancellation signal that was already handed to the transport.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_tool_policy(mut self, policy: ToolArgumentPolicy) -> Self {
        self.tool_policy = policy;
        self
    }

    pub fn with_eof_policy(mut self, policy: EofPolicy) -> Self {
        self.eof_policy = policy;
        self
    }

    pub fn with_stream_cfg(self, cfg: StreamCfg) -> Self {
        self.with_tool_policy(cfg.tool_argument_policy)
            .with_eof_policy(cfg.eof_policy)
    }

    /// Label used in logs and telemetry.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Requested model, reported until the stream reveals the served one.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_hint = Some(model.into());
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.decoder.dialect()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the session to a terminal state, notifying `observer` along the way.
    pub async fn run(self, observer: &mut dyn StreamObserver) -> CoreResult<AggregatedResponse> {
        let span = tracing::info_span!(
            "aistream.session",
            llm.provider = %self.provider,
            llm.dialect = %self.decoder.dialect(),
            llm.model = tracing::field::Empty,
            llm.response_id = tracing::field::Empty,
            finish.reason = tracing::field::Empty,
            tokens.prompt = tracing::field::Empty,
            tokens.completion = tracing::field::Empty,
            tool.calls = tracing::field::Empty,
            stream.skipped = tracing::field::Empty,
            error.kind = tracing::field::Empty,
        );
        let started = Instant::now();
        let Self {
            mut decoder,
            mut framer,
            cancel,
            tool_policy,
            eof_policy,
            provider,
            model_hint,
        } = self;
        let dialect = decoder.dialect();
        let mut agg = ResponseAggregator::new(provider.as_str(), tool_policy);

        let result = drive(&mut decoder, &mut framer, &cancel, eof_policy, &mut agg, observer)
            .instrument(span.clone())
            .await;

        span.record(keys::KEY_SKIPPED_LINES, agg.skipped_lines() as u64);
        let model = agg.model().map(str::to_string).or(model_hint);
        let mut log = CompletionLog::new(&provider, dialect.as_str());
        match &result {
            Ok(resp) => {
                if let Some(u) = resp.usage {
                    span.record(keys::KEY_TOKENS_PROMPT, u.prompt_tokens);
                    span.record(keys::KEY_TOKENS_COMPLETION, u.completion_tokens);
                }
                if !resp.id.is_empty() {
                    span.record(keys::KEY_RESPONSE_ID, resp.id.as_str());
                }
                span.record(keys::KEY_FINISH_REASON, resp.finish_reason.as_str());
                span.record(keys::KEY_TOOL_CALLS, resp.tool_calls().count() as u64);
                log = log.response(resp);
            }
            Err(err) => {
                span.record(keys::KEY_ERROR_KIND, err.kind().as_str());
                if err.is_cancelled() {
                    tracing::debug!(parent: &span, "stream cancelled");
                } else {
                    tracing::warn!(parent: &span, error = %err, "stream failed");
                }
                log = log.error(err);
            }
        }
        if let Some(m) = model.as_deref() {
            span.record(keys::KEY_MODEL, m);
        }
        telemetry::emit(
            log.model_opt(model.as_deref())
                .counters(agg.skipped_lines(), agg.dropped_tool_calls())
                .latency_ms(started.elapsed().as_millis() as u64),
        );
        result
    }
}

async fn drive(
    decoder: &mut Decoder,
    framer: &mut LineFramer,
    cancel: &CancellationToken,
    eof_policy: EofPolicy,
    agg: &mut ResponseAggregator,
    observer: &mut dyn StreamObserver,
) -> CoreResult<AggregatedResponse> {
    let framing = decoder.dialect().framing();
    loop {
        let line = match framer.next_line(cancel).await {
            Ok(Frame::Line(line)) => line,
            Ok(Frame::Cancelled) => return Err(agg.fail(AiStreamError::Cancelled, observer)),
            Ok(Frame::Eof) => break,
            Err(err) => return Err(agg.fail(err, observer)),
        };
        let events = match classify(framing, &line) {
            Chunk::Ignore => continue,
            Chunk::Done => vec![StreamEvent::StreamDone],
            Chunk::Document(doc) => decoder.decode(doc),
        };
        for event in events {
            match agg.apply(event, observer) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Done) => return finish(agg, observer),
                Err(err) => return Err(agg.fail(err, observer)),
            }
        }
    }

    if !decoder.dialect().ends_at_eof() {
        match eof_policy {
            EofPolicy::Complete => {
                tracing::warn!(
                    kind = "protocol_violation",
                    "stream ended without a terminator; completing with accumulated data"
                );
            }
            EofPolicy::Fail => {
                let err = AiStreamError::ProtocolViolation("stream ended without a terminator".into());
                return Err(agg.fail(err, observer));
            }
        }
    }
    finish(agg, observer)
}

fn finish(agg: &mut ResponseAggregator, observer: &mut dyn StreamObserver) -> CoreResult<AggregatedResponse> {
    match agg.finalize(observer) {
        Ok(resp) => Ok(resp),
        Err(err) => Err(agg.fail(err, observer)),
    }
}

/// Handle to a session running on the tokio runtime.
pub struct StreamHandle {
    cancel: CancellationToken,
    join: JoinHandle<CoreResult<AggregatedResponse>>,
}

impl StreamHandle {
    /// Request cancellation. A no-op once the session is terminal.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn result(self) -> CoreResult<AggregatedResponse> {
        self.join
            .await
            .map_err(|e| AiStreamError::Other(anyhow::anyhow!("stream task failed: {e}")))?
    }
}

/// Begin consuming `session` in a spawned task, delivering notifications to `observer`.
pub fn start<O>(session: StreamSession, mut observer: O) -> StreamHandle
where
    O: StreamObserver + 'static,
{
    let cancel = session.cancel_token();
    let join = tokio::spawn(async move { session.run(&mut observer).await });
    StreamHandle { cancel, join }
}

/// Drive `session` to completion in the caller's task without notifications.
pub async fn await_result(session: StreamSession) -> CoreResult<AggregatedResponse> {
    session.run(&mut NoopObserver).await
}
