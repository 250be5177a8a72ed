use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::model::{ChatRequest, Role};
use crate::stream::{Dialect, StreamSession};
use crate::transport::{self, ByteStream};

/// Opens a provider's streaming endpoint and fixes which dialect decodes it.
#[async_trait]
pub trait StreamProvider: Send + Sync {
    fn name(&self) -> &str;

    fn dialect(&self) -> Dialect;

    /// Connect and hand back the raw body. Connect-time failures (including
    /// non-2xx statuses) are returned here, before any session exists.
    async fn open(&self, req: &ChatRequest, cancel: &CancellationToken) -> CoreResult<ByteStream>;

    /// Open the stream and bind it to a session sharing `cancel`.
    async fn stream_chat(&self, req: &ChatRequest, cancel: CancellationToken) -> CoreResult<StreamSession> {
        let source = self.open(req, &cancel).await?;
        Ok(StreamSession::new(self.dialect(), source)
            .with_cancel(cancel)
            .with_provider(self.name())
            .with_model(req.model.as_str()))
    }
}

/// Canned provider that answers every request with a short OpenAI-style
/// stream. Always registered; useful as a routing fallback and in tests.
pub struct NullProvider;

pub const NULL_RESPONSE_TEXT: &str = "[null provider response]";

#[async_trait]
impl StreamProvider for NullProvider {
    fn name(&self) -> &str {
        "null"
    }

    fn dialect(&self) -> Dialect {
        Dialect::OpenAiSse
    }

    async fn open(&self, req: &ChatRequest, _cancel: &CancellationToken) -> CoreResult<ByteStream> {
        let prompt_tokens: usize = req
            .messages
            .iter()
            .filter(|m| m.role != Role::Assistant)
            .map(|m| m.content.len())
            .sum();
        let (head, tail) = NULL_RESPONSE_TEXT.split_at(NULL_RESPONSE_TEXT.len() / 2);
        let chunks = vec![
            json!({"id": "null-response", "model": req.model, "choices": [{"index": 0, "delta": {"role": "assistant", "content": head}}]}),
            json!({"choices": [{"index": 0, "delta": {"content": tail}}]}),
            json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}),
            json!({"choices": [], "usage": {"prompt_tokens": prompt_tokens, "completion_tokens": 0}}),
        ];
        let mut lines: Vec<String> = chunks.iter().map(|c| format!("data: {c}\n\n")).collect();
        lines.push("data: [DONE]\n\n".to_string());
        Ok(transport::from_chunks(lines))
    }
}
