use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::http_client::{HttpClient, RequestCtx, StreamAccept};
use crate::model::{ChatMessage, ChatRequest, ToolSpec};
use crate::provider::StreamProvider;
use crate::stream::Dialect;
use crate::transport::ByteStream;

pub const OPENAI_BASE: &str = "https://api.openai.com";
pub const OPENROUTER_BASE: &str = "https://openrouter.ai/api";

/// Any endpoint speaking the OpenAI chat-completions stream: OpenAI itself,
/// OpenRouter, and self-hosted compatible servers.
#[derive(Debug, Clone)]
pub struct OpenAiCompatible {
    http: HttpClient,
    base: String,
    name: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatible {
    pub fn new(http: HttpClient, name: impl Into<String>, base: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            name: name.into(),
            api_key,
        }
    }

    #[cfg(test)]
    pub fn new_for_tests(server_base: &str) -> Self {
        Self::new(
            HttpClient::new_default().unwrap(),
            "openai",
            server_base,
            Some(SecretString::from("test-key")),
        )
    }

    fn headers(&self) -> Vec<(String, String)> {
        let mut h = Vec::new();
        if let Some(key) = &self.api_key {
            h.push(("Authorization".to_string(), format!("Bearer {}", key.expose_secret())));
        }
        h
    }
}

// ---- Wire structs (request side only; the stream is decoded by the engine) ----
#[derive(Serialize)]
struct OAChatReq<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    stream_options: OAStreamOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OATool<'a>>,
}

#[derive(Serialize)]
struct OAStreamOptions {
    include_usage: bool,
}

#[derive(Serialize)]
struct OATool<'a> {
    r#type: &'static str,
    function: &'a ToolSpec,
}

#[async_trait]
impl StreamProvider for OpenAiCompatible {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::OpenAiSse
    }

    async fn open(&self, req: &ChatRequest, cancel: &CancellationToken) -> CoreResult<ByteStream> {
        let payload = OAChatReq {
            model: &req.model,
            messages: &req.messages,
            stream: true,
            stream_options: OAStreamOptions { include_usage: true },
            temperature: req.temperature,
            max_tokens: req.max_output_tokens,
            stop: req.stop_sequences.as_deref(),
            tools: req
                .tools
                .iter()
                .map(|t| OATool { r#type: "function", function: t })
                .collect(),
        };

        let url = format!("{}/v1/chat/completions", self.base);
        let ctx = RequestCtx { request_id: req.request_id.as_deref() };
        let headers = self.headers();
        let header_pairs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        self.http
            .post_stream(&self.name, &url, &payload, &header_pairs, StreamAccept::EventStream, &ctx, cancel)
            .await
    }
}
