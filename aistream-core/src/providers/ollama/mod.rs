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

pub const OLLAMA_BASE: &str = "http://127.0.0.1:11434";

/// Local Ollama server, `/api/chat` with NDJSON streaming.
#[derive(Debug, Clone)]
pub struct Ollama {
    http: HttpClient,
    base: String,
    name: String,
    // only needed behind an authenticating proxy
    api_key: Option<SecretString>,
}

impl Ollama {
    pub fn new(http: HttpClient, base: impl Into<String>, api_key: Option<SecretString>) -> Self {
        Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            name: "ollama".into(),
            api_key,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

#[derive(Serialize)]
struct OChatReq<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "OOptions::is_empty")]
    options: OOptions<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OTool<'a>>,
}

#[derive(Serialize)]
struct OOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

impl OOptions<'_> {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none() && self.stop.is_none()
    }
}

#[derive(Serialize)]
struct OTool<'a> {
    r#type: &'static str,
    function: &'a ToolSpec,
}

#[async_trait]
impl StreamProvider for Ollama {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::OllamaNdjson
    }

    async fn open(&self, req: &ChatRequest, cancel: &CancellationToken) -> CoreResult<ByteStream> {
        let payload = OChatReq {
            model: &req.model,
            messages: &req.messages,
            stream: true,
            options: OOptions {
                temperature: req.temperature,
                num_predict: req.max_output_tokens,
                stop: req.stop_sequences.as_deref(),
            },
            tools: req
                .tools
                .iter()
                .map(|t| OTool { r#type: "function", function: t })
                .collect(),
        };
        let url = format!("{}/api/chat", self.base);
        let ctx = RequestCtx { request_id: req.request_id.as_deref() };
        let auth = self.api_key.as_ref().map(|k| format!("Bearer {}", k.expose_secret()));
        let headers: Vec<(&str, &str)> = auth.iter().map(|v| ("Authorization", v.as_str())).collect();
        self.http
            .post_stream(&self.name, &url, &payload, &headers, StreamAccept::Ndjson, &ctx, cancel)
            .await
    }
}
