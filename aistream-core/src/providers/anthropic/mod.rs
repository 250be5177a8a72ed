use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::http_client::{HttpClient, RequestCtx, StreamAccept};
use crate::model::{ChatRequest, Role};
use crate::provider::StreamProvider;
use crate::stream::Dialect;
use crate::transport::ByteStream;

pub const ANTHROPIC_BASE: &str = "https://api.anthropic.com";

/// Default Anthropic API version header required by the Messages API.
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
pub struct Anthropic {
    http: HttpClient,
    api_key: SecretString,
    base: String,
    name: String,
}

impl Anthropic {
    pub fn new(http: HttpClient, api_key: SecretString, base: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            base: base.into().trim_end_matches('/').to_string(),
            name: "anthropic".into(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("x-api-key".to_string(), self.api_key.expose_secret().to_string()),
            ("anthropic-version".to_string(), ANTHROPIC_API_VERSION.to_string()),
        ]
    }
}

// ===== Anthropic wire types (Messages API, request side) =====

#[derive(Serialize)]
struct AMsgReq<'a> {
    model: &'a str,
    messages: Vec<AMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ATool<'a>>,
}

#[derive(Serialize)]
struct AMessage<'a> {
    role: &'a str,
    content: Vec<AContent<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AContent<'a> {
    Text { text: &'a str },
}

#[derive(Serialize)]
struct ATool<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

fn build_request(req: &ChatRequest) -> AMsgReq<'_> {
    let messages = req
        .messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                // system goes to the top-level field; tool results are not relayed
                Role::System | Role::Tool => return None,
            };
            Some(AMessage {
                role,
                content: vec![AContent::Text { text: &m.content }],
            })
        })
        .collect();

    AMsgReq {
        model: &req.model,
        messages,
        system: req.joined_system(),
        max_tokens: req.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS).max(1),
        stream: true,
        temperature: req.temperature,
        stop_sequences: req.stop_sequences.as_deref(),
        tools: req
            .tools
            .iter()
            .map(|t| ATool {
                name: &t.name,
                description: &t.description,
                input_schema: &t.parameters,
            })
            .collect(),
    }
}

#[async_trait]
impl StreamProvider for Anthropic {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::AnthropicSse
    }

    async fn open(&self, req: &ChatRequest, cancel: &CancellationToken) -> CoreResult<ByteStream> {
        let payload = build_request(req);
        let url = format!("{}/v1/messages", self.base);
        let ctx = RequestCtx { request_id: req.request_id.as_deref() };
        let headers = self.headers();
        let header_pairs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        self.http
            .post_stream(&self.name, &url, &payload, &header_pairs, StreamAccept::EventStream, &ctx, cancel)
            .await
    }
}
