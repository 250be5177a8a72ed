use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::CoreResult;
use crate::http_client::{HttpClient, RequestCtx, StreamAccept};
use crate::model::{ChatRequest, Role, ToolSpec};
use crate::provider::StreamProvider;
use crate::stream::Dialect;
use crate::transport::ByteStream;

pub const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct Gemini {
    http: HttpClient,
    api_key: SecretString,
    base: String,
    name: String,
}

impl Gemini {
    pub fn new(http: HttpClient, api_key: SecretString, base: impl Into<String>) -> Self {
        Self {
            http,
            api_key,
            base: base.into().trim_end_matches('/').to_string(),
            name: "gemini".into(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

// ---- generateContent request body ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GRequest<'a> {
    contents: Vec<GContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GSystem>,
    #[serde(skip_serializing_if = "GGenerationConfig::is_empty")]
    generation_config: GGenerationConfig<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<GTools<'a>>,
}

#[derive(Serialize)]
struct GContent<'a> {
    role: &'static str,
    parts: Vec<GTextPart<'a>>,
}

#[derive(Serialize)]
struct GTextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GSystem {
    parts: Vec<GOwnedText>,
}

#[derive(Serialize)]
struct GOwnedText {
    text: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GGenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

impl GGenerationConfig<'_> {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.max_output_tokens.is_none() && self.stop_sequences.is_none()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GTools<'a> {
    function_declarations: &'a [ToolSpec],
}

fn build_request(req: &ChatRequest) -> GRequest<'_> {
    let contents = req
        .messages
        .iter()
        .filter_map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::System | Role::Tool => return None,
            };
            Some(GContent {
                role,
                parts: vec![GTextPart { text: &m.content }],
            })
        })
        .collect();

    GRequest {
        contents,
        system_instruction: req.joined_system().map(|text| GSystem {
            parts: vec![GOwnedText { text }],
        }),
        generation_config: GGenerationConfig {
            temperature: req.temperature,
            max_output_tokens: req.max_output_tokens,
            stop_sequences: req.stop_sequences.as_deref(),
        },
        tools: if req.tools.is_empty() {
            Vec::new()
        } else {
            vec![GTools {
                function_declarations: &req.tools,
            }]
        },
    }
}

#[async_trait]
impl StreamProvider for Gemini {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> Dialect {
        Dialect::GeminiSse
    }

    async fn open(&self, req: &ChatRequest, cancel: &CancellationToken) -> CoreResult<ByteStream> {
        let payload = build_request(req);
        let url = format!("{}/v1beta/models/{}:streamGenerateContent?alt=sse", self.base, req.model);
        let ctx = RequestCtx { request_id: req.request_id.as_deref() };
        let headers = [("x-goog-api-key", self.api_key.expose_secret())];
        self.http
            .post_stream(&self.name, &url, &payload, &headers, StreamAccept::EventStream, &ctx, cancel)
            .await
    }
}
