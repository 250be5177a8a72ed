use std::io;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::HttpCfg;
use crate::error::{AiStreamError, CoreResult, HttpErrorKind};
use crate::transport::ByteStream;

/// Request context carries the caller's tracing id.
#[derive(Clone, Copy, Default)]
pub struct RequestCtx<'a> {
    pub request_id: Option<&'a str>,
}

/// Media type a streaming endpoint answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAccept {
    EventStream,
    Ndjson,
}

impl StreamAccept {
    fn as_str(self) -> &'static str {
        match self {
            Self::EventStream => "text/event-stream",
            Self::Ndjson => "application/x-ndjson",
        }
    }
}

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::from_cfg(&HttpCfg::default())
    }

    pub fn from_cfg(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .read_timeout(Duration::from_millis(cfg.read_timeout_ms));
        if let Some(ms) = cfg.request_timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| AiStreamError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("aistream/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    /// POST JSON and return the response body as a byte stream.
    ///
    /// Non-2xx statuses are mapped here, before any body byte is handed out.
    /// The send races `cancel`; once the body is streaming, the line framer
    /// owns cancellation.
    #[allow(clippy::too_many_arguments)]
    pub async fn post_stream<T: Serialize + ?Sized>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
        accept: StreamAccept,
        ctx: &RequestCtx<'_>,
        cancel: &CancellationToken,
    ) -> CoreResult<ByteStream> {
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent)
            .header("Accept", accept.as_str());

        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        if let Some(rid) = ctx.request_id {
            req = req.header("X-Request-Id", rid);
        }

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AiStreamError::Cancelled),
            sent = req.send() => sent.map_err(|e| AiStreamError::Transport(format!("{provider}: {e}")))?,
        };

        let status = resp.status();
        let headers = resp.headers().clone();
        if !status.is_success() {
            let ra = parse_retry_after(&headers);
            let text = resp.text().await.unwrap_or_default();
            return Err(map_http_error(provider, status, ra, &text));
        }
        tracing::debug!(
            provider,
            status = status.as_u16(),
            provider_request_id = extract_request_id(&headers).as_deref().unwrap_or(""),
            "stream opened"
        );

        Ok(Box::pin(resp.bytes_stream().map_err(io::Error::other)))
    }
}

fn extract_request_id(headers: &reqwest::header::HeaderMap) -> Option<String> {
    static CANDIDATES: [&str; 4] = ["x-request-id", "request-id", "x-amzn-requestid", "x-goog-request-id"];
    for k in CANDIDATES {
        if let Some(v) = headers.get(k)
            && let Ok(s) = v.to_str()
        {
            return Some(s.to_string());
        }
    }
    None
}

fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    // Only the delta-seconds form; HTTP-date values are ignored.
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    None
}

fn map_http_error(provider: &str, status: StatusCode, retry_after: Option<u64>, body: &str) -> AiStreamError {
    let kind = HttpErrorKind::from_status(status.as_u16());
    AiStreamError::HttpStatus {
        provider: provider.to_string(),
        status: status.as_u16(),
        kind,
        retry_after: if kind == HttpErrorKind::RateLimited { retry_after } else { None },
        message: truncate(body, 300),
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => {
            let mut t = s[..cut].to_string();
            t.push_str("...");
            t
        }
        None => s.to_string(),
    }
}
