use serde::Serialize;
use thiserror::Error;

/// Coarse classification of a failed HTTP handshake, decided at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpErrorKind {
    Auth,
    RateLimited,
    ServerError,
    Network,
}

impl HttpErrorKind {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::Network,
        }
    }
}

/// Error kinds reported through `StreamObserver::on_error` and telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransportError,
    HttpStatusError,
    DecodeError,
    ToolArgumentParseError,
    CancelledError,
    ProtocolViolation,
    ProviderError,
    Validation,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransportError => "transport_error",
            Self::HttpStatusError => "http_status_error",
            Self::DecodeError => "decode_error",
            Self::ToolArgumentParseError => "tool_argument_parse_error",
            Self::CancelledError => "cancelled",
            Self::ProtocolViolation => "protocol_violation",
            Self::ProviderError => "provider_error",
            Self::Validation => "validation",
            Self::Other => "other",
        }
    }
}

/// Core error type for aistream.
/// Internally, modules can use `anyhow::Result<T>` for convenience,
/// but public boundaries should expose `CoreResult<T>` with this error.
#[derive(Debug, Error)]
pub enum AiStreamError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("http {status} from {provider} ({kind:?}): {message}")]
    HttpStatus {
        provider: String,
        status: u16,
        kind: HttpErrorKind,
        retry_after: Option<u64>,
        message: String,
    },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("tool call {call_id} has unparseable arguments: {message}")]
    ToolArgumentParse { call_id: String, message: String },

    #[error("stream cancelled")]
    Cancelled,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("upstream error from {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AiStreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Io(_) => ErrorKind::TransportError,
            Self::HttpStatus { .. } => ErrorKind::HttpStatusError,
            Self::Decode(_) => ErrorKind::DecodeError,
            Self::ToolArgumentParse { .. } => ErrorKind::ToolArgumentParseError,
            Self::Cancelled => ErrorKind::CancelledError,
            Self::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            Self::Provider { .. } => ErrorKind::ProviderError,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type CoreResult<T> = std::result::Result<T, AiStreamError>;
