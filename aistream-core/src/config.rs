use std::collections::BTreeMap;
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::AiStreamError;
use crate::stream::{EofPolicy, ToolArgumentPolicy};

/// Which stream opener backs a configured provider.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompatible,
    Anthropic,
    Gemini,
    Ollama,
    ClaudeCli,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ProviderCfg {
    pub kind: ProviderKind,
    /// Override the provider's default endpoint root.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Name of the environment variable that contains the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Executable for subprocess-backed providers.
    #[serde(default)]
    pub command: Option<String>,
    /// Extra arguments placed before the generated ones.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Longest gap between two body reads in milliseconds (default 300000ms)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Optional whole-request deadline, streamed body included (None = unbounded)
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            request_timeout_ms: None,
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_read_timeout_ms() -> u64 {
    300_000
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamCfg {
    #[serde(default)]
    pub tool_argument_policy: ToolArgumentPolicy,
    #[serde(default)]
    pub eof_policy: EofPolicy,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    /// Regex applied to the model name, e.g. ^gpt-.*
    pub model: String,
    /// Provider to route to when this rule matches
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoutingCfg {
    pub default: String,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
}

impl Default for RoutingCfg {
    fn default() -> Self {
        Self {
            default: "null".into(),
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub providers: BTreeMap<String, ProviderCfg>,
    #[serde(default)]
    pub routing: RoutingCfg,
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub stream: StreamCfg,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> crate::error::CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| AiStreamError::Other(e.into()))?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Self>(s).map_err(|e| AiStreamError::Other(e.into()))?,
            Some("toml") => toml::from_str::<Self>(s).map_err(|e| AiStreamError::Other(e.into()))?,
            _ => serde_json::from_str::<Self>(s)
                .map_err(|e| AiStreamError::Other(e.into()))
                .or_else(|_| toml::from_str::<Self>(s).map_err(|e| AiStreamError::Other(e.into())))?,
        };
        Ok(cfg)
    }
}
