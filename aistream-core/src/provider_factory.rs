use std::{collections::HashMap, sync::Arc};

use secrecy::SecretString;

use crate::config::{Config, ProviderCfg, ProviderKind, StreamCfg};
use crate::error::CoreResult;
use crate::http_client::HttpClient;
use crate::provider::{NullProvider, StreamProvider};
use crate::providers::anthropic::{Anthropic, ANTHROPIC_BASE};
use crate::providers::claude_cli::{ClaudeCli, DEFAULT_COMMAND};
use crate::providers::gemini::{Gemini, GEMINI_BASE};
use crate::providers::ollama::{Ollama, OLLAMA_BASE};
use crate::providers::openai::{OpenAiCompatible, OPENAI_BASE, OPENROUTER_BASE};

/// Registry of concrete stream providers by name.
/// Names are the config keys; `null` is always present.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn StreamProvider>>,
    stream: StreamCfg,
}

impl ProviderRegistry {
    /// Build a registry from configuration. API keys are read from the named
    /// environment variables; a provider whose key is missing is skipped with
    /// a warning rather than failing the whole registry.
    pub fn from_config(cfg: &Config) -> CoreResult<Self> {
        Self::from_config_with_env(cfg, |var| std::env::var(var).ok())
    }

    /// Same as `from_config`, with an injectable variable lookup.
    pub fn from_config_with_env<F>(cfg: &Config, lookup: F) -> CoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut providers: HashMap<String, Arc<dyn StreamProvider>> = HashMap::new();
        providers.insert("null".into(), Arc::new(NullProvider));

        let http = HttpClient::from_cfg(&cfg.http)?;
        for (name, pcfg) in &cfg.providers {
            let key = pcfg.api_key_env.as_deref().and_then(|var| lookup(var)).map(SecretString::from);
            match build(name, pcfg, &http, key) {
                Some(p) => {
                    tracing::debug!(provider = %name, kind = ?pcfg.kind, "registered provider");
                    providers.insert(name.clone(), p);
                }
                None => {
                    tracing::warn!(
                        provider = %name,
                        env = pcfg.api_key_env.as_deref().unwrap_or(""),
                        "skipping provider: api key not set"
                    );
                }
            }
        }

        Ok(Self {
            providers,
            stream: cfg.stream,
        })
    }

    /// Get a provider by name (e.g., "openai", "anthropic", "null").
    pub fn get(&self, name: &str) -> Option<Arc<dyn StreamProvider>> {
        self.providers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Stream policies sessions opened through this registry should use.
    pub fn stream_cfg(&self) -> StreamCfg {
        self.stream
    }
}

fn build(name: &str, cfg: &ProviderCfg, http: &HttpClient, key: Option<SecretString>) -> Option<Arc<dyn StreamProvider>> {
    let base = |default: &str| cfg.base_url.clone().unwrap_or_else(|| default.to_string());
    let p: Arc<dyn StreamProvider> = match cfg.kind {
        ProviderKind::OpenaiCompatible => {
            // A keyless compatible endpoint is fine when it is self-hosted.
            if key.is_none() && cfg.base_url.is_none() {
                return None;
            }
            let default = if name == "openrouter" { OPENROUTER_BASE } else { OPENAI_BASE };
            Arc::new(OpenAiCompatible::new(http.clone(), name, base(default), key))
        }
        ProviderKind::Anthropic => Arc::new(Anthropic::new(http.clone(), key?, base(ANTHROPIC_BASE)).named(name)),
        ProviderKind::Gemini => Arc::new(Gemini::new(http.clone(), key?, base(GEMINI_BASE)).named(name)),
        ProviderKind::Ollama => Arc::new(Ollama::new(http.clone(), base(OLLAMA_BASE), key).named(name)),
        ProviderKind::ClaudeCli => {
            let command = cfg.command.clone().unwrap_or_else(|| DEFAULT_COMMAND.to_string());
            Arc::new(ClaudeCli::new(command, cfg.args.clone()).named(name))
        }
    };
    Some(p)
}
