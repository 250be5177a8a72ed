use std::sync::Arc;

use regex::Regex;

use crate::config::{Config, RoutingRule};
use crate::error::{AiStreamError, CoreResult};
use crate::provider::StreamProvider;
use crate::provider_factory::ProviderRegistry;

/// Compiled routing rule
#[derive(Debug)]
struct CompiledRule {
    regex: Regex,
    provider: String,
}

/// Resolves a model string to a provider name, then fetches the provider
/// from the registry.
#[derive(Debug)]
pub struct RoutingResolver {
    rules: Vec<CompiledRule>,
    default_provider: String,
}

impl RoutingResolver {
    /// Build a resolver by compiling regexes from config.
    pub fn new(cfg: &Config) -> CoreResult<Self> {
        let mut rules = Vec::new();
        for RoutingRule { model, provider } in &cfg.routing.rules {
            let regex = Regex::new(model)
                .map_err(|e| AiStreamError::Validation(format!("invalid routing regex '{model}': {e}")))?;
            rules.push(CompiledRule {
                regex,
                provider: provider.clone(),
            });
        }
        Ok(Self {
            rules,
            default_provider: cfg.routing.default.clone(),
        })
    }

    /// First matching rule wins; otherwise the default.
    pub fn pick_provider_name<'a>(&'a self, model: &str) -> &'a str {
        self.rules
            .iter()
            .find(|r| r.regex.is_match(model))
            .map(|r| r.provider.as_str())
            .unwrap_or(&self.default_provider)
    }

    /// Select a stream provider for the given model.
    pub fn select_stream(&self, reg: &ProviderRegistry, model: &str) -> CoreResult<Arc<dyn StreamProvider>> {
        let name = self.pick_provider_name(model);
        tracing::debug!(model, provider = name, "routed");
        reg.get(name)
            .ok_or_else(|| AiStreamError::Validation(format!("provider '{name}' not registered")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderCfg, ProviderKind, RoutingCfg};
    use crate::model::ChatRequest;
    use crate::stream::await_result;
    use tokio_util::sync::CancellationToken;

    fn cfg_with_rules(default: &str, rules: Vec<(&str, &str)>) -> Config {
        Config {
            routing: RoutingCfg {
                default: default.into(),
                rules: rules
                    .into_iter()
                    .map(|(model, provider)| RoutingRule {
                        model: model.into(),
                        provider: provider.into(),
                    })
                    .collect(),
            },
            ..Config::default()
        }
    }

    #[test]
    fn picks_rule_then_fallback_default() {
        let cfg = cfg_with_rules("null", vec![("^gpt-.*", "openai"), ("^llama", "local")]);
        let router = RoutingResolver::new(&cfg).expect("should build routing resolver");
        assert_eq!(router.pick_provider_name("gpt-4o"), "openai");
        assert_eq!(router.pick_provider_name("llama3.1"), "local");
        assert_eq!(router.pick_provider_name("claude-sonnet"), "null");
    }

    #[test]
    fn first_match_wins_rule_order() {
        let cfg = cfg_with_rules("null", vec![("^gpt-.*", "null"), ("^gpt-4o$", "missing")]);
        let reg = ProviderRegistry::from_config(&cfg).expect("should build provider registry");
        let router = RoutingResolver::new(&cfg).expect("should build routing resolver");
        let p = router.select_stream(&reg, "gpt-4o").expect("provider should be found");
        assert_eq!(p.name(), "null");
    }

    #[test]
    fn missing_provider_yields_validation_error() {
        let cfg = cfg_with_rules("missing", vec![]);
        let reg = ProviderRegistry::from_config(&cfg).expect("should build provider registry");
        let router = RoutingResolver::new(&cfg).expect("should build routing resolver");
        match router.select_stream(&reg, "gpt-4o") {
            Err(AiStreamError::Validation(msg)) => assert!(msg.contains("missing")),
            Err(other) => panic!("expected Validation error, got {other:?}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn invalid_regex_yields_validation_error() {
        let cfg = cfg_with_rules("null", vec![("(", "null")]);
        let err = RoutingResolver::new(&cfg).unwrap_err();
        match err {
            AiStreamError::Validation(msg) => assert!(msg.contains("invalid routing regex")),
            other => panic!("expected Validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn routes_to_configured_ollama_and_streams() {
        use httpmock::{Method::POST, MockServer};

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/chat");
            then.status(200).body(concat!(
                "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"po\"},\"done\":false}\n",
                "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"ng\"},\"done\":false}\n",
                "{\"model\":\"llama3\",\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true,\"done_reason\":\"stop\"}\n",
            ));
        });

        let mut cfg = cfg_with_rules("null", vec![("^llama", "local")]);
        cfg.providers.insert(
            "local".into(),
            ProviderCfg {
                kind: ProviderKind::Ollama,
                base_url: Some(server.base_url()),
                api_key_env: None,
                command: None,
                args: vec![],
            },
        );
        let reg = ProviderRegistry::from_config(&cfg).expect("registry");
        let router = RoutingResolver::new(&cfg).expect("router");

        let provider = router.select_stream(&reg, "llama3").expect("provider");
        assert_eq!(provider.name(), "local");
        let req = ChatRequest::user("llama3", "ping");
        let session = provider.stream_chat(&req, CancellationToken::new()).await.expect("open");
        let resp = await_result(session).await.expect("stream");
        assert_eq!(resp.text(), "pong");
    }
}
