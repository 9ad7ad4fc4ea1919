//! Provider registry for managing available providers.

use std::collections::HashMap;
use std::sync::Arc;

use toolmesh_core::Config;

use super::anthropic::AnthropicProvider;
use super::traits::{ModelInfo, Provider};

/// Registry of available language-model providers.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: Option<String>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: None,
        }
    }

    /// Initialize registry from configuration.
    ///
    /// The API key comes from the config first, then `ANTHROPIC_API_KEY`.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        let anthropic_config = config.providers.anthropic.as_ref();
        let anthropic_key = anthropic_config
            .and_then(|c| c.resolve_api_key())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());

        if let Some(api_key) = anthropic_key {
            let mut provider = AnthropicProvider::new(api_key);
            if let Some(model) = anthropic_config.and_then(|c| c.default_model.as_ref()) {
                provider = provider.with_default_model(model);
            }
            if let Some(base_url) = anthropic_config.and_then(|c| c.base_url.as_ref()) {
                provider = provider.with_base_url(base_url);
            }
            registry.register(Arc::new(provider));
        }

        let default = config
            .providers
            .default_provider
            .as_deref()
            .unwrap_or(&config.general.provider);
        registry.set_default(default);

        registry
    }

    /// Register a provider.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = provider.id().to_string();
        if self.default_provider.is_none() {
            self.default_provider = Some(id.clone());
        }
        self.providers.insert(id, provider);
    }

    /// Get a provider by ID.
    pub fn get(&self, id: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(id).cloned()
    }

    /// Get the default provider.
    pub fn default_provider(&self) -> Option<Arc<dyn Provider>> {
        self.default_provider.as_ref().and_then(|id| self.get(id))
    }

    /// Set the default provider.
    pub fn set_default(&mut self, id: &str) -> bool {
        if self.providers.contains_key(id) {
            self.default_provider = Some(id.to_string());
            true
        } else {
            false
        }
    }

    /// List all registered providers.
    pub fn list(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// Get all available models across all providers.
    pub fn all_models(&self) -> Vec<ModelInfo> {
        self.providers
            .values()
            .flat_map(|p| p.available_models())
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolmesh_core::ProviderConfig;

    #[test]
    fn test_from_config_with_direct_key() {
        let mut config = Config::default();
        config.providers.anthropic = Some(ProviderConfig {
            api_key: Some("sk-test".to_string()),
            default_model: Some("claude-test".to_string()),
            ..Default::default()
        });

        let registry = ProviderRegistry::from_config(&config);
        let provider = registry.default_provider().unwrap();
        assert_eq!(provider.id(), "anthropic");
        assert!(provider.is_configured());
        assert_eq!(registry.list(), vec!["anthropic"]);
        assert!(!registry.all_models().is_empty());
    }

    #[test]
    fn test_set_default_unknown_provider() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(AnthropicProvider::new("k")));
        assert!(!registry.set_default("openai"));
        assert!(registry.set_default("anthropic"));
        assert!(registry.get("openai").is_none());
    }
}
