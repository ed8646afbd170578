//! LLM Provider implementations for Chatloom.
//!
//! All providers implement the `chatloom_core::Provider` trait.
//! [`build_provider`] constructs the configured provider at startup.

pub mod openai_compat;

use std::sync::Arc;
use std::time::Duration;

use chatloom_config::AppConfig;
use chatloom_core::Provider;
use chatloom_core::error::ProviderError;

pub use openai_compat::OpenAiCompatProvider;

/// Build the chat-completions provider described by `config`.
pub fn build_provider(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        ProviderError::NotConfigured(
            "no API key (set api_key in config.toml, CHATLOOM_API_KEY or OPENAI_API_KEY)".into(),
        )
    })?;

    let name = if config.api_url.contains("api.openai.com") {
        "openai"
    } else {
        "openai-compatible"
    };

    tracing::debug!(provider = name, url = %config.api_url, "Building provider");

    Ok(Arc::new(OpenAiCompatProvider::new(
        name,
        config.api_url.clone(),
        api_key,
        Duration::from_secs(config.agent.llm_timeout_secs),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig::default();
        let err = build_provider(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn builds_openai_provider() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn custom_url_is_openai_compatible() {
        let config = AppConfig {
            api_key: Some("none".into()),
            api_url: "http://localhost:11434/v1".into(),
            ..AppConfig::default()
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "openai-compatible");
    }
}
