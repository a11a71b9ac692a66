//! Chat model implementations for Wela.
//!
//! All models implement the `wela_core::ChatModel` trait. [`build_from_config`]
//! wires the configured endpoint.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured chat model.
///
/// The provider name is derived from the endpoint host so logs say which
/// backend answered.
pub fn build_from_config(config: &wela_config::AppConfig) -> OpenAiCompatProvider {
    let name = provider_name(&config.base_url);
    OpenAiCompatProvider::new(
        name,
        &config.base_url,
        config.api_key.clone().unwrap_or_default(),
    )
    .with_streaming(config.agent.stream)
}

fn provider_name(base_url: &str) -> &'static str {
    if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("11434") {
        "ollama"
    } else {
        "custom"
    }
}
