use std::sync::Arc;

use crate::config::Settings;
use crate::llm::{GeminiAdapter, GeminiConfig, ProviderAdapter, ProviderError};

/// Builds the Gemini-backed reasoning engine from settings.
pub fn build_engine(settings: &Settings) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let adapter = GeminiAdapter::new(GeminiConfig {
        api_keys: settings.google_api_keys.clone(),
        model: settings.model_name.clone(),
        temperature: settings.agent.temperature,
        ..GeminiConfig::default()
    })?;
    tracing::info!(
        model = adapter.model(),
        keys = settings.google_api_keys.len(),
        "reasoning engine ready"
    );
    Ok(Arc::new(adapter))
}
