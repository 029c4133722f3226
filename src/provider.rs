//! LLM provider resolution.
//!
//! Most-specific to least-specific, so library and CLI users each set only
//! as much as they need:
//!
//! 1. **Pre-built provider** (`config.provider`) used as-is; handy in tests
//!    or with custom middleware.
//! 2. **Named provider** (`config.provider_name`) plus `config.model`, via
//!    [`ProviderFactory::create_llm_provider`], which reads the matching API
//!    key from the environment.
//! 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when
//!    both are set.
//! 4. **`OPENAI_API_KEY`** present: OpenAI, even when other keys exist.
//! 5. **Auto-detection** with [`ProviderFactory::from_env`].

use crate::config::ExtractorConfig;
use crate::error::StudyKitError;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::sync::Arc;
use tracing::debug;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

enum ProviderChoice {
    Prebuilt(Arc<dyn LLMProvider>),
    Named { provider: String, model: String },
    Auto,
}

fn choose(config: &ExtractorConfig, env: impl Fn(&str) -> Option<String>) -> ProviderChoice {
    if let Some(ref provider) = config.provider {
        return ProviderChoice::Prebuilt(Arc::clone(provider));
    }

    let model = || config.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string());

    if let Some(ref name) = config.provider_name {
        return ProviderChoice::Named {
            provider: name.clone(),
            model: model(),
        };
    }

    let set = |key: &str| env(key).filter(|v| !v.is_empty());
    if let (Some(provider), Some(model)) = (set("EDGEQUAKE_LLM_PROVIDER"), set("EDGEQUAKE_MODEL")) {
        return ProviderChoice::Named { provider, model };
    }

    if set("OPENAI_API_KEY").is_some() {
        return ProviderChoice::Named {
            provider: "openai".to_string(),
            model: model(),
        };
    }

    ProviderChoice::Auto
}

/// Resolve the provider shared by the vision extractor and the completion port.
pub fn resolve_provider(config: &ExtractorConfig) -> Result<Arc<dyn LLMProvider>, StudyKitError> {
    match choose(config, |key| std::env::var(key).ok()) {
        ProviderChoice::Prebuilt(provider) => Ok(provider),
        ProviderChoice::Named { provider, model } => {
            debug!("Using provider {} with model {}", provider, model);
            ProviderFactory::create_llm_provider(&provider, &model).map_err(|e| {
                StudyKitError::ProviderNotConfigured {
                    provider,
                    hint: format!("{e}"),
                }
            })
        }
        ProviderChoice::Auto => {
            let (llm_provider, _embedding) =
                ProviderFactory::from_env().map_err(|e| StudyKitError::ProviderNotConfigured {
                    provider: "auto".to_string(),
                    hint: format!(
                        "No LLM provider could be auto-detected from environment.\n\
                        Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                        Error: {}",
                        e
                    ),
                })?;
            Ok(llm_provider)
        }
    }
}
