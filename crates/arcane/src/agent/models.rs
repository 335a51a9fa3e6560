//! Model catalog.
//!
//! The models offered by `/models`. Ids not in the catalog are still usable;
//! they just fall back to the default context budget.

use crate::context::DEFAULT_CONTEXT_TOKENS;

/// One selectable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub provider: &'static str,
    pub description: &'static str,
    /// Context window in tokens, when published.
    pub context_length: Option<usize>,
}

const fn model(
    id: &'static str,
    name: &'static str,
    provider: &'static str,
    description: &'static str,
) -> ModelInfo {
    ModelInfo {
        id,
        name,
        provider,
        description,
        context_length: None,
    }
}

/// Catalog in display order. The first entry is the default.
pub const AVAILABLE_MODELS: [ModelInfo; 8] = [
    model("google/gemini-3-flash-preview", "Gemini 3 Flash Preview", "Google", "Fast multimodal model"),
    model("x-ai/grok-code-fast-1", "Grok Code Fast 1", "xAI", "Code-focused fast model"),
    model("deepseek/deepseek-v3.2", "DeepSeek V3.2", "DeepSeek", "Reasoning model"),
    model("x-ai/grok-4.1-fast", "Grok 4.1 Fast", "xAI", "General purpose fast model"),
    model("z-ai/glm-4.7", "GLM 4.7", "Z.ai", "Multilingual model"),
    model("minimax/minimax-m2.1", "MiniMax M2.1", "MiniMax", "Chat model"),
    model("perplexity/sonar-pro", "Perplexity Sonar Pro", "Perplexity", "Search-optimized model"),
    model("openai/gpt-oss-120b:free", "GPT-OSS 120B Free", "OpenAI", "Open-source large language model"),
];

pub fn find_model(id: &str) -> Option<&'static ModelInfo> {
    AVAILABLE_MODELS.iter().find(|m| m.id == id)
}

/// Compaction budget for `id`: its context length when known.
pub fn context_budget_for(id: &str) -> usize {
    find_model(id)
        .and_then(|m| m.context_length)
        .filter(|&n| n > 0)
        .unwrap_or(DEFAULT_CONTEXT_TOKENS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_MODEL;

    #[test]
    fn default_model_is_first() {
        assert_eq!(AVAILABLE_MODELS[0].id, DEFAULT_MODEL);
        assert_eq!(find_model(DEFAULT_MODEL).map(|m| m.provider), Some("Google"));
    }

    #[test]
    fn unknown_model_uses_default_budget() {
        assert!(find_model("acme/unknown").is_none());
        assert_eq!(context_budget_for("acme/unknown"), DEFAULT_CONTEXT_TOKENS);
        assert_eq!(context_budget_for("z-ai/glm-4.7"), DEFAULT_CONTEXT_TOKENS);
    }
}
