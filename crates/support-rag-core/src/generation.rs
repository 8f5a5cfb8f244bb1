//! Generative model trait and sampling parameters.

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Sampling parameters sent with every generation request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Vocabulary limit per step.
    pub top_k: u32,
}

impl GenerationParams {
    /// Parameters used for support answers: focused, bounded output.
    pub const SUPPORT_ANSWER: GenerationParams = GenerationParams {
        temperature: 0.3,
        max_output_tokens: 800,
        top_p: 0.8,
        top_k: 40,
    };
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::SUPPORT_ANSWER
    }
}

/// Trait for hosted or local text generation backends.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`.
    ///
    /// Returns `Ok(None)` when the backend answered but produced no text.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Option<String>>;
}
