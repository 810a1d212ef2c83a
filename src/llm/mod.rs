pub mod human;
pub mod llama;
pub mod mock;

use async_trait::async_trait;
use std::sync::Arc;

use crate::consts::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P};
use crate::error::ModelError;

/// Sampling knobs for a single completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    /// Sampling randomness. 0 is greedy.
    pub temperature: f32,
    /// Hard cap on generated tokens.
    pub max_tokens: u32,
    /// Nucleus-sampling probability mass.
    pub top_p: f32,
    /// Generation halts before any of these strings.
    pub stop: Vec<String>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            top_p: DEFAULT_TOP_P,
            stop: Vec::new(),
        }
    }
}

impl SamplingParams {
    /// Same params with extra stop sequences.
    pub fn with_stop(&self, stop: &[&str]) -> Self {
        let mut params = self.clone();
        params
            .stop
            .extend(stop.iter().map(|s| s.to_string()));
        params
    }
}

/// Token usage from a single model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Accumulate another usage into this one.
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Total tokens (input + output).
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// What a model call returns: the full text, plus usage when the backend reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Observes generated fragments as they arrive. Never changes the final text.
pub type StreamCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Anything that turns a prompt into text: a local model, a script, a person.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Short label for banners and logs.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<Completion, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut usage = TokenUsage::default();
        usage.add(TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
        });
        usage.add(TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
        });
        assert_eq!(usage.input_tokens, 11);
        assert_eq!(usage.output_tokens, 7);
        assert_eq!(usage.total(), 18);
    }

    #[test]
    fn with_stop_keeps_sampling_values() {
        let params = SamplingParams::default().with_stop(&["\nObservation:"]);
        assert_eq!(params.temperature, 0.75);
        assert_eq!(params.stop, vec!["\nObservation:".to_string()]);
    }
}
