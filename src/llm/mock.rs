use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::ModelError;

use super::{Completion, LanguageModel, SamplingParams, StreamCallback, TokenUsage};

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Replies for prompts containing `pattern`. The last reply repeats forever.
struct Rule {
    pattern: String,
    replies: Mutex<VecDeque<Reply>>,
}

impl Rule {
    fn next(&self) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front()
        } else {
            replies.front().cloned()
        }
    }
}

/// A deterministic model for tests and demos.
///
/// Replies are chosen by the first rule whose pattern occurs in the prompt.
/// Every prompt is recorded so callers can inspect what the model was shown.
pub struct MockModel {
    rules: Vec<Rule>,
    fallback: Option<Reply>,
    prompts: Mutex<Vec<String>>,
    on_token: Option<StreamCallback>,
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
            on_token: None,
        }
    }

    /// Answer every prompt with these replies, in order.
    pub fn scripted(replies: &[&str]) -> Self {
        Self::new().on_seq("", replies)
    }

    /// Reply with `text` whenever the prompt contains `pattern`.
    pub fn on(self, pattern: &str, text: &str) -> Self {
        self.on_seq(pattern, &[text])
    }

    /// Reply with each of `texts` in turn for prompts containing `pattern`.
    pub fn on_seq(mut self, pattern: &str, texts: &[&str]) -> Self {
        let replies = texts.iter().map(|t| Reply::Text(t.to_string())).collect();
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            replies: Mutex::new(replies),
        });
        self
    }

    /// Fail with `message` whenever the prompt contains `pattern`.
    pub fn fail_on(mut self, pattern: &str, message: &str) -> Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            replies: Mutex::new(VecDeque::from([Reply::Fail(message.to_string())])),
        });
        self
    }

    /// Reply used when no rule matches.
    pub fn otherwise(mut self, text: &str) -> Self {
        self.fallback = Some(Reply::Text(text.to_string()));
        self
    }

    pub fn with_stream(mut self, on_token: StreamCallback) -> Self {
        self.on_token = Some(on_token);
        self
    }

    /// Every prompt received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn reply_for(&self, prompt: &str) -> Option<Reply> {
        self.rules
            .iter()
            .filter(|rule| prompt.contains(&rule.pattern))
            .find_map(Rule::next)
            .or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        prompt: &str,
        _params: &SamplingParams,
    ) -> Result<Completion, ModelError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let text = match self.reply_for(prompt) {
            Some(Reply::Text(text)) => text,
            Some(Reply::Fail(message)) => return Err(ModelError::Scripted(message)),
            None => {
                let n = self.calls();
                return Err(ModelError::Scripted(format!(
                    "no scripted reply (call {})",
                    n
                )));
            }
        };

        if let Some(on_token) = &self.on_token {
            for fragment in text.split_inclusive(' ') {
                on_token(fragment);
            }
        }

        Ok(Completion {
            usage: Some(TokenUsage {
                input_tokens: prompt.split_whitespace().count() as u64,
                output_tokens: text.split_whitespace().count() as u64,
            }),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn params() -> SamplingParams {
        SamplingParams::default()
    }

    #[tokio::test]
    async fn scripted_replies_in_order_then_repeat_last() {
        let model = MockModel::scripted(&["one", "two"]);
        assert_eq!(model.complete("a", &params()).await.unwrap().text, "one");
        assert_eq!(model.complete("b", &params()).await.unwrap().text, "two");
        assert_eq!(model.complete("c", &params()).await.unwrap().text, "two");
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn rules_match_by_substring() {
        let model = MockModel::new()
            .on("Analyst", "summary")
            .on("Advisor", "advice")
            .otherwise("fallback");
        assert_eq!(model.complete("You are the Advisor", &params()).await.unwrap().text, "advice");
        assert_eq!(model.complete("You are the Analyst", &params()).await.unwrap().text, "summary");
        assert_eq!(model.complete("nobody", &params()).await.unwrap().text, "fallback");
    }

    #[tokio::test]
    async fn fail_on_returns_model_error() {
        let model = MockModel::new().fail_on("boom", "backend crashed");
        let err = model.complete("boom goes the model", &params()).await.unwrap_err();
        assert!(err.to_string().contains("backend crashed"));
    }

    #[tokio::test]
    async fn unmatched_prompt_without_fallback_fails() {
        let model = MockModel::new().on("x", "y");
        assert!(model.complete("nothing", &params()).await.is_err());
    }

    #[tokio::test]
    async fn records_prompts() {
        let model = MockModel::new().otherwise("ok");
        model.complete("first", &params()).await.unwrap();
        model.complete("second", &params()).await.unwrap();
        assert_eq!(model.prompts(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn streaming_does_not_change_text() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&seen);
        let model = MockModel::scripted(&["Your ferritin is low. Eat lentils."])
            .with_stream(Arc::new(move |fragment: &str| sink.lock().unwrap().push_str(fragment)));

        let completion = model.complete("p", &params()).await.unwrap();
        assert_eq!(completion.text, "Your ferritin is low. Eat lentils.");
        assert_eq!(*seen.lock().unwrap(), completion.text);
    }
}
