use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ModelConfig;
use crate::error::ModelError;

use super::{Completion, LanguageModel, SamplingParams, StreamCallback, TokenUsage};

const COMPLETION_PATH: &str = "/completion";
const HEALTH_PATH: &str = "/health";
const PROPS_PATH: &str = "/props";

/// How a raw prompt is framed before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// `[INST] ... [/INST]`, what Llama 2 chat weights were tuned on.
    Llama2Chat,
    /// Send the prompt untouched.
    Raw,
}

impl PromptTemplate {
    pub fn apply(self, prompt: &str) -> String {
        match self {
            PromptTemplate::Llama2Chat => format!("[INST] {} [/INST]", prompt.trim()),
            PromptTemplate::Raw => prompt.to_string(),
        }
    }
}

/// A quantized model served by a local llama.cpp server.
///
/// The weights file is checked at construction; the server itself is only
/// contacted by [`check_backend`](Self::check_backend) and [`complete`](LanguageModel::complete).
pub struct LlamaCppModel {
    client: reqwest::Client,
    endpoint: String,
    model_path: PathBuf,
    label: String,
    template: PromptTemplate,
    on_token: Option<StreamCallback>,
}

impl LlamaCppModel {
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        if !config.path.is_file() {
            return Err(ModelError::MissingWeights {
                path: config.path.clone(),
            });
        }

        // Limits each read, not the whole response.
        let client = reqwest::Client::builder()
            .read_timeout(config.request_timeout)
            .build()
            .map_err(|e| ModelError::Unreachable(e.to_string()))?;

        let label = config
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| config.path.display().to_string());

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_path: config.path.clone(),
            label,
            template: config.template,
            on_token: None,
        })
    }

    /// Stream completions, handing each fragment to `on_token` as it arrives.
    pub fn with_stream(mut self, on_token: StreamCallback) -> Self {
        self.on_token = Some(on_token);
        self
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Fail early if the server is down; warn if it serves different weights.
    pub async fn check_backend(&self) -> Result<(), ModelError> {
        let url = format!("{}{}", self.endpoint, HEALTH_PATH);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ModelError::Unreachable(format!("{}: {}", url, e)))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ModelError::Backend { status, message });
        }

        // Older servers have no /props. Nothing to compare then.
        let props_url = format!("{}{}", self.endpoint, PROPS_PATH);
        if let Ok(resp) = self.client.get(&props_url).send().await
            && resp.status().is_success()
            && let Ok(props) = resp.json::<Props>().await
            && let Some(served) = props.model_path
        {
            if !same_weights(&served, &self.model_path) {
                warn!(
                    served = %served,
                    configured = %self.model_path.display(),
                    "backend serves different weights than configured"
                );
            } else {
                debug!(served = %served, "backend serves configured weights");
            }
        }

        info!(endpoint = %self.endpoint, model = %self.label, "model backend ready");
        Ok(())
    }

    async fn post(&self, body: &ApiRequest<'_>) -> Result<reqwest::Response, ModelError> {
        let url = format!("{}{}", self.endpoint, COMPLETION_PATH);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Unreachable(format!("{}: {}", url, e)))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ModelError::Backend { status, message });
        }
        Ok(resp)
    }

    async fn complete_buffered(&self, body: &ApiRequest<'_>) -> Result<Completion, ModelError> {
        let resp = self.post(body).await?;
        let chunk: Chunk = resp
            .json()
            .await
            .map_err(|e| ModelError::Stream(format!("invalid completion body: {}", e)))?;
        let usage = chunk.usage();
        Ok(Completion {
            text: chunk.content,
            usage,
        })
    }

    async fn complete_streaming(
        &self,
        body: &ApiRequest<'_>,
        on_token: &StreamCallback,
    ) -> Result<Completion, ModelError> {
        let resp = self.post(body).await?;
        let mut stream = resp.bytes_stream();

        let mut events = SseBuffer::default();
        let mut text = String::new();
        let mut usage = None;
        let mut finished = false;

        'outer: while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| ModelError::Stream(e.to_string()))?;
            for chunk in events.push(&bytes)? {
                if !chunk.content.is_empty() {
                    on_token(&chunk.content);
                    text.push_str(&chunk.content);
                }
                if chunk.stop {
                    usage = chunk.usage();
                    finished = true;
                    break 'outer;
                }
            }
        }

        // A closed connection without a stop event is a cut-off generation.
        if !finished {
            return Err(ModelError::Stream(format!(
                "stream ended before completion after {} chars",
                text.len()
            )));
        }
        Ok(Completion { text, usage })
    }
}

#[async_trait]
impl LanguageModel for LlamaCppModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<Completion, ModelError> {
        let framed = self.template.apply(prompt);
        let completion = match &self.on_token {
            Some(on_token) => {
                let body = ApiRequest::new(&framed, params, true);
                self.complete_streaming(&body, on_token).await?
            }
            None => {
                let body = ApiRequest::new(&framed, params, false);
                self.complete_buffered(&body).await?
            }
        };

        if completion.text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        if let Some(usage) = completion.usage {
            debug!(
                input = usage.input_tokens,
                output = usage.output_tokens,
                "completion finished"
            );
        }
        Ok(completion)
    }
}

/// Compare by file name: the server may report the path relative to its own cwd.
fn same_weights(served: &str, configured: &Path) -> bool {
    let served = Path::new(served).file_name();
    served.is_some() && served == configured.file_name()
}

/// Splits a server-sent-event byte stream into completion chunks.
/// Buffers raw bytes so a multi-byte character split across reads survives.
#[derive(Default)]
struct SseBuffer {
    pending: Vec<u8>,
}

impl SseBuffer {
    fn push(&mut self, bytes: &[u8]) -> Result<Vec<Chunk>, ModelError> {
        self.pending.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let chunk: Chunk = serde_json::from_str(data)
                .map_err(|e| ModelError::Stream(format!("bad event {}: {}", data, e)))?;
            chunks.push(chunk);
        }
        Ok(chunks)
    }
}

// --- API types ---

#[derive(Serialize)]
struct ApiRequest<'a> {
    prompt: &'a str,
    temperature: f32,
    n_predict: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "no_stop")]
    stop: &'a [String],
    stream: bool,
    cache_prompt: bool,
}

impl<'a> ApiRequest<'a> {
    fn new(prompt: &'a str, params: &'a SamplingParams, stream: bool) -> Self {
        Self {
            prompt,
            temperature: params.temperature,
            n_predict: params.max_tokens,
            top_p: params.top_p,
            stop: &params.stop,
            stream,
            cache_prompt: true,
        }
    }
}

fn no_stop(stop: &&[String]) -> bool {
    stop.is_empty()
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
    tokens_evaluated: Option<u64>,
    tokens_predicted: Option<u64>,
}

impl Chunk {
    fn usage(&self) -> Option<TokenUsage> {
        match (self.tokens_evaluated, self.tokens_predicted) {
            (None, None) => None,
            (input, output) => Some(TokenUsage {
                input_tokens: input.unwrap_or(0),
                output_tokens: output.unwrap_or(0),
            }),
        }
    }
}

#[derive(Deserialize)]
struct Props {
    model_path: Option<String>,
}
