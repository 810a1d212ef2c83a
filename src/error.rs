//! Error types, one per bounded context.
//!
//! Only [`PipelineError`] and [`LoadError`] ever reach the user. Tool
//! failures are absorbed by the agent that made the call.

use std::path::PathBuf;

use thiserror::Error;

/// The uploaded document could not be turned into text.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read document: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a readable PDF: {0}")]
    Malformed(String),

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("failed to extract text from page {page}: {message}")]
    Page { page: u32, message: String },
}

/// The language model could not produce a completion.
///
/// Every variant means the model is unavailable for this run. Callers must not
/// retry automatically.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("model weights not found at {}", path.display())]
    MissingWeights { path: PathBuf },

    #[error("model backend unreachable: {0}")]
    Unreachable(String),

    #[error("model backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("model stream interrupted: {0}")]
    Stream(String),

    #[error("model returned an empty completion")]
    EmptyResponse,

    #[error("scripted model failure: {0}")]
    Scripted(String),

    #[error("failed to read completion from terminal: {0}")]
    Input(String),
}


/// A tool call failed. Recoverable: reported back to the agent as an observation.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("no search API key configured (set SERPER_API_KEY)")]
    MissingApiKey,

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("timed out after {0}s")]
    TimedOut(u64),
}

/// A single task could not produce its result.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("task '{task}' has no agent assigned")]
    NoAgent { task: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// The first fatal failure of a crew run. Later tasks never started.
#[derive(Debug, Clone, Error)]
#[error("task {index} ('{task}', {role}) failed: {source}")]
pub struct PipelineError {
    /// 1-based position of the failing task.
    pub index: usize,
    pub task: String,
    pub role: String,
    #[source]
    pub source: TaskError,
}

/// Everything that can abort an analysis, in the order it can happen.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("error reading the PDF file: {0}")]
    Load(#[from] LoadError),

    #[error("an error occurred during analysis: {0}")]
    Pipeline(#[from] PipelineError),
}
