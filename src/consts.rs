//! Project-wide constants and defaults.

use std::path::PathBuf;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Quantized chat weights the backend is expected to serve.
pub const DEFAULT_MODEL_PATH: &str = "./models/llama-2-7b-chat.Q4_K_M.gguf";

/// Where a local llama.cpp server listens by default.
pub const DEFAULT_LLM_ENDPOINT: &str = "http://127.0.0.1:8080";

pub const DEFAULT_TEMPERATURE: f32 = 0.75;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;
pub const DEFAULT_TOP_P: f32 = 1.0;

/// Local inference on CPU is slow; a single completion may take minutes.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Model calls an agent may spend on its tool loop before it must answer.
pub const DEFAULT_MAX_ITERATIONS: usize = 5;

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://google.serper.dev/search";
pub const DEFAULT_SEARCH_RESULTS: usize = 5;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

/// Environment keys. The hyphenated search key is what older `.env` files carry.
pub const ENV_SEARCH_API_KEY: &str = "SERPER_API_KEY";
pub const ENV_SEARCH_API_KEY_LEGACY: &str = "Serper-API-Key";
pub const ENV_MODEL_PATH: &str = "BLOODWORK_MODEL_PATH";
pub const ENV_LLM_ENDPOINT: &str = "BLOODWORK_LLM_ENDPOINT";

/// Number of archived reports `history` lists by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Default archive path: `~/.bloodwork/reports.db`.
/// Falls back to the working directory when there is no home directory.
pub fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".bloodwork"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reports.db")
}

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
