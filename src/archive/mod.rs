//! Finished reports, kept for later reading.
//!
//! Only successful runs are archived. A failed run leaves nothing behind.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crew::{ContextLog, CrewOutput};

/// A stored analysis, with every stage's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: i64,
    pub created_at: String,
    /// File name (or other label) of the analyzed document.
    pub source: String,
    pub report: String,
    pub log: ContextLog,
    pub tokens: u64,
}

/// One line of `history`.
#[derive(Debug, Clone)]
pub struct ReportSummary {
    pub id: i64,
    pub created_at: String,
    pub source: String,
    pub preview: String,
}

#[async_trait]
pub trait ReportArchive: Send + Sync {
    /// Store a finished run and return its id.
    async fn save(&self, source: &str, output: &CrewOutput) -> Result<i64>;
    /// Most recent first.
    async fn list(&self, limit: usize) -> Result<Vec<ReportSummary>>;
    async fn get(&self, id: i64) -> Result<Option<ReportRecord>>;
}

/// Archive path that keeps nothing once the process exits.
pub const IN_MEMORY: &str = ":memory:";

pub fn is_ephemeral(path: &str) -> bool {
    path == IN_MEMORY
}

/// First line of the report, cut to `max_chars`.
pub(crate) fn preview(report: &str, max_chars: usize) -> String {
    let line = report
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    match line.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &line[..cut]),
        None => line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_takes_first_non_empty_line() {
        assert_eq!(preview("\n\n  ## Advice  \nmore", 40), "## Advice");
    }

    #[test]
    fn only_the_in_memory_path_is_ephemeral() {
        assert!(is_ephemeral(":memory:"));
        assert!(!is_ephemeral("./reports.db"));
        assert!(!is_ephemeral(""));
    }

    #[test]
    fn preview_truncates_long_lines() {
        assert_eq!(preview("abcdefgh", 3), "abc…");
    }
}
