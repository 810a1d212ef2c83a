use serde::{Deserialize, Serialize};

/// One finished task and what it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub task: String,
    pub output: String,
}

/// The run's input plus every finished task's output, in completion order.
///
/// Each task sees [`render`](Self::render) of the log as it stood when the task
/// started, so later tasks build on all earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLog {
    input: String,
    entries: Vec<ContextEntry>,
}

impl ContextLog {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, task: impl Into<String>, output: impl Into<String>) {
        self.entries.push(ContextEntry {
            task: task.into(),
            output: output.into(),
        });
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn last_output(&self) -> Option<&str> {
        self.entries.last().map(|e| e.output.as_str())
    }

    /// Input first, then each prior output under its task name.
    pub fn render(&self) -> String {
        let mut out = self.input.clone();
        for entry in &self.entries {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&format!("### Output of {}\n{}", entry.task, entry.output));
        }
        out
    }
}
