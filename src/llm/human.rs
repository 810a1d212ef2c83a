use async_trait::async_trait;
use std::io::{self, BufRead, Write};

use crate::error::ModelError;

use super::{Completion, LanguageModel, SamplingParams};

/// Marks the end of a typed completion.
const END_MARKER: &str = ".";

/// You are the model. Read each prompt, type the completion.
///
/// Useful for walking through the crew without weights or a server.
pub struct HumanModel;

impl HumanModel {
    fn print_prompt(prompt: &str) {
        eprintln!("\n{}", "=".repeat(60));
        eprintln!("{}", prompt);
        eprintln!("{}", "=".repeat(60));
        eprintln!("Type the completion; finish with a line containing only '{}'.", END_MARKER);
    }

    fn read_completion(input: &mut impl BufRead) -> io::Result<String> {
        let mut lines = Vec::new();
        for line in input.lines() {
            let line = line?;
            if line.trim() == END_MARKER {
                break;
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

#[async_trait]
impl LanguageModel for HumanModel {
    fn name(&self) -> &str {
        "human"
    }

    async fn complete(
        &self,
        prompt: &str,
        _params: &SamplingParams,
    ) -> Result<Completion, ModelError> {
        Self::print_prompt(prompt);
        io::stderr()
            .flush()
            .map_err(|e| ModelError::Input(e.to_string()))?;

        let text = Self::read_completion(&mut io::stdin().lock())
            .map_err(|e| ModelError::Input(e.to_string()))?;

        if text.trim().is_empty() {
            return Err(ModelError::EmptyResponse);
        }
        Ok(Completion::text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_until_end_marker() {
        let mut input = Cursor::new("Final Answer: all good\nsecond line\n.\nignored\n");
        let text = HumanModel::read_completion(&mut input).unwrap();
        assert_eq!(text, "Final Answer: all good\nsecond line");
    }

    #[test]
    fn eof_ends_completion() {
        let mut input = Cursor::new("no marker here");
        let text = HumanModel::read_completion(&mut input).unwrap();
        assert_eq!(text, "no marker here");
    }
}
