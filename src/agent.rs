//! A role-bound wrapper around a language model, optionally with tools.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::ModelError;
use crate::llm::{LanguageModel, SamplingParams, TokenUsage};
use crate::prompts::agent::{
    ACTION, ACTION_INPUT, AgentPrompt, FINAL_ANSWER, FORCE_FINAL_ANSWER, OBSERVATION,
    build_agent_prompt,
};
use crate::tools::{ToolCall, ToolRegistry, ToolResult};

/// What the model said in one turn.
#[derive(Debug, Clone, PartialEq)]
enum Reply {
    /// Call a tool. `turn` is the model's text up to and including the input.
    Act { turn: String, call: ToolCall },
    Finish(String),
}

/// What an agent produced for one task.
#[derive(Debug, Clone)]
pub struct AgentOutput {
    pub text: String,
    pub usage: TokenUsage,
    /// Every tool call made while composing `text`, failed ones included.
    pub tool_results: Vec<ToolResult>,
}

pub struct Agent {
    role: String,
    goal: String,
    backstory: String,
    allow_delegation: bool,
    tools: Option<Arc<ToolRegistry>>,
    model: Arc<dyn LanguageModel>,
    params: SamplingParams,
    max_iterations: usize,
}

pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.agent.goal = goal.into();
        self
    }

    pub fn backstory(mut self, backstory: impl Into<String>) -> Self {
        self.agent.backstory = backstory.into();
        self
    }

    pub fn allow_delegation(mut self, allow: bool) -> Self {
        self.agent.allow_delegation = allow;
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.agent.tools = Some(tools);
        self
    }

    pub fn params(mut self, params: SamplingParams) -> Self {
        self.agent.params = params;
        self
    }

    /// Model calls the tool loop may spend before a final answer is demanded.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.agent.max_iterations = max_iterations.max(1);
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

impl Agent {
    pub fn builder(role: impl Into<String>, model: Arc<dyn LanguageModel>) -> AgentBuilder {
        AgentBuilder {
            agent: Agent {
                role: role.into(),
                goal: String::new(),
                backstory: String::new(),
                allow_delegation: false,
                tools: None,
                model,
                params: SamplingParams::default(),
                max_iterations: crate::consts::DEFAULT_MAX_ITERATIONS,
            },
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn backstory(&self) -> &str {
        &self.backstory
    }

    pub fn allow_delegation(&self) -> bool {
        self.allow_delegation
    }

    pub fn has_tools(&self) -> bool {
        self.tools.is_some()
    }

    /// Turn a task plus upstream context into text.
    ///
    /// Tool failures never fail the run; they are fed back as observations and
    /// noted at the end of the answer. Only model failures are returned as errors.
    pub async fn run(
        &self,
        description: &str,
        expected_output: &str,
        context: &str,
    ) -> Result<AgentOutput, ModelError> {
        if self.allow_delegation {
            warn!(role = %self.role, "delegation is not supported; the agent works alone");
        }

        let tools = match &self.tools {
            Some(registry) => registry.descriptions().await,
            None => Vec::new(),
        };
        let params = if tools.is_empty() {
            self.params.clone()
        } else {
            let stop = format!("\n{}", OBSERVATION);
            self.params.with_stop(&[stop.as_str()])
        };

        info!(role = %self.role, tools = tools.len(), "agent started");

        let mut scratchpad = String::new();
        let mut usage = TokenUsage::default();
        let mut tool_results = Vec::new();

        for iteration in 0..self.max_iterations {
            let prompt = build_agent_prompt(&AgentPrompt {
                role: &self.role,
                goal: &self.goal,
                backstory: &self.backstory,
                tools: &tools,
                description,
                expected_output,
                context,
                scratchpad: &scratchpad,
            });

            let completion = self.model.complete(&prompt, &params).await?;
            if let Some(u) = completion.usage {
                usage.add(u);
            }

            match parse_reply(&completion.text, !tools.is_empty()) {
                Reply::Finish(answer) => {
                    debug!(role = %self.role, iteration = iteration + 1, "final answer");
                    return self.finish(answer, usage, tool_results);
                }
                Reply::Act { turn, call } => {
                    // tools is non-empty only when a registry is present
                    let Some(registry) = &self.tools else {
                        return self.finish(completion.text, usage, tool_results);
                    };
                    info!(role = %self.role, tool = %call.tool, iteration = iteration + 1, "calling tool");
                    let result = registry.execute(&call).await;
                    scratchpad.push_str(&format!(
                        "{}\n{} {}\n\n",
                        turn.trim_end(),
                        OBSERVATION,
                        result.observation()
                    ));
                    tool_results.push(result);
                }
            }
        }

        warn!(role = %self.role, max = self.max_iterations, "tool budget spent, forcing final answer");
        scratchpad.push_str(FORCE_FINAL_ANSWER);
        let prompt = build_agent_prompt(&AgentPrompt {
            role: &self.role,
            goal: &self.goal,
            backstory: &self.backstory,
            tools: &[],
            description,
            expected_output,
            context,
            scratchpad: &scratchpad,
        });
        let completion = self.model.complete(&prompt, &self.params).await?;
        if let Some(u) = completion.usage {
            usage.add(u);
        }
        let answer = match parse_reply(&completion.text, false) {
            Reply::Finish(answer) => answer,
            Reply::Act { .. } => completion.text,
        };
        self.finish(answer, usage, tool_results)
    }

    fn finish(
        &self,
        answer: String,
        usage: TokenUsage,
        tool_results: Vec<ToolResult>,
    ) -> Result<AgentOutput, ModelError> {
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(ModelError::EmptyResponse);
        }

        let text = match tool_issues(&tool_results) {
            Some(note) => format!("{}\n\n{}", answer, note),
            None => answer,
        };

        info!(role = %self.role, chars = text.len(), tool_calls = tool_results.len(), "agent finished");
        Ok(AgentOutput {
            text,
            usage,
            tool_results,
        })
    }
}

/// A short note listing distinct tool failures, if there were any.
fn tool_issues(results: &[ToolResult]) -> Option<String> {
    let mut issues: Vec<String> = Vec::new();
    for result in results.iter().filter(|r| r.is_error()) {
        let line = format!("- {}: {}", result.tool, result.observation());
        if !issues.contains(&line) {
            issues.push(line);
        }
    }
    if issues.is_empty() {
        return None;
    }
    Some(format!(
        "_Note: some tools failed while this answer was prepared, so it may rely on general knowledge only._\n{}",
        issues.join("\n")
    ))
}

fn parse_reply(text: &str, tools_enabled: bool) -> Reply {
    if let Some(idx) = text.find(FINAL_ANSWER) {
        return Reply::Finish(text[idx + FINAL_ANSWER.len()..].trim().to_string());
    }

    if tools_enabled && let Some(act) = parse_action(text) {
        return act;
    }

    Reply::Finish(text.trim().to_string())
}

fn parse_action(text: &str) -> Option<Reply> {
    // Anything the model invented past its own Action Input is dropped.
    let text = match text.find(OBSERVATION) {
        Some(idx) => &text[..idx],
        None => text,
    };

    let action_at = text.find(ACTION_INPUT).and_then(|input_at| {
        text[..input_at]
            .rfind(ACTION)
            .map(|action_at| (action_at, input_at))
    });
    let (action_at, input_at) = action_at?;

    let tool = text[action_at + ACTION.len()..input_at].trim();
    let tool = tool.lines().next().unwrap_or_default().trim();
    if tool.is_empty() {
        return None;
    }

    let raw_input = text[input_at + ACTION_INPUT.len()..].trim();
    Some(Reply::Act {
        turn: text.trim_end().to_string(),
        call: ToolCall {
            tool: tool.to_string(),
            args: parse_args(raw_input),
        },
    })
}

/// JSON objects become named args; anything else is passed whole as `input`.
fn parse_args(raw: &str) -> HashMap<String, String> {
    if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(raw) {
        return obj
            .into_iter()
            .map(|(k, v)| {
                let val = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, val)
            })
            .collect();
    }
    let raw = raw.trim().trim_matches('"').to_string();
    HashMap::from([("input".to_string(), raw)])
}
