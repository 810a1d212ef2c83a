use crate::tools::ToolDescription;

pub const THOUGHT: &str = "Thought:";
pub const ACTION: &str = "Action:";
pub const ACTION_INPUT: &str = "Action Input:";
pub const OBSERVATION: &str = "Observation:";
pub const FINAL_ANSWER: &str = "Final Answer:";

const TOOL_FORMAT: &str = "To use a tool, respond in exactly this format and then stop:\nThought: <your reasoning about what to do next>\nAction: <the tool name>\nAction Input: <a JSON object with the tool arguments>";
const ANSWER_FORMAT: &str = "When you have enough information, respond with:\nThought: I now know the final answer\nFinal Answer: <your complete answer>";
const NO_TOOLS_FORMAT: &str = "Respond with your complete answer, starting with \"Final Answer:\".";
const RULES: &[&str] = &[
    "Never write an Observation yourself; it is provided after each Action.",
    "Use only the tools listed above. Never invent tools.",
    "If a tool returns an error, continue with what you already know.",
    "Write the final answer in plain language a non-medical reader understands.",
];

/// Appended when an agent has spent its tool budget.
pub const FORCE_FINAL_ANSWER: &str = "You have used all available tool calls. Do not call any more tools. Give your best final answer now, starting with \"Final Answer:\".";

/// Everything an agent prompt is assembled from.
pub struct AgentPrompt<'a> {
    pub role: &'a str,
    pub goal: &'a str,
    pub backstory: &'a str,
    pub tools: &'a [ToolDescription],
    pub description: &'a str,
    pub expected_output: &'a str,
    pub context: &'a str,
    /// Prior Action/Observation turns of this same task.
    pub scratchpad: &'a str,
}

pub fn build_agent_prompt(p: &AgentPrompt<'_>) -> String {
    let mut prompt = format!(
        "You are {role}.\n{backstory}\nYour personal goal is: {goal}\n\n",
        role = p.role,
        backstory = p.backstory,
        goal = p.goal,
    );

    if p.tools.is_empty() {
        prompt.push_str(NO_TOOLS_FORMAT);
        prompt.push_str("\n\n");
    } else {
        prompt.push_str("You have access to these tools:\n");
        for tool in p.tools {
            prompt.push_str(&format!("- {}: {}\n", tool.name, tool.description));
        }
        let rules = RULES
            .iter()
            .map(|rule| format!("- {}", rule))
            .collect::<Vec<_>>()
            .join("\n");
        prompt.push_str(&format!(
            "\n{TOOL_FORMAT}\n\n{ANSWER_FORMAT}\n\nRules:\n{rules}\n\n"
        ));
    }

    prompt.push_str(&format!("Current task: {}\n\n", p.description));
    prompt.push_str(&format!(
        "This is the expected criteria for your final answer: {}\nYou MUST return the actual complete content as the final answer, not a summary.\n",
        p.expected_output
    ));

    if !p.context.trim().is_empty() {
        prompt.push_str(&format!(
            "\nThis is the context you're working with:\n{}\n",
            p.context.trim_end()
        ));
    }

    if !p.scratchpad.is_empty() {
        prompt.push_str(&format!("\n{}\n", p.scratchpad.trim_end()));
    }

    prompt.push_str("\nBegin!\n");
    prompt
}
