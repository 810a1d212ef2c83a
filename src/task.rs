//! One unit of crew work, bound to one agent.

use std::sync::Arc;

use crate::agent::{Agent, AgentOutput};
use crate::error::TaskError;

/// Lifecycle of a task within a run. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

pub struct Task {
    pub name: String,
    pub description: String,
    /// Documents what the answer should look like. Not enforced.
    pub expected_output: String,
    pub agent: Option<Arc<Agent>>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            agent: None,
        }
    }

    pub fn with_agent(mut self, agent: Arc<Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Role of the assigned agent, or `"unassigned"`.
    pub fn role(&self) -> &str {
        self.agent.as_deref().map(Agent::role).unwrap_or("unassigned")
    }

    /// Run the assigned agent over `context` and return its output verbatim.
    pub async fn execute(&self, context: &str) -> Result<AgentOutput, TaskError> {
        let agent = self.agent.as_ref().ok_or_else(|| TaskError::NoAgent {
            task: self.name.clone(),
        })?;
        let output = agent
            .run(&self.description, &self.expected_output, context)
            .await?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockModel;

    #[tokio::test]
    async fn unassigned_task_fails() {
        let task = Task::new("orphan", "do it", "something");
        assert_eq!(task.role(), "unassigned");
        let err = task.execute("ctx").await.unwrap_err();
        assert!(matches!(err, TaskError::NoAgent { ref task } if task == "orphan"));
    }

    #[tokio::test]
    async fn returns_agent_text_verbatim() {
        let model = Arc::new(MockModel::scripted(&["Final Answer: Glucose 92 mg/dL is normal."]));
        let agent = Arc::new(Agent::builder("Medical Analyst", model.clone()).build());
        let task = Task::new("analyze", "Analyze the report", "A summary").with_agent(agent);

        let output = task.execute("Glucose 92 mg/dL").await.unwrap();
        assert_eq!(output.text, "Glucose 92 mg/dL is normal.");
        assert_eq!(task.role(), "Medical Analyst");

        let prompt = &model.prompts()[0];
        assert!(prompt.contains("Current task: Analyze the report"));
        assert!(prompt.contains("expected criteria for your final answer: A summary"));
    }

    #[tokio::test]
    async fn model_error_becomes_task_error() {
        let model = Arc::new(MockModel::new().fail_on("", "offline"));
        let agent = Arc::new(Agent::builder("Health Advisor", model).build());
        let task = Task::new("advise", "Advise", "Advice").with_agent(agent);
        assert!(matches!(task.execute("").await, Err(TaskError::Model(_))));
    }
}
