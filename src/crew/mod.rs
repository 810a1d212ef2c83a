pub mod context;

use std::sync::Arc;

use tracing::{error, info};

use crate::agent::Agent;
use crate::error::PipelineError;
use crate::events::{Event, EventBus};
use crate::llm::TokenUsage;
use crate::task::{Task, TaskStatus};

pub use context::{ContextEntry, ContextLog};

/// How tasks are scheduled. Later tasks read earlier outputs, so only
/// sequential execution is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Process {
    #[default]
    Sequential,
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct CrewOutput {
    /// Output of the last task.
    pub raw: String,
    pub log: ContextLog,
    pub usage: TokenUsage,
}

/// Runs tasks in declaration order, threading every output forward as context.
///
/// Build a fresh crew per run; nothing here is shared between runs.
pub struct Crew {
    agents: Vec<Arc<Agent>>,
    tasks: Vec<Task>,
    process: Process,
    statuses: Vec<TaskStatus>,
    events: Option<Arc<EventBus>>,
}

impl Crew {
    pub fn new(agents: Vec<Arc<Agent>>, tasks: Vec<Task>) -> Self {
        let statuses = vec![TaskStatus::Pending; tasks.len()];
        Self {
            agents,
            tasks,
            process: Process::Sequential,
            statuses,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn process(&self) -> Process {
        self.process
    }

    pub fn agents(&self) -> &[Arc<Agent>] {
        &self.agents
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Status of each task, in declaration order.
    pub fn statuses(&self) -> &[TaskStatus] {
        &self.statuses
    }

    fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    /// Run every task in order and return the last one's output.
    ///
    /// Fails fast: the first failing task ends the run, later tasks stay
    /// [`TaskStatus::Pending`], and no intermediate output is returned.
    /// With no tasks the input comes back unchanged.
    pub async fn kickoff(&mut self, input: &str) -> Result<CrewOutput, PipelineError> {
        self.statuses = vec![TaskStatus::Pending; self.tasks.len()];
        let total = self.tasks.len();
        let mut log = ContextLog::new(input);
        let mut usage = TokenUsage::default();

        info!(tasks = total, input_chars = input.len(), "crew kickoff");

        for i in 0..total {
            let index = i + 1;
            let task = &self.tasks[i];
            let name = task.name.clone();
            let role = task.role().to_string();

            self.statuses[i] = TaskStatus::Running;
            self.emit(Event::TaskStarted {
                index,
                total,
                task: name.clone(),
                role: role.clone(),
            });
            info!(task = %name, role = %role, index, total, "task started");

            let context = log.render();
            match self.tasks[i].execute(&context).await {
                Ok(output) => {
                    for result in &output.tool_results {
                        self.emit(Event::ToolUsed {
                            role: role.clone(),
                            tool: result.tool.clone(),
                            ok: !result.is_error(),
                        });
                    }
                    usage.add(output.usage);
                    self.statuses[i] = TaskStatus::Completed;
                    self.emit(Event::TaskCompleted {
                        index,
                        task: name.clone(),
                        chars: output.text.len(),
                    });
                    info!(task = %name, chars = output.text.len(), "task completed");
                    log.push(name, output.text);
                }
                Err(source) => {
                    self.statuses[i] = TaskStatus::Failed;
                    self.emit(Event::TaskFailed {
                        index,
                        task: name.clone(),
                        error: source.to_string(),
                    });
                    error!(task = %name, role = %role, error = %source, "task failed, aborting run");
                    return Err(PipelineError {
                        index,
                        task: name,
                        role,
                        source,
                    });
                }
            }
        }

        let raw = log.last_output().unwrap_or(input).to_string();
        info!(chars = raw.len(), tokens = usage.total(), "crew finished");
        Ok(CrewOutput { raw, log, usage })
    }
}
