//! The blood-report crew: summarize, research, advise.

use std::sync::Arc;

use tracing::info;

use crate::agent::Agent;
use crate::config::AppConfig;
use crate::crew::{Crew, CrewOutput};
use crate::document;
use crate::error::AnalysisError;
use crate::events::EventBus;
use crate::llm::LanguageModel;
use crate::task::Task;
use crate::tools::ToolRegistry;
use crate::tools::search::SerperSearchTool;

pub const MEDICAL_ANALYST: &str = "Medical Analyst";
pub const HEALTH_RESEARCHER: &str = "Health Researcher";
pub const HEALTH_ADVISOR: &str = "Health Advisor";

pub const ANALYZE_BLOOD_TEST: &str = "analyze_blood_test";
pub const SEARCH_FOR_ARTICLES: &str = "search_for_articles";
pub const PROVIDE_RECOMMENDATIONS: &str = "provide_recommendations";

/// The three roles of a run.
pub struct Agents {
    pub analyst: Arc<Agent>,
    pub researcher: Arc<Agent>,
    pub advisor: Arc<Agent>,
}

/// Fresh agents bound to `model`. Only the researcher gets web search.
pub async fn build_agents(model: Arc<dyn LanguageModel>, config: &AppConfig) -> Agents {
    let params = config.model.params.clone();

    let analyst = Agent::builder(MEDICAL_ANALYST, model.clone())
        .goal("Analyze the blood test report and provide a summary in simple terms.")
        .backstory(
            "An expert in interpreting medical data and explaining it to non-medical people.",
        )
        .allow_delegation(false)
        .params(params.clone())
        .build();

    let search = ToolRegistry::with_timeout(config.search.timeout);
    search
        .register(Arc::new(SerperSearchTool::new(&config.search)))
        .await;

    let researcher = Agent::builder(HEALTH_RESEARCHER, model.clone())
        .goal("Search for articles based on the blood test analysis.")
        .backstory("Skilled at finding accurate and relevant health information online.")
        .allow_delegation(false)
        .tools(Arc::new(search))
        .params(params.clone())
        .max_iterations(config.max_iterations)
        .build();

    let advisor = Agent::builder(HEALTH_ADVISOR, model)
        .goal("Provide health recommendations based on the articles and blood test summary.")
        .backstory("Experienced in providing personalized health advice.")
        .allow_delegation(false)
        .params(params)
        .build();

    Agents {
        analyst: Arc::new(analyst),
        researcher: Arc::new(researcher),
        advisor: Arc::new(advisor),
    }
}

pub fn build_tasks(agents: &Agents) -> Vec<Task> {
    vec![
        Task::new(
            ANALYZE_BLOOD_TEST,
            "Analyze the extracted text from the blood test report and provide a summary.",
            "A concise summary of the blood test results in simple terms.",
        )
        .with_agent(agents.analyst.clone()),
        Task::new(
            SEARCH_FOR_ARTICLES,
            "Search for articles relevant to the health issues identified in the blood test summary.",
            "A list of relevant articles with key insights.",
        )
        .with_agent(agents.researcher.clone()),
        Task::new(
            PROVIDE_RECOMMENDATIONS,
            "Provide health recommendations based on the articles and blood test summary.",
            "Personalized health advice based on the analysis and research.",
        )
        .with_agent(agents.advisor.clone()),
    ]
}

/// A ready-to-run crew. Build one per analysis.
pub async fn build_crew(
    model: Arc<dyn LanguageModel>,
    config: &AppConfig,
    events: Option<Arc<EventBus>>,
) -> Crew {
    let agents = build_agents(model, config).await;
    let tasks = build_tasks(&agents);
    let crew = Crew::new(
        vec![
            agents.analyst.clone(),
            agents.researcher.clone(),
            agents.advisor.clone(),
        ],
        tasks,
    );
    match events {
        Some(events) => crew.with_events(events),
        None => crew,
    }
}

/// Analyze already-extracted report text.
pub async fn analyze_text(
    text: &str,
    model: Arc<dyn LanguageModel>,
    config: &AppConfig,
    events: Option<Arc<EventBus>>,
) -> Result<CrewOutput, AnalysisError> {
    let mut crew = build_crew(model, config, events).await;
    Ok(crew.kickoff(text).await?)
}

/// Extract the PDF, then run the crew over its text.
///
/// An unreadable document fails before the model is ever called.
pub async fn analyze_pdf(
    bytes: &[u8],
    model: Arc<dyn LanguageModel>,
    config: &AppConfig,
    events: Option<Arc<EventBus>>,
) -> Result<CrewOutput, AnalysisError> {
    let report = document::load_report(bytes)?;
    info!(pages = report.pages, chars = report.text.len(), "report loaded");
    analyze_text(&report.text, model, config, events).await
}
