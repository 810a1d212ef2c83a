use std::sync::Arc;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};

use bloodwork::agent::Agent;
use bloodwork::analysis::{
    self, ANALYZE_BLOOD_TEST, HEALTH_RESEARCHER, MEDICAL_ANALYST, PROVIDE_RECOMMENDATIONS,
    SEARCH_FOR_ARTICLES,
};
use bloodwork::config::AppConfig;
use bloodwork::crew::Crew;
use bloodwork::error::{AnalysisError, ModelError, TaskError};
use bloodwork::events::{Event, EventBus};
use bloodwork::llm::LanguageModel;
use bloodwork::llm::mock::MockModel;
use bloodwork::task::{Task, TaskStatus};

const ANALYST: &str = "You are Medical Analyst.";
const RESEARCHER: &str = "You are Health Researcher.";
const ADVISOR: &str = "You are Health Advisor.";

const REPORT: &str = "Hemoglobin 13.5 g/dL\nLDL 162 mg/dL";

/// No search key, so a researcher that tries to search gets a tool error.
fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.search.api_key = None;
    config.max_iterations = 3;
    config
}

fn happy_model() -> MockModel {
    MockModel::new()
        .on(ANALYST, "Final Answer: LDL is high.")
        .on(RESEARCHER, "Final Answer: Articles on lowering LDL.")
        .on(ADVISOR, "Final Answer: Eat more fiber.")
}

fn position(haystack: &str, needle: &str) -> usize {
    haystack
        .find(needle)
        .unwrap_or_else(|| panic!("{:?} not found in prompt", needle))
}

#[tokio::test]
async fn final_output_is_the_advisors_answer() {
    let model = Arc::new(happy_model());
    let out = analysis::analyze_text(REPORT, model.clone(), &config(), None)
        .await
        .unwrap();

    assert_eq!(out.raw, "Eat more fiber.");
    let tasks: Vec<_> = out.log.entries().iter().map(|e| e.task.as_str()).collect();
    assert_eq!(
        tasks,
        vec![ANALYZE_BLOOD_TEST, SEARCH_FOR_ARTICLES, PROVIDE_RECOMMENDATIONS]
    );
    assert_eq!(out.log.input(), REPORT);
}

#[tokio::test]
async fn agents_run_once_each_in_declared_order() {
    let model = Arc::new(happy_model());
    analysis::analyze_text(REPORT, model.clone(), &config(), None)
        .await
        .unwrap();

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[0].starts_with(ANALYST));
    assert!(prompts[1].starts_with(RESEARCHER));
    assert!(prompts[2].starts_with(ADVISOR));
}

#[tokio::test]
async fn every_task_sees_the_input_then_all_earlier_outputs() {
    let model = Arc::new(happy_model());
    analysis::analyze_text(REPORT, model.clone(), &config(), None)
        .await
        .unwrap();
    let prompts = model.prompts();

    assert!(prompts[0].contains(REPORT));

    let research = &prompts[1];
    assert!(position(research, REPORT) < position(research, "LDL is high."));
    assert!(!research.contains("Articles on lowering LDL."));

    let advice = &prompts[2];
    let report_at = position(advice, REPORT);
    let summary_at = position(advice, "LDL is high.");
    let articles_at = position(advice, "Articles on lowering LDL.");
    assert!(report_at < summary_at);
    assert!(summary_at < articles_at);
}

#[tokio::test]
async fn failing_middle_task_stops_the_run() {
    let model = Arc::new(
        MockModel::new()
            .on(ANALYST, "Final Answer: LDL is high.")
            .fail_on(RESEARCHER, "backend went away")
            .on(ADVISOR, "Final Answer: never"),
    );
    let mut crew = analysis::build_crew(model.clone(), &config(), None).await;

    let err = crew.kickoff(REPORT).await.unwrap_err();
    assert_eq!(err.index, 2);
    assert_eq!(err.task, SEARCH_FOR_ARTICLES);
    assert_eq!(err.role, HEALTH_RESEARCHER);
    assert!(matches!(
        err.source,
        TaskError::Model(ModelError::Scripted(ref m)) if m == "backend went away"
    ));
    assert_eq!(
        crew.statuses(),
        &[TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Pending]
    );
    assert!(model.prompts().iter().all(|p| !p.starts_with(ADVISOR)));
}

#[tokio::test]
async fn analysis_error_names_the_failure() {
    let model = Arc::new(MockModel::new().fail_on(ANALYST, "out of memory"));
    let err = analysis::analyze_text(REPORT, model, &config(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::Pipeline(_)));
    let message = err.to_string();
    assert!(message.starts_with("an error occurred during analysis:"));
    assert!(message.contains(MEDICAL_ANALYST));
    assert!(message.contains("out of memory"));
}

#[tokio::test]
async fn identical_inputs_give_identical_outputs() {
    let first = analysis::analyze_text(REPORT, Arc::new(happy_model()), &config(), None)
        .await
        .unwrap();
    let second = analysis::analyze_text(REPORT, Arc::new(happy_model()), &config(), None)
        .await
        .unwrap();

    assert_eq!(first.raw, second.raw);
    assert_eq!(first.log, second.log);
}

#[tokio::test]
async fn search_failure_does_not_abort_the_run() {
    let model = Arc::new(
        MockModel::new()
            .on(ANALYST, "Final Answer: LDL is high.")
            .on_seq(
                RESEARCHER,
                &[
                    "Thought: I should look this up.\nAction: web_search\nAction Input: {\"query\": \"high LDL\"}",
                    "Thought: I now know the final answer\nFinal Answer: General guidance on LDL.",
                ],
            )
            .on(ADVISOR, "Final Answer: Eat more fiber."),
    );
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();

    let out = analysis::analyze_text(REPORT, model.clone(), &config(), Some(bus))
        .await
        .unwrap();
    assert_eq!(out.raw, "Eat more fiber.");

    let research = &out.log.entries()[1].output;
    assert!(research.starts_with("General guidance on LDL."));
    assert!(research.contains("web_search"));

    // The second researcher prompt carries the tool error as its observation.
    let prompts = model.prompts();
    assert_eq!(prompts.len(), 4);
    assert!(prompts[2].contains("Observation: Tool error:"));

    let mut tool_events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let Event::ToolUsed { role, tool, ok } = event {
            tool_events.push((role, tool, ok));
        }
    }
    assert_eq!(
        tool_events,
        vec![(HEALTH_RESEARCHER.to_string(), "web_search".to_string(), false)]
    );
}

#[tokio::test]
async fn researcher_is_forced_to_answer_when_budget_is_spent() {
    let searching = "Action: web_search\nAction Input: {\"query\": \"ldl\"}";
    let model = Arc::new(
        MockModel::new()
            .on(ANALYST, "Final Answer: LDL is high.")
            .on("Do not call any more tools", "Final Answer: What I know already.")
            .on(RESEARCHER, searching)
            .on(ADVISOR, "Final Answer: Eat more fiber."),
    );

    let out = analysis::analyze_text(REPORT, model.clone(), &config(), None)
        .await
        .unwrap();

    assert!(out.log.entries()[1].output.starts_with("What I know already."));
    // analyst + three searches + forced answer + advisor
    assert_eq!(model.calls(), 6);
}

#[tokio::test]
async fn custom_crew_threads_context_through_three_tasks() {
    let model = Arc::new(
        MockModel::new()
            .on("You are A.", "Final Answer: alpha")
            .on("You are B.", "Final Answer: beta")
            .on("You are C.", "Final Answer: gamma"),
    );
    let agent = |role: &str| {
        let m: Arc<dyn LanguageModel> = model.clone();
        Arc::new(Agent::builder(role, m).build())
    };
    let (a, b, c) = (agent("A"), agent("B"), agent("C"));
    let tasks = vec![
        Task::new("first", "one", "x").with_agent(a.clone()),
        Task::new("second", "two", "x").with_agent(b.clone()),
        Task::new("third", "three", "x").with_agent(c.clone()),
    ];
    let mut crew = Crew::new(vec![a, b, c], tasks);

    let out = crew.kickoff("seed").await.unwrap();
    assert_eq!(out.raw, "gamma");

    let third = &model.prompts()[2];
    assert!(third.contains("seed\n\n### Output of first\nalpha\n\n### Output of second\nbeta"));
}

#[tokio::test]
async fn analyze_pdf_runs_the_crew_over_extracted_text() {
    let model = Arc::new(happy_model());
    let pdf = pdf_with_lines(&["Hemoglobin 13.5 g/dL", "LDL 162 mg/dL"]);

    let out = analysis::analyze_pdf(&pdf, model.clone(), &config(), None)
        .await
        .unwrap();

    assert_eq!(out.raw, "Eat more fiber.");
    let first = &model.prompts()[0];
    assert!(first.contains("Hemoglobin 13.5 g/dL"));
    assert!(first.contains("LDL 162 mg/dL"));
    assert!(position(first, "Hemoglobin") < position(first, "LDL 162"));
}

#[tokio::test]
async fn analyze_pdf_reports_unreadable_files() {
    let model = Arc::new(happy_model());
    let err = analysis::analyze_pdf(b"%PDF-nonsense", model.clone(), &config(), None)
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("error reading the PDF file:"));
    assert_eq!(model.calls(), 0);
}

/// One page per line of text.
fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for line in lines {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
