use bloodwork::archive::ReportArchive;
use bloodwork::archive::sqlite::SqliteArchive;
use bloodwork::crew::{ContextLog, CrewOutput};
use bloodwork::llm::TokenUsage;

fn output(report: &str) -> CrewOutput {
    let mut log = ContextLog::new("Hemoglobin 13.5 g/dL");
    log.push("analyze_blood_test", "Normal hemoglobin.");
    log.push("provide_recommendations", report);
    CrewOutput {
        raw: report.to_string(),
        log,
        usage: TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        },
    }
}

#[tokio::test]
async fn save_and_get_report() {
    let archive = SqliteArchive::in_memory().unwrap();

    let id = archive
        .save("labs.pdf", &output("Keep it up."))
        .await
        .unwrap();

    let record = archive.get(id).await.unwrap().unwrap();
    assert_eq!(record.id, id);
    assert_eq!(record.source, "labs.pdf");
    assert_eq!(record.report, "Keep it up.");
    assert_eq!(record.tokens, 120);
    assert_eq!(record.log.input(), "Hemoglobin 13.5 g/dL");
    assert_eq!(record.log.entries().len(), 2);
    assert_eq!(record.log.entries()[0].output, "Normal hemoglobin.");
}

#[tokio::test]
async fn get_missing_report_is_none() {
    let archive = SqliteArchive::in_memory().unwrap();
    assert!(archive.get(42).await.unwrap().is_none());
}

#[tokio::test]
async fn list_is_newest_first_and_limited() {
    let archive = SqliteArchive::in_memory().unwrap();
    for name in ["a.pdf", "b.pdf", "c.pdf"] {
        archive
            .save(name, &output(&format!("Report for {}", name)))
            .await
            .unwrap();
    }

    let all = archive.list(10).await.unwrap();
    let sources: Vec<_> = all.iter().map(|r| r.source.as_str()).collect();
    assert_eq!(sources, vec!["c.pdf", "b.pdf", "a.pdf"]);
    assert_eq!(all[0].preview, "Report for c.pdf");

    let limited = archive.list(2).await.unwrap();
    assert_eq!(limited.len(), 2);
    assert_eq!(limited[0].source, "c.pdf");
}

#[tokio::test]
async fn archive_persists_across_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("reports.db");
    let path = path.to_str().unwrap();

    let id = {
        let archive = SqliteArchive::open(path).unwrap();
        archive.save("labs.pdf", &output("Stored.")).await.unwrap()
    };

    let reopened = SqliteArchive::open(path).unwrap();
    let record = reopened.get(id).await.unwrap().unwrap();
    assert_eq!(record.report, "Stored.");
}
