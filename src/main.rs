use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use bloodwork::analysis;
use bloodwork::archive::{ReportArchive, is_ephemeral};
use bloodwork::archive::sqlite::SqliteArchive;
use bloodwork::banner::{BannerInfo, disclaimer, print_banner, print_run_summary};
use bloodwork::config::{AppConfig, ModelConfig, SearchConfig, search_api_key_from_env};
use bloodwork::consts::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_LLM_ENDPOINT, DEFAULT_MAX_ITERATIONS, DEFAULT_MAX_TOKENS,
    DEFAULT_MODEL_PATH, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
    ENV_LLM_ENDPOINT, ENV_MODEL_PATH, ENV_SEARCH_API_KEY, default_db_path,
};
use bloodwork::document;
use bloodwork::error::AnalysisError;
use bloodwork::events::{Event, EventBus};
use bloodwork::llm::human::HumanModel;
use bloodwork::llm::llama::{LlamaCppModel, PromptTemplate};
use bloodwork::llm::{LanguageModel, SamplingParams};
use bloodwork::spinner::Spinner;

#[derive(Debug, Clone, ValueEnum)]
enum Provider {
    /// Local weights served by llama.cpp
    Llama,
    /// You type each completion
    Human,
}

#[derive(Parser)]
#[command(
    name = "bloodwork",
    version,
    about = "Blood-test reports, read by a small crew of local LLM agents.",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// `bloodwork <FILE>` is short for `bloodwork analyze <FILE>`
    #[command(flatten)]
    analyze: AnalyzeArgs,

    /// Report archive path (use :memory: to keep nothing)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze a blood-test PDF
    Analyze(AnalyzeArgs),
    /// List archived reports, newest first
    History {
        #[arg(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Print an archived report
    Show {
        id: i64,
        /// Also print every stage's output
        #[arg(long, default_value_t = false)]
        stages: bool,
        /// Print the full record as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

#[derive(Args)]
struct AnalyzeArgs {
    /// PDF file to analyze
    file: Option<PathBuf>,

    /// Who produces completions
    #[arg(short, long, value_enum, default_value_t = Provider::Llama)]
    provider: Provider,

    /// Quantized weights served by the backend
    #[arg(long, env = ENV_MODEL_PATH, default_value = DEFAULT_MODEL_PATH)]
    model_path: PathBuf,

    /// llama.cpp server base URL
    #[arg(long, env = ENV_LLM_ENDPOINT, default_value = DEFAULT_LLM_ENDPOINT)]
    endpoint: String,

    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    #[arg(long, default_value_t = DEFAULT_TOP_P)]
    top_p: f32,

    /// Serper API key for the research agent's web search
    #[arg(long, env = ENV_SEARCH_API_KEY, hide_env_values = true)]
    search_api_key: Option<String>,

    /// Model calls the research agent may spend on searching
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Seconds the backend may stay silent before a completion fails
    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout: u64,

    /// Show a spinner instead of streaming tokens
    #[arg(long, default_value_t = false)]
    no_stream: bool,

    /// Send prompts without the Llama 2 chat template
    #[arg(long, default_value_t = false)]
    raw_prompt: bool,
}

impl AnalyzeArgs {
    fn into_config(self, db_path: String) -> (AppConfig, Option<PathBuf>, Provider) {
        let config = AppConfig {
            model: ModelConfig {
                path: self.model_path,
                endpoint: self.endpoint,
                template: if self.raw_prompt {
                    PromptTemplate::Raw
                } else {
                    PromptTemplate::Llama2Chat
                },
                params: SamplingParams {
                    temperature: self.temperature,
                    max_tokens: self.max_tokens,
                    top_p: self.top_p,
                    stop: Vec::new(),
                },
                request_timeout: Duration::from_secs(self.timeout),
            },
            search: SearchConfig {
                api_key: self
                    .search_api_key
                    .filter(|key| !key.trim().is_empty())
                    .or_else(search_api_key_from_env),
                ..SearchConfig::default()
            },
            max_iterations: self.max_iterations,
            stream: !self.no_stream,
            db_path,
        };
        (config, self.file, self.provider)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Before parsing, so `.env` values act as flag fallbacks.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let db_path = cli
        .db
        .unwrap_or_else(|| default_db_path().to_string_lossy().into_owned());

    match cli.command.unwrap_or(Command::Analyze(cli.analyze)) {
        Command::Analyze(args) => {
            let (config, file, provider) = args.into_config(db_path);
            let Some(file) = file else {
                Cli::command().print_help()?;
                return Ok(ExitCode::FAILURE);
            };
            run_analysis(config, &file, provider).await
        }
        Command::History { limit } => {
            show_history(&db_path, limit).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Show { id, stages, json } => {
            show_report(&db_path, id, stages, json).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_analysis(
    config: AppConfig,
    file: &Path,
    provider: Provider,
) -> anyhow::Result<ExitCode> {
    config.validate()?;

    // Read and extract first: a bad upload never costs a model call.
    let report = match std::fs::read(file)
        .map_err(document_error)
        .and_then(|bytes| document::load_report(&bytes).map_err(AnalysisError::Load))
    {
        Ok(report) => report,
        Err(e) => {
            error!(file = %file.display(), error = %e, "could not load report");
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };
    if report.text.is_empty() {
        warn!(file = %file.display(), "no extractable text in report");
    }

    let (model, model_label, stream): (Arc<dyn LanguageModel>, String, bool) = match provider {
        Provider::Human => (Arc::new(HumanModel), "human".to_string(), false),
        Provider::Llama => {
            let mut llama = match LlamaCppModel::new(&config.model) {
                Ok(llama) => llama,
                Err(e) => {
                    eprintln!("{}", AnalysisError::Pipeline(startup_failure(e)));
                    return Ok(ExitCode::FAILURE);
                }
            };
            if let Err(e) = llama.check_backend().await {
                eprintln!("{}", AnalysisError::Pipeline(startup_failure(e)));
                return Ok(ExitCode::FAILURE);
            }
            if config.stream {
                llama = llama.with_stream(Arc::new(|fragment: &str| {
                    eprint!("{}", fragment);
                    let _ = io::stderr().flush();
                }));
            }
            let label = llama.name().to_string();
            (Arc::new(llama), label, config.stream)
        }
    };

    let source = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());
    let search_status = if config.search.api_key.is_some() {
        "serper ✓"
    } else {
        "not configured (research falls back to model knowledge)"
    };
    let archive_label = if is_ephemeral(&config.db_path) {
        "ephemeral"
    } else {
        config.db_path.as_str()
    };
    print_banner(&BannerInfo {
        report: &source,
        pages: report.pages,
        model: &model_label,
        endpoint: &config.model.endpoint,
        search: search_status,
        archive: archive_label,
    });

    let events = Arc::new(EventBus::default());
    let show_spinner = !stream && !matches!(provider, Provider::Human);
    let progress = spawn_progress(events.subscribe(), show_spinner);

    eprintln!("Analyzing the report... This may take a few minutes.");
    let started = Instant::now();
    let result = analysis::analyze_text(&report.text, model, &config, Some(Arc::clone(&events))).await;

    // Last sender gone: the progress task drains and exits.
    drop(events);
    let _ = progress.await;

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            error!(error = %e, "analysis failed");
            eprintln!("\n{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("\n# Analysis Results\n\n{}\n\n{}", output.raw.trim(), disclaimer());

    if is_ephemeral(&config.db_path) {
        debug!("ephemeral archive, report not saved");
    } else {
        match SqliteArchive::open(&config.db_path) {
            Ok(archive) => match archive.save(&source, &output).await {
                Ok(id) => eprintln!("\nsaved as report #{} (bloodwork show {})", id, id),
                Err(e) => warn!(error = %e, "failed to archive report"),
            },
            Err(e) => warn!(error = %e, "failed to open report archive"),
        }
    }

    print_run_summary(output.usage, started.elapsed());
    Ok(ExitCode::SUCCESS)
}

fn document_error(e: io::Error) -> AnalysisError {
    AnalysisError::Load(e.into())
}

/// Model failures before the first task are reported as a failure of task 1.
fn startup_failure(e: bloodwork::error::ModelError) -> bloodwork::error::PipelineError {
    bloodwork::error::PipelineError {
        index: 1,
        task: analysis::ANALYZE_BLOOD_TEST.to_string(),
        role: analysis::MEDICAL_ANALYST.to_string(),
        source: e.into(),
    }
}

/// Mirrors crew progress on stderr: a spinner, or headers between streamed output.
fn spawn_progress(mut rx: broadcast::Receiver<Event>, show_spinner: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = show_spinner.then(|| Spinner::start("Processing..."));
        loop {
            match rx.recv().await {
                Ok(Event::TaskStarted {
                    index, total, role, ..
                }) => {
                    let line = format!("[{}/{}] {} is working...", index, total, role);
                    match &spinner {
                        Some(spinner) => spinner.set_message(line),
                        None => eprintln!("\n── {} ──", line),
                    }
                }
                Ok(Event::ToolUsed { tool, ok, .. }) if spinner.is_none() => {
                    eprintln!("\n  [{}] {}", tool, if ok { "✓" } else { "✗" });
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        if let Some(spinner) = spinner {
            spinner.stop().await;
        }
    })
}

async fn show_history(db_path: &str, limit: usize) -> anyhow::Result<()> {
    let archive = SqliteArchive::open(db_path)?;
    let reports = archive.list(limit).await?;
    if reports.is_empty() {
        println!("no reports yet.");
        return Ok(());
    }
    for report in reports {
        println!(
            "#{:<4} {}  {:<24} {}",
            report.id, report.created_at, report.source, report.preview
        );
    }
    Ok(())
}

async fn show_report(db_path: &str, id: i64, stages: bool, json: bool) -> anyhow::Result<()> {
    let archive = SqliteArchive::open(db_path)?;
    let Some(record) = archive.get(id).await? else {
        bail!("no report with id {}", id);
    };

    if json {
        let out = serde_json::to_string_pretty(&record).context("failed to encode report")?;
        println!("{}", out);
        return Ok(());
    }

    println!("# Report #{} ({}, {})\n", record.id, record.source, record.created_at);
    if stages {
        for entry in record.log.entries() {
            println!("## {}\n\n{}\n", entry.task, entry.output.trim());
        }
    } else {
        println!("{}\n", record.report.trim());
    }
    println!("{}", disclaimer());
    Ok(())
}
