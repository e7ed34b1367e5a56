// CLI commands for the exam client
use crate::exam::{run_countdown, Countdown, ExamClock, ExamSession};
use crate::workspace::{
    build_problems, default_snippet, filter_by_parity, score_quiz, select_quiz_questions, Workspace,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Args;
use sentinel_common::api::{ApiClient, ApiError, ResultSink};
use sentinel_common::config::ClientConfig;
use sentinel_common::types::{
    EvaluationMode, EvaluationResult, Language, QuizQuestion, Role, ScoreReport, TestPayload, TestType,
};
use sentinel_grader::SandboxConfig;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Debug, Args)]
pub struct TestSource {
    /// Test identifier assigned by the instructor
    #[arg(short, long)]
    pub test_id: String,

    /// Student id; numeric ids select the odd/even problem set
    #[arg(short, long)]
    pub user_id: String,

    /// Read the test payload from a JSON file instead of the backend
    #[arg(long)]
    pub payload: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: TestSource,

    /// Problem number (1-based)
    #[arg(short, long, default_value = "1")]
    pub problem: usize,

    /// Solution file; the starter code is used when omitted
    #[arg(short, long)]
    pub code: Option<PathBuf>,

    /// Editor language (defaults to the file extension, then javascript)
    #[arg(short, long)]
    pub language: Option<String>,

    /// Grade against the hidden cases instead of the sample
    #[arg(long, default_value = "false")]
    pub hidden: bool,
}

#[derive(Debug, Args)]
pub struct ExamArgs {
    #[command(flatten)]
    pub source: TestSource,

    /// Directory holding one solution per problem, named `<number>.<ext>`
    #[arg(short, long)]
    pub solutions: Option<PathBuf>,

    /// Quiz answers as a JSON object mapping question title to option label
    #[arg(short, long)]
    pub answers: Option<PathBuf>,

    /// Submit immediately instead of waiting for the timer or Ctrl+C
    #[arg(long, default_value = "false")]
    pub submit_now: bool,

    /// Print the score report instead of posting it
    #[arg(long, default_value = "false")]
    pub dry_run: bool,
}

/// Sink used by `--dry-run`: the report is printed, nothing leaves the machine.
struct PrintSink;

#[async_trait]
impl ResultSink for PrintSink {
    async fn submit_result(&self, report: &ScoreReport) -> Result<(), ApiError> {
        let rendered = serde_json::to_string_pretty(report).map_err(|e| ApiError::Decode(e.to_string()))?;
        println!("{}", rendered);
        Ok(())
    }
}

fn sandbox_config(config: &ClientConfig) -> SandboxConfig {
    SandboxConfig {
        loop_iteration_limit: config.loop_iteration_limit,
        recursion_limit: None,
    }
}

async fn load_payload(client: &ApiClient, source: &TestSource) -> Result<TestPayload> {
    if let Some(path) = &source.payload {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse test payload {}", path.display()));
    }

    client
        .get_test_questions(&source.test_id)
        .await
        .with_context(|| format!("Failed to load test {}", source.test_id))
}

fn lab_workspace(payload: &TestPayload, user_id: &str, sandbox: SandboxConfig) -> Result<Workspace> {
    if payload.test_type != TestType::Lab {
        bail!("Test is a {}, not a lab", payload.test_type);
    }

    let all = build_problems(&payload.questions);
    let loaded = all.len();
    let problems = filter_by_parity(all, user_id);
    info!(loaded, assigned = problems.len(), user_id, "Problems loaded");

    if problems.is_empty() {
        bail!("No questions found for this test.");
    }
    Ok(Workspace::with_sandbox(problems, sandbox))
}

fn language_for(explicit: Option<&str>, path: Option<&Path>) -> Result<Language> {
    if let Some(name) = explicit {
        return Language::from_str(name).with_context(|| format!("Unknown language: {}", name));
    }
    Ok(path
        .and_then(|p| p.extension())
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_str)
        .unwrap_or_default())
}

/// Load `<number>.<ext>` files from `dir` into the matching editors.
fn load_solutions(workspace: &mut Workspace, dir: &Path) -> Result<usize> {
    let mut loaded = 0;
    let entries = fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        let Some(number) = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .and_then(|stem| stem.parse::<usize>().ok())
        else {
            continue;
        };
        if number == 0 || number > workspace.len() {
            warn!(file = %path.display(), "No problem with this number, skipping");
            continue;
        }

        let code = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        workspace.set_code(number - 1, code)?;
        workspace.set_language(number - 1, language_for(None, Some(&path))?)?;
        debug!(problem = number, file = %path.display(), "Solution loaded");
        loaded += 1;
    }

    Ok(loaded)
}

/// Render a result for the terminal. Hidden runs only report the score;
/// their expected values never reach the student.
fn render_result(title: &str, result: &EvaluationResult) -> String {
    let mut lines = vec![format!("→ {} ({})", title, result.mode)];
    if result.total == 0 {
        lines.push(format!("  {}", result.message));
        return lines.join("\n");
    }

    lines.push(format!("  {}: {}", result.message, result.summary()));
    if result.mode == EvaluationMode::Sample {
        for failure in &result.failures {
            match &failure.error {
                Some(error) => lines.push(format!("  ✗ {}: {}", failure.label, error)),
                None => lines.push(format!(
                    "  ✗ {}: expected {}, received {}",
                    failure.label,
                    failure.expected.as_deref().unwrap_or_default(),
                    failure.received.as_deref().unwrap_or_default()
                )),
            }
        }
    }
    if result.is_success() {
        lines.push("  ✓ All tests passed".to_string());
    }
    lines.join("\n")
}

fn print_result(title: &str, result: &EvaluationResult) {
    println!("{}", render_result(title, result));
}

pub async fn login(client: &ApiClient, user_id: &str, password: &str) -> Result<()> {
    let role = client.check_user(user_id, password).await?;
    match role {
        Role::Teacher => println!("✓ Logged in as teacher {}", user_id),
        Role::Student => println!("✓ Logged in as student {}", user_id),
    }
    Ok(())
}

/// Print the problems assigned to a student, with their starter code.
pub async fn show(config: &ClientConfig, client: &ApiClient, source: &TestSource) -> Result<()> {
    let payload = load_payload(client, source).await?;
    let workspace = lab_workspace(&payload, &source.user_id, sandbox_config(config))?;

    for (index, problem) in workspace.problems().iter().enumerate() {
        println!("━━━ {}. {} ━━━", index + 1, problem.title);
        if let Some(description) = &problem.description {
            println!("{}", description);
        }
        if let Some(sample) = &problem.sample_case {
            println!("Sample: {}", sample);
        }
        for (n, example) in problem.examples.iter().enumerate() {
            println!("Example {}: {}", n + 1, example);
        }
        println!("Hidden tests: {}", problem.hidden_cases.len());
        println!();
        println!("{}", default_snippet(problem));
        println!();
    }
    Ok(())
}

/// Run one solution against a problem's sample or hidden cases.
pub async fn run(config: &ClientConfig, client: &ApiClient, args: &RunArgs) -> Result<()> {
    let payload = load_payload(client, &args.source).await?;
    let mut workspace = lab_workspace(&payload, &args.source.user_id, sandbox_config(config))?;

    if args.problem == 0 {
        bail!("Problem numbers start at 1");
    }
    let index = args.problem - 1;

    if let Some(path) = &args.code {
        let code = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        workspace.set_code(index, code)?;
    }
    let language = language_for(args.language.as_deref(), args.code.as_deref())?;
    workspace.set_language(index, language)?;

    let result = if args.hidden {
        workspace.submit_problem(index)?
    } else {
        workspace.run_sample(index)?
    };

    print_result(&workspace.problem(index)?.title, &result);
    Ok(())
}

pub async fn exam(config: &ClientConfig, client: &ApiClient, args: &ExamArgs) -> Result<()> {
    let payload = load_payload(client, &args.source).await?;
    let sink: &dyn ResultSink = if args.dry_run { &PrintSink } else { client };

    match payload.test_type {
        TestType::Lab => lab_exam(config, &payload, args, sink).await,
        TestType::Quiz => quiz_exam(config, &payload, args, sink).await,
    }
}

async fn lab_exam(
    config: &ClientConfig,
    payload: &TestPayload,
    args: &ExamArgs,
    sink: &dyn ResultSink,
) -> Result<()> {
    let mut workspace = lab_workspace(payload, &args.source.user_id, sandbox_config(config))?;
    if let Some(dir) = &args.solutions {
        let loaded = load_solutions(&mut workspace, dir)?;
        info!(loaded, problems = workspace.len(), "Solutions loaded");
    }

    let session = ExamSession::new(args.source.user_id.as_str(), args.source.test_id.as_str());
    let deadline = session
        .deadline(config.exam_duration())
        .with_context(|| format!("Exam duration of {} ms is out of range", config.exam_duration_ms))?;
    info!(
        session = %session.id(),
        started_at = %session.started_at().to_rfc3339(),
        deadline = %deadline.to_rfc3339(),
        "Exam started"
    );

    if !args.submit_now {
        let clock = ExamClock::new(config.exam_duration(), config.warning_threshold());
        println!("⏱ {} remaining. Press Ctrl+C to submit.", clock.display());

        let countdown = run_countdown(&session, clock, config.tick(), |clock| {
            if clock.remaining().as_secs() % 60 == 0 {
                println!("⏱ {} remaining", clock.display());
            }
        });

        tokio::select! {
            outcome = countdown => {
                if outcome == Countdown::Expired {
                    warn!("Time is up, submitting automatically");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                info!("Manual submit requested");
            }
        }
    }

    let Some(outcome) = session.submit(&workspace, sink).await else {
        return Ok(());
    };

    for (problem, result) in workspace.problems().iter().zip(&outcome.results) {
        print_result(&problem.title, result);
    }
    outcome
        .delivery
        .context("Failed to submit exam results")?;

    println!(
        "✓ Exam submitted! You passed {} out of {} test cases.",
        outcome.report.passed, outcome.report.total
    );
    Ok(())
}

async fn prompt_answers(questions: &[QuizQuestion]) -> Result<Vec<Option<String>>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut answers = Vec::with_capacity(questions.len());

    for (index, question) in questions.iter().enumerate() {
        println!("{}. {}", index + 1, question.title);
        for option in &question.options {
            println!("   {}) {}", option.label, option.text);
        }
        let line = lines.next_line().await.context("Failed to read answer")?;
        let answer = line.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
        answers.push(answer);
    }
    Ok(answers)
}

fn read_answers(path: &Path, questions: &[QuizQuestion]) -> Result<Vec<Option<String>>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let by_title: HashMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse answers {}", path.display()))?;
    Ok(questions
        .iter()
        .map(|q| by_title.get(&q.title).cloned())
        .collect())
}

async fn quiz_exam(
    config: &ClientConfig,
    payload: &TestPayload,
    args: &ExamArgs,
    sink: &dyn ResultSink,
) -> Result<()> {
    let questions: Vec<QuizQuestion> = serde_json::from_value(payload.questions.clone())
        .context("Quiz questions are malformed")?;
    let selected = select_quiz_questions(questions, config.quiz_question_limit, &mut rand::thread_rng());
    info!(questions = selected.len(), "Quiz started");

    let answers = match &args.answers {
        Some(path) => read_answers(path, &selected)?,
        None => prompt_answers(&selected).await?,
    };

    let correct = score_quiz(&selected, &answers);
    let report = ScoreReport {
        user_id: args.source.user_id.clone(),
        test_id: args.source.test_id.clone(),
        test_type: TestType::Quiz,
        passed: correct,
        total: selected.len() as u32,
    };
    info!(passed = report.passed, total = report.total, "Quiz graded");

    sink.submit_result(&report)
        .await
        .context("Failed to submit quiz")?;
    println!("✓ Quiz submitted! Score: {} / {}", report.passed, report.total);
    Ok(())
}
