/// Student Workspace - Problems, Editors and Runs
///
/// **Core Responsibility:**
/// Turn a fetched test payload into an ordered problem list, hold one editor
/// state per problem and route "run sample" / "submit" requests through the
/// grader.
///
/// **Problem Records:**
/// Problem banks are loosely shaped. Every field is resolved through an
/// ordered key list; the first key present wins (a `null` value still counts
/// as present). Non-object entries are dropped.
///
/// **Parity Assignment:**
/// A numeric user id is assigned the "odd" or "even" problem category.
/// Uncategorized problems are visible to everyone.

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use sentinel_common::types::{
    EditorState, EvaluationMode, EvaluationResult, Language, Problem, QuizQuestion,
};
use sentinel_grader::adapter::{aliases, CaseField, HIDDEN_LABEL, SAMPLE_LABEL};
use sentinel_grader::{adapt, JsSandbox, SandboxConfig, SuiteRunner};
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

pub const NO_SAMPLE_MESSAGE: &str = "No sample test case available yet.";
pub const NO_HIDDEN_MESSAGE: &str = "Hidden tests are not available for this question.";

const PROBLEM_LIST_KEYS: &[&str] = &["questions", "problems", "data", "items"];
const SINGLE_PROBLEM_MARKERS: &[&str] = &["title", "description", "prompt"];

const DESCRIPTION_KEYS: &[&str] = &["description", "prompt", "details", "body"];
const SAMPLE_KEYS: &[&str] = &["sample_test_case", "sampleTestCase", "sample"];
const HIDDEN_KEYS: &[&str] = &["hidden_test_cases", "hiddenTestCases"];
const EXAMPLE_KEYS: &[&str] = &["examples"];
const CATEGORY_KEYS: &[&str] = &["category"];
const FUNCTION_NAME_KEYS: &[&str] = &["functionName", "function_name"];

fn pick_value<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| record.get(*key))
}

fn pick_string(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    pick_value(record, keys)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// A case field as a list: arrays are taken element-wise, a single value is
/// wrapped, falsy values and null elements disappear.
fn case_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        None => Vec::new(),
        Some(v) if is_falsy(v) => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).cloned().collect(),
        Some(v) => vec![v.clone()],
    }
}

/// Locate the problem array inside a test payload.
pub fn extract_problem_list(payload: &Value) -> Vec<Value> {
    let parsed;
    let payload = match payload {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                parsed = value;
                &parsed
            }
            Err(_) => return Vec::new(),
        },
        other => other,
    };

    match payload {
        Value::Array(items) => items.clone(),
        Value::Object(container) => {
            for key in PROBLEM_LIST_KEYS {
                if let Some(Value::Array(items)) = container.get(*key) {
                    return items.clone();
                }
            }
            if SINGLE_PROBLEM_MARKERS.iter().any(|key| container.contains_key(*key)) {
                return vec![payload.clone()];
            }
            Vec::new()
        }
        _ => Vec::new(),
    }
}

/// Resolve one raw problem record. `index` is its 0-based list position.
pub fn build_problem(raw: &Value, index: usize) -> Option<Problem> {
    let record = raw.as_object()?;

    let title = match record.get("title") {
        Some(Value::String(title)) if !title.trim().is_empty() => title.clone(),
        _ => format!("Question {}", index + 1),
    };

    Some(Problem {
        title,
        description: pick_string(record, DESCRIPTION_KEYS),
        sample_case: pick_value(record, SAMPLE_KEYS).filter(|v| !v.is_null()).cloned(),
        hidden_cases: case_list(pick_value(record, HIDDEN_KEYS)),
        examples: case_list(pick_value(record, EXAMPLE_KEYS)),
        category: pick_string(record, CATEGORY_KEYS),
        function_name: pick_string(record, FUNCTION_NAME_KEYS),
    })
}

pub fn build_problems(payload: &Value) -> Vec<Problem> {
    extract_problem_list(payload)
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| build_problem(raw, index))
        .collect()
}

/// Problem category of a user id, read from its leading decimal digits
/// (`"12abc"` is 12). Ids without leading digits get no category. The
/// remainder keeps its sign, so negative ids are never "odd".
pub fn user_category(user_id: &str) -> Option<&'static str> {
    let trimmed = user_id.trim_start();
    let negative = trimmed.starts_with('-');
    let unsigned = trimmed.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(trimmed);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let last = unsigned[..end].bytes().last()?;

    if !negative && (last - b'0') % 2 == 1 {
        Some("odd")
    } else {
        Some("even")
    }
}

/// Keep the problems assigned to `user_id`.
pub fn filter_by_parity(problems: Vec<Problem>, user_id: &str) -> Vec<Problem> {
    let Some(category) = user_category(user_id) else {
        return problems;
    };

    problems
        .into_iter()
        .filter(|p| match &p.category {
            Some(c) if !c.is_empty() => c == category,
            _ => true,
        })
        .collect()
}

/// Starter code for a problem that was never edited.
pub fn default_snippet(problem: &Problem) -> String {
    let mut hints = String::from("  // Extract your inputs from args\n");

    match &problem.sample_case {
        Some(sample) => {
            let input = sample
                .as_object()
                .and_then(|record| pick_value(record, aliases(CaseField::Input)));
            match input {
                Some(Value::Array(args)) => {
                    for idx in 0..args.len() {
                        hints.push_str(&format!("  // const arg{} = args[{}];\n", idx + 1, idx));
                    }
                }
                _ => hints.push_str("  // const input = args[0];\n"),
            }
        }
        None => {
            hints.push_str("  // Example: const arg1 = args[0];\n");
            hints.push_str("  //          const arg2 = args[1];\n");
        }
    }

    format!(
        "function {}(...args) {{\n{}\n  // Your solution here\n  return null;\n}}",
        problem.entry_point(),
        hints
    )
}

/// Draw at most `limit` questions in random order.
pub fn select_quiz_questions<R: Rng + ?Sized>(
    mut questions: Vec<QuizQuestion>,
    limit: usize,
    rng: &mut R,
) -> Vec<QuizQuestion> {
    questions.shuffle(rng);
    questions.truncate(limit);
    questions
}

/// Count answers that match the question's answer label exactly.
/// Unanswered questions count as wrong.
pub fn score_quiz(questions: &[QuizQuestion], answers: &[Option<String>]) -> u32 {
    questions
        .iter()
        .zip(answers.iter().chain(std::iter::repeat(&None)))
        .filter(|(question, answer)| answer.as_deref() == Some(question.answer.as_str()))
        .count() as u32
}

/// Problems of one lab test plus the student's editor buffers.
#[derive(Debug)]
pub struct Workspace {
    problems: Vec<Problem>,
    editors: HashMap<usize, EditorState>,
    sandbox: SandboxConfig,
}

impl Workspace {
    pub fn new(problems: Vec<Problem>) -> Self {
        Self::with_sandbox(problems, SandboxConfig::default())
    }

    pub fn with_sandbox(problems: Vec<Problem>, sandbox: SandboxConfig) -> Self {
        Self {
            problems,
            editors: HashMap::new(),
            sandbox,
        }
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn problem(&self, index: usize) -> Result<&Problem> {
        self.problems
            .get(index)
            .with_context(|| format!("No problem at index {} ({} loaded)", index, self.problems.len()))
    }

    /// The stored editor state, or the default one for an untouched problem.
    pub fn editor_state(&self, index: usize) -> Result<EditorState> {
        let problem = self.problem(index)?;
        Ok(self.editors.get(&index).cloned().unwrap_or_else(|| EditorState {
            code: default_snippet(problem),
            language: Language::default(),
        }))
    }

    pub fn set_code(&mut self, index: usize, code: impl Into<String>) -> Result<()> {
        let mut state = self.editor_state(index)?;
        state.code = code.into();
        self.editors.insert(index, state);
        Ok(())
    }

    pub fn set_language(&mut self, index: usize, language: Language) -> Result<()> {
        let mut state = self.editor_state(index)?;
        state.language = language;
        self.editors.insert(index, state);
        Ok(())
    }

    fn runner(&self, problem: &Problem) -> SuiteRunner<JsSandbox> {
        SuiteRunner::new(JsSandbox::new(self.sandbox.clone())).with_entry_point(problem.entry_point())
    }

    /// Run the current code against the problem's sample case.
    #[instrument(skip(self))]
    pub fn run_sample(&self, index: usize) -> Result<EvaluationResult> {
        let problem = self.problem(index)?;
        let Some(sample) = &problem.sample_case else {
            return Ok(EvaluationResult::empty(EvaluationMode::Sample, NO_SAMPLE_MESSAGE));
        };

        let state = self.editor_state(index)?;
        let cases = adapt(sample, SAMPLE_LABEL);
        debug!(problem = %problem.title, cases = cases.len(), "Running sample");
        Ok(self.runner(problem).run(&state.code, state.language, &cases, EvaluationMode::Sample))
    }

    /// Grade the current code against the problem's hidden cases.
    #[instrument(skip(self))]
    pub fn submit_problem(&self, index: usize) -> Result<EvaluationResult> {
        let problem = self.problem(index)?;
        if problem.hidden_cases.is_empty() {
            return Ok(EvaluationResult::empty(EvaluationMode::Hidden, NO_HIDDEN_MESSAGE));
        }

        let state = self.editor_state(index)?;
        let cases = adapt(&Value::Array(problem.hidden_cases.clone()), HIDDEN_LABEL);
        let result = self.runner(problem).run(&state.code, state.language, &cases, EvaluationMode::Hidden);
        info!(problem = index, passed = result.passed, total = result.total, "Problem graded");
        Ok(result)
    }
}
