use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Editor languages offered by the exam client.
///
/// Only the JavaScript family is executable; the rest exist so a student can
/// switch the editor mode, which the grader then reports as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Markdown,
    Python,
    JavaScript,
    TypeScript,
    Cpp,
    Html,
    Json,
    Java,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::Markdown,
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Cpp,
        Language::Html,
        Language::Json,
        Language::Java,
    ];

    /// Parse a language name as the editor menu spells it.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Some(Language::Markdown),
            "python" | "py" => Some(Language::Python),
            "javascript" | "js" => Some(Language::JavaScript),
            "typescript" | "ts" => Some(Language::TypeScript),
            "cpp" | "c++" | "cc" => Some(Language::Cpp),
            "html" => Some(Language::Html),
            "json" => Some(Language::Json),
            "java" => Some(Language::Java),
            _ => None,
        }
    }

    /// TypeScript sources run unmodified on the JavaScript runtime.
    pub fn is_executable(&self) -> bool {
        matches!(self, Language::JavaScript | Language::TypeScript)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::JavaScript
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Markdown => "markdown",
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Cpp => "cpp",
            Language::Html => "html",
            Language::Json => "json",
            Language::Java => "java",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Quiz,
    Lab,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestType::Quiz => write!(f, "quiz"),
            TestType::Lab => write!(f, "lab"),
        }
    }
}

/// A test definition as delivered by the backend.
///
/// `questions` stays untyped: lab problems arrive in several key spellings and
/// are resolved by the client workspace, quiz questions deserialize directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPayload {
    pub test_type: TestType,
    #[serde(default)]
    pub questions: Value,
}

/// A coding problem after alias resolution.
///
/// Test cases are kept raw; they go through the grader's adapter on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub title: String,
    pub description: Option<String>,
    pub sample_case: Option<Value>,
    pub hidden_cases: Vec<Value>,
    pub examples: Vec<Value>,
    pub category: Option<String>,
    pub function_name: Option<String>,
}

impl Problem {
    pub const DEFAULT_ENTRY_POINT: &'static str = "solve";

    /// The callable name the grader invokes for this problem.
    pub fn entry_point(&self) -> &str {
        self.function_name
            .as_deref()
            .unwrap_or(Self::DEFAULT_ENTRY_POINT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTestCase {
    pub label: String,
    pub input: Vec<Value>,
    /// `None` means the case only has to run without faulting.
    pub expected: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationMode {
    Sample,
    Hidden,
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMode::Sample => write!(f, "sample"),
            EvaluationMode::Hidden => write!(f, "hidden"),
        }
    }
}

/// Why a single case did not pass. Carries either `error` or the
/// `expected`/`received` pair, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FailureDetail {
    pub fn mismatch(label: impl Into<String>, expected: String, received: String) -> Self {
        Self {
            label: label.into(),
            expected: Some(expected),
            received: Some(received),
            error: None,
        }
    }

    pub fn fault(label: impl Into<String>, error: String) -> Self {
        Self {
            label: label.into(),
            expected: None,
            received: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub mode: EvaluationMode,
    pub passed: u32,
    pub total: u32,
    pub failures: Vec<FailureDetail>,
    pub message: String,
}

impl EvaluationResult {
    /// A result for a run where no case was attempted.
    pub fn empty(mode: EvaluationMode, message: impl Into<String>) -> Self {
        Self {
            mode,
            passed: 0,
            total: 0,
            failures: Vec::new(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.total > 0 && self.passed == self.total
    }

    pub fn summary(&self) -> String {
        format!("{} / {} tests passed", self.passed, self.total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorState {
    pub code: String,
    pub language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOption {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub title: String,
    pub options: Vec<QuizOption>,
    pub answer: String,
}

/// Payload posted to the result submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReport {
    pub user_id: String,
    pub test_id: String,
    pub test_type: TestType,
    pub passed: u32,
    pub total: u32,
}
