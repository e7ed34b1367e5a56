/// Suite Runner - Case-by-Case Orchestration
///
/// **Responsibility:**
/// Run one source against an ordered list of normalized cases and fold the
/// outcomes into an `EvaluationResult`.
///
/// **Architecture:**
/// 1. Guard the language and the case list before touching the sandbox
/// 2. Execute each case on the sandbox (engine.rs), strictly in order
/// 3. Judge returned values with the comparator (evaluator.rs)
///
/// A faulting case is recorded and the run moves on; nothing a submission
/// does can abort the remaining cases. This module is the glue layer and
/// knows nothing about how code executes or how values are compared.

use crate::engine::{JsSandbox, Sandbox};
use crate::evaluator::{equal, serialize_value};
use sentinel_common::types::{
    EvaluationMode, EvaluationResult, FailureDetail, Language, NormalizedTestCase, Problem,
};
use tracing::{debug, info, instrument};

pub const NO_TESTS_MESSAGE: &str = "No tests available for this action.";
pub const SAMPLE_DONE_MESSAGE: &str = "Sample run completed";
pub const HIDDEN_DONE_MESSAGE: &str = "Submission evaluated";

fn unsupported_message(mode: EvaluationMode) -> &'static str {
    match mode {
        EvaluationMode::Sample => "Sample runs currently support JavaScript/TypeScript only.",
        EvaluationMode::Hidden => "Hidden runs currently support JavaScript/TypeScript only.",
    }
}

fn completed_message(mode: EvaluationMode) -> &'static str {
    match mode {
        EvaluationMode::Sample => SAMPLE_DONE_MESSAGE,
        EvaluationMode::Hidden => HIDDEN_DONE_MESSAGE,
    }
}

pub struct SuiteRunner<S: Sandbox = JsSandbox> {
    sandbox: S,
    entry_point: String,
}

impl Default for SuiteRunner<JsSandbox> {
    fn default() -> Self {
        Self::new(JsSandbox::default())
    }
}

impl<S: Sandbox> SuiteRunner<S> {
    pub fn new(sandbox: S) -> Self {
        Self {
            sandbox,
            entry_point: Problem::DEFAULT_ENTRY_POINT.to_string(),
        }
    }

    /// Invoke `name` instead of the default `solve`.
    pub fn with_entry_point(mut self, name: impl Into<String>) -> Self {
        self.entry_point = name.into();
        self
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Run `source` against every case and aggregate the outcome.
    #[instrument(skip(self, source, cases), fields(mode = %mode, language = %language, entry_point = %self.entry_point, cases = cases.len()))]
    pub fn run(
        &self,
        source: &str,
        language: Language,
        cases: &[NormalizedTestCase],
        mode: EvaluationMode,
    ) -> EvaluationResult {
        if !language.is_executable() {
            info!("Language is not executable, skipping run");
            return EvaluationResult::empty(mode, unsupported_message(mode));
        }
        if cases.is_empty() {
            return EvaluationResult::empty(mode, NO_TESTS_MESSAGE);
        }

        let mut passed = 0u32;
        let mut failures = Vec::new();

        for case in cases {
            match self.evaluate_case(source, case) {
                None => passed += 1,
                Some(failure) => failures.push(failure),
            }
        }

        let total = cases.len() as u32;
        info!(passed, total, failed = failures.len(), "Suite run finished");

        EvaluationResult {
            mode,
            passed,
            total,
            failures,
            message: completed_message(mode).to_string(),
        }
    }

    /// `None` when the case passed.
    fn evaluate_case(&self, source: &str, case: &NormalizedTestCase) -> Option<FailureDetail> {
        let actual = match self.sandbox.execute(source, &self.entry_point, &case.input) {
            Ok(value) => value,
            Err(e) => {
                debug!(case = %case.label, error = %e, "Case faulted");
                return Some(FailureDetail::fault(&case.label, e.to_string()));
            }
        };

        let Some(expected) = &case.expected else {
            debug!(case = %case.label, "Case ran without expectation");
            return None;
        };

        if equal(&actual, expected) {
            debug!(case = %case.label, "Case passed");
            None
        } else {
            debug!(
                case = %case.label,
                expected = %serialize_value(expected),
                received = %serialize_value(&actual),
                "Case output mismatch"
            );
            Some(FailureDetail::mismatch(
                &case.label,
                serialize_value(expected),
                serialize_value(&actual),
            ))
        }
    }
}
