/// Execution Sandbox - Embedded JavaScript Runtime
///
/// **Core Responsibility:**
/// Run a student's source text and call its entry point with positional
/// arguments, returning the JSON value it produced.
///
/// **Critical Architectural Boundary:**
/// - Sandbox knows HOW to execute (embedded boa_engine context)
/// - Sandbox does NOT know test cases, labels or scoring
/// - Sandbox returns a value or a fault for the Suite Runner to judge
///
/// **Isolation Rules:**
/// 1. Every call gets a brand-new JS context; nothing survives between calls
/// 2. The source is compiled through `new Function("args", ...)` in strict mode,
///    so syntax errors are thrown (and caught) like any other runtime error
/// 3. A missing entry point is reported before any invocation
/// 4. Thrown values become `RuntimeFault` carrying the error's `message`
/// 5. Results cross back as JSON text; `undefined` and functions become `null`
///
/// Execution is synchronous and not preemptible. An endless loop hangs the
/// caller unless `SandboxConfig::loop_iteration_limit` is set.

use boa_engine::{Context, Source};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Safety limit to keep pathological sources out of the parser
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    /// Anything thrown while compiling or running the submission.
    #[error("{0}")]
    RuntimeFault(String),

    #[error("missing entry point: define a function named {0}")]
    MissingEntryPoint(String),

    #[error("invalid entry point name: {0:?}")]
    InvalidEntryPoint(String),

    #[error("source code exceeds maximum size of {max} bytes ({actual} bytes)")]
    SourceTooLarge { max: usize, actual: usize },

    #[error("sandbox failure: {0}")]
    Internal(String),
}

/// Compile-and-invoke capability. One call, one isolated execution.
pub trait Sandbox {
    fn execute(&self, source: &str, entry_point: &str, args: &[Value]) -> Result<Value, SandboxError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Abort loops after this many iterations. `None` keeps loops unbounded.
    pub loop_iteration_limit: Option<u64>,
    /// Maximum call depth. `None` keeps the engine default.
    pub recursion_limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum HarnessOutcome {
    Returned {
        #[serde(default)]
        value: Value,
    },
    Threw {
        message: String,
    },
    MissingEntryPoint,
}

/// Wraps the submission and reports the outcome as a JSON string, so no JS
/// object ever has to be inspected from the Rust side.
const HARNESS: &str = r#"
(function (source, entry, args) {
    var describe = function (e) {
        return (e instanceof Error) ? String(e.message) : String(e);
    };
    var runner;
    try {
        runner = new Function(
            "args",
            "\"use strict\";\n" + source +
            "\nif (typeof " + entry + " !== \"function\") { return { missing: true }; }" +
            "\nreturn { value: " + entry + "(...args) };"
        );
    } catch (e) {
        return JSON.stringify({ status: "threw", message: describe(e) });
    }
    var outcome;
    try {
        outcome = runner(args);
    } catch (e) {
        return JSON.stringify({ status: "threw", message: describe(e) });
    }
    if (outcome === null || typeof outcome !== "object" || outcome.missing) {
        return JSON.stringify({ status: "missing_entry_point" });
    }
    var encoded;
    try {
        encoded = JSON.stringify(outcome.value === undefined ? null : outcome.value);
    } catch (e) {
        return JSON.stringify({ status: "threw", message: describe(e) });
    }
    return '{"status":"returned","value":' + (encoded === undefined ? "null" : encoded) + '}';
})
"#;

/// Entry points are spliced into generated code, so only plain identifiers pass.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

fn js_string_literal(text: &str) -> Result<String, SandboxError> {
    serde_json::to_string(text).map_err(|e| SandboxError::Internal(e.to_string()))
}

/// Built-in JavaScript sandbox using boa_engine
#[derive(Debug, Clone, Default)]
pub struct JsSandbox {
    config: SandboxConfig,
}

impl JsSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    fn build_script(source: &str, entry_point: &str, args: &[Value]) -> Result<String, SandboxError> {
        let args_json =
            serde_json::to_string(args).map_err(|e| SandboxError::Internal(e.to_string()))?;

        Ok(format!(
            "{}({}, {}, JSON.parse({}))",
            HARNESS.trim_end(),
            js_string_literal(source)?,
            js_string_literal(entry_point)?,
            js_string_literal(&args_json)?
        ))
    }

    fn context(&self) -> Context {
        let mut context = Context::default();
        let limits = context.runtime_limits_mut();
        if let Some(limit) = self.config.loop_iteration_limit {
            limits.set_loop_iteration_limit(limit);
        }
        if let Some(limit) = self.config.recursion_limit {
            limits.set_recursion_limit(limit);
        }
        context
    }
}

impl Sandbox for JsSandbox {
    fn execute(&self, source: &str, entry_point: &str, args: &[Value]) -> Result<Value, SandboxError> {
        if source.len() > MAX_SOURCE_CODE_BYTES {
            return Err(SandboxError::SourceTooLarge {
                max: MAX_SOURCE_CODE_BYTES,
                actual: source.len(),
            });
        }
        if !is_valid_identifier(entry_point) {
            return Err(SandboxError::InvalidEntryPoint(entry_point.to_string()));
        }

        let script = Self::build_script(source, entry_point, args)?;
        let mut context = self.context();

        // only uncatchable errors (runtime limits) escape the harness
        let result = context.eval(Source::from_bytes(&script)).map_err(|e| {
            warn!(error = %e, "Submission aborted by the runtime");
            SandboxError::RuntimeFault(e.to_string())
        })?;

        let report = result
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| SandboxError::Internal("harness returned a non-string value".to_string()))?;

        let outcome: HarnessOutcome = serde_json::from_str(&report)
            .map_err(|e| SandboxError::Internal(format!("unreadable harness report: {}", e)))?;

        match outcome {
            HarnessOutcome::Returned { value } => {
                debug!(entry_point, "Submission returned");
                Ok(value)
            }
            HarnessOutcome::Threw { message } => {
                debug!(entry_point, error = %message, "Submission threw");
                Err(SandboxError::RuntimeFault(message))
            }
            HarnessOutcome::MissingEntryPoint => Err(SandboxError::MissingEntryPoint(entry_point.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(source: &str, args: Vec<Value>) -> Result<Value, SandboxError> {
        JsSandbox::default().execute(source, "solve", &args)
    }

    #[test]
    fn test_positional_arguments() {
        let result = run("function solve(a, b) { return a + b; }", vec![json!(2), json!(3)]);
        assert_eq!(result, Ok(json!(5)));
    }

    #[test]
    fn test_structured_values_round_trip() {
        let source = r#"
            function solve(obj) {
                return { keys: Object.keys(obj).sort(), total: obj.nums.reduce((a, b) => a + b, 0) };
            }
        "#;
        let result = run(source, vec![json!({"nums": [1, 2, 3], "target": ["a"]})]);
        assert_eq!(result, Ok(json!({"keys": ["nums", "target"], "total": 6})));
    }

    #[test]
    fn test_arrow_function_entry_point() {
        let result = run("const solve = (s) => s.toUpperCase();", vec![json!("abc")]);
        assert_eq!(result, Ok(json!("ABC")));
    }

    #[test]
    fn test_custom_entry_point() {
        let source = "function twoSum(nums, target) { return [0, 1]; }";
        let result = JsSandbox::default().execute(source, "twoSum", &[json!([1, 2]), json!(3)]);
        assert_eq!(result, Ok(json!([0, 1])));
    }

    #[test]
    fn test_missing_entry_point() {
        let result = run("function helper() { return 1; }", vec![]);
        assert_eq!(result, Err(SandboxError::MissingEntryPoint("solve".to_string())));
        assert!(result.unwrap_err().to_string().contains("missing entry point"));
    }

    #[test]
    fn test_non_function_entry_point_is_missing() {
        let result = run("var solve = 42;", vec![]);
        assert!(matches!(result, Err(SandboxError::MissingEntryPoint(_))));
    }

    #[test]
    fn test_thrown_type_error_message() {
        let result = run("function solve(x) { return x.length.foo.bar; }", vec![json!(null)]);
        match result {
            Err(SandboxError::RuntimeFault(message)) => assert!(!message.is_empty()),
            other => panic!("expected runtime fault, got {:?}", other),
        }
    }

    #[test]
    fn test_thrown_error_carries_message() {
        let result = run("function solve() { throw new RangeError('too big'); }", vec![]);
        assert_eq!(result, Err(SandboxError::RuntimeFault("too big".to_string())));
    }

    #[test]
    fn test_thrown_non_error_value() {
        let result = run("function solve() { throw 'plain'; }", vec![]);
        assert_eq!(result, Err(SandboxError::RuntimeFault("plain".to_string())));
    }

    #[test]
    fn test_syntax_error_is_fault() {
        let result = run("function solve( { return 1; }", vec![]);
        assert!(matches!(result, Err(SandboxError::RuntimeFault(_))));
    }

    #[test]
    fn test_strict_mode_applies() {
        let result = run("function solve() { undeclared = 1; return undeclared; }", vec![]);
        assert!(matches!(result, Err(SandboxError::RuntimeFault(_))));
    }

    #[test]
    fn test_undefined_result_becomes_null() {
        assert_eq!(run("function solve() {}", vec![]), Ok(json!(null)));
        assert_eq!(run("function solve() { return function () {}; }", vec![]), Ok(json!(null)));
    }

    #[test]
    fn test_global_state_does_not_leak_between_calls() {
        let source = r#"
            globalThis.counter = (globalThis.counter || 0) + 1;
            function solve() { return globalThis.counter; }
        "#;
        let sandbox = JsSandbox::default();
        assert_eq!(sandbox.execute(source, "solve", &[]), Ok(json!(1)));
        assert_eq!(sandbox.execute(source, "solve", &[]), Ok(json!(1)));

        let probe = "function solve() { return typeof globalThis.counter; }";
        assert_eq!(sandbox.execute(probe, "solve", &[]), Ok(json!("undefined")));
    }

    #[test]
    fn test_prototype_pollution_does_not_leak() {
        let sandbox = JsSandbox::default();
        let polluter = "Array.prototype.sum = function () { return 99; }; function solve() { return [].sum(); }";
        assert_eq!(sandbox.execute(polluter, "solve", &[]), Ok(json!(99)));

        let probe = "function solve() { return typeof [].sum; }";
        assert_eq!(sandbox.execute(probe, "solve", &[]), Ok(json!("undefined")));
    }

    #[test]
    fn test_source_cannot_break_out_of_string_literal() {
        let source = "function solve() { return \"\\\")}); SOURCE ENTRY ARGS\"; }";
        let result = run(source, vec![]);
        assert_eq!(result, Ok(json!("\")}); SOURCE ENTRY ARGS")));
    }

    #[test]
    fn test_invalid_entry_point_rejected() {
        let result = JsSandbox::default().execute("function solve() {}", "solve(); evil", &[]);
        assert!(matches!(result, Err(SandboxError::InvalidEntryPoint(_))));
        assert!(is_valid_identifier("$helper_2"));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_oversized_source_rejected() {
        let source = "x".repeat(MAX_SOURCE_CODE_BYTES + 1);
        assert!(matches!(run(&source, vec![]), Err(SandboxError::SourceTooLarge { .. })));
    }

    #[test]
    fn test_loop_iteration_limit_aborts_endless_loop() {
        let sandbox = JsSandbox::new(SandboxConfig {
            loop_iteration_limit: Some(10_000),
            recursion_limit: None,
        });
        let result = sandbox.execute("function solve() { while (true) {} }", "solve", &[]);
        assert!(matches!(result, Err(SandboxError::RuntimeFault(_))));
    }
}
