/// Exam Controller - Countdown and One-Shot Submission
///
/// **State Machine:**
/// `Running -> Locked`. Locked is terminal: the first trigger (manual submit
/// or timer expiry) wins the lock, grades every problem against its hidden
/// cases and reports the aggregate once. Every later trigger is a no-op.
///
/// **Scoring:**
/// - passed = sum of passed hidden cases over all problems
/// - total = sum of hidden case counts over all problems
/// - Problems never edited are graded with their starter code
/// - A faulting problem only loses its own cases

use crate::workspace::Workspace;
use chrono::{DateTime, Utc};
use sentinel_common::api::{ApiError, ResultSink};
use sentinel_common::types::{EvaluationResult, ScoreReport, TestType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running,
    Expired,
}

/// Remaining exam time, advanced by a fixed period per tick.
#[derive(Debug, Clone)]
pub struct ExamClock {
    remaining: Duration,
    warning_threshold: Duration,
}

impl ExamClock {
    pub fn new(duration: Duration, warning_threshold: Duration) -> Self {
        Self {
            remaining: duration,
            warning_threshold,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.remaining
    }

    /// Expires when no more than one period is left.
    pub fn tick(&mut self, period: Duration) -> Tick {
        if self.remaining <= period {
            self.remaining = Duration::ZERO;
            Tick::Expired
        } else {
            self.remaining -= period;
            Tick::Running
        }
    }

    /// `MM:SS`; minutes are not wrapped into hours.
    pub fn display(&self) -> String {
        let secs = self.remaining.as_secs();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }

    pub fn is_warning(&self) -> bool {
        self.remaining < self.warning_threshold
    }
}

/// What a winning submission produced.
#[derive(Debug)]
pub struct ExamOutcome {
    pub report: ScoreReport,
    /// Per-problem hidden results in problem order.
    pub results: Vec<EvaluationResult>,
    pub delivery: Result<(), ApiError>,
}

pub struct ExamSession {
    id: Uuid,
    user_id: String,
    test_id: String,
    started_at: DateTime<Utc>,
    locked: AtomicBool,
}

impl ExamSession {
    pub fn new(user_id: impl Into<String>, test_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            test_id: test_id.into(),
            started_at: Utc::now(),
            locked: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Start time plus `duration`, or `None` when that is not a representable date.
    pub fn deadline(&self, duration: Duration) -> Option<DateTime<Utc>> {
        let duration = chrono::Duration::from_std(duration).ok()?;
        self.started_at.checked_add_signed(duration)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Returns true for exactly one caller over the session's lifetime.
    pub fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Grade all problems and report the score, once.
    ///
    /// Returns `None` when the session was already locked.
    #[instrument(skip_all, fields(session = %self.id, test_id = %self.test_id))]
    pub async fn submit(&self, workspace: &Workspace, sink: &dyn ResultSink) -> Option<ExamOutcome> {
        if !self.try_lock() {
            info!("Exam already submitted, ignoring trigger");
            return None;
        }

        let mut passed = 0u32;
        let mut total = 0u32;
        let mut results = Vec::with_capacity(workspace.len());

        for (index, problem) in workspace.problems().iter().enumerate() {
            total += problem.hidden_cases.len() as u32;
            match workspace.submit_problem(index) {
                Ok(result) => {
                    passed += result.passed;
                    results.push(result);
                }
                Err(e) => warn!(problem = index, error = %e, "Problem could not be graded"),
            }
        }

        let report = ScoreReport {
            user_id: self.user_id.clone(),
            test_id: self.test_id.clone(),
            test_type: TestType::Lab,
            passed,
            total,
        };
        info!(passed, total, problems = workspace.len(), "Exam graded");

        let delivery = sink.submit_result(&report).await;
        if let Err(e) = &delivery {
            error!(error = %e, "Failed to submit exam results");
        }

        Some(ExamOutcome {
            report,
            results,
            delivery,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Countdown {
    /// Time ran out; the caller should auto-submit.
    Expired,
    /// The session was locked by another trigger first.
    Cancelled,
}

/// Drive `clock` every `period` until it expires or the session locks.
///
/// `on_tick` sees the clock after every decrement.
pub async fn run_countdown(
    session: &ExamSession,
    mut clock: ExamClock,
    period: Duration,
    mut on_tick: impl FnMut(&ExamClock),
) -> Countdown {
    let mut interval = tokio::time::interval(period);
    // the first tick of a tokio interval completes immediately
    interval.tick().await;
    let mut warned = clock.is_warning();

    loop {
        interval.tick().await;
        if session.is_locked() {
            return Countdown::Cancelled;
        }

        let state = clock.tick(period);
        on_tick(&clock);

        if !warned && clock.is_warning() {
            warned = true;
            warn!(remaining = %clock.display(), "Exam time almost up");
        }
        if state == Tick::Expired {
            info!("Exam time expired");
            return Countdown::Expired;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_common::types::Problem;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingSink {
        calls: AtomicUsize,
        reports: Mutex<Vec<ScoreReport>>,
        fail: bool,
    }

    #[async_trait]
    impl ResultSink for RecordingSink {
        async fn submit_result(&self, report: &ScoreReport) -> Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reports.lock().unwrap().push(report.clone());
            if self.fail {
                return Err(ApiError::Rejected("Failed to submit test results".to_string()));
            }
            Ok(())
        }
    }

    fn make_problem(hidden: Vec<serde_json::Value>) -> Problem {
        Problem {
            title: "Double".to_string(),
            hidden_cases: hidden,
            ..Problem::default()
        }
    }

    fn make_workspace() -> Workspace {
        let mut workspace = Workspace::new(vec![
            make_problem(vec![json!({"input": [1], "output": 2}), json!({"input": [2], "output": 4})]),
            make_problem(vec![json!({"input": [3], "output": 6})]),
            make_problem(vec![]),
        ]);
        workspace.set_code(0, "function solve(x) { return x * 2; }").unwrap();
        workspace.set_code(1, "function solve(x) { throw new Error('nope'); }").unwrap();
        workspace
    }

    #[test]
    fn test_clock_ticks_and_expires() {
        let mut clock = ExamClock::new(Duration::from_millis(2500), Duration::from_secs(300));
        assert_eq!(clock.tick(Duration::from_secs(1)), Tick::Running);
        assert_eq!(clock.tick(Duration::from_secs(1)), Tick::Running);
        assert_eq!(clock.remaining(), Duration::from_millis(500));
        assert_eq!(clock.tick(Duration::from_secs(1)), Tick::Expired);
        assert_eq!(clock.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_clock_expires_at_exactly_one_period() {
        let mut clock = ExamClock::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(clock.tick(Duration::from_secs(1)), Tick::Expired);
    }

    #[test]
    fn test_clock_display_and_warning() {
        let clock = ExamClock::new(Duration::from_secs(3600), Duration::from_secs(300));
        assert_eq!(clock.display(), "60:00");
        assert!(!clock.is_warning());

        let clock = ExamClock::new(Duration::from_millis(299_999), Duration::from_secs(300));
        assert_eq!(clock.display(), "04:59");
        assert!(clock.is_warning());
    }

    #[test]
    fn test_lock_is_taken_once() {
        let session = ExamSession::new("7", "t-1");
        assert!(!session.is_locked());
        assert!(session.try_lock());
        assert!(!session.try_lock());
        assert!(session.is_locked());
    }

    #[test]
    fn test_deadline_of_huge_duration_is_none() {
        let session = ExamSession::new("7", "t-1");
        let deadline = session.deadline(Duration::from_secs(3600)).unwrap();
        assert_eq!((deadline - session.started_at()).num_minutes(), 60);

        assert!(session.deadline(Duration::from_millis(100_000_000_000_000_000)).is_none());
        assert!(session.deadline(Duration::from_millis(u64::MAX)).is_none());
    }

    #[tokio::test]
    async fn test_submit_aggregates_hidden_results() {
        let session = ExamSession::new("7", "t-1");
        let sink = RecordingSink::default();
        let outcome = session.submit(&make_workspace(), &sink).await.unwrap();

        assert_eq!(outcome.report.passed, 2);
        assert_eq!(outcome.report.total, 3);
        assert_eq!(outcome.report.test_type, TestType::Lab);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[1].failures[0].error.as_deref(), Some("nope"));
        assert!(outcome.delivery.is_ok());
        assert_eq!(sink.reports.lock().unwrap()[0], outcome.report);
    }

    #[tokio::test]
    async fn test_second_submit_is_noop() {
        let session = ExamSession::new("7", "t-1");
        let sink = RecordingSink::default();
        let workspace = make_workspace();
        assert!(session.submit(&workspace, &sink).await.is_some());
        assert!(session.submit(&workspace, &sink).await.is_none());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_triggers_submit_once() {
        let session = Arc::new(ExamSession::new("8", "t-2"));
        let sink = Arc::new(RecordingSink::default());
        let workspace = Arc::new(make_workspace());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                let sink = Arc::clone(&sink);
                let workspace = Arc::clone(&workspace);
                tokio::spawn(async move { session.submit(&workspace, sink.as_ref()).await.is_some() })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_reported_once() {
        let session = ExamSession::new("7", "t-1");
        let sink = RecordingSink {
            fail: true,
            ..RecordingSink::default()
        };
        let outcome = session.submit(&make_workspace(), &sink).await.unwrap();
        assert!(outcome.delivery.is_err());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_untouched_problems_use_starter_code() {
        let session = ExamSession::new("7", "t-1");
        let sink = RecordingSink::default();
        let workspace = Workspace::new(vec![make_problem(vec![json!({"input": [1], "output": null})])]);
        let outcome = session.submit(&workspace, &sink).await.unwrap();
        // the starter returns null
        assert_eq!(outcome.report.passed, 1);
        assert_eq!(outcome.report.total, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expires() {
        let session = ExamSession::new("7", "t-1");
        let clock = ExamClock::new(Duration::from_secs(3), Duration::from_secs(1));
        let mut ticks = 0;
        let outcome = run_countdown(&session, clock, Duration::from_secs(1), |_| ticks += 1).await;
        assert_eq!(outcome, Countdown::Expired);
        assert_eq!(ticks, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_stops_after_manual_submit() {
        let session = ExamSession::new("7", "t-1");
        assert!(session.try_lock());
        let clock = ExamClock::new(Duration::from_secs(60), Duration::from_secs(1));
        let outcome = run_countdown(&session, clock, Duration::from_secs(1), |_| {}).await;
        assert_eq!(outcome, Countdown::Cancelled);
    }
}
