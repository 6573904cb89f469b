//! The execution sandbox
//!
//! One run is: analyze, build a fresh namespace, start an execution unit
//! (a named OS thread with a large stack), arm the limiter and the
//! instruction counter inside it, then wait for the unit with a wall-clock
//! bound that ignores time spent blocked on `input()`.
//!
//! Interpreter values are `Rc`-based, so the namespace and interpreter are
//! built inside the unit and never leave it. Only strings cross back.

use crate::analyzer::Analyzer;
use crate::config::SandboxConfig;
use crate::counter::{CancelFlag, InstructionCounter};
use crate::environment::build_namespace;
use crate::limiter;
use crate::policy::Policy;
use crate::{Fault, LimitCause};
use sandpit_lang::format::to_str;
use sandpit_lang::{
    CollectingSink, HaltReason, InputProvider, OutputSink, RuntimeLimits, Unwind, Value,
};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Stack reserved for each execution unit; deep snippet recursion runs here
const UNIT_STACK_SIZE: usize = 256 * 1024 * 1024;

/// Deepest snippet recursion [`UNIT_STACK_SIZE`] holds with room to spare
pub const MAX_RECURSION_DEPTH: usize = 3000;

/// Written by [`NonInteractiveInput`] each time a snippet calls `input()`
pub const INPUT_UNSUPPORTED_NOTICE: &str = "WARNING: input() is not supported in this mode.\n\
     WARNING: use predefined variables instead of asking for user input.\n";

/// Prefixed to one-shot output when the source mentions `input(`
pub const INPUT_MODE_NOTICE: &str = "WARNING: your code calls input().\n\
     WARNING: run it in interactive mode to answer its prompts.\n\
     WARNING: here every input() call returns an empty string.\n\n";

static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// Final `{output, error}` of a run; `error` is empty on success
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub output: String,
    pub error: String,
    #[serde(skip)]
    pub fault: Option<Fault>,
}

impl ExecutionResult {
    pub fn success(output: String) -> Self {
        Self {
            output,
            error: String::new(),
            fault: None,
        }
    }

    pub fn failed(output: String, fault: Fault) -> Self {
        Self {
            output,
            error: fault.to_string(),
            fault: Some(fault),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

#[derive(Debug)]
struct ClockState {
    start: Instant,
    paused_total: Duration,
    paused_since: Option<Instant>,
}

/// Wall clock for one run that can be paused while the unit waits for input
#[derive(Debug, Clone)]
pub struct RunClock(Arc<Mutex<ClockState>>);

impl Default for RunClock {
    fn default() -> Self {
        Self::new()
    }
}

impl RunClock {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ClockState {
            start: Instant::now(),
            paused_total: Duration::ZERO,
            paused_since: None,
        })))
    }

    fn state(&self) -> MutexGuard<'_, ClockState> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Time the run has spent outside input waits
    pub fn active(&self) -> Duration {
        let state = self.state();
        let now = Instant::now();
        let paused_now = state
            .paused_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        now.saturating_duration_since(state.start)
            .saturating_sub(state.paused_total + paused_now)
    }

    pub fn is_paused(&self) -> bool {
        self.state().paused_since.is_some()
    }

    /// Stop the clock until the returned guard drops
    pub fn pause(&self) -> Paused {
        let mut state = self.state();
        if state.paused_since.is_none() {
            state.paused_since = Some(Instant::now());
        }
        Paused(self.clone())
    }

    fn resume(&self) {
        let mut state = self.state();
        if let Some(since) = state.paused_since.take() {
            state.paused_total += since.elapsed();
        }
    }
}

/// Keeps a [`RunClock`] paused while alive
#[must_use]
pub struct Paused(RunClock);

impl Drop for Paused {
    fn drop(&mut self) {
        self.0.resume();
    }
}

/// Host side of one run: where output goes and where input comes from
pub struct RunIo {
    pub output: CollectingSink,
    pub input: Box<dyn InputProvider + Send>,
    pub clock: RunClock,
    pub cancel: CancelFlag,
}

impl RunIo {
    pub fn new(output: CollectingSink, input: Box<dyn InputProvider + Send>) -> Self {
        Self {
            output,
            input,
            clock: RunClock::new(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_clock(mut self, clock: RunClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Input for runs nobody can answer: explains why and returns `""`
#[derive(Debug, Default)]
pub struct NonInteractiveInput;

impl InputProvider for NonInteractiveInput {
    fn read_line(&mut self, _prompt: &str, output: &mut dyn OutputSink) -> Result<String, Unwind> {
        output.write(INPUT_UNSUPPORTED_NOTICE)?;
        Ok(String::new())
    }
}

/// What the unit hands back to the waiting caller
struct UnitOutcome {
    fault: Option<Fault>,
    last_value: Option<String>,
    executed: u64,
}

/// Runs snippets under one configuration and policy
#[derive(Debug, Clone)]
pub struct Sandbox {
    config: SandboxConfig,
    policy: Arc<Policy>,
    analyzer: Analyzer,
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let policy = Policy::standard();
        Self {
            config,
            analyzer: Analyzer::new(policy.clone()),
            policy,
        }
    }

    pub fn with_policy(mut self, policy: Arc<Policy>) -> Self {
        self.analyzer = Analyzer::new(policy.clone());
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn policy(&self) -> &Arc<Policy> {
        &self.policy
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    /// Output buffer sized to this sandbox's output ceiling
    pub fn output_sink(&self) -> CollectingSink {
        CollectingSink::with_limit(self.config.max_output_bytes)
    }

    /// One-shot run with the input notice prefixed when the code asks for input
    pub async fn run(&self, source: &str) -> ExecutionResult {
        let mut result = self.execute(source).await;
        if source.contains("input(") {
            result.output.insert_str(0, INPUT_MODE_NOTICE);
        }
        result
    }

    /// Run `source` with no input channel
    pub async fn execute(&self, source: &str) -> ExecutionResult {
        let io = RunIo::new(self.output_sink(), Box::new(NonInteractiveInput));
        self.execute_with(source, io).await
    }

    /// Run `source` with caller-supplied output, input, clock and cancel flag
    pub async fn execute_with(&self, source: &str, io: RunIo) -> ExecutionResult {
        let run = NEXT_RUN.fetch_add(1, Ordering::Relaxed);

        let issues = self.analyzer.analyze(source);
        if !issues.is_empty() {
            info!(run, issues = issues.len(), "snippet rejected by analysis");
            return ExecutionResult::failed(String::new(), Fault::AnalysisRejected(issues));
        }

        info!(run, bytes = source.len(), "run started");
        let RunIo {
            output,
            input,
            clock,
            cancel,
        } = io;

        let (tx, mut rx) = oneshot::channel();
        let unit = {
            let source = source.to_string();
            let config = self.config.clone();
            let policy = self.policy.clone();
            let output = output.clone();
            let cancel = cancel.clone();
            std::thread::Builder::new()
                .name(format!("sandpit-unit-{run}"))
                .stack_size(UNIT_STACK_SIZE)
                .spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        run_unit(&source, &config, policy, output, input, cancel)
                    }))
                    .unwrap_or_else(|payload| UnitOutcome {
                        fault: Some(Fault::Internal(format!(
                            "execution unit panicked: {}",
                            panic_message(payload.as_ref())
                        ))),
                        last_value: None,
                        executed: 0,
                    });
                    // the caller may have stopped waiting
                    let _ = tx.send(outcome);
                })
        };
        if let Err(e) = unit {
            warn!(run, error = %e, "could not spawn execution unit");
            return ExecutionResult::failed(
                String::new(),
                Fault::Internal(format!("could not start execution unit: {e}")),
            );
        }

        let outcome = match self.join_bounded(&mut rx, &clock).await {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) => UnitOutcome {
                fault: Some(Fault::Internal(
                    "execution unit stopped without reporting a result".to_string(),
                )),
                last_value: None,
                executed: 0,
            },
            None => {
                cancel.cancel();
                warn!(run, timeout = ?self.config.timeout, "run timed out, unit cancelled");
                return ExecutionResult::failed(
                    output.contents(),
                    LimitCause::WallClockTimeout(self.config.timeout).into(),
                );
            }
        };

        let mut text = output.contents();
        let result = match outcome.fault {
            Some(fault) => ExecutionResult::failed(text, fault),
            None => {
                if text.is_empty() {
                    text = outcome.last_value.unwrap_or_default();
                }
                ExecutionResult::success(text)
            }
        };
        info!(
            run,
            instructions = outcome.executed,
            ok = result.is_success(),
            "run finished"
        );
        result
    }

    /// Wait for the unit until `timeout` of unpaused time has passed
    async fn join_bounded(
        &self,
        rx: &mut oneshot::Receiver<UnitOutcome>,
        clock: &RunClock,
    ) -> Option<Result<UnitOutcome, oneshot::error::RecvError>> {
        loop {
            let remaining = self.config.timeout.saturating_sub(clock.active());
            if remaining.is_zero() && !clock.is_paused() {
                return None;
            }
            let wait = remaining.max(Duration::from_millis(10));
            if let Ok(done) = tokio::time::timeout(wait, &mut *rx).await {
                return Some(done);
            }
        }
    }
}

/// Body of the execution unit thread
fn run_unit(
    source: &str,
    config: &SandboxConfig,
    policy: Arc<Policy>,
    output: CollectingSink,
    input: Box<dyn InputProvider + Send>,
    cancel: CancelFlag,
) -> UnitOutcome {
    let (report, ceilings) = limiter::apply(config);
    debug!(?report, "unit limits");

    let mut interp = build_namespace(policy).into_interpreter();
    interp.set_output(Box::new(output));
    interp.set_input(input);
    let max_recursion_depth = if config.max_recursion_depth > MAX_RECURSION_DEPTH {
        warn!(
            requested = config.max_recursion_depth,
            allowed = MAX_RECURSION_DEPTH,
            "recursion depth clamped to the unit stack"
        );
        MAX_RECURSION_DEPTH
    } else {
        config.max_recursion_depth
    };
    interp.set_limits(RuntimeLimits {
        max_recursion_depth,
        max_heap_bytes: ceilings.heap_bytes,
    });

    let counter = InstructionCounter::new(config.max_instructions)
        .with_cancel(cancel)
        .with_cpu_ceiling(ceilings.cpu);
    let (result, executed) = {
        let mut guard = counter.activate(&mut interp);
        let result = guard.run_source(source);
        (result, guard.executed())
    };

    let fault = result.err().map(|unwind| classify(unwind, config));
    let last_value = match interp.take_last_value() {
        Some(Value::None) | None => None,
        Some(value) => Some(to_str(&value)),
    };
    UnitOutcome {
        fault,
        last_value,
        executed,
    }
}

fn classify(unwind: Unwind, config: &SandboxConfig) -> Fault {
    match unwind {
        Unwind::Exception(exc) => Fault::Runtime(exc.render()),
        Unwind::Halt(reason) => Fault::from(match reason {
            HaltReason::InstructionBudget(n) => LimitCause::InstructionBudget(n),
            HaltReason::CpuTime(limit) => LimitCause::CpuTime(limit),
            HaltReason::Memory(bytes) => LimitCause::Memory(bytes),
            HaltReason::OutputLimit(bytes) => LimitCause::OutputLimit(bytes),
            HaltReason::InputTimeout(wait) => LimitCause::InputTimeout(wait),
            HaltReason::Cancelled => LimitCause::WallClockTimeout(config.timeout),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Issue;
    use sandpit_lang::ScriptedInput;

    fn sandbox(config: SandboxConfig) -> Sandbox {
        Sandbox::new(config)
    }

    #[tokio::test]
    async fn test_prints_are_captured() {
        let result = Sandbox::default()
            .execute("for i in range(3):\n    print(i, i * i)\n")
            .await;
        assert_eq!(result.error, "");
        assert_eq!(result.output, "0 0\n1 1\n2 4\n");
        assert!(result.fault.is_none());
    }

    #[tokio::test]
    async fn test_analysis_rejection_runs_nothing() {
        let result = Sandbox::default()
            .execute("print('sentinel')\nimport socket\n")
            .await;
        assert_eq!(result.output, "");
        assert_eq!(
            result.error,
            "Issues detected in code:\n- Import not allowed: socket (line 2)"
        );
        assert!(matches!(
            result.fault,
            Some(Fault::AnalysisRejected(ref issues)) if issues == &vec![Issue::ForbiddenImport { module: "socket".into(), line: 2 }]
        ));
    }

    #[tokio::test]
    async fn test_last_expression_is_shown() {
        let result = Sandbox::default().execute("x = 6\nx * 7").await;
        assert_eq!(result.output, "42");
        let result = Sandbox::default().execute("x = [1]\nx.append(2)").await;
        assert_eq!(result.output, "");
        let result = Sandbox::default().execute("print('hi')\n'ignored'").await;
        assert_eq!(result.output, "hi\n");
    }

    #[tokio::test]
    async fn test_runtime_error_keeps_partial_output() {
        let src = "print('before')\ndef f(x):\n    return 1 / x\nf(0)\n";
        let result = Sandbox::default().execute(src).await;
        assert_eq!(result.output, "before\n");
        assert_eq!(
            result.error,
            "Traceback (most recent call last):\n  \
             File \"<snippet>\", line 4, in <module>\n  \
             File \"<snippet>\", line 3, in f\n\
             ZeroDivisionError: division by zero"
        );
    }

    #[tokio::test]
    async fn test_instruction_budget() {
        let config = SandboxConfig::default()
            .with_max_instructions(500)
            .with_timeout(Duration::from_secs(600));
        let result = sandbox(config)
            .execute("def down(n):\n    return down(n + 1)\ndown(0)\n")
            .await;
        assert_eq!(
            result.fault,
            Some(Fault::ResourceExceeded(LimitCause::InstructionBudget(500)))
        );
    }

    #[tokio::test]
    async fn test_recursion_limit_is_catchable_error() {
        let config = SandboxConfig::default().with_max_recursion_depth(50);
        let src = "def down(n):\n    return down(n + 1)\ntry:\n    down(0)\nexcept RecursionError:\n    print('deep')\n";
        let result = sandbox(config).execute(src).await;
        assert_eq!(result.error, "");
        assert_eq!(result.output, "deep\n");
    }

    #[tokio::test]
    async fn test_oversized_recursion_depth_is_clamped() {
        let config = SandboxConfig::default()
            .with_max_recursion_depth(100_000)
            .with_max_instructions(10_000_000)
            .with_timeout(Duration::from_secs(600));
        let src = "def d(n):\n    return d(n - 1) if n else 0\nd(90000)\n";
        let result = sandbox(config).execute(src).await;
        assert!(result
            .error
            .ends_with("RecursionError: maximum recursion depth exceeded"));
        assert!(matches!(result.fault, Some(Fault::Runtime(_))));
    }

    #[tokio::test]
    async fn test_wall_clock_timeout_keeps_partial_output() {
        let config = SandboxConfig::default()
            .with_timeout(Duration::from_millis(200))
            .with_max_instructions(u64::MAX);
        let src = "print('started')\nn = 0\nwhile n >= 0:\n    n += 1\n";
        let result = sandbox(config).execute(src).await;
        assert_eq!(result.output, "started\n");
        assert!(matches!(
            result.fault,
            Some(Fault::ResourceExceeded(
                LimitCause::WallClockTimeout(_) | LimitCause::CpuTime(_)
            ))
        ));
    }

    #[tokio::test]
    async fn test_memory_ceiling() {
        let config = SandboxConfig::default().with_max_memory_mb(1);
        let result = sandbox(config).execute("s = 'x' * (4 * 1024 * 1024)\n").await;
        assert_eq!(
            result.fault,
            Some(Fault::ResourceExceeded(LimitCause::Memory(1024 * 1024)))
        );
    }

    #[tokio::test]
    async fn test_output_ceiling() {
        let config = SandboxConfig::default().with_max_output_bytes(16);
        let result = sandbox(config)
            .execute("for i in range(100):\n    print('line', i)\n")
            .await;
        assert_eq!(result.output.len(), 16);
        assert_eq!(
            result.fault,
            Some(Fault::ResourceExceeded(LimitCause::OutputLimit(16)))
        );
    }

    #[tokio::test]
    async fn test_one_shot_input_notice() {
        let result = Sandbox::default()
            .run("name = input('Name: ')\nprint('Hello', name)\n")
            .await;
        assert_eq!(result.error, "");
        assert_eq!(
            result.output,
            format!("{INPUT_MODE_NOTICE}{INPUT_UNSUPPORTED_NOTICE}Hello \n")
        );
    }

    #[tokio::test]
    async fn test_scripted_input_through_execute_with() {
        let sandbox = Sandbox::default();
        let io = RunIo::new(sandbox.output_sink(), Box::new(ScriptedInput::new(["Ada"])));
        let result = sandbox
            .execute_with("n = input('Name: ')\nprint('Hi', n)\n", io)
            .await;
        assert_eq!(result.output, "Name: Ada\nHi Ada\n");
    }

    #[tokio::test]
    async fn test_paused_clock_does_not_count() {
        let clock = RunClock::new();
        {
            let _paused = clock.pause();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(clock.is_paused());
        }
        assert!(!clock.is_paused());
        assert!(clock.active() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_isolated() {
        let sandbox = Sandbox::default();
        let (a, b) = tokio::join!(
            sandbox.execute("for i in range(200):\n    print('a')\n"),
            sandbox.execute("for i in range(200):\n    print('b')\n"),
        );
        assert!(a.output.lines().all(|l| l == "a"));
        assert!(b.output.lines().all(|l| l == "b"));
        assert_eq!(a.output.lines().count(), 200);
    }

    #[test]
    fn test_result_serializes_without_fault() {
        let result = ExecutionResult::failed(
            "partial".into(),
            Fault::Runtime("ValueError: bad".into()),
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"output": "partial", "error": "ValueError: bad"})
        );
    }
}
