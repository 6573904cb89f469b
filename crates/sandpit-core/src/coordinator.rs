//! Async execution coordinator
//!
//! Tracks many concurrent runs by token. `submit` returns as soon as the run
//! is registered; a tokio task owns each run's bounded join and writes the
//! final result into the record. Callers poll for progress and answer
//! `input()` prompts through `supply_input`.

use crate::record::{ExecutionRecord, Snapshot, Status, Token};
use crate::rendezvous::Rendezvous;
use sandpit_lang::OutputSink;
use sandpit_sandbox::{RunClock, RunIo, Sandbox, SandboxConfig};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Written ahead of the output of runs that call `input()`
pub const INPUT_BANNER: &str =
    "INFO: your code calls input(). Execution pauses until you answer each prompt.\n";

/// Retention used by [`Coordinator::spawn_sweeper`] callers that have no opinion
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Unknown execution token: {0}")]
    NotFound(Token),

    #[error("No tokio runtime is available to start background tasks")]
    NoRuntime,
}

/// Registry of live runs; cheap to clone, clones share the registry
#[derive(Debug, Clone)]
pub struct Coordinator {
    sandbox: Arc<Sandbox>,
    records: Arc<RwLock<HashMap<Token, Arc<ExecutionRecord>>>>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(Sandbox::new(SandboxConfig::interactive()))
    }
}

impl Coordinator {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox: Arc::new(sandbox),
            records: Arc::default(),
        }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Register `source` and start running it in the background
    pub async fn submit(&self, source: impl Into<String>) -> Token {
        let output = self.sandbox.output_sink();
        let record = Arc::new(ExecutionRecord::new(source, output.clone()));
        let token = record.token();
        self.records.write().await.insert(token, record.clone());
        record.advance(Status::Running);
        info!(%token, "run submitted");

        let sandbox = self.sandbox.clone();
        tokio::spawn(async move {
            let mut banner = output.clone();
            if record.source().contains("input(") {
                // the run reports an output ceiling hit on its own
                let _ = banner.write(INPUT_BANNER);
            }
            let clock = RunClock::new();
            let input = Rendezvous::new(record.clone(), clock.clone(), sandbox.config().input_wait);
            let io = RunIo::new(output, Box::new(input)).with_clock(clock);
            let result = sandbox.execute_with(record.source(), io).await;
            debug!(token = %record.token(), ok = result.is_success(), "run settled");
            record.finish(result);
        });
        token
    }

    async fn record(&self, token: Token) -> Result<Arc<ExecutionRecord>, CoordinatorError> {
        self.records
            .read()
            .await
            .get(&token)
            .cloned()
            .ok_or(CoordinatorError::NotFound(token))
    }

    /// Current state of the run behind `token`
    pub async fn poll(&self, token: Token) -> Result<Snapshot, CoordinatorError> {
        Ok(self.record(token).await?.snapshot())
    }

    /// Answer a pending `input()`; `Ok(false)` when the run is not waiting
    pub async fn supply_input(
        &self,
        token: Token,
        value: impl Into<String>,
    ) -> Result<bool, CoordinatorError> {
        let accepted = self.record(token).await?.deliver(value.into());
        debug!(%token, accepted, "input supplied");
        Ok(accepted)
    }

    /// Drop every record older than `max_age`, finished or not
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| record.age() <= max_age);
        let removed = before - records.len();
        if removed > 0 {
            info!(removed, remaining = records.len(), "swept old runs");
        }
        removed
    }

    /// Number of records currently held
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current runtime
    pub fn spawn_sweeper(
        &self,
        interval: Duration,
        max_age: Duration,
    ) -> Result<JoinHandle<()>, CoordinatorError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| CoordinatorError::NoRuntime)?;
        let coordinator = self.clone();
        Ok(handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                coordinator.sweep(max_age).await;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn settle(coordinator: &Coordinator, token: Token) -> Snapshot {
        loop {
            let snap = coordinator.poll(token).await.unwrap();
            if snap.status.is_terminal() {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_submit_and_complete() {
        let coordinator = Coordinator::default();
        let token = coordinator.submit("print(sum(range(5)))").await;
        let snap = settle(&coordinator, token).await;
        assert_eq!(snap.status, Status::Completed);
        let result = snap.result.unwrap();
        assert_eq!(result.output, "10\n");
        assert_eq!(result.error, "");
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let coordinator = Coordinator::default();
        let token = uuid::Uuid::new_v4();
        assert!(matches!(
            coordinator.poll(token).await,
            Err(CoordinatorError::NotFound(t)) if t == token
        ));
        assert!(coordinator.supply_input(token, "x").await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_run_is_error() {
        let coordinator = Coordinator::default();
        let token = coordinator.submit("import os\n").await;
        let snap = settle(&coordinator, token).await;
        assert_eq!(snap.status, Status::Error);
        assert!(snap
            .result
            .unwrap()
            .error
            .contains("Import not allowed: os (line 1)"));
    }

    #[tokio::test]
    async fn test_sweep_removes_old_records() {
        let coordinator = Coordinator::default();
        let token = coordinator.submit("x = 1").await;
        settle(&coordinator, token).await;
        assert_eq!(coordinator.sweep(Duration::from_secs(3600)).await, 0);
        assert_eq!(coordinator.sweep(Duration::ZERO).await, 1);
        assert!(coordinator.is_empty().await);
    }

    #[test]
    fn test_sweeper_needs_runtime() {
        let coordinator = Coordinator::default();
        assert!(matches!(
            coordinator.spawn_sweeper(Duration::from_secs(1), DEFAULT_MAX_AGE),
            Err(CoordinatorError::NoRuntime)
        ));
    }
}
