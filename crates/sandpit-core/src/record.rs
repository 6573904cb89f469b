//! Execution records: the live state of one coordinated run

use chrono::{DateTime, Utc};
use sandpit_lang::CollectingSink;
use sandpit_sandbox::ExecutionResult;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque id handed out by `submit`
pub type Token = Uuid;

/// Lifecycle of a coordinated run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Running,
    WaitingForInput,
    Completed,
    Error,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Error)
    }
}

/// Point-in-time view returned by `poll`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub token: Token,
    pub status: Status,
    pub input_required: bool,
    /// Most recent prompt; empty until the run first asks for input
    pub input_prompt: String,
    /// Output captured so far, prompts and echoed answers included
    pub output: String,
    pub result: Option<ExecutionResult>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RecordState {
    status: Status,
    input_required: bool,
    input_prompt: String,
    /// Sender half of the current wait's single-slot channel
    pending_input: Option<SyncSender<String>>,
    result: Option<ExecutionResult>,
}

#[derive(Debug)]
pub struct ExecutionRecord {
    token: Token,
    source: String,
    created_at: DateTime<Utc>,
    born: Instant,
    output: CollectingSink,
    state: Mutex<RecordState>,
}

impl ExecutionRecord {
    pub fn new(source: impl Into<String>, output: CollectingSink) -> Self {
        Self {
            token: Uuid::new_v4(),
            source: source.into(),
            created_at: Utc::now(),
            born: Instant::now(),
            output,
            state: Mutex::new(RecordState {
                status: Status::Pending,
                input_required: false,
                input_prompt: String::new(),
                pending_input: None,
                result: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, RecordState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.born.elapsed()
    }

    pub fn status(&self) -> Status {
        self.state().status
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state();
        Snapshot {
            token: self.token,
            status: state.status,
            input_required: state.input_required,
            input_prompt: state.input_prompt.clone(),
            output: self.output.contents(),
            result: state.result.clone(),
            created_at: self.created_at,
        }
    }

    /// Move to `status` unless the record already finished
    pub(crate) fn advance(&self, status: Status) -> bool {
        let mut state = self.state();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        true
    }

    /// Record the final result; the first call wins
    pub(crate) fn finish(&self, result: ExecutionResult) {
        let mut state = self.state();
        if state.status.is_terminal() {
            return;
        }
        state.status = if result.is_success() {
            Status::Completed
        } else {
            Status::Error
        };
        state.input_required = false;
        state.pending_input = None;
        state.result = Some(result);
    }

    /// Open a fresh single-slot channel and mark the run as waiting
    ///
    /// A finished record keeps its state; the returned receiver is already
    /// disconnected, so the wait ends at once.
    pub(crate) fn begin_wait(&self, prompt: &str) -> Receiver<String> {
        let (tx, rx) = mpsc::sync_channel(1);
        let mut state = self.state();
        if state.status.is_terminal() {
            return rx;
        }
        state.status = Status::WaitingForInput;
        state.input_required = true;
        state.input_prompt = prompt.to_string();
        state.pending_input = Some(tx);
        rx
    }

    /// Close the current wait and go back to running
    ///
    /// A value that raced in just before the wait timed out is still
    /// returned, so delivery and timeout never both succeed.
    pub(crate) fn end_wait(&self, rx: &Receiver<String>) -> Option<String> {
        let mut state = self.state();
        state.pending_input = None;
        state.input_required = false;
        let late = rx.try_recv().ok();
        if state.status == Status::WaitingForInput {
            state.status = Status::Running;
        }
        late
    }

    /// Hand `value` to a pending wait; false when nothing is waiting
    pub(crate) fn deliver(&self, value: String) -> bool {
        let mut state = self.state();
        if state.status != Status::WaitingForInput {
            return false;
        }
        let Some(tx) = state.pending_input.take() else {
            return false;
        };
        if tx.try_send(value).is_err() {
            return false;
        }
        state.input_required = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpit_sandbox::LimitCause;

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&Status::WaitingForInput).unwrap();
        assert_eq!(json, "\"waiting_for_input\"");
        let back: Status = serde_json::from_str("\"completed\"").unwrap();
        assert_eq!(back, Status::Completed);
    }

    #[test]
    fn test_terminal_status_is_final() {
        let record = ExecutionRecord::new("x = 1", CollectingSink::new());
        assert_eq!(record.status(), Status::Pending);
        assert!(record.advance(Status::Running));
        record.finish(ExecutionResult::success("done".into()));
        assert_eq!(record.status(), Status::Completed);
        assert!(!record.advance(Status::Running));
        record.finish(ExecutionResult::success("again".into()));
        assert_eq!(record.snapshot().result.unwrap().output, "done");
    }

    #[test]
    fn test_delivery_only_while_waiting() {
        let record = ExecutionRecord::new("", CollectingSink::new());
        record.advance(Status::Running);
        assert!(!record.deliver("early".into()));

        let rx = record.begin_wait("Name: ");
        let snap = record.snapshot();
        assert_eq!(snap.status, Status::WaitingForInput);
        assert!(snap.input_required);
        assert_eq!(snap.input_prompt, "Name: ");

        assert!(record.deliver("Ada".into()));
        assert!(!record.deliver("twice".into()));
        assert!(!record.snapshot().input_required);
        assert_eq!(rx.recv().unwrap(), "Ada");
        assert_eq!(record.end_wait(&rx), None);
        assert_eq!(record.status(), Status::Running);
    }

    #[test]
    fn test_late_value_is_not_lost() {
        let record = ExecutionRecord::new("", CollectingSink::new());
        record.advance(Status::Running);
        let rx = record.begin_wait("");
        assert!(record.deliver("late".into()));
        assert_eq!(record.end_wait(&rx).as_deref(), Some("late"));
        assert!(!record.deliver("after".into()));
    }

    #[test]
    fn test_prompt_starts_empty() {
        let record = ExecutionRecord::new("", CollectingSink::new());
        let json = serde_json::to_value(record.snapshot()).unwrap();
        assert_eq!(json["input_prompt"], "");
    }

    #[test]
    fn test_wait_after_finish_leaves_record_alone() {
        let record = ExecutionRecord::new("", CollectingSink::new());
        record.advance(Status::Running);
        record.finish(ExecutionResult::failed(
            String::new(),
            LimitCause::WallClockTimeout(Duration::from_secs(1)).into(),
        ));

        let rx = record.begin_wait("late? ");
        let snap = record.snapshot();
        assert_eq!(snap.status, Status::Error);
        assert!(!snap.input_required);
        assert_eq!(snap.input_prompt, "");
        assert!(rx.recv_timeout(Duration::from_millis(10)).is_err());
        assert!(!record.deliver("ignored".into()));
    }
}
