//! Sandpit Core - coordinated, interactive runs
//!
//! Wraps the sandbox in a token-keyed registry so frontends can start a run,
//! poll it, and answer its `input()` prompts while it is still executing.

pub mod coordinator;
pub mod record;
mod rendezvous;

pub use coordinator::{Coordinator, CoordinatorError, DEFAULT_MAX_AGE, INPUT_BANNER};
pub use record::{ExecutionRecord, Snapshot, Status, Token};
pub use rendezvous::Rendezvous;
pub use sandpit_sandbox::{ExecutionResult, Fault, LimitCause, Sandbox, SandboxConfig};
