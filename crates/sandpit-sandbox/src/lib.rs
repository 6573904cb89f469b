//! Sandpit Sandbox - guarded execution of untrusted snippets
//!
//! Every snippet is analyzed before it runs, executes in a namespace with
//! no file, process or reflection primitives, and is bounded by wall-clock
//! time, CPU time, memory, output size and an executed-line budget.

pub mod analyzer;
pub mod config;
pub mod counter;
pub mod environment;
pub mod limiter;
pub mod policy;
mod runtime;

pub use analyzer::{Analyzer, Issue};
pub use config::{ConfigError, LimitScope, SandboxConfig};
pub use counter::{CancelFlag, CounterGuard, InstructionCounter};
pub use environment::{build_namespace, GuardedImport, Namespace};
pub use limiter::{Ceiling, LimitReport};
pub use policy::Policy;
pub use runtime::{
    ExecutionResult, NonInteractiveInput, Paused, RunClock, RunIo, Sandbox, INPUT_MODE_NOTICE,
    INPUT_UNSUPPORTED_NOTICE,
};

use std::time::Duration;

/// A resource ceiling a run ran into
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LimitCause {
    #[error("Execution exceeded the time limit ({0:?}).")]
    WallClockTimeout(Duration),

    #[error(
        "The code executed more than {0} instructions. \
         This is probably an infinite loop or very inefficient code."
    )]
    InstructionBudget(u64),

    #[error("Timed out waiting for user input after {0:?}.")]
    InputTimeout(Duration),

    #[error("Execution exceeded the CPU time limit ({0:?}).")]
    CpuTime(Duration),

    #[error("Execution exceeded the memory limit ({} MB).", .0 / (1024 * 1024))]
    Memory(usize),

    #[error("Output exceeded the limit of {0} bytes.")]
    OutputLimit(usize),
}

/// Why a run did not complete normally
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    /// The analyzer refused the snippet; nothing ran
    #[error("Issues detected in code:\n{}", bullet_list(.0))]
    AnalysisRejected(Vec<Issue>),

    #[error(transparent)]
    ResourceExceeded(#[from] LimitCause),

    /// Uncaught exception, rendered as a traceback
    #[error("{0}")]
    Runtime(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Fault {
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Fault::ResourceExceeded(_))
    }

    pub fn limit_cause(&self) -> Option<&LimitCause> {
        match self {
            Fault::ResourceExceeded(cause) => Some(cause),
            _ => None,
        }
    }
}

fn bullet_list(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|issue| format!("- {issue}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_messages() {
        let rejected = Fault::AnalysisRejected(vec![
            Issue::ForbiddenImport {
                module: "os".into(),
                line: 1,
            },
            Issue::InfiniteLoop { line: 2 },
        ]);
        assert_eq!(
            rejected.to_string(),
            "Issues detected in code:\n\
             - Import not allowed: os (line 1)\n\
             - 'while True' loop without a 'break' statement (line 2)"
        );

        let memory = Fault::from(LimitCause::Memory(100 * 1024 * 1024));
        assert_eq!(
            memory.to_string(),
            "Execution exceeded the memory limit (100 MB)."
        );
        assert!(memory.is_limit_exceeded());
        assert_eq!(
            Fault::from(LimitCause::WallClockTimeout(Duration::from_secs(2))).to_string(),
            "Execution exceeded the time limit (2s)."
        );
        assert!(!Fault::Runtime("ValueError: bad".into()).is_limit_exceeded());
    }
}
