//! Exceptions raised by snippets and the halts that end a run
//!
//! Two unwinding channels exist. `Exception` is the catchable kind user
//! code can handle with `try/except`. `HaltReason` is raised by the host
//! (budgets, cancellation, input timeouts) and passes straight through
//! every handler and `finally` block.

use std::fmt;
use std::time::Duration;

/// Built-in exception classes known to the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    Exception,
    ArithmeticError,
    AssertionError,
    AttributeError,
    EOFError,
    ImportError,
    IndexError,
    KeyError,
    LookupError,
    MemoryError,
    ModuleNotFoundError,
    NameError,
    NotImplementedError,
    OverflowError,
    RecursionError,
    RuntimeError,
    StatisticsError,
    StopIteration,
    SyntaxError,
    TimeoutError,
    TypeError,
    UnboundLocalError,
    ValueError,
    ZeroDivisionError,
}

impl ExcKind {
    pub const ALL: [ExcKind; 24] = [
        ExcKind::Exception,
        ExcKind::ArithmeticError,
        ExcKind::AssertionError,
        ExcKind::AttributeError,
        ExcKind::EOFError,
        ExcKind::ImportError,
        ExcKind::IndexError,
        ExcKind::KeyError,
        ExcKind::LookupError,
        ExcKind::MemoryError,
        ExcKind::ModuleNotFoundError,
        ExcKind::NameError,
        ExcKind::NotImplementedError,
        ExcKind::OverflowError,
        ExcKind::RecursionError,
        ExcKind::RuntimeError,
        ExcKind::StatisticsError,
        ExcKind::StopIteration,
        ExcKind::SyntaxError,
        ExcKind::TimeoutError,
        ExcKind::TypeError,
        ExcKind::UnboundLocalError,
        ExcKind::ValueError,
        ExcKind::ZeroDivisionError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExcKind::Exception => "Exception",
            ExcKind::ArithmeticError => "ArithmeticError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::EOFError => "EOFError",
            ExcKind::ImportError => "ImportError",
            ExcKind::IndexError => "IndexError",
            ExcKind::KeyError => "KeyError",
            ExcKind::LookupError => "LookupError",
            ExcKind::MemoryError => "MemoryError",
            ExcKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExcKind::NameError => "NameError",
            ExcKind::NotImplementedError => "NotImplementedError",
            ExcKind::OverflowError => "OverflowError",
            ExcKind::RecursionError => "RecursionError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::StatisticsError => "StatisticsError",
            ExcKind::StopIteration => "StopIteration",
            ExcKind::SyntaxError => "SyntaxError",
            ExcKind::TimeoutError => "TimeoutError",
            ExcKind::TypeError => "TypeError",
            ExcKind::UnboundLocalError => "UnboundLocalError",
            ExcKind::ValueError => "ValueError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
        }
    }

    /// Direct base class, `None` for the root
    pub fn parent(self) -> Option<ExcKind> {
        match self {
            ExcKind::Exception => None,
            ExcKind::ZeroDivisionError | ExcKind::OverflowError => Some(ExcKind::ArithmeticError),
            ExcKind::IndexError | ExcKind::KeyError => Some(ExcKind::LookupError),
            ExcKind::ModuleNotFoundError => Some(ExcKind::ImportError),
            ExcKind::UnboundLocalError => Some(ExcKind::NameError),
            ExcKind::RecursionError | ExcKind::NotImplementedError => Some(ExcKind::RuntimeError),
            ExcKind::StatisticsError => Some(ExcKind::ValueError),
            _ => Some(ExcKind::Exception),
        }
    }

    pub fn is_subclass_of(self, other: ExcKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// One line of a traceback, outermost frame first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    pub function: String,
    pub line: u32,
}

/// A raised exception instance
#[derive(Debug, Clone)]
pub struct Exception {
    pub kind: ExcKind,
    pub message: String,
    pub traceback: Vec<TraceEntry>,
}

impl Exception {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            traceback: Vec::new(),
        }
    }

    /// Render the way an uncaught exception is reported to the student
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.traceback.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for entry in &self.traceback {
                out.push_str(&format!(
                    "  File \"<snippet>\", line {}, in {}\n",
                    entry.line, entry.function
                ));
            }
        }
        out.push_str(&self.to_string());
        out
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind.name())
        } else {
            write!(f, "{}: {}", self.kind.name(), self.message)
        }
    }
}

/// Host-imposed reasons to stop a run; never catchable by user code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HaltReason {
    #[error("instruction budget of {0} executed lines exceeded")]
    InstructionBudget(u64),

    #[error("CPU time ceiling of {0:?} exceeded")]
    CpuTime(Duration),

    #[error("memory ceiling of {0} bytes exceeded")]
    Memory(usize),

    #[error("output limit of {0} bytes exceeded")]
    OutputLimit(usize),

    #[error("no input received within {0:?}")]
    InputTimeout(Duration),

    #[error("run cancelled")]
    Cancelled,
}

/// Everything that can unwind the interpreter's Rust stack
#[derive(Debug, Clone)]
pub enum Unwind {
    Exception(Box<Exception>),
    Halt(HaltReason),
}

impl Unwind {
    pub fn exc(kind: ExcKind, message: impl Into<String>) -> Self {
        Unwind::Exception(Box::new(Exception::new(kind, message)))
    }
}

impl From<Exception> for Unwind {
    fn from(e: Exception) -> Self {
        Unwind::Exception(Box::new(e))
    }
}

impl From<HaltReason> for Unwind {
    fn from(reason: HaltReason) -> Self {
        Unwind::Halt(reason)
    }
}

/// Shorthand used across the runtime
pub(crate) fn type_error(message: impl Into<String>) -> Unwind {
    Unwind::exc(ExcKind::TypeError, message)
}

pub(crate) fn value_error(message: impl Into<String>) -> Unwind {
    Unwind::exc(ExcKind::ValueError, message)
}

/// A source text that could not be tokenized or parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {line})")]
pub struct SyntaxError {
    pub message: String,
    pub line: u32,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, line: u32) -> Self {
        Self {
            message: message.into(),
            line,
        }
    }
}

impl From<SyntaxError> for Exception {
    fn from(e: SyntaxError) -> Self {
        let mut exc = Exception::new(ExcKind::SyntaxError, e.message);
        exc.traceback.push(TraceEntry {
            function: "<module>".to_string(),
            line: e.line,
        });
        exc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy() {
        assert!(ExcKind::ZeroDivisionError.is_subclass_of(ExcKind::ArithmeticError));
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::Exception));
        assert!(ExcKind::ModuleNotFoundError.is_subclass_of(ExcKind::ImportError));
        assert!(!ExcKind::ValueError.is_subclass_of(ExcKind::TypeError));
    }

    #[test]
    fn test_render_with_traceback() {
        let mut exc = Exception::new(ExcKind::ValueError, "bad value");
        exc.traceback.push(TraceEntry {
            function: "<module>".into(),
            line: 4,
        });
        exc.traceback.push(TraceEntry {
            function: "check".into(),
            line: 2,
        });
        let text = exc.render();
        assert!(text.starts_with("Traceback (most recent call last):"));
        assert!(text.contains("line 4, in <module>"));
        assert!(text.ends_with("ValueError: bad value"));
    }

    #[test]
    fn test_bare_exception_display() {
        assert_eq!(Exception::new(ExcKind::StopIteration, "").to_string(), "StopIteration");
    }
}
