//! Allowlist policy for snippet execution
//!
//! One `Policy` decides what a snippet may import, which builtins it sees
//! and which call shapes the analyzer flags. Modules are allowlisted:
//! anything not named here is denied. Builtins are denylisted against the
//! runtime's catalog, which already leaves out file and process access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

const DEFAULT_MODULES: &[&str] = &[
    // scientific
    "numpy", "pandas", "scipy", "sympy", "matplotlib", "matplotlib.pyplot",
    // text processing
    "re", "string", "nltk", "textblob",
    // standard library
    "math", "random", "statistics", "datetime", "collections", "itertools",
    "functools", "operator", "decimal", "fractions", "json", "csv",
];

const DEFAULT_DENIED_BUILTINS: &[&str] = &[
    "open", "eval", "exec", "compile", "__import__", "globals", "locals",
    "vars", "getattr", "setattr", "delattr", "hasattr", "dir",
    "memoryview", "classmethod", "staticmethod", "property",
    "breakpoint", "help", "super",
];

const DEFAULT_DANGEROUS_CALLS: &[&str] = &[
    "eval", "exec", "compile", "__import__", "globals", "locals",
    "vars", "getattr", "setattr", "delattr", "open", "file",
    "execfile", "system", "popen", "subprocess",
];

const DEFAULT_DANGEROUS_METHODS: &[&str] =
    &["system", "popen", "call", "Popen", "shell", "eval", "exec"];

/// Largest literal `range(N)` bound the analyzer lets through
pub const DEFAULT_LOOP_CEILING: i64 = 10_000;

/// Builtins rebound per run; never removed by the denylist
pub const IO_BUILTINS: &[&str] = &["print", "input"];

fn set_of(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

/// Import, namespace and analysis rules shared by every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    allowed_modules: BTreeSet<String>,
    denied_builtins: BTreeSet<String>,
    dangerous_calls: BTreeSet<String>,
    dangerous_methods: BTreeSet<String>,
    /// Ceiling for a literal `for … in range(N)` bound
    pub max_loop_iterations: i64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allowed_modules: set_of(DEFAULT_MODULES),
            denied_builtins: set_of(DEFAULT_DENIED_BUILTINS),
            dangerous_calls: set_of(DEFAULT_DANGEROUS_CALLS),
            dangerous_methods: set_of(DEFAULT_DANGEROUS_METHODS),
            max_loop_iterations: DEFAULT_LOOP_CEILING,
        }
    }
}

impl Policy {
    /// The process-wide default policy, built on first use
    pub fn standard() -> Arc<Policy> {
        static STANDARD: OnceLock<Arc<Policy>> = OnceLock::new();
        STANDARD.get_or_init(|| Arc::new(Policy::default())).clone()
    }

    /// A policy that allows no imports and flags nothing
    pub fn empty() -> Self {
        Self {
            allowed_modules: BTreeSet::new(),
            denied_builtins: BTreeSet::new(),
            dangerous_calls: BTreeSet::new(),
            dangerous_methods: BTreeSet::new(),
            max_loop_iterations: DEFAULT_LOOP_CEILING,
        }
    }

    pub fn allows_module(&self, name: &str) -> bool {
        self.allowed_modules.contains(name)
    }

    pub fn allowed_modules(&self) -> impl Iterator<Item = &str> {
        self.allowed_modules.iter().map(String::as_str)
    }

    /// Whether `name` is withheld from the namespace
    pub fn denies_builtin(&self, name: &str) -> bool {
        !IO_BUILTINS.contains(&name) && self.denied_builtins.contains(name)
    }

    pub fn is_dangerous_call(&self, name: &str) -> bool {
        self.dangerous_calls.contains(name)
    }

    pub fn is_dangerous_method(&self, name: &str) -> bool {
        self.dangerous_methods.contains(name)
    }
}

/// Builder-style adjustments
impl Policy {
    pub fn with_module(mut self, name: impl Into<String>) -> Self {
        self.allowed_modules.insert(name.into());
        self
    }

    pub fn without_module(mut self, name: &str) -> Self {
        self.allowed_modules.remove(name);
        self
    }

    /// Put a denylisted builtin back into the namespace
    pub fn with_builtin(mut self, name: &str) -> Self {
        self.denied_builtins.remove(name);
        self
    }

    pub fn without_builtin(mut self, name: impl Into<String>) -> Self {
        self.denied_builtins.insert(name.into());
        self
    }

    pub fn with_dangerous_call(mut self, name: impl Into<String>) -> Self {
        self.dangerous_calls.insert(name.into());
        self
    }

    pub fn with_dangerous_method(mut self, name: impl Into<String>) -> Self {
        self.dangerous_methods.insert(name.into());
        self
    }

    pub fn with_loop_ceiling(mut self, ceiling: i64) -> Self {
        self.max_loop_iterations = ceiling;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_modules() {
        let policy = Policy::default();
        assert!(policy.allows_module("math"));
        assert!(policy.allows_module("matplotlib.pyplot"));
        assert!(!policy.allows_module("os"));
        assert!(!policy.allows_module("socket"));
        assert!(!policy.allows_module("subprocess"));
    }

    #[test]
    fn test_io_builtins_are_never_denied() {
        let policy = Policy::default().without_builtin("print");
        assert!(!policy.denies_builtin("print"));
        assert!(!policy.denies_builtin("input"));
        assert!(policy.denies_builtin("eval"));
        assert!(policy.denies_builtin("getattr"));
        assert!(!policy.denies_builtin("len"));
    }

    #[test]
    fn test_builders() {
        let policy = Policy::empty()
            .with_module("math")
            .with_dangerous_call("input")
            .with_loop_ceiling(5);
        assert!(policy.allows_module("math"));
        assert!(!policy.allows_module("random"));
        assert!(policy.is_dangerous_call("input"));
        assert_eq!(policy.max_loop_iterations, 5);

        let policy = Policy::default().with_builtin("getattr").without_module("json");
        assert!(!policy.denies_builtin("getattr"));
        assert!(!policy.allows_module("json"));
    }

    #[test]
    fn test_standard_is_shared() {
        let a = Policy::standard();
        let b = Policy::standard();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a, Policy::default());
    }
}
