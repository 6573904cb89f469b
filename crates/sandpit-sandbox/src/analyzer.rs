//! Static analysis run before any snippet executes
//!
//! The checks are deliberately coarse. A `break` anywhere under a
//! `while True` exempts it, even one that belongs to a nested loop, and
//! only literal `range` bounds are inspected. Anything subtler is left to
//! the instruction counter at run time.

use crate::policy::Policy;
use sandpit_lang::ast::{walk_body, walk_expr, walk_stmt, Arg, Constant, Expr, Stmt, StmtKind, Visitor};
use sandpit_lang::parse_module;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Stack for the analysis thread; the tree walks recurse once per nesting level
const ANALYSIS_STACK_SIZE: usize = 64 * 1024 * 1024;

/// One reason a snippet is refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    Syntax { message: String, line: u32 },
    ForbiddenImport { module: String, line: u32 },
    InfiniteLoop { line: u32 },
    /// `bound` holds the literal's digits
    LargeRange { bound: String, line: u32 },
    DangerousCall { name: String, line: u32 },
    DangerousMethod { name: String, line: u32 },
}

impl Issue {
    pub fn line(&self) -> u32 {
        match self {
            Issue::Syntax { line, .. }
            | Issue::ForbiddenImport { line, .. }
            | Issue::InfiniteLoop { line }
            | Issue::LargeRange { line, .. }
            | Issue::DangerousCall { line, .. }
            | Issue::DangerousMethod { line, .. } => *line,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::Syntax { message, line } => write!(f, "Syntax error: {message} (line {line})"),
            Issue::ForbiddenImport { module, line } => {
                write!(f, "Import not allowed: {module} (line {line})")
            }
            Issue::InfiniteLoop { line } => {
                write!(f, "'while True' loop without a 'break' statement (line {line})")
            }
            Issue::LargeRange { bound, line } => write!(
                f,
                "'for' loop with a very large number of iterations ({bound}) (line {line})"
            ),
            Issue::DangerousCall { name, line } => {
                write!(f, "Dangerous function call: {name} (line {line})")
            }
            Issue::DangerousMethod { name, line } => {
                write!(f, "Dangerous method call: {name} (line {line})")
            }
        }
    }
}

/// Source-level gate in front of the sandbox
#[derive(Debug, Clone)]
pub struct Analyzer {
    policy: Arc<Policy>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Policy::standard())
    }
}

impl Analyzer {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self { policy }
    }

    /// Every issue found in `source`; empty means the snippet may run
    ///
    /// Issues are grouped: imports first, then loops, then calls, each
    /// group in source order. The work happens on a dedicated thread with a
    /// large stack so that nesting never overflows the caller's.
    pub fn analyze(&self, source: &str) -> Vec<Issue> {
        std::thread::scope(|scope| {
            let spawned = std::thread::Builder::new()
                .name("sandpit-analyzer".to_string())
                .stack_size(ANALYSIS_STACK_SIZE)
                .spawn_scoped(scope, || self.analyze_here(source));
            match spawned {
                Ok(handle) => handle.join().unwrap_or_else(|_| {
                    vec![Issue::Syntax {
                        message: "source could not be analyzed".to_string(),
                        line: 1,
                    }]
                }),
                Err(e) => {
                    warn!(error = %e, "analysis thread refused, analyzing inline");
                    self.analyze_here(source)
                }
            }
        })
    }

    fn analyze_here(&self, source: &str) -> Vec<Issue> {
        let module = match parse_module(source) {
            Ok(module) => module,
            Err(e) => {
                return vec![Issue::Syntax {
                    message: e.message,
                    line: e.line,
                }]
            }
        };
        let mut scan = Scan {
            policy: &self.policy,
            line: 0,
            imports: Vec::new(),
            loops: Vec::new(),
            calls: Vec::new(),
        };
        walk_body(&mut scan, &module);
        let mut issues = scan.imports;
        issues.append(&mut scan.loops);
        issues.append(&mut scan.calls);
        issues
    }
}

struct Scan<'a> {
    policy: &'a Policy,
    line: u32,
    imports: Vec<Issue>,
    loops: Vec<Issue>,
    calls: Vec<Issue>,
}

impl Scan<'_> {
    fn check_import(&mut self, module: String) {
        if !self.policy.allows_module(&module) {
            self.imports.push(Issue::ForbiddenImport {
                module,
                line: self.line,
            });
        }
    }
}

impl Visitor for Scan<'_> {
    fn visit_stmt(&mut self, stmt: &Stmt) {
        self.line = stmt.line;
        match &stmt.kind {
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    self.check_import(alias.name.clone());
                }
            }
            StmtKind::ImportFrom { module, level, .. } => {
                let name = module.clone().unwrap_or_default();
                // relative imports never match an allowlist entry
                self.check_import(format!("{}{name}", ".".repeat(*level)));
            }
            StmtKind::While { test, body, .. } => {
                if is_truthy_constant(test) && !has_exit(body) {
                    self.loops.push(Issue::InfiniteLoop { line: stmt.line });
                }
            }
            StmtKind::For { iter, .. } => {
                if let Some(bound) = oversized_range_bound(iter, self.policy.max_loop_iterations) {
                    self.loops.push(Issue::LargeRange {
                        bound,
                        line: stmt.line,
                    });
                }
            }
            _ => {}
        }
        walk_stmt(self, stmt);
    }

    fn visit_expr(&mut self, expr: &Expr) {
        if let Expr::Call { func, .. } = expr {
            match func.as_ref() {
                Expr::Name(name) if self.policy.is_dangerous_call(name) => {
                    self.calls.push(Issue::DangerousCall {
                        name: name.to_string(),
                        line: self.line,
                    });
                }
                Expr::Attribute { attr, .. } if self.policy.is_dangerous_method(attr) => {
                    self.calls.push(Issue::DangerousMethod {
                        name: attr.to_string(),
                        line: self.line,
                    });
                }
                _ => {}
            }
        }
        walk_expr(self, expr);
    }
}

fn is_truthy_constant(expr: &Expr) -> bool {
    match expr {
        Expr::Constant(c) => match c {
            Constant::None => false,
            Constant::Bool(b) => *b,
            Constant::Int(i) => *i != 0,
            Constant::BigInt(_) => true,
            Constant::Float(f) => *f != 0.0,
            Constant::Str(s) => !s.is_empty(),
            Constant::Ellipsis => true,
        },
        _ => false,
    }
}

/// First argument of `range(<int literal>, …)` when it exceeds `ceiling`
fn oversized_range_bound(iter: &Expr, ceiling: i64) -> Option<String> {
    let Expr::Call { func, args } = iter else {
        return None;
    };
    if !matches!(func.as_ref(), Expr::Name(name) if &**name == "range") {
        return None;
    }
    match args.first()? {
        Arg::Positional(Expr::Constant(Constant::Int(n))) if *n > ceiling => Some(n.to_string()),
        Arg::Positional(Expr::Constant(Constant::BigInt(n))) => {
            let digits = n.to_string();
            (!digits.starts_with('-')).then_some(digits)
        }
        _ => None,
    }
}

/// Whether a `break` or `return` appears anywhere under `body`
fn has_exit(body: &[Stmt]) -> bool {
    struct ExitFinder(bool);

    impl Visitor for ExitFinder {
        fn visit_stmt(&mut self, stmt: &Stmt) {
            if matches!(stmt.kind, StmtKind::Break | StmtKind::Return(_)) {
                self.0 = true;
                return;
            }
            walk_stmt(self, stmt);
        }
    }

    let mut finder = ExitFinder(false);
    walk_body(&mut finder, body);
    finder.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues(source: &str) -> Vec<String> {
        Analyzer::default()
            .analyze(source)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_clean_code_passes() {
        let src = "\
import math
from statistics import mean
total = 0
for i in range(100):
    total += i
while True:
    if total > 10:
        break
print(mean([1, 2]), math.sqrt(total))
";
        assert!(issues(src).is_empty());
    }

    #[test]
    fn test_forbidden_imports() {
        let found = issues("import os, math\nfrom socket import socket\nfrom . import sibling\n");
        assert_eq!(
            found,
            vec![
                "Import not allowed: os (line 1)",
                "Import not allowed: socket (line 2)",
                "Import not allowed: . (line 3)",
            ]
        );
    }

    #[test]
    fn test_dotted_import_must_be_listed() {
        assert!(issues("import matplotlib.pyplot as plt").is_empty());
        assert_eq!(issues("import os.path"), vec!["Import not allowed: os.path (line 1)"]);
    }

    #[test]
    fn test_infinite_loops() {
        assert_eq!(
            issues("while True:\n    pass\n"),
            vec!["'while True' loop without a 'break' statement (line 1)"]
        );
        assert_eq!(issues("while 1:\n    x = 1\n").len(), 1);
        assert_eq!(issues("while 'yes':\n    x = 1\n").len(), 1);
        assert!(issues("while False:\n    pass\n").is_empty());
        assert!(issues("x = 3\nwhile x:\n    x -= 1\n").is_empty());
    }

    #[test]
    fn test_nested_break_exempts_outer_loop() {
        let src = "\
while True:
    for i in range(3):
        break
";
        assert!(issues(src).is_empty());
    }

    #[test]
    fn test_return_exempts_loop_in_function() {
        let src = "\
def ask():
    while True:
        return 1
";
        assert!(issues(src).is_empty());
    }

    #[test]
    fn test_large_literal_range() {
        assert_eq!(
            issues("for i in range(100000000):\n    pass\n"),
            vec!["'for' loop with a very large number of iterations (100000000) (line 1)"]
        );
        assert!(issues("for i in range(10000):\n    pass\n").is_empty());
        assert!(issues("n = 100000000\nfor i in range(n):\n    pass\n").is_empty());
        assert_eq!(
            issues("for i in range(100000000000000000000000):\n    pass\n"),
            vec!["'for' loop with a very large number of iterations (100000000000000000000000) (line 1)"]
        );
    }

    #[test]
    fn test_dangerous_calls() {
        let src = "\
x = eval('1 + 1')
def f():
    return getattr(x, 'real')
import math
math.system('ls')
";
        assert_eq!(
            issues(src),
            vec![
                "Dangerous function call: eval (line 1)",
                "Dangerous function call: getattr (line 3)",
                "Dangerous method call: system (line 5)",
            ]
        );
    }

    #[test]
    fn test_issue_groups_are_ordered() {
        let src = "exec('x')\nwhile True:\n    pass\nimport os\n";
        let found = Analyzer::default().analyze(src);
        assert!(matches!(found[0], Issue::ForbiddenImport { line: 4, .. }));
        assert!(matches!(found[1], Issue::InfiniteLoop { line: 2 }));
        assert!(matches!(found[2], Issue::DangerousCall { line: 1, .. }));
    }

    #[test]
    fn test_syntax_error_is_single_issue() {
        let found = Analyzer::default().analyze("def broken(:\n    pass\n");
        assert_eq!(found.len(), 1);
        assert!(matches!(found[0], Issue::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_deep_nesting_is_a_syntax_issue() {
        let parens = format!("x = {}1{}\n", "(".repeat(1000), ")".repeat(1000));
        assert_eq!(
            issues(&parens),
            vec!["Syntax error: too many nested parentheses (line 1)"]
        );
        let unary = format!("{}1\n", "-".repeat(200_000));
        assert_eq!(
            issues(&unary),
            vec!["Syntax error: expression nested too deeply (line 1)"]
        );
        let nested = format!("x = {}1{}\n", "(".repeat(150), ")".repeat(150));
        assert!(issues(&nested).is_empty());
    }

    #[test]
    fn test_custom_policy() {
        let policy = Arc::new(Policy::default().with_module("os").with_loop_ceiling(10));
        let analyzer = Analyzer::new(policy);
        assert!(analyzer.analyze("import os").is_empty());
        assert_eq!(analyzer.analyze("for i in range(11):\n    pass\n").len(), 1);
    }
}
