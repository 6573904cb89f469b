//! The capability-limited namespace a snippet runs in
//!
//! Built fresh for every run and never shared: module objects are mutable
//! and a snippet that assigns `math.pi = 3` must not affect the next one.

use crate::policy::Policy;
use sandpit_lang::builtins::catalog;
use sandpit_lang::modules;
use sandpit_lang::{ExcKind, Exception, ImportHook, Interpreter, Value};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Builtins and pre-bound modules for one run
pub struct Namespace {
    policy: Arc<Policy>,
    builtins: HashMap<Rc<str>, Value>,
    /// Implemented allowlisted modules by full dotted name
    modules: HashMap<String, Value>,
}

/// Assemble the namespace for a snippet under `policy`
pub fn build_namespace(policy: Arc<Policy>) -> Namespace {
    let mut builtins = catalog();
    builtins.retain(|name, _| !policy.denies_builtin(name));

    let modules = policy
        .allowed_modules()
        .filter_map(|name| modules::load(name).map(|m| (name.to_string(), m)))
        .collect();

    Namespace {
        policy,
        builtins,
        modules,
    }
}

impl Namespace {
    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Names bound at module level before the snippet starts, with the
    /// module each refers to
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.modules
            .iter()
            .map(|(name, module)| (binding_name(name), module))
    }

    /// Interpreter whose globals, builtins and import hook come from this namespace
    pub fn into_interpreter(self) -> Interpreter {
        let mut interp = Interpreter::with_builtins(self.builtins);
        for (name, module) in &self.modules {
            interp.set_global(binding_name(name), module.clone());
        }
        interp.set_importer(Box::new(GuardedImport {
            policy: self.policy,
            modules: self.modules,
        }));
        interp
    }
}

/// `matplotlib.pyplot` binds as `pyplot`
fn binding_name(module: &str) -> &str {
    module.rsplit('.').next().unwrap_or(module)
}

/// Import hook that only hands out allowlisted modules
///
/// An allowed import returns the very object pre-bound in the namespace,
/// so `import math` after `math.tau = 0` sees the change.
pub struct GuardedImport {
    policy: Arc<Policy>,
    modules: HashMap<String, Value>,
}

impl ImportHook for GuardedImport {
    fn import(&mut self, name: &str, level: usize) -> Result<Value, Exception> {
        if level > 0 || !self.policy.allows_module(name) {
            let shown = format!("{}{name}", ".".repeat(level));
            return Err(Exception::new(
                ExcKind::ImportError,
                format!("Import not allowed: {shown}"),
            ));
        }
        self.modules.get(name).cloned().ok_or_else(|| {
            Exception::new(
                ExcKind::ModuleNotFoundError,
                format!("No module named '{name}'"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpit_lang::{CollectingSink, Unwind};

    fn run(policy: Arc<Policy>, source: &str) -> (String, Result<(), Unwind>) {
        let mut interp = build_namespace(policy).into_interpreter();
        let sink = CollectingSink::new();
        interp.set_output(Box::new(sink.clone()));
        let result = interp.run_source(source);
        (sink.contents(), result)
    }

    fn exception(result: Result<(), Unwind>) -> Exception {
        match result {
            Err(Unwind::Exception(e)) => *e,
            other => panic!("expected an exception, got {other:?}"),
        }
    }

    #[test]
    fn test_denied_builtins_are_absent() {
        let ns = build_namespace(Policy::standard());
        assert!(ns.has_builtin("len"));
        assert!(ns.has_builtin("print"));
        assert!(ns.has_builtin("input"));
        for denied in ["eval", "exec", "getattr", "globals", "dir", "__import__"] {
            assert!(!ns.has_builtin(denied), "{denied} leaked into the namespace");
        }
    }

    #[test]
    fn test_denied_builtin_is_a_name_error() {
        let (_, result) = run(Policy::standard(), "f = eval\n");
        let e = exception(result);
        assert_eq!(e.kind, ExcKind::NameError);
    }

    #[test]
    fn test_modules_are_prebound() {
        let (out, result) = run(Policy::standard(), "print(math.floor(2.5), json.dumps([1]))");
        assert!(result.is_ok());
        assert_eq!(out, "2 [1]\n");
    }

    #[test]
    fn test_import_returns_prebound_object() {
        let src = "math.answer = 42\nimport math as m\nprint(m.answer, m is math)";
        let (out, result) = run(Policy::standard(), src);
        assert!(result.is_ok());
        assert_eq!(out, "42 True\n");
    }

    #[test]
    fn test_guarded_import_rejects_unlisted_names() {
        let (_, result) = run(Policy::standard(), "import os");
        let e = exception(result);
        assert_eq!(e.kind, ExcKind::ImportError);
        assert_eq!(e.message, "Import not allowed: os");

        let (_, result) = run(Policy::standard(), "from . import x");
        assert_eq!(exception(result).message, "Import not allowed: .");
    }

    #[test]
    fn test_listed_but_unimplemented_module() {
        let (_, result) = run(Policy::standard(), "import numpy");
        let e = exception(result);
        assert_eq!(e.kind, ExcKind::ModuleNotFoundError);
        assert!(e.kind.is_subclass_of(ExcKind::ImportError));
    }

    #[test]
    fn test_reenabled_dunder_import_is_still_guarded() {
        let policy = Arc::new(Policy::default().with_builtin("__import__"));
        let (out, result) = run(policy.clone(), "m = __import__('math')\nprint(m.floor(1.5))");
        assert!(result.is_ok());
        assert_eq!(out, "1\n");
        let (_, result) = run(policy, "__import__('os')");
        assert_eq!(exception(result).kind, ExcKind::ImportError);
    }

    #[test]
    fn test_namespaces_are_not_shared() {
        let (_, first) = run(Policy::standard(), "math.pi = 3");
        assert!(first.is_ok());
        let (out, _) = run(Policy::standard(), "print(math.pi)");
        assert_eq!(out, "3.141592653589793\n");
    }

    #[test]
    fn test_dotted_binding_name() {
        assert_eq!(binding_name("matplotlib.pyplot"), "pyplot");
        assert_eq!(binding_name("math"), "math");
    }
}
