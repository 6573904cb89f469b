//! Static scope resolution for function bodies and comprehensions

use crate::ast::{Comprehension, Expr, Params, ScopeInfo, Stmt, StmtKind};
use std::rc::Rc;

pub fn function_scope(params: &Params, body: &[Stmt]) -> ScopeInfo {
    let mut info = ScopeInfo::default();
    for name in params.names() {
        info.locals.insert(name.clone());
    }
    collect_body(body, &mut info);
    for name in info.globals.iter().chain(info.nonlocals.iter()) {
        info.locals.remove(name);
    }
    info
}

pub fn comprehension_scope(generators: &[Comprehension]) -> ScopeInfo {
    let mut info = ScopeInfo::default();
    for generator in generators {
        bind_target(&generator.target, &mut info);
    }
    info
}

fn collect_body(body: &[Stmt], info: &mut ScopeInfo) {
    for stmt in body {
        collect_stmt(stmt, info);
    }
}

fn collect_stmt(stmt: &Stmt, info: &mut ScopeInfo) {
    match &stmt.kind {
        StmtKind::Assign { targets, .. } => {
            for t in targets {
                bind_target(t, info);
            }
        }
        StmtKind::AugAssign { target, .. } => bind_target(target, info),
        StmtKind::For {
            target,
            body,
            orelse,
            ..
        } => {
            bind_target(target, info);
            collect_body(body, info);
            collect_body(orelse, info);
        }
        StmtKind::If { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
            collect_body(body, info);
            collect_body(orelse, info);
        }
        StmtKind::FunctionDef(def) => {
            info.locals.insert(def.name.clone());
        }
        StmtKind::Import(aliases) => {
            for alias in aliases {
                let bound = alias
                    .asname
                    .clone()
                    .unwrap_or_else(|| alias.name.split('.').next().unwrap_or("").to_string());
                info.locals.insert(Rc::from(bound));
            }
        }
        StmtKind::ImportFrom { names, .. } => {
            for alias in names {
                if alias.name != "*" {
                    let bound = alias.asname.as_deref().unwrap_or(&alias.name);
                    info.locals.insert(Rc::from(bound));
                }
            }
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            collect_body(body, info);
            for h in handlers {
                if let Some(name) = &h.name {
                    info.locals.insert(name.clone());
                }
                collect_body(&h.body, info);
            }
            collect_body(orelse, info);
            collect_body(finalbody, info);
        }
        StmtKind::Global(names) => info.globals.extend(names.iter().cloned()),
        StmtKind::Nonlocal(names) => info.nonlocals.extend(names.iter().cloned()),
        StmtKind::Delete(targets) => {
            for t in targets {
                bind_target(t, info);
            }
        }
        _ => {}
    }
}

fn bind_target(target: &Expr, info: &mut ScopeInfo) {
    match target {
        Expr::Name(name) => {
            info.locals.insert(name.clone());
        }
        Expr::Tuple(items) | Expr::List(items) => {
            for item in items {
                bind_target(item, info);
            }
        }
        Expr::Starred(inner) => bind_target(inner, info),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::StmtKind;
    use crate::parser::parse_module;

    #[test]
    fn test_function_locals_and_globals() {
        let module = parse_module(
            "def f(a, *rest):\n    global counter\n    counter = 1\n    b, c = a, 2\n    for i in rest:\n        pass\n",
        )
        .unwrap();
        let StmtKind::FunctionDef(def) = &module[0].kind else {
            panic!("expected def");
        };
        let scope = &def.scope;
        for name in ["a", "rest", "b", "c", "i"] {
            assert!(scope.locals.contains(name), "{name} should be local");
        }
        assert!(!scope.locals.contains("counter"));
        assert!(scope.globals.contains("counter"));
    }
}
