//! Tree-walking interpreter
//!
//! The module namespace doubles as global and local scope. Each call pushes
//! an `Env` holding the call's locals plus the scopes captured where the
//! function was defined; lookup walks locals, captured scopes, globals and
//! finally the builtins table.
//!
//! Every executed statement line goes through [`Interpreter::trace_line`],
//! which feeds the installed [`TraceHook`] and the heap meter. Hooks stop a
//! run by returning a [`HaltReason`], which unwinds past every `except` and
//! `finally` block.

use crate::ast::*;
use crate::builtins;
use crate::exception::{type_error, value_error, ExcKind, Exception, HaltReason, TraceEntry, Unwind};
use crate::format;
use crate::heap::{HeapMeter, Walker, VALUE_SIZE};
use crate::io::{CollectingSink, ImportHook, InputProvider, NativeImporter, NoInput, OutputSink, TraceHook};
use crate::methods;
use crate::ops;
use crate::parser::{parse_expression, parse_module};
use crate::value::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Native loops consult the trace hook once per this many elements
const CHECKPOINT_INTERVAL: u32 = 4096;

/// Ceiling for a single allocation when no heap limit is configured
const UNBOUNDED_ALLOCATION: usize = 1 << 32;

/// Ceilings enforced by the interpreter itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub max_recursion_depth: usize,
    pub max_heap_bytes: Option<usize>,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: 1000,
            max_heap_bytes: None,
        }
    }
}

struct Env {
    locals: Option<Scope>,
    info: Option<Rc<ScopeInfo>>,
    enclosing: Rc<[Scope]>,
}

struct Frame {
    function: Rc<str>,
    line: u32,
}

pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

type Exec = Result<Flow, Unwind>;
type Eval = Result<Value, Unwind>;

/// A subscript after evaluation
pub(crate) enum Index {
    Item(Value),
    Slice(Option<Value>, Option<Value>, Option<Value>),
}

pub struct Interpreter {
    globals: Scope,
    builtins: HashMap<Rc<str>, Value>,
    importer: Box<dyn ImportHook>,
    output: Box<dyn OutputSink>,
    input: Box<dyn InputProvider>,
    trace: Option<Box<dyn TraceHook>>,
    module_env: Env,
    envs: Vec<Env>,
    frames: Vec<Frame>,
    handling: Vec<Rc<Exception>>,
    limits: RuntimeLimits,
    heap: HeapMeter,
    pub(crate) rng: StdRng,
    last_value: Option<Value>,
    /// Values under construction that no scope reaches yet
    temporaries: Vec<Value>,
    native_ticks: u32,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter with the full builtin catalog and native modules
    pub fn new() -> Self {
        Self::with_builtins(builtins::catalog())
    }

    pub fn with_builtins(builtins: HashMap<Rc<str>, Value>) -> Self {
        Self {
            globals: new_scope(),
            builtins,
            importer: Box::<NativeImporter>::default(),
            output: Box::new(CollectingSink::new()),
            input: Box::new(NoInput),
            trace: None,
            module_env: Env {
                locals: None,
                info: None,
                enclosing: Rc::from(Vec::new()),
            },
            envs: Vec::new(),
            frames: Vec::new(),
            handling: Vec::new(),
            limits: RuntimeLimits::default(),
            heap: HeapMeter::default(),
            rng: StdRng::from_entropy(),
            last_value: None,
            temporaries: Vec::new(),
            native_ticks: 0,
        }
    }

    pub fn set_output(&mut self, output: Box<dyn OutputSink>) {
        self.output = output;
    }

    pub fn set_input(&mut self, input: Box<dyn InputProvider>) {
        self.input = input;
    }

    pub fn set_importer(&mut self, importer: Box<dyn ImportHook>) {
        self.importer = importer;
    }

    /// Install a trace hook, returning the one it replaces
    pub fn set_trace(&mut self, hook: Option<Box<dyn TraceHook>>) -> Option<Box<dyn TraceHook>> {
        std::mem::replace(&mut self.trace, hook)
    }

    pub fn set_limits(&mut self, limits: RuntimeLimits) {
        self.limits = limits;
    }

    pub fn limits(&self) -> RuntimeLimits {
        self.limits
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(Rc::from(name), value);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn has_builtin(&self, name: &str) -> bool {
        self.builtins.contains_key(name)
    }

    /// Value of the last top-level expression statement, if the run ended on one
    pub fn take_last_value(&mut self) -> Option<Value> {
        self.last_value.take()
    }

    /// Most recent heap measurement in bytes
    pub fn heap_estimate(&self) -> usize {
        self.heap.estimate()
    }

    pub fn run_source(&mut self, source: &str) -> Result<(), Unwind> {
        let module = parse_module(source).map_err(|e| Unwind::from(Exception::from(e)))?;
        self.run_module(&module)
    }

    pub fn run_module(&mut self, body: &[Stmt]) -> Result<(), Unwind> {
        self.frames.push(Frame {
            function: Rc::from("<module>"),
            line: 0,
        });
        let mut result = Ok(());
        for stmt in body {
            self.last_value = None;
            match self.exec_stmt(stmt) {
                Ok(Flow::Normal) => {}
                Ok(Flow::Return(_)) => {
                    result = Err(self.syntax_error("'return' outside function", stmt.line));
                    break;
                }
                Ok(Flow::Break) | Ok(Flow::Continue) => {
                    result = Err(self.syntax_error("'break' or 'continue' outside loop", stmt.line));
                    break;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.frames.pop();
        result
    }

    fn syntax_error(&self, message: &str, line: u32) -> Unwind {
        let mut exc = Exception::new(ExcKind::SyntaxError, message);
        exc.traceback.push(TraceEntry {
            function: "<module>".to_string(),
            line,
        });
        exc.into()
    }

    // ---- host hooks --------------------------------------------------

    pub(crate) fn trace_line(&mut self, line: u32) -> Result<(), Unwind> {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
        if let Some(hook) = self.trace.as_mut() {
            hook.on_line(line)?;
        }
        if let Some(max) = self.limits.max_heap_bytes {
            if self.heap.tick() {
                self.measure_heap();
                if self.heap.live() > max {
                    return Err(HaltReason::Memory(max).into());
                }
            }
        }
        Ok(())
    }

    /// Called from native loops so long builtins stay interruptible
    pub fn checkpoint(&mut self) -> Result<(), Unwind> {
        self.native_ticks += 1;
        if self.native_ticks >= CHECKPOINT_INTERVAL {
            self.native_ticks = 0;
            if let Some(hook) = self.trace.as_mut() {
                hook.on_checkpoint()?;
            }
        }
        Ok(())
    }

    /// Account for an allocation of `bytes` before making it
    pub fn reserve(&mut self, bytes: usize) -> Result<(), Unwind> {
        let Some(max) = self.limits.max_heap_bytes else {
            if bytes > UNBOUNDED_ALLOCATION {
                return Err(Unwind::exc(ExcKind::MemoryError, ""));
            }
            return Ok(());
        };
        if self.heap.estimate().saturating_add(bytes) > max {
            self.measure_heap();
            if self.heap.live().saturating_add(bytes) > max {
                return Err(HaltReason::Memory(max).into());
            }
        }
        self.heap.add_pending(bytes);
        Ok(())
    }

    fn measure_heap(&mut self) {
        let mut walker = Walker::default();
        walker.scope(&self.globals);
        for env in &self.envs {
            if let Some(locals) = &env.locals {
                walker.scope(locals);
            }
            for scope in env.enclosing.iter() {
                walker.scope(scope);
            }
        }
        if let Some(v) = &self.last_value {
            walker.value(v);
        }
        for v in &self.temporaries {
            walker.value(v);
        }
        self.heap.record(walker.finish());
    }

    /// Run `f` with `root` counted as live heap
    pub(crate) fn rooted<T>(
        &mut self,
        root: Value,
        f: impl FnOnce(&mut Self) -> Result<T, Unwind>,
    ) -> Result<T, Unwind> {
        let mark = self.temporaries.len();
        self.temporaries.push(root);
        let result = f(self);
        self.temporaries.truncate(mark);
        result
    }

    /// Native code sees its arguments as live heap while it runs
    fn call_native(&mut self, args: Args, f: impl FnOnce(&mut Self, Args) -> Eval) -> Eval {
        let mark = self.temporaries.len();
        self.temporaries.extend(args.positional.iter().cloned());
        self.temporaries
            .extend(args.keywords.iter().map(|(_, v)| v.clone()));
        let result = f(self, args);
        self.temporaries.truncate(mark);
        result
    }

    pub fn write_output(&mut self, text: &str) -> Result<(), Unwind> {
        self.output.write(text).map_err(Unwind::from)
    }

    pub fn read_input(&mut self, prompt: &str) -> Result<String, Unwind> {
        self.input.read_line(prompt, self.output.as_mut())
    }

    pub(crate) fn import_module(&mut self, name: &str, level: usize) -> Eval {
        self.importer.import(name, level).map_err(Unwind::from)
    }

    fn traceback(&self) -> Vec<TraceEntry> {
        self.frames
            .iter()
            .map(|f| TraceEntry {
                function: f.function.to_string(),
                line: f.line,
            })
            .collect()
    }

    fn current_line(&self) -> u32 {
        self.frames.last().map(|f| f.line).unwrap_or(0)
    }

    // ---- scopes --------------------------------------------------------

    fn env(&self) -> &Env {
        self.envs.last().unwrap_or(&self.module_env)
    }

    fn at_module_level(&self) -> bool {
        self.envs.is_empty()
    }

    fn capture_scopes(&self) -> Rc<[Scope]> {
        let env = self.env();
        match &env.locals {
            None => env.enclosing.clone(),
            Some(locals) => {
                let mut scopes = env.enclosing.to_vec();
                scopes.push(locals.clone());
                Rc::from(scopes)
            }
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Eval {
        let env = self.env();
        if let Some(locals) = &env.locals {
            if let Some(v) = locals.borrow().get(name) {
                return Ok(v.clone());
            }
            if env.info.as_ref().is_some_and(|info| info.locals.contains(name)) {
                return Err(Unwind::exc(
                    ExcKind::UnboundLocalError,
                    format!("cannot access local variable '{name}' where it is not associated with a value"),
                ));
            }
        }
        let declared_global = env.info.as_ref().is_some_and(|info| info.globals.contains(name));
        if !declared_global {
            for scope in env.enclosing.iter().rev() {
                if let Some(v) = scope.borrow().get(name) {
                    return Ok(v.clone());
                }
            }
        }
        if let Some(v) = self.globals.borrow().get(name) {
            return Ok(v.clone());
        }
        if let Some(v) = self.builtins.get(name) {
            return Ok(v.clone());
        }
        Err(Unwind::exc(
            ExcKind::NameError,
            format!("name '{name}' is not defined"),
        ))
    }

    fn nonlocal_scope(&self, env: &Env, name: &str) -> Option<Scope> {
        env.enclosing
            .iter()
            .rev()
            .find(|scope| scope.borrow().contains_key(name))
            .or_else(|| env.enclosing.last())
            .cloned()
    }

    pub(crate) fn store_name(&mut self, name: &Rc<str>, value: Value) -> Result<(), Unwind> {
        let env = self.env();
        if let Some(info) = &env.info {
            if info.globals.contains(&**name) {
                self.globals.borrow_mut().insert(name.clone(), value);
                return Ok(());
            }
            if info.nonlocals.contains(&**name) {
                let scope = self.nonlocal_scope(env, name).ok_or_else(|| {
                    Unwind::exc(
                        ExcKind::SyntaxError,
                        format!("no binding for nonlocal '{name}' found"),
                    )
                })?;
                scope.borrow_mut().insert(name.clone(), value);
                return Ok(());
            }
        }
        match &env.locals {
            Some(locals) => locals.borrow_mut().insert(name.clone(), value),
            None => self.globals.borrow_mut().insert(name.clone(), value),
        };
        Ok(())
    }

    fn delete_name(&mut self, name: &Rc<str>) -> Result<(), Unwind> {
        let env = self.env();
        let declared_global = env.info.as_ref().is_some_and(|info| info.globals.contains(&**name));
        let removed = match (&env.locals, declared_global) {
            (Some(locals), false) => locals.borrow_mut().remove(&**name),
            _ => self.globals.borrow_mut().remove(&**name),
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(Unwind::exc(
                ExcKind::NameError,
                format!("name '{name}' is not defined"),
            )),
        }
    }

    /// Names visible in the current local scope, as used by `locals()` and `dir()`
    pub(crate) fn local_names(&self) -> Vec<(Rc<str>, Value)> {
        let scope = self.env().locals.clone().unwrap_or_else(|| self.globals.clone());
        let mut names: Vec<(Rc<str>, Value)> = scope
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }

    pub(crate) fn global_names(&self) -> Vec<(Rc<str>, Value)> {
        let mut names: Vec<(Rc<str>, Value)> = self
            .globals
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        names.sort_by(|a, b| a.0.cmp(&b.0));
        names
    }

    // ---- statements ------------------------------------------------------

    fn exec_body(&mut self, body: &[Stmt]) -> Exec {
        for stmt in body {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Exec {
        self.trace_line(stmt.line)?;
        let mut result = self.exec_kind(stmt);
        if let Err(Unwind::Exception(exc)) = &mut result {
            if exc.traceback.is_empty() {
                exc.traceback = self.traceback();
            }
        }
        result
    }

    fn exec_kind(&mut self, stmt: &Stmt) -> Exec {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let value = self.eval(expr)?;
                if self.at_module_level() {
                    self.last_value = Some(value);
                }
                Ok(Flow::Normal)
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value)?;
                for target in targets {
                    self.assign(target, value.clone())?;
                }
                Ok(Flow::Normal)
            }
            StmtKind::AugAssign { target, op, value } => {
                self.exec_aug_assign(target, *op, value)?;
                Ok(Flow::Normal)
            }
            StmtKind::If { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.exec_body(body)
                } else {
                    self.exec_body(orelse)
                }
            }
            StmtKind::While { test, body, orelse } => {
                let mut first = true;
                loop {
                    if !first {
                        self.trace_line(stmt.line)?;
                    }
                    first = false;
                    if !self.eval(test)?.truthy() {
                        return self.exec_body(orelse);
                    }
                    match self.exec_body(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter)?;
                let mut items = self.iter_value(&iterable)?;
                let mut first = true;
                while let Some(item) = items.next() {
                    if !first {
                        self.trace_line(stmt.line)?;
                    }
                    first = false;
                    self.assign(target, item)?;
                    match self.exec_body(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
                self.exec_body(orelse)
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Pass | StmtKind::Global(_) | StmtKind::Nonlocal(_) => Ok(Flow::Normal),
            StmtKind::FunctionDef(def) => {
                let function = self.make_function(def)?;
                self.store_name(&def.name, function)?;
                Ok(Flow::Normal)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    self.exec_import(alias)?;
                }
                Ok(Flow::Normal)
            }
            StmtKind::ImportFrom {
                module,
                names,
                level,
            } => {
                self.exec_import_from(module.as_deref().unwrap_or(""), names, *level)?;
                Ok(Flow::Normal)
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => self.exec_try(body, handlers, orelse, finalbody),
            StmtKind::Raise { exc, cause } => Err(self.raise(exc.as_ref(), cause.as_ref())),
            StmtKind::Assert { test, msg } => {
                if self.eval(test)?.truthy() {
                    return Ok(Flow::Normal);
                }
                let message = match msg {
                    Some(m) => format::to_str(&self.eval(m)?),
                    None => String::new(),
                };
                Err(Unwind::exc(ExcKind::AssertionError, message))
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target)?;
                }
                Ok(Flow::Normal)
            }
        }
    }

    fn exec_import(&mut self, alias: &Alias) -> Result<(), Unwind> {
        let module = self.import_module(&alias.name, 0)?;
        match &alias.asname {
            Some(asname) => self.store_name(&Rc::from(asname.as_str()), module),
            None => {
                let top = alias.name.split('.').next().unwrap_or(&alias.name);
                let bound = if top == alias.name {
                    module
                } else {
                    self.import_module(top, 0)?
                };
                self.store_name(&Rc::from(top), bound)
            }
        }
    }

    fn exec_import_from(&mut self, module: &str, names: &[Alias], level: usize) -> Result<(), Unwind> {
        let imported = self.import_module(module, level)?;
        let Value::Module(md) = &imported else {
            return Err(Unwind::exc(
                ExcKind::ImportError,
                format!("'{module}' is not a module"),
            ));
        };
        for alias in names {
            if alias.name == "*" {
                let public: Vec<(Rc<str>, Value)> = md
                    .attrs
                    .borrow()
                    .iter()
                    .filter(|(k, _)| !k.starts_with('_'))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (name, value) in public {
                    self.store_name(&name, value)?;
                }
                continue;
            }
            let value = match md.get(&alias.name) {
                Some(v) => v,
                None => self
                    .import_module(&format!("{module}.{}", alias.name), level)
                    .map_err(|_| {
                        Unwind::exc(
                            ExcKind::ImportError,
                            format!("cannot import name '{}' from '{module}'", alias.name),
                        )
                    })?,
            };
            let bound = alias.asname.as_deref().unwrap_or(&alias.name);
            self.store_name(&Rc::from(bound), value)?;
        }
        Ok(())
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[Handler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> Exec {
        let mut outcome = match self.exec_body(body) {
            Err(Unwind::Exception(exc)) => self.handle_exception(*exc, handlers),
            Ok(Flow::Normal) => self.exec_body(orelse),
            other => other,
        };
        // halts skip `finally`; nothing may run after the host stops a snippet
        if !finalbody.is_empty() && !matches!(outcome, Err(Unwind::Halt(_))) {
            match self.exec_body(finalbody) {
                Ok(Flow::Normal) => {}
                other => outcome = other,
            }
        }
        outcome
    }

    fn handle_exception(&mut self, exc: Exception, handlers: &[Handler]) -> Exec {
        for handler in handlers {
            let matched = match &handler.kinds {
                None => true,
                Some(expr) => {
                    let kinds = self.eval(expr)?;
                    exception_matches(&exc, &kinds)?
                }
            };
            if !matched {
                continue;
            }
            self.trace_line(handler.line)?;
            let shared = Rc::new(exc);
            if let Some(name) = &handler.name {
                self.store_name(name, Value::Exception(shared.clone()))?;
            }
            self.handling.push(shared);
            let result = self.exec_body(&handler.body);
            self.handling.pop();
            if let Some(name) = &handler.name {
                let _ = self.delete_name(name);
            }
            return result;
        }
        Err(Unwind::Exception(Box::new(exc)))
    }

    fn raise(&mut self, exc: Option<&Expr>, cause: Option<&Expr>) -> Unwind {
        let Some(expr) = exc else {
            return match self.handling.last() {
                Some(active) => Unwind::Exception(Box::new((**active).clone())),
                None => Unwind::exc(ExcKind::RuntimeError, "No active exception to reraise"),
            };
        };
        let value = match self.eval(expr) {
            Ok(v) => v,
            Err(e) => return e,
        };
        if let Some(cause) = cause {
            if let Err(e) = self.eval(cause) {
                return e;
            }
        }
        match value {
            Value::Exception(e) => {
                let mut exc = (*e).clone();
                exc.traceback.clear();
                Unwind::Exception(Box::new(exc))
            }
            Value::ExceptionType(kind) => Unwind::exc(kind, ""),
            _ => type_error("exceptions must derive from BaseException"),
        }
    }

    fn exec_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr) -> Result<(), Unwind> {
        match target {
            Expr::Name(name) => {
                let current = self.lookup(name)?;
                let rhs = self.eval(value)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.store_name(name, result)
            }
            Expr::Subscript { value: obj, index } => {
                let container = self.eval(obj)?;
                let index = self.eval_index(index)?;
                let current = self.get_item(&container, &index)?;
                let rhs = self.eval(value)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.set_item(&container, index, result)
            }
            Expr::Attribute { value: obj, attr } => {
                let object = self.eval(obj)?;
                let current = self.get_attr(&object, attr)?;
                let rhs = self.eval(value)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.set_attr(&object, attr, result)
            }
            _ => Err(Unwind::exc(
                ExcKind::SyntaxError,
                "illegal expression for augmented assignment",
            )),
        }
    }

    fn inplace_op(&mut self, op: BinOp, current: &Value, rhs: &Value) -> Eval {
        if let (BinOp::Add, Value::List(items)) = (op, current) {
            let extra = self.collect(rhs)?;
            self.reserve(extra.len() * VALUE_SIZE)?;
            items.borrow_mut().extend(extra);
            return Ok(current.clone());
        }
        ops::binary_op(self, op, current, rhs)
    }

    // ---- assignment targets ------------------------------------------

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), Unwind> {
        match target {
            Expr::Name(name) => self.store_name(name, value),
            Expr::Attribute { value: obj, attr } => {
                let object = self.eval(obj)?;
                self.set_attr(&object, attr, value)
            }
            Expr::Subscript { value: obj, index } => {
                let container = self.eval(obj)?;
                let index = self.eval_index(index)?;
                self.set_item(&container, index, value)
            }
            Expr::Tuple(targets) | Expr::List(targets) => self.unpack(targets, value),
            _ => Err(Unwind::exc(ExcKind::SyntaxError, "cannot assign to expression")),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value) -> Result<(), Unwind> {
        let mut values = self.collect(&value)?;
        let star = targets.iter().position(|t| matches!(t, Expr::Starred(_)));
        match star {
            None => {
                if values.len() < targets.len() {
                    return Err(value_error(format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        values.len()
                    )));
                }
                if values.len() > targets.len() {
                    return Err(value_error(format!(
                        "too many values to unpack (expected {})",
                        targets.len()
                    )));
                }
                for (target, v) in targets.iter().zip(values) {
                    self.assign(target, v)?;
                }
            }
            Some(pos) => {
                let after = targets.len() - pos - 1;
                if values.len() < targets.len() - 1 {
                    return Err(value_error(format!(
                        "not enough values to unpack (expected at least {}, got {})",
                        targets.len() - 1,
                        values.len()
                    )));
                }
                let tail = values.split_off(values.len() - after);
                let middle = values.split_off(pos);
                for (target, v) in targets[..pos].iter().zip(values) {
                    self.assign(target, v)?;
                }
                if let Expr::Starred(inner) = &targets[pos] {
                    self.assign(inner, Value::list(middle))?;
                }
                for (target, v) in targets[pos + 1..].iter().zip(tail) {
                    self.assign(target, v)?;
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, target: &Expr) -> Result<(), Unwind> {
        match target {
            Expr::Name(name) => self.delete_name(name),
            Expr::Subscript { value: obj, index } => {
                let container = self.eval(obj)?;
                let index = self.eval_index(index)?;
                self.del_item(&container, index)
            }
            Expr::Attribute { value: obj, attr } => {
                let object = self.eval(obj)?;
                self.del_attr(&object, attr)
            }
            Expr::Tuple(items) | Expr::List(items) => {
                for item in items {
                    self.delete(item)?;
                }
                Ok(())
            }
            _ => Err(Unwind::exc(ExcKind::SyntaxError, "cannot delete expression")),
        }
    }

    // ---- functions -------------------------------------------------------

    fn make_function(&mut self, def: &Rc<FunctionDef>) -> Eval {
        let mut defaults = Vec::with_capacity(def.params.positional.len());
        for param in &def.params.positional {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        let mut kw_defaults = Vec::with_capacity(def.params.kwonly.len());
        for param in &def.params.kwonly {
            kw_defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr)?),
                None => None,
            });
        }
        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            kw_defaults,
            enclosing: self.capture_scopes(),
        })))
    }

    /// Call any callable value
    pub fn call(&mut self, callee: &Value, args: Args) -> Eval {
        match callee {
            Value::Function(f) => self.call_function(f, args),
            Value::Builtin(b) => self.call_native(args, |interp, args| (b.func)(interp, args)),
            Value::Method(m) => self.call_native(args, |interp, args| {
                methods::call_method(interp, &m.receiver, &m.name, args)
            }),
            Value::Type(tag) => {
                self.call_native(args, |interp, args| builtins::construct(interp, *tag, args))
            }
            Value::ExceptionType(kind) => {
                args.no_keywords(kind.name())?;
                Ok(Value::Exception(Rc::new(exception_from_args(
                    *kind,
                    &args.positional,
                ))))
            }
            other => Err(type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    fn call_function(&mut self, func: &Rc<Function>, args: Args) -> Eval {
        if self.frames.len() > self.limits.max_recursion_depth {
            return Err(Unwind::exc(
                ExcKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        let locals = bind_arguments(func, args)?;
        self.envs.push(Env {
            locals: Some(Rc::new(RefCell::new(locals))),
            info: Some(func.def.scope.clone()),
            enclosing: func.enclosing.clone(),
        });
        self.frames.push(Frame {
            function: func.def.name.clone(),
            line: func.def.line,
        });
        let result = self.exec_body(&func.def.body);
        self.frames.pop();
        self.envs.pop();
        match result? {
            Flow::Return(v) => Ok(v),
            Flow::Normal => Ok(Value::None),
            Flow::Break | Flow::Continue => Err(Unwind::exc(
                ExcKind::SyntaxError,
                "'break' or 'continue' outside loop",
            )),
        }
    }

    fn eval_args(&mut self, args: &[Arg]) -> Result<Args, Unwind> {
        let mut out = Args::default();
        for arg in args {
            match arg {
                Arg::Positional(expr) => {
                    let v = self.eval(expr)?;
                    out.positional.push(v);
                }
                Arg::Star(expr) => {
                    let v = self.eval(expr)?;
                    let items = self.collect(&v)?;
                    out.positional.extend(items);
                }
                Arg::Keyword(name, expr) => {
                    let v = self.eval(expr)?;
                    push_keyword(&mut out, name.clone(), v)?;
                }
                Arg::DoubleStar(expr) => match self.eval(expr)? {
                    Value::Dict(d) => {
                        for (k, v) in d.borrow().items() {
                            let Value::Str(k) = k else {
                                return Err(type_error("keywords must be strings"));
                            };
                            push_keyword(&mut out, k, v)?;
                        }
                    }
                    other => {
                        return Err(type_error(format!(
                            "argument after ** must be a mapping, not {}",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Ok(out)
    }

    // ---- iteration -----------------------------------------------------

    pub fn iter_value(&mut self, value: &Value) -> Result<IterSource, Unwind> {
        Ok(match value {
            Value::List(items) => IterSource::List {
                list: items.clone(),
                idx: 0,
            },
            Value::Tuple(items) => IterSource::Items(items.to_vec().into_iter()),
            Value::Str(s) => {
                let count = s.chars().count();
                self.reserve(count.saturating_mul(VALUE_SIZE + 24))?;
                let chars: Vec<Value> = s.chars().map(|c| Value::string(c.to_string())).collect();
                IterSource::Items(chars.into_iter())
            }
            Value::Dict(d) | Value::Set(d) => IterSource::Items(d.borrow().keys().into_iter()),
            Value::Range(r) => IterSource::Range {
                next: r.start,
                stop: r.stop,
                step: r.step,
            },
            Value::Iterator(it) => IterSource::Shared(it.clone()),
            other => {
                return Err(type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        })
    }

    /// Materialize any iterable into a vector
    pub fn collect(&mut self, value: &Value) -> Result<Vec<Value>, Unwind> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.to_vec()),
            _ => {
                if let Value::Range(r) = value {
                    self.reserve(r.len().saturating_mul(VALUE_SIZE))?;
                }
                let mut items = self.iter_value(value)?;
                let mut out = Vec::new();
                while let Some(item) = items.next() {
                    self.checkpoint()?;
                    out.push(item);
                }
                Ok(out)
            }
        }
    }

    // ---- attributes and items ----------------------------------------

    pub fn get_attr(&mut self, object: &Value, name: &str) -> Eval {
        let found = match (object, name) {
            (Value::Module(m), _) => {
                return m.get(name).ok_or_else(|| {
                    Unwind::exc(
                        ExcKind::AttributeError,
                        format!("module '{}' has no attribute '{name}'", m.name),
                    )
                })
            }
            (Value::Exception(e), "args") => Some(if e.message.is_empty() {
                Value::tuple(vec![])
            } else {
                Value::tuple(vec![Value::str(&e.message)])
            }),
            (Value::Function(f), "__name__") => Some(Value::Str(f.def.name.clone())),
            (Value::Builtin(b), "__name__") => Some(Value::str(b.name)),
            (Value::Type(t), "__name__") => Some(Value::str(t.name())),
            (Value::ExceptionType(k), "__name__") => Some(Value::str(k.name())),
            (Value::Float(f), "real") => Some(Value::Float(*f)),
            (Value::Float(_), "imag") => Some(Value::Float(0.0)),
            (Value::Int(i), "real" | "numerator") => Some(Value::Int(*i)),
            (Value::Int(_), "imag") => Some(Value::Int(0)),
            (Value::Int(_), "denominator") => Some(Value::Int(1)),
            _ => None,
        };
        if let Some(v) = found {
            return Ok(v);
        }
        if methods::has_method(object, name) {
            return Ok(Value::Method(Rc::new(Method {
                receiver: object.clone(),
                name: Rc::from(name),
            })));
        }
        Err(Unwind::exc(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{name}'", object.type_name()),
        ))
    }

    pub(crate) fn set_attr(&mut self, object: &Value, name: &str, value: Value) -> Result<(), Unwind> {
        match object {
            Value::Module(m) => {
                m.set(name, value);
                Ok(())
            }
            other => Err(Unwind::exc(
                ExcKind::AttributeError,
                format!("'{}' object has no attribute '{name}'", other.type_name()),
            )),
        }
    }

    pub(crate) fn del_attr(&mut self, object: &Value, name: &str) -> Result<(), Unwind> {
        if let Value::Module(m) = object {
            if m.attrs.borrow_mut().remove(name).is_some() {
                return Ok(());
            }
        }
        Err(Unwind::exc(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{name}'", object.type_name()),
        ))
    }

    fn eval_index(&mut self, index: &Expr) -> Result<Index, Unwind> {
        match index {
            Expr::Slice { lower, upper, step } => Ok(Index::Slice(
                self.eval_slice_part(lower.as_deref())?,
                self.eval_slice_part(upper.as_deref())?,
                self.eval_slice_part(step.as_deref())?,
            )),
            other => Ok(Index::Item(self.eval(other)?)),
        }
    }

    fn eval_slice_part(&mut self, part: Option<&Expr>) -> Result<Option<Value>, Unwind> {
        match part {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::None => Ok(None),
                v => Ok(Some(v)),
            },
        }
    }

    pub(crate) fn get_item(&mut self, container: &Value, index: &Index) -> Eval {
        match (container, index) {
            (Value::List(items), Index::Item(i)) => {
                let items = items.borrow();
                let idx = sequence_index(i, items.len(), "list")?;
                Ok(items[idx].clone())
            }
            (Value::Tuple(items), Index::Item(i)) => {
                let idx = sequence_index(i, items.len(), "tuple")?;
                Ok(items[idx].clone())
            }
            (Value::Str(s), Index::Item(i)) => {
                if s.is_ascii() {
                    let idx = sequence_index(i, s.len(), "string")?;
                    Ok(Value::str(&s[idx..idx + 1]))
                } else {
                    let chars: Vec<char> = s.chars().collect();
                    let idx = sequence_index(i, chars.len(), "string")?;
                    Ok(Value::string(chars[idx].to_string()))
                }
            }
            (Value::Range(r), Index::Item(i)) => {
                let idx = sequence_index(i, r.len(), "range object")?;
                Ok(Value::Int(r.get(idx).unwrap_or(0)))
            }
            (Value::Dict(d), Index::Item(key)) => {
                let found = d.borrow().get(key)?;
                found.ok_or_else(|| Unwind::exc(ExcKind::KeyError, format::repr(key)))
            }
            (Value::List(items), Index::Slice(lo, hi, st)) => {
                let items = items.borrow();
                let picked = slice_positions(items.len(), lo, hi, st)?
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect();
                Ok(Value::list(picked))
            }
            (Value::Tuple(items), Index::Slice(lo, hi, st)) => {
                let picked = slice_positions(items.len(), lo, hi, st)?
                    .into_iter()
                    .map(|i| items[i].clone())
                    .collect();
                Ok(Value::tuple(picked))
            }
            (Value::Str(s), Index::Slice(lo, hi, st)) => {
                let chars: Vec<char> = s.chars().collect();
                let picked: String = slice_positions(chars.len(), lo, hi, st)?
                    .into_iter()
                    .map(|i| chars[i])
                    .collect();
                Ok(Value::string(picked))
            }
            (Value::Range(r), Index::Slice(lo, hi, st)) => {
                let (start, stop, step) = slice_bounds(r.len(), lo, hi, st)?;
                Ok(Value::Range(Range {
                    start: r.start.saturating_add(start.saturating_mul(r.step)),
                    stop: r.start.saturating_add(stop.saturating_mul(r.step)),
                    step: r.step.saturating_mul(step),
                }))
            }
            (Value::Dict(_), Index::Slice(..)) => Err(type_error("unhashable type: 'slice'")),
            (other, _) => Err(type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn set_item(&mut self, container: &Value, index: Index, value: Value) -> Result<(), Unwind> {
        match (container, index) {
            (Value::List(items), Index::Item(i)) => {
                let len = items.borrow().len();
                let idx = sequence_index(&i, len, "list assignment")?;
                items.borrow_mut()[idx] = value;
                Ok(())
            }
            (Value::List(items), Index::Slice(lo, hi, st)) => {
                let replacement = self.collect(&value)?;
                let len = items.borrow().len();
                let (start, stop, step) = slice_bounds(len, &lo, &hi, &st)?;
                if step == 1 {
                    let start = start as usize;
                    let stop = (stop.max(start as i64)) as usize;
                    self.reserve(replacement.len() * VALUE_SIZE)?;
                    items.borrow_mut().splice(start..stop, replacement);
                    return Ok(());
                }
                let positions = slice_positions(len, &lo, &hi, &st)?;
                if positions.len() != replacement.len() {
                    return Err(value_error(format!(
                        "attempt to assign sequence of size {} to extended slice of size {}",
                        replacement.len(),
                        positions.len()
                    )));
                }
                let mut items = items.borrow_mut();
                for (pos, v) in positions.into_iter().zip(replacement) {
                    items[pos] = v;
                }
                Ok(())
            }
            (Value::Dict(d), Index::Item(key)) => {
                self.reserve(2 * VALUE_SIZE + 32)?;
                d.borrow_mut().insert(key, value)
            }
            (other, _) => Err(type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    fn del_item(&mut self, container: &Value, index: Index) -> Result<(), Unwind> {
        match (container, index) {
            (Value::List(items), Index::Item(i)) => {
                let len = items.borrow().len();
                let idx = sequence_index(&i, len, "list assignment")?;
                items.borrow_mut().remove(idx);
                Ok(())
            }
            (Value::List(items), Index::Slice(lo, hi, st)) => {
                let len = items.borrow().len();
                let mut positions = slice_positions(len, &lo, &hi, &st)?;
                positions.sort_unstable();
                let mut items = items.borrow_mut();
                for pos in positions.into_iter().rev() {
                    items.remove(pos);
                }
                Ok(())
            }
            (Value::Dict(d), Index::Item(key)) => match d.borrow_mut().remove(&key)? {
                Some(_) => Ok(()),
                None => Err(Unwind::exc(ExcKind::KeyError, format::repr(&key))),
            },
            (other, _) => Err(type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }

    // ---- expressions -----------------------------------------------------

    pub(crate) fn eval(&mut self, expr: &Expr) -> Eval {
        match expr {
            Expr::Constant(c) => Ok(match c {
                Constant::None => Value::None,
                Constant::Bool(b) => Value::Bool(*b),
                Constant::Int(i) => Value::Int(*i),
                Constant::BigInt(i) => Value::BigInt(i.clone()),
                Constant::Float(f) => Value::Float(*f),
                Constant::Str(s) => Value::Str(s.clone()),
                Constant::Ellipsis => Value::Ellipsis,
            }),
            Expr::Name(name) => self.lookup(name),
            Expr::FString(parts) => self.eval_fstring(parts),
            Expr::BinOp { left, op, right } => {
                let a = self.eval(left)?;
                let b = self.eval(right)?;
                ops::binary_op(self, *op, &a, &b)
            }
            Expr::UnaryOp { op, operand } => {
                let v = self.eval(operand)?;
                ops::unary_op(*op, &v)
            }
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = self.eval(value)?;
                    let stop = match op {
                        BoolOp::And => !last.truthy(),
                        BoolOp::Or => last.truthy(),
                    };
                    if stop {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops: cmp_ops,
                comparators,
            } => {
                let mut current = self.eval(left)?;
                for (op, right) in cmp_ops.iter().zip(comparators) {
                    let next = self.eval(right)?;
                    if !ops::compare(self, *op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call { func, args } => {
                let callee = self.eval(func)?;
                let args = self.eval_args(args)?;
                self.call(&callee, args)
            }
            Expr::Attribute { value, attr } => {
                let object = self.eval(value)?;
                self.get_attr(&object, attr)
            }
            Expr::Subscript { value, index } => {
                let container = self.eval(value)?;
                let index = self.eval_index(index)?;
                self.get_item(&container, &index)
            }
            Expr::Slice { .. } => Err(Unwind::exc(ExcKind::SyntaxError, "invalid syntax")),
            Expr::List(items) => Ok(Value::list(self.eval_items(items)?)),
            Expr::Tuple(items) => Ok(Value::tuple(self.eval_items(items)?)),
            Expr::Set(items) => {
                let mut set = Dict::new();
                for item in self.eval_items(items)? {
                    set.insert(item, Value::None)?;
                }
                Ok(Value::set(set))
            }
            Expr::Dict(pairs) => {
                let mut dict = Dict::new();
                for (key, value) in pairs {
                    match key {
                        Some(key) => {
                            let k = self.eval(key)?;
                            let v = self.eval(value)?;
                            dict.insert(k, v)?;
                        }
                        None => match self.eval(value)? {
                            Value::Dict(other) => {
                                for (k, v) in other.borrow().items() {
                                    dict.insert(k, v)?;
                                }
                            }
                            other => {
                                return Err(type_error(format!(
                                    "'{}' object is not a mapping",
                                    other.type_name()
                                )))
                            }
                        },
                    }
                }
                self.reserve(dict.len() * (2 * VALUE_SIZE + 32))?;
                Ok(Value::dict(dict))
            }
            Expr::Starred(_) => Err(Unwind::exc(
                ExcKind::SyntaxError,
                "can't use starred expression here",
            )),
            Expr::ListComp {
                elt,
                generators,
                scope,
            } => {
                let out = self.comprehension_items(elt, generators, scope)?;
                Ok(Value::list(out))
            }
            Expr::GeneratorExp {
                elt,
                generators,
                scope,
            } => {
                let out = self.comprehension_items(elt, generators, scope)?;
                Ok(Value::iterator("generator", out))
            }
            Expr::SetComp {
                elt,
                generators,
                scope,
            } => {
                // built in place so heap samples see the partial result
                let out = Rc::new(RefCell::new(Dict::new()));
                self.rooted(Value::Set(out.clone()), |interp| {
                    interp.eval_comprehension(generators, scope, &mut |interp: &mut Interpreter| {
                        let v = interp.eval(elt)?;
                        interp.reserve(2 * VALUE_SIZE)?;
                        out.borrow_mut().insert(v, Value::None)
                    })
                })?;
                Ok(Value::Set(out))
            }
            Expr::DictComp {
                key,
                value,
                generators,
                scope,
            } => {
                let out = Rc::new(RefCell::new(Dict::new()));
                self.rooted(Value::Dict(out.clone()), |interp| {
                    interp.eval_comprehension(generators, scope, &mut |interp: &mut Interpreter| {
                        let k = interp.eval(key)?;
                        let v = interp.eval(value)?;
                        interp.reserve(2 * VALUE_SIZE + 32)?;
                        out.borrow_mut().insert(k, v)
                    })
                })?;
                Ok(Value::Dict(out))
            }
            Expr::IfExp { test, body, orelse } => {
                if self.eval(test)?.truthy() {
                    self.eval(body)
                } else {
                    self.eval(orelse)
                }
            }
            Expr::Lambda(def) => self.make_function(def),
        }
    }

    fn eval_items(&mut self, items: &[Expr]) -> Result<Vec<Value>, Unwind> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Expr::Starred(inner) = item {
                let v = self.eval(inner)?;
                out.extend(self.collect(&v)?);
            } else {
                out.push(self.eval(item)?);
            }
        }
        self.reserve(out.len() * VALUE_SIZE)?;
        Ok(out)
    }

    fn eval_fstring(&mut self, parts: &[FStringPart]) -> Eval {
        let out = self.render_fstring(parts)?;
        self.reserve(out.len())?;
        Ok(Value::string(out))
    }

    fn render_fstring(&mut self, parts: &[FStringPart]) -> Result<String, Unwind> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Literal(text) => out.push_str(text),
                FStringPart::Field {
                    expr,
                    conversion,
                    spec,
                } => {
                    let value = self.eval(expr)?;
                    let value = match conversion {
                        Some('r') | Some('a') => Value::string(format::repr(&value)),
                        Some('s') => Value::string(format::to_str(&value)),
                        _ => value,
                    };
                    let spec = match spec.as_slice() {
                        [] => String::new(),
                        [FStringPart::Literal(text)] => text.clone(),
                        nested => self.render_fstring(nested)?,
                    };
                    out.push_str(&format::format_value(&value, &spec)?);
                }
            }
        }
        Ok(out)
    }

    /// Elements of a list comprehension or generator expression
    fn comprehension_items(
        &mut self,
        elt: &Expr,
        generators: &[Comprehension],
        scope: &Rc<ScopeInfo>,
    ) -> Result<Vec<Value>, Unwind> {
        let out = Rc::new(RefCell::new(Vec::new()));
        self.rooted(Value::List(out.clone()), |interp| {
            interp.eval_comprehension(generators, scope, &mut |interp: &mut Interpreter| {
                let v = interp.eval(elt)?;
                interp.reserve(VALUE_SIZE)?;
                out.borrow_mut().push(v);
                Ok(())
            })
        })?;
        let items = std::mem::take(&mut *out.borrow_mut());
        Ok(items)
    }

    fn eval_comprehension(
        &mut self,
        generators: &[Comprehension],
        scope: &Rc<ScopeInfo>,
        emit: &mut dyn FnMut(&mut Interpreter) -> Result<(), Unwind>,
    ) -> Result<(), Unwind> {
        let Some(first) = generators.first() else {
            return Ok(());
        };
        // the outermost iterable is evaluated in the enclosing scope
        let iterable = self.eval(&first.iter)?;
        let enclosing = self.capture_scopes();
        self.envs.push(Env {
            locals: Some(new_scope()),
            info: Some(scope.clone()),
            enclosing,
        });
        let result = self.comprehension_level(generators, 0, Some(iterable), emit);
        self.envs.pop();
        result
    }

    fn comprehension_level(
        &mut self,
        generators: &[Comprehension],
        level: usize,
        first: Option<Value>,
        emit: &mut dyn FnMut(&mut Interpreter) -> Result<(), Unwind>,
    ) -> Result<(), Unwind> {
        let generator = &generators[level];
        let iterable = match first {
            Some(v) => v,
            None => self.eval(&generator.iter)?,
        };
        let mut items = self.iter_value(&iterable)?;
        let line = self.current_line();
        while let Some(item) = items.next() {
            self.trace_line(line)?;
            self.assign(&generator.target, item)?;
            let mut keep = true;
            for cond in &generator.ifs {
                if !self.eval(cond)?.truthy() {
                    keep = false;
                    break;
                }
            }
            if !keep {
                continue;
            }
            if level + 1 == generators.len() {
                emit(self)?;
            } else {
                self.comprehension_level(generators, level + 1, None, emit)?;
            }
        }
        Ok(())
    }

    // ---- dynamic evaluation (`eval`, `exec`) ------------------------

    pub(crate) fn eval_source(&mut self, source: &str) -> Eval {
        let expr = parse_expression(source).map_err(|e| Unwind::from(Exception::from(e)))?;
        self.eval(&expr)
    }

    pub(crate) fn exec_source(&mut self, source: &str) -> Result<(), Unwind> {
        let body = parse_module(source).map_err(|e| Unwind::from(Exception::from(e)))?;
        self.exec_body(&body)?;
        Ok(())
    }
}

fn push_keyword(args: &mut Args, name: Rc<str>, value: Value) -> Result<(), Unwind> {
    if args.keywords.iter().any(|(k, _)| *k == name) {
        return Err(type_error(format!("keyword argument repeated: {name}")));
    }
    args.keywords.push((name, value));
    Ok(())
}

fn exception_matches(exc: &Exception, kinds: &Value) -> Result<bool, Unwind> {
    match kinds {
        Value::ExceptionType(kind) => Ok(exc.kind.is_subclass_of(*kind)),
        Value::Tuple(items) => {
            for item in items.iter() {
                if exception_matches(exc, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn missing_arguments(function: &str, missing: &[Rc<str>], kind: &str) -> Unwind {
    let quoted: Vec<String> = missing.iter().map(|n| format!("'{n}'")).collect();
    let list = match quoted.as_slice() {
        [one] => one.clone(),
        [a, b] => format!("{a} and {b}"),
        [init @ .., last] => format!("{}, and {last}", init.join(", ")),
        [] => String::new(),
    };
    let plural = if missing.len() == 1 { "" } else { "s" };
    type_error(format!(
        "{function}() missing {} required {kind} argument{plural}: {list}",
        missing.len()
    ))
}

fn bind_arguments(func: &Function, args: Args) -> Result<HashMap<Rc<str>, Value>, Unwind> {
    let params = &func.def.params;
    let name = &func.def.name;
    let mut locals: HashMap<Rc<str>, Value> = HashMap::new();

    let mut positional = args.positional.into_iter();
    for param in &params.positional {
        match positional.next() {
            Some(v) => {
                locals.insert(param.name.clone(), v);
            }
            None => break,
        }
    }
    let extra: Vec<Value> = positional.collect();
    match &params.varargs {
        Some(var) => {
            locals.insert(var.clone(), Value::tuple(extra));
        }
        None if !extra.is_empty() => {
            let expected = params.positional.len();
            let given = expected + extra.len();
            let plural = if expected == 1 { "" } else { "s" };
            return Err(type_error(format!(
                "{name}() takes {expected} positional argument{plural} but {given} were given"
            )));
        }
        None => {}
    }

    let mut kwargs = Dict::new();
    for (key, value) in args.keywords {
        let is_param = params
            .positional
            .iter()
            .chain(params.kwonly.iter())
            .any(|p| p.name == key);
        if is_param {
            if locals.contains_key(&key) {
                return Err(type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            locals.insert(key, value);
        } else if params.kwargs.is_some() {
            kwargs.insert(Value::Str(key), value)?;
        } else {
            return Err(type_error(format!(
                "{name}() got an unexpected keyword argument '{key}'"
            )));
        }
    }

    let mut missing = Vec::new();
    for (param, default) in params.positional.iter().zip(&func.defaults) {
        if !locals.contains_key(&param.name) {
            match default {
                Some(v) => {
                    locals.insert(param.name.clone(), v.clone());
                }
                None => missing.push(param.name.clone()),
            }
        }
    }
    if !missing.is_empty() {
        return Err(missing_arguments(name, &missing, "positional"));
    }
    for (param, default) in params.kwonly.iter().zip(&func.kw_defaults) {
        if !locals.contains_key(&param.name) {
            match default {
                Some(v) => {
                    locals.insert(param.name.clone(), v.clone());
                }
                None => missing.push(param.name.clone()),
            }
        }
    }
    if !missing.is_empty() {
        return Err(missing_arguments(name, &missing, "keyword-only"));
    }
    if let Some(kw) = &params.kwargs {
        locals.insert(kw.clone(), Value::dict(kwargs));
    }
    Ok(locals)
}

/// Normalize a (possibly negative) index into `0..len`
pub(crate) fn sequence_index(index: &Value, len: usize, what: &str) -> Result<usize, Unwind> {
    let Some(i) = index.as_int() else {
        let subject = what.split(' ').next().unwrap_or(what);
        return Err(type_error(format!(
            "{subject} indices must be integers or slices, not {}",
            index.type_name()
        )));
    };
    let len = len as i64;
    let adjusted = if i < 0 { i + len } else { i };
    if adjusted < 0 || adjusted >= len {
        return Err(Unwind::exc(
            ExcKind::IndexError,
            format!("{what} index out of range"),
        ));
    }
    Ok(adjusted as usize)
}

fn slice_int(v: &Option<Value>) -> Result<Option<i64>, Unwind> {
    match v {
        None => Ok(None),
        Some(v) => v.as_int().map(Some).ok_or_else(|| {
            type_error("slice indices must be integers or None or have an __index__ method")
        }),
    }
}

/// Resolve slice bounds against a length, Python style
pub(crate) fn slice_bounds(
    len: usize,
    lower: &Option<Value>,
    upper: &Option<Value>,
    step: &Option<Value>,
) -> Result<(i64, i64, i64), Unwind> {
    let step = slice_int(step)?.unwrap_or(1);
    if step == 0 {
        return Err(value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |v: i64| -> i64 {
        if v < 0 {
            let v = v + len;
            if v < 0 {
                if step < 0 {
                    -1
                } else {
                    0
                }
            } else {
                v
            }
        } else if v >= len {
            if step < 0 {
                len - 1
            } else {
                len
            }
        } else {
            v
        }
    };
    let (default_start, default_stop) = if step > 0 { (0, len) } else { (len - 1, -1) };
    let start = slice_int(lower)?.map(clamp).unwrap_or(default_start);
    let stop = slice_int(upper)?.map(clamp).unwrap_or(default_stop);
    Ok((start, stop, step))
}

pub(crate) fn slice_positions(
    len: usize,
    lower: &Option<Value>,
    upper: &Option<Value>,
    step: &Option<Value>,
) -> Result<Vec<usize>, Unwind> {
    let (start, stop, step) = slice_bounds(len, lower, upper, step)?;
    let mut out = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        i += step;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ScriptedInput;

    fn run(source: &str) -> (String, Result<(), Unwind>) {
        let sink = CollectingSink::new();
        let mut interp = Interpreter::new();
        interp.set_output(Box::new(sink.clone()));
        let result = interp.run_source(source);
        (sink.contents(), result)
    }

    fn output(source: &str) -> String {
        let (out, result) = run(source);
        if let Err(Unwind::Exception(e)) = &result {
            panic!("unexpected exception: {}", e.render());
        }
        assert!(result.is_ok(), "run halted: {result:?}");
        out
    }

    fn exception(source: &str) -> Exception {
        match run(source).1 {
            Err(Unwind::Exception(e)) => *e,
            other => panic!("expected an exception, got {other:?}"),
        }
    }

    #[test]
    fn test_print_and_arithmetic() {
        assert_eq!(output("print(1 + 2 * 3, 7 // 2, 7 / 2, -7 % 3)"), "7 3 3.5 2\n");
        assert_eq!(output("print('a', 'b', sep='-', end='!')"), "a-b!");
    }

    #[test]
    fn test_functions_defaults_and_closures() {
        let src = "\
def make_counter(start=0):
    count = start
    def bump(step=1):
        nonlocal count
        count += step
        return count
    return bump

c = make_counter(10)
c()
print(c(5))
";
        assert_eq!(output(src), "16\n");
    }

    #[test]
    fn test_global_statement() {
        let src = "total = 0\ndef add(n):\n    global total\n    total += n\nadd(3)\nadd(4)\nprint(total)\n";
        assert_eq!(output(src), "7\n");
    }

    #[test]
    fn test_unbound_local() {
        let exc = exception("x = 1\ndef f():\n    print(x)\n    x = 2\nf()\n");
        assert_eq!(exc.kind, ExcKind::UnboundLocalError);
    }

    #[test]
    fn test_loops_with_else_and_break() {
        let src = "\
for i in range(5):
    if i == 3:
        break
else:
    print('no break')
print(i)
n = 0
while n < 3:
    n += 1
else:
    print('done', n)
";
        assert_eq!(output(src), "3\ndone 3\n");
    }

    #[test]
    fn test_comprehensions() {
        let src = "\
words = ['apple', 'kiwi', 'banana']
print([w.upper() for w in words if len(w) > 4])
print({w: len(w) for w in words})
print(sorted({len(w) for w in words}))
print(sum(x * x for x in range(4)))
print([(a, b) for a in range(2) for b in 'xy'])
";
        assert_eq!(
            output(src),
            "['APPLE', 'BANANA']\n{'apple': 5, 'kiwi': 4, 'banana': 6}\n[4, 5, 6]\n14\n[(0, 'x'), (0, 'y'), (1, 'x'), (1, 'y')]\n"
        );
    }

    #[test]
    fn test_unpacking() {
        let src = "a, (b, c) = 1, [2, 3]\nfirst, *rest = 'hello'\nprint(a, b, c, first, rest)\n";
        assert_eq!(output(src), "1 2 3 h ['e', 'l', 'l', 'o']\n");
        let exc = exception("a, b = [1, 2, 3]\n");
        assert_eq!(exc.kind, ExcKind::ValueError);
        assert_eq!(exc.message, "too many values to unpack (expected 2)");
    }

    #[test]
    fn test_try_except_finally_flow() {
        let src = "\
def risky(n):
    try:
        return 10 / n
    except ZeroDivisionError as e:
        print('caught', e)
        return None
    finally:
        print('cleanup')

print(risky(2))
print(risky(0))
try:
    {}['missing']
except (IndexError, KeyError) as e:
    print(type(e).__name__, e)
";
        assert_eq!(
            output(src),
            "cleanup\n5.0\ncaught division by zero\ncleanup\nNone\nKeyError 'missing'\n"
        );
    }

    #[test]
    fn test_bare_raise_reraises() {
        let exc = exception("try:\n    int('x')\nexcept ValueError:\n    raise\n");
        assert_eq!(exc.kind, ExcKind::ValueError);
        assert!(exc.message.contains("invalid literal"));
    }

    #[test]
    fn test_traceback_lines() {
        let exc = exception("def f(x):\n    return x[5]\n\nf([1])\n");
        assert_eq!(exc.kind, ExcKind::IndexError);
        let lines: Vec<(String, u32)> = exc
            .traceback
            .iter()
            .map(|t| (t.function.clone(), t.line))
            .collect();
        assert_eq!(lines, vec![("<module>".to_string(), 4), ("f".to_string(), 2)]);
        assert!(exc.render().ends_with("IndexError: list index out of range"));
    }

    #[test]
    fn test_fstrings_and_format() {
        let src = "name = 'Ada'\nscore = 0.4567\nw = 8\nprint(f'{name!r:>{w}} {score:.1%} {{x}} {3 * 4}')\n";
        assert_eq!(output(src), "   'Ada' 45.7% {x} 12\n");
        assert_eq!(
            output("x = 21\nname = 'Ada'\nprint(f'{x*2=}', f'{name=}')\n"),
            "x*2=42 name='Ada'\n"
        );
    }

    #[test]
    fn test_slices() {
        let src = "s = 'abcdef'\nl = list(range(10))\nprint(s[::-1], s[1:4], l[-3:], l[::3])\nl[2:5] = ['x']\nprint(l)\ndel l[::2]\nprint(l)\n";
        assert_eq!(
            output(src),
            "fedcba bcd [7, 8, 9] [0, 3, 6, 9]\n[0, 1, 'x', 5, 6, 7, 8, 9]\n[1, 5, 7, 9]\n"
        );
    }

    #[test]
    fn test_last_value_recorded() {
        let mut interp = Interpreter::new();
        interp.run_source("x = 20\nx + 1\n").unwrap();
        assert!(matches!(interp.take_last_value(), Some(Value::Int(21))));
        interp.run_source("y = 1\n").unwrap();
        assert!(interp.take_last_value().is_none());
    }

    #[test]
    fn test_input_through_provider() {
        let sink = CollectingSink::new();
        let mut interp = Interpreter::new();
        interp.set_output(Box::new(sink.clone()));
        interp.set_input(Box::new(ScriptedInput::new(["Ada"])));
        interp
            .run_source("nom = input('Nom: '); print('Bonjour', nom)")
            .unwrap();
        assert_eq!(sink.contents(), "Nom: Ada\nBonjour Ada\n");
    }

    #[test]
    fn test_halt_skips_handlers_and_finally() {
        struct StopAt(u32);
        impl TraceHook for StopAt {
            fn on_line(&mut self, line: u32) -> Result<(), HaltReason> {
                if line == self.0 {
                    Err(HaltReason::Cancelled)
                } else {
                    Ok(())
                }
            }
        }
        let sink = CollectingSink::new();
        let mut interp = Interpreter::new();
        interp.set_output(Box::new(sink.clone()));
        interp.set_trace(Some(Box::new(StopAt(3))));
        let result = interp.run_source(
            "try:\n    print('start')\n    print('never')\nexcept Exception:\n    print('caught')\nfinally:\n    print('finally')\n",
        );
        assert!(matches!(result, Err(Unwind::Halt(HaltReason::Cancelled))));
        assert_eq!(sink.contents(), "start\n");
    }

    #[test]
    fn test_recursion_limit() {
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024 * 1024)
            .spawn(|| {
                let mut interp = Interpreter::new();
                interp.set_limits(RuntimeLimits {
                    max_recursion_depth: 200,
                    max_heap_bytes: None,
                });
                match interp.run_source("def f(n):\n    return f(n + 1)\nf(0)\n") {
                    Err(Unwind::Exception(e)) => e.kind,
                    _ => ExcKind::Exception,
                }
            })
            .unwrap();
        assert_eq!(handle.join().unwrap(), ExcKind::RecursionError);
    }

    #[test]
    fn test_heap_ceiling_halts() {
        let mut interp = Interpreter::new();
        interp.set_limits(RuntimeLimits {
            max_recursion_depth: 1000,
            max_heap_bytes: Some(1024 * 1024),
        });
        let result = interp.run_source("data = 'x' * 10_000_000\n");
        assert!(matches!(result, Err(Unwind::Halt(HaltReason::Memory(_)))));

        let result = interp.run_source("items = []\nwhile True:\n    items.append('y' * 100)\n");
        assert!(matches!(result, Err(Unwind::Halt(HaltReason::Memory(_)))));
    }

    #[test]
    fn test_heap_ceiling_sees_unfinished_comprehensions() {
        let limited = |source: &str| {
            let mut interp = Interpreter::new();
            interp.set_limits(RuntimeLimits {
                max_recursion_depth: 1000,
                max_heap_bytes: Some(10 * 1024 * 1024),
            });
            interp.run_source(source)
        };
        let result = limited("x = len(['a' * 10000 + str(i) for i in range(100000)])\n");
        assert!(matches!(result, Err(Unwind::Halt(HaltReason::Memory(_)))));
        let result = limited("x = {i: 'b' * 10000 for i in range(100000)}\n");
        assert!(matches!(result, Err(Unwind::Halt(HaltReason::Memory(_)))));
        let result = limited("x = len(list(map(lambda i: 'c' * 10000, range(100000))))\n");
        assert!(matches!(result, Err(Unwind::Halt(HaltReason::Memory(_)))));

        // small temporaries stay well under the ceiling
        assert!(limited("x = sum([len(str(i)) for i in range(1000)])\n").is_ok());
    }

    #[test]
    fn test_import_native_module() {
        assert_eq!(
            output("import math\nfrom math import sqrt as root\nprint(math.floor(2.7), root(16))\n"),
            "2 4.0\n"
        );
        assert_eq!(exception("import socket\n").kind, ExcKind::ModuleNotFoundError);
    }

    #[test]
    fn test_syntax_error_surfaces_as_exception() {
        let exc = exception("print('x'\n");
        assert_eq!(exc.kind, ExcKind::SyntaxError);
    }
}
