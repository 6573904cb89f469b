//! Sandpit Lang - the snippet language runtime
//!
//! A tree-walking interpreter for the Python subset students write in
//! exercises. It owns no process resources: output, input, imports and
//! per-line tracing all go through the host seams in [`io`].

pub mod ast;
pub mod builtins;
pub mod exception;
pub mod format;
pub mod interp;
pub mod io;
pub mod modules;
pub mod parser;
pub mod value;

mod heap;
mod methods;
mod ops;
mod scope;

pub use exception::{ExcKind, Exception, HaltReason, SyntaxError, TraceEntry, Unwind};
pub use interp::{Interpreter, RuntimeLimits};
pub use io::{
    CollectingSink, ImportHook, InputProvider, NativeImporter, NoInput, OutputSink, ScriptedInput,
    TraceHook,
};
pub use parser::{parse_expression, parse_module};
pub use value::{Args, Module, Value};
