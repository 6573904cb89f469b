//! Seams between the interpreter and its host
//!
//! The interpreter never touches the process's stdout, stdin or module
//! system directly. Hosts plug in an [`OutputSink`], an [`InputProvider`],
//! an [`ImportHook`] and optionally a [`TraceHook`].

use crate::exception::{ExcKind, Exception, HaltReason, Unwind};
use crate::modules;
use crate::value::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Receives everything `print` writes
pub trait OutputSink {
    fn write(&mut self, text: &str) -> Result<(), HaltReason>;
}

/// Answers `input(prompt)`
pub trait InputProvider {
    fn read_line(&mut self, prompt: &str, output: &mut dyn OutputSink) -> Result<String, Unwind>;
}

/// Called before every executed source line
pub trait TraceHook {
    fn on_line(&mut self, line: u32) -> Result<(), HaltReason>;

    /// Called periodically from long-running native loops
    fn on_checkpoint(&mut self) -> Result<(), HaltReason> {
        Ok(())
    }
}

/// Resolves `import` statements
pub trait ImportHook {
    fn import(&mut self, name: &str, level: usize) -> Result<Value, Exception>;
}

/// Thread-safe, clonable output buffer with an optional byte ceiling
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    buffer: Arc<Mutex<String>>,
    limit: Option<usize>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            buffer: Arc::default(),
            limit: Some(limit),
        }
    }

    /// Copy of everything written so far
    pub fn contents(&self) -> String {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_empty()
    }
}

impl OutputSink for CollectingSink {
    fn write(&mut self, text: &str) -> Result<(), HaltReason> {
        let mut buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match self.limit {
            Some(limit) if buffer.len() + text.len() > limit => {
                let mut room = limit.saturating_sub(buffer.len());
                while room > 0 && !text.is_char_boundary(room) {
                    room -= 1;
                }
                buffer.push_str(&text[..room]);
                Err(HaltReason::OutputLimit(limit))
            }
            _ => {
                buffer.push_str(text);
                Ok(())
            }
        }
    }
}

/// Input provider for hosts with no input channel
pub struct NoInput;

impl InputProvider for NoInput {
    fn read_line(&mut self, _prompt: &str, _output: &mut dyn OutputSink) -> Result<String, Unwind> {
        Err(Unwind::exc(ExcKind::EOFError, "EOF when reading a line"))
    }
}

/// Replays a fixed list of lines, echoing prompts like a terminal would
#[derive(Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl InputProvider for ScriptedInput {
    fn read_line(&mut self, prompt: &str, output: &mut dyn OutputSink) -> Result<String, Unwind> {
        output.write(prompt)?;
        let line = self
            .lines
            .pop_front()
            .ok_or_else(|| Unwind::exc(ExcKind::EOFError, "EOF when reading a line"))?;
        output.write(&line)?;
        output.write("\n")?;
        Ok(line)
    }
}

/// Imports any module that ships with the runtime; one object per name
#[derive(Default)]
pub struct NativeImporter {
    cache: HashMap<String, Value>,
}

impl ImportHook for NativeImporter {
    fn import(&mut self, name: &str, level: usize) -> Result<Value, Exception> {
        if level > 0 {
            return Err(Exception::new(
                ExcKind::ImportError,
                "attempted relative import with no known parent package",
            ));
        }
        if let Some(module) = self.cache.get(name) {
            return Ok(module.clone());
        }
        let module = modules::load(name).ok_or_else(|| {
            Exception::new(
                ExcKind::ModuleNotFoundError,
                format!("No module named '{name}'"),
            )
        })?;
        self.cache.insert(name.to_string(), module.clone());
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_limit() {
        let mut sink = CollectingSink::with_limit(8);
        sink.write("hello").unwrap();
        assert_eq!(sink.write(" world"), Err(HaltReason::OutputLimit(8)));
        assert_eq!(sink.contents(), "hello wo");
    }

    #[test]
    fn test_scripted_input_echoes() {
        let mut sink = CollectingSink::new();
        let mut input = ScriptedInput::new(["Ada"]);
        assert_eq!(input.read_line("Nom: ", &mut sink).unwrap(), "Ada");
        assert_eq!(sink.contents(), "Nom: Ada\n");
        assert!(input.read_line("again: ", &mut sink).is_err());
    }

    #[test]
    fn test_native_importer_caches() {
        let mut importer = NativeImporter::default();
        let a = importer.import("math", 0).unwrap();
        let b = importer.import("math", 0).unwrap();
        assert!(a.same_object(&b));
        assert_eq!(
            importer.import("socket", 0).unwrap_err().kind,
            ExcKind::ModuleNotFoundError
        );
    }
}
