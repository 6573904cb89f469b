//! Executed-line budget
//!
//! [`InstructionCounter`] is a trace hook: the interpreter calls it before
//! every statement line. Past the budget it returns a halt, which unwinds
//! the snippet without running `except` or `finally` blocks. The same hook
//! is where cooperative cancellation and the thread-scope CPU and heap
//! ceilings are noticed.

use crate::limiter::CpuCeiling;
use sandpit_lang::{HaltReason, Interpreter, TraceHook};
use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lines between cancellation and CPU checks
const POLL_INTERVAL: u64 = 1024;

/// Shared stop flag set by the host when a run must end early
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct InstructionCounter {
    max_instructions: u64,
    executed: Rc<Cell<u64>>,
    cancel: CancelFlag,
    cpu: Option<CpuCeiling>,
}

impl InstructionCounter {
    pub fn new(max_instructions: u64) -> Self {
        Self {
            max_instructions,
            executed: Rc::default(),
            cancel: CancelFlag::default(),
            cpu: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_cpu_ceiling(mut self, cpu: Option<CpuCeiling>) -> Self {
        self.cpu = cpu;
        self
    }

    /// Install on `interp` until the returned guard drops
    pub fn activate(self, interp: &mut Interpreter) -> CounterGuard<'_> {
        let executed = self.executed.clone();
        let previous = interp.set_trace(Some(Box::new(self)));
        CounterGuard {
            interp,
            previous,
            executed,
        }
    }

    fn poll(&self) -> Result<(), HaltReason> {
        if self.cancel.is_cancelled() {
            return Err(HaltReason::Cancelled);
        }
        if let Some(cpu) = &self.cpu {
            if cpu.exceeded() {
                return Err(HaltReason::CpuTime(cpu.limit()));
            }
        }
        Ok(())
    }
}

impl TraceHook for InstructionCounter {
    fn on_line(&mut self, _line: u32) -> Result<(), HaltReason> {
        let count = self.executed.get() + 1;
        self.executed.set(count);
        if count > self.max_instructions {
            return Err(HaltReason::InstructionBudget(self.max_instructions));
        }
        if count % POLL_INTERVAL == 0 {
            self.poll()?;
        }
        Ok(())
    }

    fn on_checkpoint(&mut self) -> Result<(), HaltReason> {
        self.poll()
    }
}

/// Keeps the counter installed; restores the previous hook on drop,
/// including when the run panics
pub struct CounterGuard<'a> {
    interp: &'a mut Interpreter,
    previous: Option<Box<dyn TraceHook>>,
    executed: Rc<Cell<u64>>,
}

impl CounterGuard<'_> {
    /// Lines executed so far
    pub fn executed(&self) -> u64 {
        self.executed.get()
    }
}

impl Deref for CounterGuard<'_> {
    type Target = Interpreter;

    fn deref(&self) -> &Interpreter {
        self.interp
    }
}

impl DerefMut for CounterGuard<'_> {
    fn deref_mut(&mut self) -> &mut Interpreter {
        self.interp
    }
}

impl Drop for CounterGuard<'_> {
    fn drop(&mut self) {
        self.interp.set_trace(self.previous.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sandpit_lang::Unwind;

    fn halt_of(result: Result<(), Unwind>) -> HaltReason {
        match result {
            Err(Unwind::Halt(reason)) => reason,
            other => panic!("expected a halt, got {other:?}"),
        }
    }

    #[test]
    fn test_budget_stops_long_loop() {
        let mut interp = Interpreter::new();
        let mut guard = InstructionCounter::new(500).activate(&mut interp);
        let result = guard.run_source("i = 0\nwhile i < 10000:\n    i += 1\n");
        assert_eq!(halt_of(result), HaltReason::InstructionBudget(500));
        assert_eq!(guard.executed(), 501);
    }

    #[test]
    fn test_budget_is_not_catchable() {
        let src = "\
hits = 0
try:
    while True:
        hits += 1
except Exception:
    print('caught')
finally:
    print('finally')
";
        let sink = sandpit_lang::CollectingSink::new();
        let mut interp = Interpreter::new();
        interp.set_output(Box::new(sink.clone()));
        let result = InstructionCounter::new(100).activate(&mut interp).run_source(src);
        assert_eq!(halt_of(result), HaltReason::InstructionBudget(100));
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn test_small_programs_fit() {
        let mut interp = Interpreter::new();
        let mut guard = InstructionCounter::new(10).activate(&mut interp);
        assert!(guard.run_source("a = 1\nb = 2\nc = a + b\n").is_ok());
        assert_eq!(guard.executed(), 3);
    }

    #[test]
    fn test_cancel_flag_halts_at_next_poll() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut interp = Interpreter::new();
        let result = InstructionCounter::new(u64::MAX)
            .with_cancel(cancel)
            .activate(&mut interp)
            .run_source("while True:\n    pass\n");
        assert_eq!(halt_of(result), HaltReason::Cancelled);
    }

    #[test]
    fn test_guard_restores_previous_hook() {
        struct Marker;
        impl TraceHook for Marker {
            fn on_line(&mut self, _line: u32) -> Result<(), HaltReason> {
                Err(HaltReason::Cancelled)
            }
        }

        let mut interp = Interpreter::new();
        interp.set_trace(Some(Box::new(Marker)));
        {
            let mut guard = InstructionCounter::new(100).activate(&mut interp);
            assert!(guard.run_source("x = 1\n").is_ok());
        }
        assert_eq!(halt_of(interp.run_source("x = 1\n")), HaltReason::Cancelled);
    }
}
