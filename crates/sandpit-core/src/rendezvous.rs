//! Interactive `input()` for coordinated runs
//!
//! Runs on the execution unit's thread. Each call parks the unit on a
//! fresh single-slot channel whose sender sits in the record, so
//! `supply_input` can hand over exactly one value. The run's wall clock
//! is paused for the duration of the wait.

use crate::record::ExecutionRecord;
use sandpit_lang::{HaltReason, InputProvider, OutputSink, Unwind};
use sandpit_sandbox::RunClock;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Rendezvous {
    record: Arc<ExecutionRecord>,
    clock: RunClock,
    wait: Duration,
}

impl Rendezvous {
    pub fn new(record: Arc<ExecutionRecord>, clock: RunClock, wait: Duration) -> Self {
        Self {
            record,
            clock,
            wait,
        }
    }
}

impl InputProvider for Rendezvous {
    fn read_line(&mut self, prompt: &str, output: &mut dyn OutputSink) -> Result<String, Unwind> {
        output.write(prompt)?;
        let rx = self.record.begin_wait(prompt);
        debug!(token = %self.record.token(), "waiting for input");

        let received = {
            let _paused = self.clock.pause();
            rx.recv_timeout(self.wait)
        };
        let late = self.record.end_wait(&rx);
        let value = match received {
            Ok(value) => value,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => match late {
                Some(value) => value,
                None => return Err(Unwind::Halt(HaltReason::InputTimeout(self.wait))),
            },
        };

        output.write(&value)?;
        output.write("\n")?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Status;
    use sandpit_lang::CollectingSink;
    use std::thread;

    #[test]
    fn test_value_is_echoed() {
        let record = Arc::new(ExecutionRecord::new("", CollectingSink::new()));
        record.advance(Status::Running);
        let mut sink = CollectingSink::new();
        let mut input =
            Rendezvous::new(record.clone(), RunClock::new(), Duration::from_secs(5));

        let supplier = {
            let record = record.clone();
            thread::spawn(move || {
                while !record.deliver("42".into()) {
                    thread::sleep(Duration::from_millis(5));
                }
            })
        };
        let value = input.read_line("n? ", &mut sink).unwrap();
        supplier.join().unwrap();

        assert_eq!(value, "42");
        assert_eq!(sink.contents(), "n? 42\n");
        assert_eq!(record.status(), Status::Running);
    }

    #[test]
    fn test_timeout_halts() {
        let record = Arc::new(ExecutionRecord::new("", CollectingSink::new()));
        record.advance(Status::Running);
        let clock = RunClock::new();
        let mut sink = CollectingSink::new();
        let mut input = Rendezvous::new(record.clone(), clock.clone(), Duration::from_millis(30));

        let err = input.read_line("? ", &mut sink).unwrap_err();
        assert!(matches!(
            err,
            Unwind::Halt(HaltReason::InputTimeout(d)) if d == Duration::from_millis(30)
        ));
        assert!(!clock.is_paused());
        assert!(!record.snapshot().input_required);
        assert!(!record.deliver("too late".into()));
    }
}
