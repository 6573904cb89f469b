//! Live-heap estimation for the memory ceiling
//!
//! Sizes are approximate: each value is charged its enum slot plus the
//! payload it owns. Shared containers are charged once.

use crate::value::{IterSource, Scope, Value};
use std::collections::HashSet;
use std::rc::Rc;

pub const VALUE_SIZE: usize = std::mem::size_of::<Value>();

/// Lines between two samples while the heap is small
const MIN_SAMPLE_INTERVAL: u64 = 2048;

/// Walks everything reachable from a set of scopes
#[derive(Default)]
pub struct Walker {
    seen: HashSet<usize>,
    stack: Vec<Value>,
    total: usize,
}

impl Walker {
    fn first_visit(&mut self, ptr: usize) -> bool {
        self.seen.insert(ptr)
    }

    pub fn scope(&mut self, scope: &Scope) {
        if !self.first_visit(Rc::as_ptr(scope) as *const () as usize) {
            return;
        }
        let scope = scope.borrow();
        self.total += 48 + scope.len() * (VALUE_SIZE + 32);
        self.stack.extend(scope.values().cloned());
        self.drain();
    }

    pub fn value(&mut self, value: &Value) {
        self.stack.push(value.clone());
        self.drain();
    }

    fn drain(&mut self) {
        while let Some(value) = self.stack.pop() {
            self.total += VALUE_SIZE;
            match &value {
                Value::Str(s) => {
                    if self.first_visit(s.as_ptr() as usize) {
                        self.total += s.len() + 16;
                    }
                }
                Value::List(items) => {
                    if self.first_visit(Rc::as_ptr(items) as *const () as usize) {
                        let Ok(items) = items.try_borrow() else {
                            continue;
                        };
                        self.total += 40 + items.capacity() * VALUE_SIZE;
                        self.stack.extend(items.iter().cloned());
                    }
                }
                Value::Tuple(items) => {
                    if self.first_visit(Rc::as_ptr(items) as *const () as usize) {
                        self.total += 40 + items.len() * VALUE_SIZE;
                        self.stack.extend(items.iter().cloned());
                    }
                }
                Value::Dict(d) | Value::Set(d) => {
                    if self.first_visit(Rc::as_ptr(d) as *const () as usize) {
                        let Ok(d) = d.try_borrow() else {
                            continue;
                        };
                        self.total += 64 + d.len() * (2 * VALUE_SIZE + 32);
                        for (k, v) in d.iter() {
                            self.stack.push(k.clone());
                            self.stack.push(v.clone());
                        }
                    }
                }
                Value::Function(f) => {
                    if self.first_visit(Rc::as_ptr(f) as *const () as usize) {
                        self.total += 128;
                        self.stack
                            .extend(f.defaults.iter().chain(f.kw_defaults.iter()).flatten().cloned());
                        let scopes: Vec<Scope> = f.enclosing.to_vec();
                        for scope in &scopes {
                            if self.first_visit(Rc::as_ptr(scope) as *const () as usize) {
                                let scope = scope.borrow();
                                self.total += 48 + scope.len() * (VALUE_SIZE + 32);
                                self.stack.extend(scope.values().cloned());
                            }
                        }
                    }
                }
                Value::BigInt(i) => {
                    if self.first_visit(Rc::as_ptr(i) as *const () as usize) {
                        self.total += 24 + (i.bits() as usize).div_ceil(8);
                    }
                }
                Value::Iterator(it) => {
                    if self.first_visit(Rc::as_ptr(it) as *const () as usize) {
                        self.total += 64;
                        let Ok(iter) = it.try_borrow() else {
                            continue;
                        };
                        match &iter.source {
                            IterSource::Items(rest) => {
                                self.total += rest.len() * VALUE_SIZE;
                                self.stack.extend(rest.as_slice().iter().cloned());
                            }
                            IterSource::List { list, .. } => {
                                self.stack.push(Value::List(list.clone()))
                            }
                            IterSource::Shared(inner) => {
                                self.stack.push(Value::Iterator(inner.clone()))
                            }
                            IterSource::Range { .. } => {}
                        }
                    }
                }
                Value::Method(m) => self.stack.push(m.receiver.clone()),
                Value::Exception(e) => {
                    if self.first_visit(Rc::as_ptr(e) as *const () as usize) {
                        self.total += 64 + e.message.len();
                    }
                }
                _ => {}
            }
        }
    }

    pub fn finish(self) -> usize {
        self.total
    }
}

/// Sampling state kept by the interpreter
#[derive(Debug)]
pub struct HeapMeter {
    live: usize,
    pending: usize,
    lines: u64,
    interval: u64,
}

impl Default for HeapMeter {
    fn default() -> Self {
        Self {
            live: 0,
            pending: 0,
            lines: 0,
            interval: MIN_SAMPLE_INTERVAL,
        }
    }
}

impl HeapMeter {
    /// Count one executed line; true when a sample is due
    pub fn tick(&mut self) -> bool {
        self.lines += 1;
        self.lines >= self.interval
    }

    /// Store a fresh measurement; bigger heaps are sampled less often
    pub fn record(&mut self, live: usize) {
        self.live = live;
        self.pending = 0;
        self.lines = 0;
        self.interval = ((live / 1024) as u64).max(MIN_SAMPLE_INTERVAL);
    }

    pub fn live(&self) -> usize {
        self.live
    }

    /// Estimated heap including allocations since the last sample
    pub fn estimate(&self) -> usize {
        self.live.saturating_add(self.pending)
    }

    pub fn add_pending(&mut self, bytes: usize) {
        self.pending = self.pending.saturating_add(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::new_scope;

    #[test]
    fn test_shared_list_counted_once() {
        let big = Value::list((0..1000).map(Value::Int).collect());
        let scope = new_scope();
        scope.borrow_mut().insert("a".into(), big.clone());
        let mut walker = Walker::default();
        walker.scope(&scope);
        let once = walker.finish();

        scope.borrow_mut().insert("b".into(), big);
        let mut walker = Walker::default();
        walker.scope(&scope);
        let twice = walker.finish();
        assert!(twice < once + 200);
        assert!(once > 1000 * VALUE_SIZE);
    }

    #[test]
    fn test_self_referencing_list_terminates() {
        let v = Value::list(vec![]);
        if let Value::List(items) = &v {
            items.borrow_mut().push(v.clone());
        }
        let mut walker = Walker::default();
        walker.value(&v);
        assert!(walker.finish() > 0);
    }

    #[test]
    fn test_pending_iterator_items_are_counted() {
        let items: Vec<Value> = (0..100).map(|i| Value::string("x".repeat(1000 + i))).collect();
        let it = Value::iterator("zip", items);
        let mut walker = Walker::default();
        walker.value(&it);
        assert!(walker.finish() > 100 * 1000);
    }

    #[test]
    fn test_meter_interval_grows_with_heap() {
        let mut meter = HeapMeter::default();
        meter.record(100 * 1024 * 1024);
        for _ in 0..MIN_SAMPLE_INTERVAL {
            assert!(!meter.tick());
        }
        meter.add_pending(10);
        assert_eq!(meter.estimate(), 100 * 1024 * 1024 + 10);
    }
}
