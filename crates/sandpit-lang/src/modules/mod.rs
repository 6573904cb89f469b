//! Modules implemented natively by the runtime

mod json;
mod math;
mod random;
mod statistics;
mod string;

use crate::value::Value;
use std::rc::Rc;

/// Names of every module [`load`] can build
pub const NATIVE_MODULES: &[&str] = &["json", "math", "random", "statistics", "string"];

/// Build a fresh module object, or `None` when the runtime has no such module
pub fn load(name: &str) -> Option<Value> {
    let module = match name {
        "json" => json::module(),
        "math" => math::module(),
        "random" => random::module(),
        "statistics" => statistics::module(),
        "string" => string::module(),
        _ => return None,
    };
    Some(Value::Module(Rc::new(module)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_native_module_loads() {
        for name in NATIVE_MODULES {
            assert!(load(name).is_some(), "{name} failed to load");
        }
        assert!(load("os").is_none());
    }
}
