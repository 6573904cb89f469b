//! `json`
//!
//! `loads` goes through serde_json with `preserve_order`, so objects come
//! back with their keys in document order. `dumps` has its own writer
//! because the output has to match Python's spacing and float rendering.

use crate::builtins::sort_values;
use crate::exception::{type_error, value_error, Unwind};
use crate::format::float_repr;
use crate::interp::Interpreter;
use crate::value::{expect_str, Args, Dict, Module, Value};
use std::rc::Rc;

type NativeResult = Result<Value, Unwind>;

const MAX_DEPTH: usize = 500;

pub(super) fn module() -> Module {
    Module::new("json")
        .with_function("dumps", dumps)
        .with_function("loads", loads)
}

struct Writer<'a> {
    interp: &'a mut Interpreter,
    indent: Option<String>,
    item_sep: String,
    key_sep: String,
    sort_keys: bool,
    ensure_ascii: bool,
    /// Containers currently being written, for cycle detection
    active: Vec<usize>,
    out: String,
}

impl Writer<'_> {
    fn newline(&mut self, level: usize) {
        if let Some(indent) = &self.indent {
            self.out.push('\n');
            for _ in 0..level {
                self.out.push_str(indent);
            }
        }
    }

    fn enter(&mut self, ptr: usize) -> Result<(), Unwind> {
        if self.active.contains(&ptr) {
            return Err(value_error("Circular reference detected"));
        }
        if self.active.len() >= MAX_DEPTH {
            return Err(Unwind::exc(
                crate::exception::ExcKind::RecursionError,
                "maximum recursion depth exceeded while encoding a JSON object",
            ));
        }
        self.active.push(ptr);
        Ok(())
    }

    fn value(&mut self, value: &Value, level: usize) -> Result<(), Unwind> {
        self.interp.checkpoint()?;
        match value {
            Value::None => self.out.push_str("null"),
            Value::Bool(true) => self.out.push_str("true"),
            Value::Bool(false) => self.out.push_str("false"),
            Value::Int(i) => self.out.push_str(&i.to_string()),
            Value::BigInt(i) => self.out.push_str(&i.to_string()),
            Value::Float(f) => self.out.push_str(&json_float(*f)),
            Value::Str(s) => self.string(s),
            Value::List(items) => {
                self.enter(Rc::as_ptr(items) as *const () as usize)?;
                let items = items.borrow().clone();
                self.array(&items, level)?;
                self.active.pop();
            }
            Value::Tuple(items) => {
                self.enter(Rc::as_ptr(items) as *const () as usize)?;
                self.array(items, level)?;
                self.active.pop();
            }
            Value::Dict(dict) => {
                self.enter(Rc::as_ptr(dict) as *const () as usize)?;
                let pairs = dict.borrow().items();
                self.object(pairs, level)?;
                self.active.pop();
            }
            other => {
                return Err(type_error(format!(
                    "Object of type {} is not JSON serializable",
                    other.type_name()
                )))
            }
        }
        Ok(())
    }

    fn array(&mut self, items: &[Value], level: usize) -> Result<(), Unwind> {
        if items.is_empty() {
            self.out.push_str("[]");
            return Ok(());
        }
        self.out.push('[');
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                let sep = self.item_sep.clone();
                self.out.push_str(&sep);
            }
            self.newline(level + 1);
            self.value(item, level + 1)?;
        }
        self.newline(level);
        self.out.push(']');
        Ok(())
    }

    fn object(&mut self, mut pairs: Vec<(Value, Value)>, level: usize) -> Result<(), Unwind> {
        if pairs.is_empty() {
            self.out.push_str("{}");
            return Ok(());
        }
        if self.sort_keys {
            let keys = pairs.iter().map(|(k, _)| k.clone()).collect();
            let keys = sort_values(self.interp, keys, None, false)?;
            let mut lookup = Dict::new();
            for (k, v) in pairs {
                lookup.insert(k, v)?;
            }
            pairs = Vec::with_capacity(keys.len());
            for k in keys {
                let v = lookup.get(&k)?.unwrap_or(Value::None);
                pairs.push((k, v));
            }
        }
        self.out.push('{');
        for (i, (key, value)) in pairs.iter().enumerate() {
            if i > 0 {
                let sep = self.item_sep.clone();
                self.out.push_str(&sep);
            }
            self.newline(level + 1);
            let key = json_key(key)?;
            self.string(&key);
            let sep = self.key_sep.clone();
            self.out.push_str(&sep);
            self.value(value, level + 1)?;
        }
        self.newline(level);
        self.out.push('}');
        Ok(())
    }

    fn string(&mut self, s: &str) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                '\u{8}' => self.out.push_str("\\b"),
                '\u{c}' => self.out.push_str("\\f"),
                c if (c as u32) < 0x20 => self.out.push_str(&format!("\\u{:04x}", c as u32)),
                c if self.ensure_ascii && !c.is_ascii() => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        self.out.push_str(&format!("\\u{:04x}", unit));
                    }
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }
}

fn json_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        float_repr(f)
    }
}

fn json_key(key: &Value) -> Result<String, Unwind> {
    Ok(match key {
        Value::Str(s) => s.to_string(),
        Value::Int(i) => i.to_string(),
        Value::BigInt(i) => i.to_string(),
        Value::Float(f) => json_float(*f),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::None => "null".to_string(),
        other => {
            return Err(type_error(format!(
                "keys must be str, int, float, bool or None, not {}",
                other.type_name()
            )))
        }
    })
}

fn dumps(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let indent = match args.take_keyword("indent") {
        None | Some(Value::None) => None,
        Some(Value::Int(n)) => Some(" ".repeat(n.max(0) as usize)),
        Some(Value::Str(s)) => Some(s.to_string()),
        Some(other) => {
            return Err(type_error(format!(
                "indent must be int or str, not {}",
                other.type_name()
            )))
        }
    };
    let sort_keys = args.take_keyword("sort_keys").is_some_and(|v| v.truthy());
    let ensure_ascii = args.take_keyword("ensure_ascii").map_or(true, |v| v.truthy());
    let (item_sep, key_sep) = match args.take_keyword("separators") {
        None | Some(Value::None) => {
            let item = if indent.is_some() { "," } else { ", " };
            (item.to_string(), ": ".to_string())
        }
        Some(pair) => {
            let parts = interp.collect(&pair)?;
            let [item, key] = parts.as_slice() else {
                return Err(value_error("separators must be a (item, key) pair"));
            };
            (
                expect_str(item, "item separator")?.to_string(),
                expect_str(key, "key separator")?.to_string(),
            )
        }
    };
    args.no_keywords("dumps")?;
    args.expect("dumps", 1, 1)?;

    let mut writer = Writer {
        interp,
        indent,
        item_sep,
        key_sep,
        sort_keys,
        ensure_ascii,
        active: Vec::new(),
        out: String::new(),
    };
    writer.value(&args.positional[0], 0)?;
    let out = writer.out;
    interp.reserve(out.len())?;
    Ok(Value::string(out))
}

fn loads(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("loads")?;
    args.expect("loads", 1, 1)?;
    let text = expect_str(&args.positional[0], "the JSON object")?;
    let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
        value_error(format!(
            "{e}: line {} column {}",
            e.line(),
            e.column()
        ))
    })?;
    interp.reserve(text.len() * 2)?;
    from_json(&parsed)
}

fn from_json(value: &serde_json::Value) -> NativeResult {
    Ok(match value {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_u64()) {
            (Some(i), _) => Value::Int(i),
            (None, Some(u)) => Value::from_bigint(u.into()),
            _ => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::str(s),
        serde_json::Value::Array(items) => {
            Value::list(items.iter().map(from_json).collect::<Result<_, _>>()?)
        }
        serde_json::Value::Object(map) => {
            let mut dict = Dict::new();
            for (k, v) in map {
                dict.insert(Value::str(k), from_json(v)?)?;
            }
            Value::dict(dict)
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::exception::{ExcKind, Unwind};
    use crate::interp::Interpreter;
    use crate::io::CollectingSink;

    fn output(source: &str) -> String {
        let mut interp = Interpreter::new();
        let sink = CollectingSink::new();
        interp.set_output(Box::new(sink.clone()));
        if let Err(e) = interp.run_source(source) {
            panic!("run failed: {e:?}");
        }
        sink.contents()
    }

    #[test]
    fn test_dumps_matches_python_layout() {
        let src = "\
import json
print(json.dumps({'b': [1, 2.5, None], 'a': (True, 'x')}))
print(json.dumps({'b': 1, 'a': 2}, sort_keys=True))
print(json.dumps([1, {'k': []}], indent=2))
print(json.dumps('caf\u{e9}'), json.dumps('caf\u{e9}', ensure_ascii=False))
print(json.dumps({1: 'one'}, separators=(',', ':')))
";
        assert_eq!(
            output(src),
            "{\"b\": [1, 2.5, null], \"a\": [true, \"x\"]}\n\
             {\"a\": 2, \"b\": 1}\n\
             [\n  1,\n  {\n    \"k\": []\n  }\n]\n\
             \"caf\\u00e9\" \"caf\u{e9}\"\n\
             {\"1\":\"one\"}\n"
        );
    }

    #[test]
    fn test_loads_keeps_document_order() {
        let src = "\
import json
data = json.loads('{\"z\": 1, \"a\": [1.5, \"s\", null, false]}')
print(list(data), data['a'])
";
        assert_eq!(output(src), "['z', 'a'] [1.5, 's', None, False]\n");
    }

    #[test]
    fn test_unserializable_and_malformed() {
        let mut interp = Interpreter::new();
        match interp.run_source("import json\njson.dumps({1, 2})") {
            Err(Unwind::Exception(e)) => {
                assert_eq!(e.kind, ExcKind::TypeError);
                assert_eq!(e.message, "Object of type set is not JSON serializable");
            }
            other => panic!("unexpected {other:?}"),
        }
        let mut interp = Interpreter::new();
        match interp.run_source("import json\njson.loads('{nope')") {
            Err(Unwind::Exception(e)) => assert_eq!(e.kind, ExcKind::ValueError),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_circular_structure_is_rejected() {
        let mut interp = Interpreter::new();
        match interp.run_source("import json\nxs = []\nxs.append(xs)\njson.dumps(xs)") {
            Err(Unwind::Exception(e)) => assert_eq!(e.message, "Circular reference detected"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
