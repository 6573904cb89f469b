//! Builtin functions and types
//!
//! [`catalog`] returns every builtin the runtime implements, including the
//! introspection family (`eval`, `exec`, `getattr`, ...). Hosts decide which of
//! them end up in a snippet's namespace.

use crate::ast::BinOp;
use crate::exception::{type_error, value_error, ExcKind, Unwind};
use crate::format;
use crate::heap::VALUE_SIZE;
use crate::interp::Interpreter;
use crate::ops;
use crate::value::*;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Signed, Zero};
use std::cell::RefCell;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

type NativeResult = Result<Value, Unwind>;

/// Every builtin name the runtime knows about
pub fn catalog() -> HashMap<Rc<str>, Value> {
    let functions: &[(&'static str, NativeFn)] = &[
        ("print", print),
        ("input", input),
        ("len", len),
        ("sorted", sorted),
        ("min", min),
        ("max", max),
        ("sum", sum),
        ("round", round),
        ("abs", abs),
        ("all", all),
        ("any", any),
        ("chr", chr),
        ("ord", ord),
        ("bin", bin),
        ("oct", oct),
        ("hex", hex),
        ("divmod", divmod),
        ("pow", pow),
        ("hash", hash),
        ("id", id),
        ("callable", callable),
        ("repr", repr),
        ("ascii", ascii),
        ("format", format_builtin),
        ("isinstance", isinstance),
        ("issubclass", issubclass),
        ("iter", iter),
        ("next", next),
        ("enumerate", enumerate),
        ("zip", zip),
        ("map", map),
        ("filter", filter),
        ("reversed", reversed),
        ("eval", eval),
        ("exec", exec),
        ("globals", globals),
        ("locals", locals),
        ("vars", vars),
        ("dir", dir),
        ("getattr", getattr),
        ("setattr", setattr),
        ("hasattr", hasattr),
        ("delattr", delattr),
        ("__import__", import),
    ];
    let mut names: HashMap<Rc<str>, Value> = functions
        .iter()
        .map(|(name, func)| (Rc::from(*name), Value::builtin(*name, *func)))
        .collect();
    for tag in [
        TypeTag::Int,
        TypeTag::Float,
        TypeTag::Str,
        TypeTag::Bool,
        TypeTag::List,
        TypeTag::Tuple,
        TypeTag::Dict,
        TypeTag::Set,
        TypeTag::Range,
        TypeTag::Type,
    ] {
        names.insert(Rc::from(tag.name()), Value::Type(tag));
    }
    for kind in ExcKind::ALL {
        names.insert(Rc::from(kind.name()), Value::ExceptionType(kind));
    }
    names
}

// ---- constructors ------------------------------------------------------

/// Call a builtin type, e.g. `int('42')` or `dict(a=1)`
pub fn construct(interp: &mut Interpreter, tag: TypeTag, mut args: Args) -> NativeResult {
    match tag {
        TypeTag::Int => {
            let base = args.take_keyword("base");
            args.no_keywords("int")?;
            args.expect("int", 0, 2)?;
            let base = match (args.get(1), base.as_ref()) {
                (Some(b), _) | (None, Some(b)) => Some(expect_int(b, "base")?),
                (None, None) => None,
            };
            match (args.get(0), base) {
                (None, _) => Ok(Value::Int(0)),
                (Some(Value::Str(s)), base) => parse_int_literal(s, base.unwrap_or(10)),
                (Some(_), Some(_)) => Err(type_error("int() can't convert non-string with explicit base")),
                (Some(v), None) => to_int(v),
            }
        }
        TypeTag::Float => {
            args.no_keywords("float")?;
            args.expect("float", 0, 1)?;
            match args.get(0) {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s).map(Value::Float).ok_or_else(|| {
                    value_error(format!(
                        "could not convert string to float: {}",
                        format::str_repr(s)
                    ))
                }),
                Some(v) => v.as_float().map(Value::Float).ok_or_else(|| {
                    type_error(format!(
                        "float() argument must be a string or a real number, not '{}'",
                        v.type_name()
                    ))
                }),
            }
        }
        TypeTag::Str => {
            args.no_keywords("str")?;
            args.expect("str", 0, 1)?;
            Ok(match args.get(0) {
                None => Value::str(""),
                Some(s @ Value::Str(_)) => s.clone(),
                Some(v) => Value::string(format::to_str(v)),
            })
        }
        TypeTag::Bool => {
            args.no_keywords("bool")?;
            args.expect("bool", 0, 1)?;
            Ok(Value::Bool(args.get(0).is_some_and(Value::truthy)))
        }
        TypeTag::List => {
            args.no_keywords("list")?;
            args.expect("list", 0, 1)?;
            let items = match args.get(0) {
                None => Vec::new(),
                Some(v) => interp.collect(v)?,
            };
            interp.reserve(items.len() * VALUE_SIZE)?;
            Ok(Value::list(items))
        }
        TypeTag::Tuple => {
            args.no_keywords("tuple")?;
            args.expect("tuple", 0, 1)?;
            match args.get(0) {
                None => Ok(Value::tuple(Vec::new())),
                Some(t @ Value::Tuple(_)) => Ok(t.clone()),
                Some(v) => {
                    let items = interp.collect(v)?;
                    interp.reserve(items.len() * VALUE_SIZE)?;
                    Ok(Value::tuple(items))
                }
            }
        }
        TypeTag::Dict => {
            args.expect("dict", 0, 1)?;
            let mut dict = match args.get(0) {
                None => Dict::new(),
                Some(v) => dict_from(interp, v)?,
            };
            for (k, v) in std::mem::take(&mut args.keywords) {
                dict.insert(Value::Str(k), v)?;
            }
            interp.reserve(dict.len() * (2 * VALUE_SIZE + 32))?;
            Ok(Value::dict(dict))
        }
        TypeTag::Set => {
            args.no_keywords("set")?;
            args.expect("set", 0, 1)?;
            let mut set = Dict::new();
            if let Some(v) = args.get(0) {
                for item in interp.collect(v)? {
                    set.insert(item, Value::None)?;
                }
            }
            interp.reserve(set.len() * (2 * VALUE_SIZE + 32))?;
            Ok(Value::set(set))
        }
        TypeTag::Range => {
            args.no_keywords("range")?;
            if args.is_empty() {
                return Err(type_error("range expected at least 1 argument, got 0"));
            }
            if args.len() > 3 {
                return Err(type_error(format!(
                    "range expected at most 3 arguments, got {}",
                    args.len()
                )));
            }
            let mut bounds = Vec::with_capacity(3);
            for v in &args.positional {
                bounds.push(index_int(v)?);
            }
            let (start, stop, step) = match bounds.as_slice() {
                [stop] => (0, *stop, 1),
                [start, stop] => (*start, *stop, 1),
                [start, stop, step] => (*start, *stop, *step),
                _ => unreachable!("argument count checked above"),
            };
            if step == 0 {
                return Err(value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range(Range { start, stop, step }))
        }
        TypeTag::Type => {
            args.no_keywords("type")?;
            match args.positional.as_slice() {
                [v] => Ok(type_of(v)),
                [_, _, _] => Err(type_error("type() with 3 arguments is not supported")),
                _ => Err(type_error("type() takes 1 or 3 arguments")),
            }
        }
        other => Err(type_error(format!(
            "cannot create '{}' instances",
            other.name()
        ))),
    }
}

pub(crate) fn type_of(value: &Value) -> Value {
    match value {
        Value::Exception(e) => Value::ExceptionType(e.kind),
        other => Value::Type(other.type_tag()),
    }
}

fn index_int(v: &Value) -> Result<i64, Unwind> {
    if let Value::BigInt(_) = v {
        return Err(int_too_large());
    }
    v.as_int().ok_or_else(|| {
        type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            v.type_name()
        ))
    })
}

/// Build a dict from a mapping or an iterable of key/value pairs
pub(crate) fn dict_from(interp: &mut Interpreter, source: &Value) -> Result<Dict, Unwind> {
    if let Value::Dict(d) = source {
        return Ok(d.borrow().clone());
    }
    let mut dict = Dict::new();
    for (n, pair) in interp.collect(source)?.into_iter().enumerate() {
        let items = match &pair {
            Value::List(_) | Value::Tuple(_) | Value::Str(_) => interp.collect(&pair)?,
            _ => {
                return Err(type_error(format!(
                    "cannot convert dictionary update sequence element #{n} to a sequence"
                )))
            }
        };
        let [k, v]: [Value; 2] = items.try_into().map_err(|items: Vec<Value>| {
            value_error(format!(
                "dictionary update sequence element #{n} has length {}; 2 is required",
                items.len()
            ))
        })?;
        dict.insert(k, v)?;
    }
    Ok(dict)
}

fn to_int(v: &Value) -> NativeResult {
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::BigInt(_) => Ok(v.clone()),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => float_to_int(*f),
        other => Err(type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

/// Truncate a float to an integer of any size
pub(crate) fn float_to_int(f: f64) -> Result<Value, Unwind> {
    if f.is_nan() {
        return Err(value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Unwind::exc(
            ExcKind::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    let t = f.trunc();
    if t >= i64::MIN as f64 && t < i64::MAX as f64 {
        return Ok(Value::Int(t as i64));
    }
    BigInt::from_f64(t)
        .map(Value::from_bigint)
        .ok_or_else(|| value_error("cannot convert float to integer"))
}

fn parse_int_literal(text: &str, base: i64) -> NativeResult {
    if base != 0 && !(2..=36).contains(&base) {
        return Err(value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    parse_int(text, base as u32).map(Value::from_bigint).ok_or_else(|| {
        value_error(format!(
            "invalid literal for int() with base {base}: {}",
            format::str_repr(text)
        ))
    })
}

/// Parse an integer literal the way `int(text, base)` does; base 0 reads the prefix
pub(crate) fn parse_int(text: &str, base: u32) -> Option<BigInt> {
    let s = text.trim();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let lower = s.to_ascii_lowercase();
    let prefixed = |p: &str| lower.starts_with(p);
    let (base, digits) = match base {
        0 if prefixed("0x") => (16, &s[2..]),
        0 if prefixed("0o") => (8, &s[2..]),
        0 if prefixed("0b") => (2, &s[2..]),
        0 => {
            if s.len() > 1 && s.starts_with('0') && s.chars().any(|c| c != '0' && c != '_') {
                return None;
            }
            (10, s)
        }
        16 if prefixed("0x") => (16, &s[2..]),
        8 if prefixed("0o") => (8, &s[2..]),
        2 if prefixed("0b") => (2, &s[2..]),
        b => (b, s),
    };
    let digits = digits.strip_prefix('_').unwrap_or(digits);
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return None;
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    if !cleaned.chars().all(|c| c.is_digit(base)) {
        return None;
    }
    let magnitude = BigInt::parse_bytes(cleaned.as_bytes(), base)?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Parse text the way `float(text)` does
pub(crate) fn parse_float(text: &str) -> Option<f64> {
    let s = text.trim();
    let (sign, body) = match s.as_bytes().first() {
        Some(b'-') => (-1.0, &s[1..]),
        Some(b'+') => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    match body.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => return Some(sign * f64::INFINITY),
        "nan" => return Some(f64::NAN),
        _ => {}
    }
    if body.is_empty()
        || body.starts_with('_')
        || body.ends_with('_')
        || body.contains("__")
        || !body.chars().all(|c| c.is_ascii_digit() || "._eE+-".contains(c))
    {
        return None;
    }
    let cleaned: String = body.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f64>().ok().map(|f| sign * f)
}

// ---- I/O -----------------------------------------------------------------

fn print(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let sep = match args.take_keyword("sep") {
        None | Some(Value::None) => " ".to_string(),
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => {
            return Err(type_error(format!(
                "sep must be None or a string, not {}",
                other.type_name()
            )))
        }
    };
    let end = match args.take_keyword("end") {
        None | Some(Value::None) => "\n".to_string(),
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => {
            return Err(type_error(format!(
                "end must be None or a string, not {}",
                other.type_name()
            )))
        }
    };
    if let Some(file) = args.take_keyword("file") {
        if !file.is_none() {
            return Err(type_error("print() can only write to standard output"));
        }
    }
    args.take_keyword("flush");
    args.no_keywords("print")?;
    let mut line = String::new();
    for (i, value) in args.positional.iter().enumerate() {
        if i > 0 {
            line.push_str(&sep);
        }
        line.push_str(&format::to_str(value));
    }
    line.push_str(&end);
    interp.write_output(&line)?;
    Ok(Value::None)
}

fn input(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("input")?;
    args.expect("input", 0, 1)?;
    let prompt = args.get(0).map(format::to_str).unwrap_or_default();
    let line = interp.read_input(&prompt)?;
    interp.reserve(line.len())?;
    Ok(Value::string(line))
}

// ---- sequences -----------------------------------------------------------

pub(crate) fn length(value: &Value) -> Result<usize, Unwind> {
    Ok(match value {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(d) | Value::Set(d) => d.borrow().len(),
        Value::Range(r) => r.len(),
        other => {
            return Err(type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    })
}

fn len(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("len")?;
    args.expect("len", 1, 1)?;
    Ok(Value::Int(length(&args.positional[0])? as i64))
}

/// Stable merge sort with fallible comparisons, shared by `sorted` and `list.sort`
pub(crate) fn sort_values(
    interp: &mut Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Result<Vec<Value>, Unwind> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(f) if !f.is_none() => interp.call(f, Args::new(vec![item.clone()]))?,
            _ => item.clone(),
        };
        keyed.push((k, item));
    }
    let n = keyed.len();
    let mut width = 1;
    while width < n {
        let mut merged = Vec::with_capacity(n);
        let mut start = 0;
        while start < n {
            let mid = (start + width).min(n);
            let end = (start + 2 * width).min(n);
            let (mut i, mut j) = (start, mid);
            while i < mid && j < end {
                interp.checkpoint()?;
                let right_first = if reverse {
                    ops::py_lt(&keyed[i].0, &keyed[j].0)?
                } else {
                    ops::py_lt(&keyed[j].0, &keyed[i].0)?
                };
                if right_first {
                    merged.push(keyed[j].clone());
                    j += 1;
                } else {
                    merged.push(keyed[i].clone());
                    i += 1;
                }
            }
            merged.extend_from_slice(&keyed[i..mid]);
            merged.extend_from_slice(&keyed[j..end]);
            start = end;
        }
        keyed = merged;
        width *= 2;
    }
    Ok(keyed.into_iter().map(|(_, v)| v).collect())
}

fn sorted(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let key = args.take_keyword("key");
    let reverse = args.take_keyword("reverse").is_some_and(|r| r.truthy());
    args.no_keywords("sorted")?;
    if args.len() != 1 {
        return Err(type_error(format!(
            "sorted expected 1 argument, got {}",
            args.len()
        )));
    }
    let items = interp.collect(&args.positional[0])?;
    interp.reserve(items.len() * VALUE_SIZE)?;
    Ok(Value::list(sort_values(interp, items, key.as_ref(), reverse)?))
}

fn extreme(interp: &mut Interpreter, mut args: Args, name: &str, want_greater: bool) -> NativeResult {
    let key = args.take_keyword("key").filter(|k| !k.is_none());
    let default = args.take_keyword("default");
    args.no_keywords(name)?;
    let candidates = match args.positional.len() {
        0 => {
            return Err(type_error(format!(
                "{name} expected at least 1 argument, got 0"
            )))
        }
        1 => interp.collect(&args.positional[0])?,
        _ => {
            if default.is_some() {
                return Err(type_error(format!(
                    "Cannot specify a default for {name}() with multiple positional arguments"
                )));
            }
            std::mem::take(&mut args.positional)
        }
    };
    let mut best: Option<(Value, Value)> = None;
    for item in candidates {
        interp.checkpoint()?;
        let k = match &key {
            Some(f) => interp.call(f, Args::new(vec![item.clone()]))?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => {
                if want_greater {
                    ops::py_lt(best_key, &k)?
                } else {
                    ops::py_lt(&k, best_key)?
                }
            }
        };
        if replace {
            best = Some((k, item));
        }
    }
    match (best, default) {
        (Some((_, v)), _) => Ok(v),
        (None, Some(d)) => Ok(d),
        (None, None) => Err(value_error(format!("{name}() iterable argument is empty"))),
    }
}

fn min(interp: &mut Interpreter, args: Args) -> NativeResult {
    extreme(interp, args, "min", false)
}

fn max(interp: &mut Interpreter, args: Args) -> NativeResult {
    extreme(interp, args, "max", true)
}

fn sum(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let start_kw = args.take_keyword("start");
    args.no_keywords("sum")?;
    args.expect("sum", 1, 2)?;
    let start = args.get(1).cloned().or(start_kw).unwrap_or(Value::Int(0));
    if matches!(start, Value::Str(_)) {
        return Err(type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    let items = interp.collect(&args.positional[0])?;
    let mut total = start;
    // compensated float accumulation, as CPython does
    let mut compensation = 0.0f64;
    let mut float_mode = false;
    for item in items {
        interp.checkpoint()?;
        match (&total, &item) {
            (Value::Float(acc), Value::Float(_) | Value::Int(_) | Value::Bool(_)) => {
                let x = item.as_float().unwrap_or(0.0);
                let t = acc + x;
                if acc.abs() >= x.abs() {
                    compensation += (acc - t) + x;
                } else {
                    compensation += (x - t) + acc;
                }
                total = Value::Float(t);
                float_mode = true;
            }
            _ => {
                if float_mode {
                    if let Value::Float(acc) = total {
                        total = Value::Float(acc + compensation);
                    }
                    compensation = 0.0;
                    float_mode = false;
                }
                total = ops::binary_op(interp, BinOp::Add, &total, &item)?;
            }
        }
    }
    if float_mode {
        if let Value::Float(acc) = total {
            if compensation.is_finite() {
                total = Value::Float(acc + compensation);
            }
        }
    }
    Ok(total)
}

// ---- numbers ---------------------------------------------------------------

fn round(_interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let ndigits_kw = args.take_keyword("ndigits");
    args.no_keywords("round")?;
    args.expect("round", 1, 2)?;
    let ndigits = match args.get(1).cloned().or(ndigits_kw) {
        None | Some(Value::None) => None,
        Some(v) => Some(index_int(&v)?),
    };
    match (&args.positional[0], ndigits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()),
        (Value::Float(f), Some(n)) => Ok(Value::Float(round_float(*f, n))),
        (v, None) if v.is_int() => Ok(Value::from_bigint(v.as_bigint().unwrap_or_default())),
        (v, Some(n)) if v.is_int() => Ok(Value::from_bigint(round_int(
            v.as_bigint().unwrap_or_default(),
            n,
        ))),
        (other, _) => Err(type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn round_int(i: BigInt, ndigits: i64) -> BigInt {
    if ndigits >= 0 {
        return i;
    }
    let digits = ndigits.unsigned_abs();
    if digits > i.bits() {
        return BigInt::zero();
    }
    let scale = BigInt::from(10).pow(digits as u32);
    let (quotient, remainder) = i.div_mod_floor(&scale);
    let doubled = remainder * 2;
    let rounded = if doubled > scale || (doubled == scale && quotient.is_odd()) {
        quotient + 1
    } else {
        quotient
    };
    rounded * scale
}

/// Round half to even on the exact binary value, like `round(x, n)`
pub(crate) fn round_float(f: f64, ndigits: i64) -> f64 {
    if !f.is_finite() {
        return f;
    }
    if ndigits > 308 {
        return f;
    }
    if ndigits >= 0 {
        let text = format!("{:.*}", ndigits as usize, f);
        return text.parse().unwrap_or(f);
    }
    if ndigits < -308 {
        return 0.0 * f.signum();
    }
    let scale = 10f64.powi((-ndigits) as i32);
    (f / scale).round_ties_even() * scale
}

fn abs(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("abs")?;
    args.expect("abs", 1, 1)?;
    match &args.positional[0] {
        Value::Int(i) => Ok(match i.checked_abs() {
            Some(a) => Value::Int(a),
            None => Value::from_bigint(BigInt::from(*i).abs()),
        }),
        Value::BigInt(i) => Ok(Value::from_bigint(i.abs())),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn divmod(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("divmod")?;
    args.expect("divmod", 2, 2)?;
    let (a, b) = (&args.positional[0], &args.positional[1]);
    match (a, b) {
        _ if a.is_int() && b.is_int() => Ok(Value::tuple(vec![
            ops::binary_op(interp, BinOp::FloorDiv, a, b)?,
            ops::binary_op(interp, BinOp::Mod, a, b)?,
        ])),
        _ if a.is_number() && b.is_number() => {
            let (x, y) = (a.as_float().unwrap_or(0.0), b.as_float().unwrap_or(0.0));
            if y == 0.0 {
                return Err(Unwind::exc(ExcKind::ZeroDivisionError, "division by zero"));
            }
            Ok(Value::tuple(vec![
                Value::Float(ops::float_floordiv(x, y)?),
                Value::Float(ops::float_mod(x, y)?),
            ]))
        }
        _ => Err(type_error(format!(
            "unsupported operand type(s) for divmod(): '{}' and '{}'",
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn pow(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let modulus_kw = args.take_keyword("mod");
    args.no_keywords("pow")?;
    args.expect("pow", 2, 3)?;
    let modulus = args.get(2).cloned().or(modulus_kw).filter(|m| !m.is_none());
    let (base, exp) = (args.positional[0].clone(), args.positional[1].clone());
    let Some(modulus) = modulus else {
        return ops::binary_op(interp, BinOp::Pow, &base, &exp);
    };
    let (Some(b), Some(e), Some(m)) = (base.as_bigint(), exp.as_bigint(), modulus.as_bigint())
    else {
        return Err(type_error(
            "pow() 3rd argument not allowed unless all arguments are integers",
        ));
    };
    if m.is_zero() {
        return Err(value_error("pow() 3rd argument cannot be 0"));
    }
    if e.is_negative() {
        return Err(value_error(
            "pow() 2nd argument cannot be negative when 3rd argument specified",
        ));
    }
    Ok(Value::from_bigint(b.modpow(&e, &m)))
}

fn int_in_base(args: &Args, name: &str, prefix: &str, radix: u32) -> NativeResult {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    let value = &args.positional[0];
    let i = value.as_bigint().ok_or_else(|| {
        type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })?;
    let magnitude = i.magnitude();
    let digits = match radix {
        2 => format!("{magnitude:b}"),
        8 => format!("{magnitude:o}"),
        _ => format!("{magnitude:x}"),
    };
    let sign = if i.is_negative() { "-" } else { "" };
    Ok(Value::string(format!("{sign}{prefix}{digits}")))
}

fn bin(_interp: &mut Interpreter, args: Args) -> NativeResult {
    int_in_base(&args, "bin", "0b", 2)
}

fn oct(_interp: &mut Interpreter, args: Args) -> NativeResult {
    int_in_base(&args, "oct", "0o", 8)
}

fn hex(_interp: &mut Interpreter, args: Args) -> NativeResult {
    int_in_base(&args, "hex", "0x", 16)
}

fn chr(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("chr")?;
    args.expect("chr", 1, 1)?;
    let code = index_int(&args.positional[0])?;
    u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map(|c| Value::string(c.to_string()))
        .ok_or_else(|| value_error("chr() arg not in range(0x110000)"))
}

fn ord(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("ord")?;
    args.expect("ord", 1, 1)?;
    let Value::Str(s) = &args.positional[0] else {
        return Err(type_error(format!(
            "ord() expected string of length 1, but {} found",
            args.positional[0].type_name()
        )));
    };
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(Value::Int(c as i64)),
        _ => Err(type_error(format!(
            "ord() expected a character, but string of length {} found",
            s.chars().count()
        ))),
    }
}

// ---- predicates and identity -------------------------------------------------

fn all(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("all")?;
    args.expect("all", 1, 1)?;
    let mut items = interp.iter_value(&args.positional[0])?;
    while let Some(item) = items.next() {
        interp.checkpoint()?;
        if !item.truthy() {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn any(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("any")?;
    args.expect("any", 1, 1)?;
    let mut items = interp.iter_value(&args.positional[0])?;
    while let Some(item) = items.next() {
        interp.checkpoint()?;
        if item.truthy() {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn hash(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("hash")?;
    args.expect("hash", 1, 1)?;
    match args.positional[0].hash_key()? {
        HashKey::Int(i) => Ok(Value::Int(i)),
        key => {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            Ok(Value::Int(hasher.finish() as i64))
        }
    }
}

fn id(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("id")?;
    args.expect("id", 1, 1)?;
    let value = &args.positional[0];
    let addr = match value {
        Value::List(v) => Rc::as_ptr(v) as *const () as usize,
        Value::Dict(d) | Value::Set(d) => Rc::as_ptr(d) as *const () as usize,
        Value::Tuple(t) => Rc::as_ptr(t) as *const () as usize,
        Value::Str(s) => s.as_ptr() as usize,
        other => match other.hash_key()? {
            HashKey::Ident(ptr) => ptr,
            key => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                hasher.finish() as usize >> 1
            }
        },
    };
    Ok(Value::Int(addr as i64))
}

fn callable(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("callable")?;
    args.expect("callable", 1, 1)?;
    Ok(Value::Bool(matches!(
        args.positional[0],
        Value::Function(_)
            | Value::Builtin(_)
            | Value::Method(_)
            | Value::Type(_)
            | Value::ExceptionType(_)
    )))
}

fn repr(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("repr")?;
    args.expect("repr", 1, 1)?;
    Ok(Value::string(format::repr(&args.positional[0])))
}

fn ascii(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("ascii")?;
    args.expect("ascii", 1, 1)?;
    let mut out = String::new();
    for c in format::repr(&args.positional[0]).chars() {
        match c as u32 {
            0..=0x7f => out.push(c),
            n @ 0x80..=0xff => out.push_str(&format!("\\x{n:02x}")),
            n @ 0x100..=0xffff => out.push_str(&format!("\\u{n:04x}")),
            n => out.push_str(&format!("\\U{n:08x}")),
        }
    }
    Ok(Value::string(out))
}

fn format_builtin(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("format")?;
    args.expect("format", 1, 2)?;
    let spec = match args.get(1) {
        None => "",
        Some(v) => expect_str(v, "format() argument 2")?,
    };
    Ok(Value::string(format::format_value(&args.positional[0], spec)?))
}

fn class_matches(value: &Value, class: &Value) -> Result<bool, Unwind> {
    match class {
        Value::Type(tag) => Ok(value.type_tag().is_subtype_of(*tag)),
        Value::ExceptionType(kind) => Ok(matches!(value, Value::Exception(e) if e.kind.is_subclass_of(*kind))),
        Value::Tuple(options) => {
            for option in options.iter() {
                if class_matches(value, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(type_error(
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        )),
    }
}

fn isinstance(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("isinstance")?;
    args.expect("isinstance", 2, 2)?;
    Ok(Value::Bool(class_matches(
        &args.positional[0],
        &args.positional[1],
    )?))
}

fn issubclass(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("issubclass")?;
    args.expect("issubclass", 2, 2)?;
    fn check(sub: &Value, sup: &Value) -> Result<bool, Unwind> {
        match (sub, sup) {
            (_, Value::Tuple(options)) => {
                for option in options.iter() {
                    if check(sub, option)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            (Value::Type(a), Value::Type(b)) => Ok(a.is_subtype_of(*b)),
            (Value::ExceptionType(a), Value::ExceptionType(b)) => Ok(a.is_subclass_of(*b)),
            (Value::Type(_), Value::ExceptionType(_)) | (Value::ExceptionType(_), Value::Type(_)) => Ok(false),
            _ => Err(type_error("issubclass() arg 1 must be a class")),
        }
    }
    Ok(Value::Bool(check(&args.positional[0], &args.positional[1])?))
}

// ---- iteration ---------------------------------------------------------------

fn iterator_name(value: &Value) -> &'static str {
    match value {
        Value::List(_) => "list_iterator",
        Value::Tuple(_) => "tuple_iterator",
        Value::Str(_) => "str_iterator",
        Value::Dict(_) => "dict_keyiterator",
        Value::Set(_) => "set_iterator",
        Value::Range(_) => "range_iterator",
        _ => "iterator",
    }
}

fn wrap_iterator(name: &'static str, source: IterSource) -> Value {
    Value::Iterator(Rc::new(RefCell::new(Iter { name, source })))
}

fn iter(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("iter")?;
    args.expect("iter", 1, 1)?;
    let value = &args.positional[0];
    if let Value::Iterator(_) = value {
        return Ok(value.clone());
    }
    let source = interp.iter_value(value)?;
    Ok(wrap_iterator(iterator_name(value), source))
}

fn next(_interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("next")?;
    args.expect("next", 1, 2)?;
    let Value::Iterator(it) = &args.positional[0] else {
        return Err(type_error(format!(
            "'{}' object is not an iterator",
            args.positional[0].type_name()
        )));
    };
    let item = it.borrow_mut().source.next();
    match (item, args.get(1)) {
        (Some(v), _) => Ok(v),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(Unwind::exc(ExcKind::StopIteration, "")),
    }
}

fn enumerate(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let start_kw = args.take_keyword("start");
    args.no_keywords("enumerate")?;
    args.expect("enumerate", 1, 2)?;
    let mut n = match args.get(1).cloned().or(start_kw) {
        None => 0,
        Some(v) => index_int(&v)?,
    };
    let items = interp.collect(&args.positional[0])?;
    interp.reserve(items.len() * 3 * VALUE_SIZE)?;
    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        pairs.push(Value::tuple(vec![Value::Int(n), item]));
        n = n.saturating_add(1);
    }
    Ok(Value::iterator("enumerate", pairs))
}

fn zip(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let strict = args.take_keyword("strict").is_some_and(|s| s.truthy());
    args.no_keywords("zip")?;
    let mut columns = Vec::with_capacity(args.len());
    for value in &args.positional {
        columns.push(interp.collect(value)?);
    }
    let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
    if strict && columns.iter().any(|c| c.len() != shortest) {
        return Err(value_error("zip() arguments have different lengths"));
    }
    interp.reserve(shortest * (columns.len() + 1) * VALUE_SIZE)?;
    let rows = (0..shortest)
        .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
        .collect();
    Ok(Value::iterator("zip", rows))
}

fn map(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("map")?;
    if args.len() < 2 {
        return Err(type_error("map() must have at least two arguments."));
    }
    let func = args.positional[0].clone();
    let mut columns = Vec::with_capacity(args.len() - 1);
    for value in &args.positional[1..] {
        columns.push(interp.collect(value)?);
    }
    let shortest = columns.iter().map(Vec::len).min().unwrap_or(0);
    let out = Rc::new(RefCell::new(Vec::with_capacity(shortest)));
    interp.rooted(Value::List(out.clone()), |interp| {
        for i in 0..shortest {
            let call_args = columns.iter().map(|c| c[i].clone()).collect();
            let mapped = interp.call(&func, Args::new(call_args))?;
            out.borrow_mut().push(mapped);
        }
        interp.reserve(shortest * VALUE_SIZE)
    })?;
    let out = std::mem::take(&mut *out.borrow_mut());
    Ok(Value::iterator("map", out))
}

fn filter(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("filter")?;
    args.expect("filter", 2, 2)?;
    let func = args.positional[0].clone();
    let items = interp.collect(&args.positional[1])?;
    let mut out = Vec::new();
    for item in items {
        let keep = if func.is_none() {
            item.truthy()
        } else {
            interp.call(&func, Args::new(vec![item.clone()]))?.truthy()
        };
        if keep {
            out.push(item);
        }
    }
    interp.reserve(out.len() * VALUE_SIZE)?;
    Ok(Value::iterator("filter", out))
}

fn reversed(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("reversed")?;
    args.expect("reversed", 1, 1)?;
    let value = &args.positional[0];
    if let Value::Range(r) = value {
        let last = match r.len() {
            0 => r.start,
            n => r.get(n - 1).unwrap_or(r.start),
        };
        let source = if r.is_empty() {
            IterSource::Items(Vec::new().into_iter())
        } else {
            IterSource::Range {
                next: last,
                stop: r.start.saturating_sub(r.step),
                step: -r.step,
            }
        };
        return Ok(wrap_iterator("range_iterator", source));
    }
    match value {
        Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Dict(_) => {
            let mut items = interp.collect(value)?;
            items.reverse();
            let name = match value {
                Value::List(_) => "list_reverseiterator",
                Value::Dict(_) => "dict_reversekeyiterator",
                _ => "reversed",
            };
            Ok(Value::iterator(name, items))
        }
        other => Err(type_error(format!(
            "'{}' object is not reversible",
            other.type_name()
        ))),
    }
}

// ---- introspection and dynamic evaluation ------------------------------------

fn source_arg<'a>(args: &'a Args, name: &str) -> Result<&'a str, Unwind> {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    args.positional[0].as_str().ok_or_else(|| {
        type_error(format!(
            "{name}() arg 1 must be a string, bytes or code object"
        ))
    })
}

fn eval(interp: &mut Interpreter, args: Args) -> NativeResult {
    let source = source_arg(&args, "eval")?.to_string();
    interp.eval_source(source.trim())
}

fn exec(interp: &mut Interpreter, args: Args) -> NativeResult {
    let source = source_arg(&args, "exec")?.to_string();
    interp.exec_source(&source)?;
    Ok(Value::None)
}

fn names_to_dict(names: Vec<(Rc<str>, Value)>) -> Result<Value, Unwind> {
    let mut dict = Dict::new();
    for (k, v) in names {
        dict.insert(Value::Str(k), v)?;
    }
    Ok(Value::dict(dict))
}

fn globals(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("globals")?;
    args.expect("globals", 0, 0)?;
    names_to_dict(interp.global_names())
}

fn locals(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("locals")?;
    args.expect("locals", 0, 0)?;
    names_to_dict(interp.local_names())
}

fn vars(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("vars")?;
    args.expect("vars", 0, 1)?;
    match args.get(0) {
        None => names_to_dict(interp.local_names()),
        Some(Value::Module(m)) => {
            let mut names: Vec<(Rc<str>, Value)> = m
                .attrs
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            names.sort_by(|a, b| a.0.cmp(&b.0));
            names_to_dict(names)
        }
        Some(_) => Err(type_error("vars() argument must have __dict__ attribute")),
    }
}

fn dir(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("dir")?;
    args.expect("dir", 0, 1)?;
    let mut names: Vec<String> = match args.get(0) {
        None => interp
            .local_names()
            .into_iter()
            .map(|(k, _)| k.to_string())
            .collect(),
        Some(Value::Module(m)) => m.attrs.borrow().keys().map(|k| k.to_string()).collect(),
        Some(v) => crate::methods::method_names(v)
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };
    names.sort();
    Ok(Value::list(names.into_iter().map(Value::string).collect()))
}

fn attr_name<'a>(args: &'a Args, name: &str) -> Result<&'a str, Unwind> {
    args.positional[1].as_str().ok_or_else(|| {
        type_error(format!(
            "{name}(): attribute name must be string, not '{}'",
            args.positional[1].type_name()
        ))
    })
}

fn getattr(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("getattr")?;
    args.expect("getattr", 2, 3)?;
    let name = attr_name(&args, "getattr")?;
    match interp.get_attr(&args.positional[0], name) {
        Err(Unwind::Exception(e)) if e.kind == ExcKind::AttributeError && args.len() == 3 => {
            Ok(args.positional[2].clone())
        }
        other => other,
    }
}

fn setattr(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("setattr")?;
    args.expect("setattr", 3, 3)?;
    let name = attr_name(&args, "setattr")?;
    interp.set_attr(&args.positional[0], name, args.positional[2].clone())?;
    Ok(Value::None)
}

fn hasattr(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("hasattr")?;
    args.expect("hasattr", 2, 2)?;
    let name = attr_name(&args, "hasattr")?;
    match interp.get_attr(&args.positional[0], name) {
        Ok(_) => Ok(Value::Bool(true)),
        Err(Unwind::Exception(e)) if e.kind == ExcKind::AttributeError => Ok(Value::Bool(false)),
        Err(e) => Err(e),
    }
}

fn delattr(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("delattr")?;
    args.expect("delattr", 2, 2)?;
    let name = attr_name(&args, "delattr")?;
    interp.del_attr(&args.positional[0], name)?;
    Ok(Value::None)
}

fn import(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let level = match args.take_keyword("level") {
        None => 0,
        Some(v) => index_int(&v)?.max(0) as usize,
    };
    for key in ["globals", "locals", "fromlist"] {
        args.take_keyword(key);
    }
    args.no_keywords("__import__")?;
    args.expect("__import__", 1, 5)?;
    let name = expect_str(&args.positional[0], "__import__() argument 1")?.to_string();
    let module = interp.import_module(&name, level)?;
    match name.split_once('.') {
        Some((top, _)) => interp.import_module(top, level),
        None => Ok(module),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::CollectingSink;

    fn eval_str(source: &str) -> String {
        let mut interp = Interpreter::new();
        let sink = CollectingSink::new();
        interp.set_output(Box::new(sink.clone()));
        if let Err(e) = interp.run_source(source) {
            panic!("run failed: {e:?}");
        }
        sink.contents()
    }

    fn error_of(source: &str) -> (ExcKind, String) {
        let mut interp = Interpreter::new();
        match interp.run_source(source) {
            Err(Unwind::Exception(e)) => (e.kind, e.message),
            other => panic!("expected exception, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_int_literals() {
        let int = |i: i64| Some(BigInt::from(i));
        assert_eq!(parse_int(" 42 ", 10), int(42));
        assert_eq!(parse_int("-1_000", 10), int(-1000));
        assert_eq!(parse_int("0x1F", 16), int(31));
        assert_eq!(parse_int("0b101", 0), int(5));
        assert_eq!(parse_int("ff", 16), int(255));
        assert_eq!(parse_int("1__0", 10), None);
        assert_eq!(parse_int("12a", 10), None);
        assert_eq!(parse_int("--5", 10), None);
        assert_eq!(parse_int("-9223372036854775808", 10), int(i64::MIN));
        assert_eq!(
            parse_int("9223372036854775808", 10),
            Some(BigInt::from(i64::MAX) + 1)
        );
    }

    #[test]
    fn test_parse_float_literals() {
        assert_eq!(parse_float(" 3.5 "), Some(3.5));
        assert_eq!(parse_float("1e3"), Some(1000.0));
        assert_eq!(parse_float("-inf"), Some(f64::NEG_INFINITY));
        assert!(parse_float("nan").is_some_and(f64::is_nan));
        assert_eq!(parse_float("abc"), None);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(
            eval_str("print(int('12'), int(3.9), int(-3.9), float('2.5'), str(10), bool([]))"),
            "12 3 -3 2.5 10 False\n"
        );
        assert_eq!(
            error_of("int('abc')"),
            (
                ExcKind::ValueError,
                "invalid literal for int() with base 10: 'abc'".to_string()
            )
        );
        assert_eq!(
            eval_str("print(list('ab'), tuple([1]), dict([('a', 1)], b=2), sorted(set([3, 1, 3])))"),
            "['a', 'b'] (1,) {'a': 1, 'b': 2} [1, 3]\n"
        );
    }

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(
            eval_str("print(round(2.5), round(3.5), round(-0.5), round(2.675, 2), round(1234, -2), round(1250, -2))"),
            "2 4 0 2.67 1200 1200\n"
        );
    }

    #[test]
    fn test_sorted_is_stable_and_reverses_stably() {
        let src = "\
pairs = [('b', 2), ('a', 1), ('c', 2), ('d', 1)]
print(sorted(pairs, key=lambda p: p[1]))
print(sorted(pairs, key=lambda p: p[1], reverse=True))
print(sorted('banana'))
";
        assert_eq!(
            eval_str(src),
            "[('a', 1), ('d', 1), ('b', 2), ('c', 2)]\n[('b', 2), ('c', 2), ('a', 1), ('d', 1)]\n['a', 'a', 'a', 'b', 'n', 'n']\n"
        );
        assert_eq!(error_of("sorted([1, 'a'])").0, ExcKind::TypeError);
    }

    #[test]
    fn test_min_max_sum() {
        assert_eq!(
            eval_str("print(min(3, 1, 2), max([1, 5, 2]), max(['aa', 'b'], key=len), min([], default=0), sum([1, 2, 3], 10))"),
            "1 5 aa 0 16\n"
        );
        assert_eq!(eval_str("print(sum([0.1] * 10))"), "1.0\n");
        assert_eq!(error_of("max([])").0, ExcKind::ValueError);
    }

    #[test]
    fn test_iteration_helpers() {
        let src = "\
print(list(enumerate('ab', 1)))
print(list(zip([1, 2, 3], 'xy')))
print(list(map(lambda a, b: a * b, [1, 2], [3, 4])))
print(list(filter(None, [0, 1, '', 'a'])))
print(list(reversed(range(1, 10, 3))), list(reversed([1, 2])))
it = iter([1, 2])
print(next(it), next(it), next(it, 'done'))
";
        assert_eq!(
            eval_str(src),
            "[(1, 'a'), (2, 'b')]\n[(1, 'x'), (2, 'y')]\n[3, 8]\n[1, 'a']\n[7, 4, 1] [2, 1]\n1 2 done\n"
        );
        assert_eq!(error_of("next(iter([]))").0, ExcKind::StopIteration);
    }

    #[test]
    fn test_number_helpers() {
        assert_eq!(
            eval_str("print(abs(-3), divmod(7, -2), pow(3, 4, 5), bin(-5), hex(255), oct(8), chr(65), ord('a'))"),
            "3 (-4, -1) 1 -0b101 0xff 0o10 A 97\n"
        );
    }

    #[test]
    fn test_int_with_explicit_base() {
        assert_eq!(
            eval_str("print(int('ff', 16), int('ff', base=16), int('0b101', 0), int('z', 36))"),
            "255 255 5 35\n"
        );
        let (kind, message) = error_of("int(5, 16)");
        assert_eq!(kind, ExcKind::TypeError);
        assert_eq!(message, "int() can't convert non-string with explicit base");
    }

    #[test]
    fn test_integers_past_64_bits() {
        let src = "\
print(2 ** 100)
print(10 ** 18 * 10)
big = 99999999999999999999999
print(big + 1, -big // 7, big % 1000, abs(-big))
print(int('123456789012345678901234567890') * 2, hex(2 ** 70), 2 ** 64 > 1.5e19)
print(divmod(2 ** 65, 3), pow(2, 100, 10 ** 9 + 7), round(123456789012345678901, -5))
print(int(1e20), (2 ** 64).bit_length(), {2 ** 64: 'k'}[18446744073709551616])
print(2 ** 64 - 2 ** 64 + 5, type(2 ** 64) is int)
";
        assert_eq!(
            eval_str(src),
            "1267650600228229401496703205376\n\
             10000000000000000000\n\
             100000000000000000000000 -14285714285714285714286 999 99999999999999999999999\n\
             246913578024691357802469135780 0x400000000000000000 True\n\
             (12297829382473034410, 2) 976371285 123456789012345700000\n\
             100000000000000000000 65 k\n\
             5 True\n"
        );
        assert_eq!(error_of("x = 2 ** (2 ** 40)").0, ExcKind::OverflowError);
    }

    #[test]
    fn test_isinstance_and_type() {
        assert_eq!(
            eval_str("print(isinstance(True, int), isinstance(1.0, (int, str)), type(3) is int, isinstance(ValueError('x'), Exception))"),
            "True False True True\n"
        );
    }

    #[test]
    fn test_introspection_builtins_work_when_present() {
        assert_eq!(
            eval_str("x = 2\nprint(eval('x * 21'), getattr('a', 'missing', 'fallback'), hasattr([], 'append'))"),
            "42 fallback True\n"
        );
        assert_eq!(eval_str("exec('y = 5')\nprint(y, 'y' in globals())"), "5 True\n");
    }
}
