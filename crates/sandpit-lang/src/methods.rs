//! Methods of the builtin types
//!
//! Attribute lookup on a builtin value produces a bound [`Method`]; calling
//! it lands in [`call_method`], which dispatches on the receiver's type.
//!
//! [`Method`]: crate::value::Method

use crate::ast::BinOp;
use crate::builtins;
use crate::exception::{type_error, value_error, ExcKind, Unwind};
use crate::format;
use crate::heap::VALUE_SIZE;
use crate::interp::{slice_bounds, Interpreter};
use crate::ops;
use crate::value::*;
use std::cell::RefCell;
use std::rc::Rc;

type NativeResult = Result<Value, Unwind>;

const STR_METHODS: &[&str] = &[
    "capitalize",
    "casefold",
    "center",
    "count",
    "endswith",
    "find",
    "format",
    "index",
    "isalnum",
    "isalpha",
    "isdecimal",
    "isdigit",
    "islower",
    "isnumeric",
    "isspace",
    "istitle",
    "isupper",
    "join",
    "ljust",
    "lower",
    "lstrip",
    "partition",
    "removeprefix",
    "removesuffix",
    "replace",
    "rfind",
    "rindex",
    "rjust",
    "rpartition",
    "rsplit",
    "rstrip",
    "split",
    "splitlines",
    "startswith",
    "strip",
    "swapcase",
    "title",
    "upper",
    "zfill",
];

const LIST_METHODS: &[&str] = &[
    "append", "clear", "copy", "count", "extend", "index", "insert", "pop", "remove", "reverse",
    "sort",
];

const TUPLE_METHODS: &[&str] = &["count", "index"];

const DICT_METHODS: &[&str] = &[
    "clear",
    "copy",
    "fromkeys",
    "get",
    "items",
    "keys",
    "pop",
    "popitem",
    "setdefault",
    "update",
    "values",
];

const SET_METHODS: &[&str] = &[
    "add",
    "clear",
    "copy",
    "difference",
    "difference_update",
    "discard",
    "intersection",
    "intersection_update",
    "isdisjoint",
    "issubset",
    "issuperset",
    "pop",
    "remove",
    "symmetric_difference",
    "union",
    "update",
];

fn names_for_tag(tag: TypeTag) -> &'static [&'static str] {
    match tag {
        TypeTag::Str => STR_METHODS,
        TypeTag::List => LIST_METHODS,
        TypeTag::Tuple => TUPLE_METHODS,
        TypeTag::Dict => DICT_METHODS,
        TypeTag::Set => SET_METHODS,
        TypeTag::Int | TypeTag::Bool => &["bit_length"],
        TypeTag::Float => &["is_integer"],
        _ => &[],
    }
}

/// Method names available on `value`, as listed by `dir()`
pub fn method_names(value: &Value) -> &'static [&'static str] {
    match value {
        Value::Type(tag) => names_for_tag(*tag),
        other => names_for_tag(other.type_tag()),
    }
}

pub fn has_method(value: &Value, name: &str) -> bool {
    method_names(value).contains(&name)
}

pub fn call_method(interp: &mut Interpreter, receiver: &Value, name: &str, mut args: Args) -> NativeResult {
    match receiver {
        Value::Type(TypeTag::Dict) if name == "fromkeys" => dict_fromkeys(interp, args),
        Value::Type(tag) => {
            // unbound form, e.g. `str.upper('x')`
            if args.positional.is_empty() {
                return Err(type_error(format!(
                    "unbound method {}.{name}() needs an argument",
                    tag.name()
                )));
            }
            let target = args.positional.remove(0);
            if !target.type_tag().is_subtype_of(*tag) {
                return Err(type_error(format!(
                    "descriptor '{name}' for '{}' objects doesn't apply to a '{}' object",
                    tag.name(),
                    target.type_name()
                )));
            }
            call_method(interp, &target, name, args)
        }
        Value::Str(s) => str_method(interp, s, name, args),
        Value::List(items) => list_method(interp, receiver, items, name, args),
        Value::Tuple(items) => sequence_method(&items[..], "tuple", name, &args),
        Value::Dict(d) => dict_method(interp, receiver, d, name, args),
        Value::Set(d) => set_method(interp, receiver, d, name, args),
        Value::Int(_) | Value::Bool(_) if name == "bit_length" => {
            args.expect("bit_length", 0, 0)?;
            let i = receiver.as_int().unwrap_or(0);
            Ok(Value::Int((64 - i.unsigned_abs().leading_zeros()) as i64))
        }
        Value::BigInt(i) if name == "bit_length" => {
            args.expect("bit_length", 0, 0)?;
            Ok(Value::Int(i.bits() as i64))
        }
        Value::Float(f) if name == "is_integer" => {
            args.expect("is_integer", 0, 0)?;
            Ok(Value::Bool(f.is_finite() && f.fract() == 0.0))
        }
        other => Err(Unwind::exc(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{name}'", other.type_name()),
        )),
    }
}

// ---- str -------------------------------------------------------------------

fn opt_str<'a>(v: Option<&'a Value>, what: &str) -> Result<Option<&'a str>, Unwind> {
    match v {
        None | Some(Value::None) => Ok(None),
        Some(v) => expect_str(v, what).map(Some),
    }
}

/// Char window `s[start:end]` used by find/count/startswith
fn window(s: &str, args: &[Value]) -> Result<(Vec<char>, usize, usize), Unwind> {
    let chars: Vec<char> = s.chars().collect();
    let start = args.first().cloned().filter(|v| !v.is_none());
    let end = args.get(1).cloned().filter(|v| !v.is_none());
    let (lo, hi, _) = slice_bounds(chars.len(), &start, &end, &None)?;
    let lo = lo.max(0) as usize;
    let hi = (hi.max(0) as usize).max(lo);
    Ok((chars, lo, hi))
}

fn find_chars(hay: &[char], needle: &[char], reverse: bool) -> Option<usize> {
    if needle.len() > hay.len() {
        return None;
    }
    let last = hay.len() - needle.len();
    if reverse {
        (0..=last).rev().find(|&i| hay[i..i + needle.len()] == *needle)
    } else {
        (0..=last).find(|&i| hay[i..i + needle.len()] == *needle)
    }
}

fn split_whitespace(s: &str, maxsplit: i64, reverse: bool) -> Vec<Value> {
    let mut parts: Vec<&str> = Vec::new();
    if !reverse {
        let mut rest = s.trim_start();
        while !rest.is_empty() {
            if maxsplit >= 0 && parts.len() as i64 == maxsplit {
                parts.push(rest);
                break;
            }
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            parts.push(&rest[..end]);
            rest = rest[end..].trim_start();
        }
    } else {
        let mut rest = s.trim_end();
        while !rest.is_empty() {
            if maxsplit >= 0 && parts.len() as i64 == maxsplit {
                parts.push(rest);
                break;
            }
            let start = rest
                .rfind(char::is_whitespace)
                .map(|i| i + rest[i..].chars().next().map_or(1, char::len_utf8))
                .unwrap_or(0);
            parts.push(&rest[start..]);
            rest = rest[..start].trim_end();
        }
        parts.reverse();
    }
    parts.into_iter().map(Value::str).collect()
}

fn split_on(s: &str, sep: &str, maxsplit: i64, reverse: bool) -> Vec<Value> {
    let parts: Vec<&str> = match (maxsplit < 0, reverse) {
        (true, _) => s.split(sep).collect(),
        (false, false) => s.splitn(maxsplit as usize + 1, sep).collect(),
        (false, true) => {
            let mut parts: Vec<&str> = s.rsplitn(maxsplit as usize + 1, sep).collect();
            parts.reverse();
            parts
        }
    };
    parts.into_iter().map(Value::str).collect()
}

fn strip_chars<'a>(s: &'a str, chars: Option<&str>, left: bool, right: bool) -> &'a str {
    let matcher = |c: char| match chars {
        None => c.is_whitespace(),
        Some(set) => set.contains(c),
    };
    let mut out = s;
    if left {
        out = out.trim_start_matches(matcher);
    }
    if right {
        out = out.trim_end_matches(matcher);
    }
    out
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut previous_cased = false;
    for c in s.chars() {
        if previous_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        previous_cased = c.is_alphabetic();
    }
    out
}

fn fill_char(v: Option<&Value>, name: &str) -> Result<char, Unwind> {
    match v {
        None => Ok(' '),
        Some(v) => {
            let s = expect_str(v, &format!("{name}() argument 2"))?;
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(type_error(
                    "The fill character must be exactly one character long",
                )),
            }
        }
    }
}

fn str_method(interp: &mut Interpreter, s: &Rc<str>, name: &str, mut args: Args) -> NativeResult {
    let text: &str = s;
    if name == "format" {
        let formatted = format::str_format(text, &args.positional, &args.keywords)?;
        interp.reserve(formatted.len())?;
        return Ok(Value::string(formatted));
    }
    let maxsplit_kw = args.take_keyword("maxsplit");
    let sep_kw = args.take_keyword("sep");
    let keepends_kw = args.take_keyword("keepends");
    args.no_keywords(name)?;
    let p = &args.positional;
    let predicate = |f: fn(char) -> bool| -> NativeResult {
        Ok(Value::Bool(!text.is_empty() && text.chars().all(f)))
    };
    match name {
        "upper" => Ok(Value::string(text.to_uppercase())),
        "lower" => Ok(Value::string(text.to_lowercase())),
        "casefold" => Ok(Value::string(text.to_lowercase())),
        "swapcase" => Ok(Value::string(
            text.chars()
                .flat_map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<Vec<_>>()
                    } else {
                        c.to_uppercase().collect::<Vec<_>>()
                    }
                })
                .collect(),
        )),
        "title" => Ok(Value::string(title_case(text))),
        "capitalize" => {
            let mut chars = text.chars();
            Ok(Value::string(match chars.next() {
                None => String::new(),
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
            }))
        }
        "strip" | "lstrip" | "rstrip" => {
            args.expect(name, 0, 1)?;
            let chars = opt_str(p.first(), &format!("{name} arg"))?;
            let stripped = strip_chars(text, chars, name != "rstrip", name != "lstrip");
            Ok(Value::str(stripped))
        }
        "split" | "rsplit" => {
            args.expect(name, 0, 2)?;
            let sep = opt_str(p.first().or(sep_kw.as_ref()), "must be str or None")?;
            let maxsplit = match p.get(1).or(maxsplit_kw.as_ref()) {
                None => -1,
                Some(v) => expect_int(v, "maxsplit")?,
            };
            let parts = match sep {
                None => split_whitespace(text, maxsplit, name == "rsplit"),
                Some("") => return Err(value_error("empty separator")),
                Some(sep) => split_on(text, sep, maxsplit, name == "rsplit"),
            };
            interp.reserve(parts.len() * (VALUE_SIZE + 24) + text.len())?;
            Ok(Value::list(parts))
        }
        "splitlines" => {
            args.expect(name, 0, 1)?;
            let keepends = p.first().or(keepends_kw.as_ref()).is_some_and(Value::truthy);
            let mut lines = Vec::new();
            let mut rest = text;
            while !rest.is_empty() {
                let (line, consumed) = match rest.find(['\n', '\r']) {
                    None => (rest, rest.len()),
                    Some(i) => {
                        let width = if rest[i..].starts_with("\r\n") { 2 } else { 1 };
                        let end = if keepends { i + width } else { i };
                        (&rest[..end], i + width)
                    }
                };
                lines.push(Value::str(line));
                rest = &rest[consumed..];
            }
            Ok(Value::list(lines))
        }
        "join" => {
            args.expect(name, 1, 1)?;
            let items = interp.collect(&p[0])?;
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                let Value::Str(piece) = item else {
                    return Err(type_error(format!(
                        "sequence item {i}: expected str instance, {} found",
                        item.type_name()
                    )));
                };
                if i > 0 {
                    out.push_str(text);
                }
                out.push_str(piece);
            }
            interp.reserve(out.len())?;
            Ok(Value::string(out))
        }
        "replace" => {
            args.expect(name, 2, 3)?;
            let old = expect_str(&p[0], "replace() argument 1")?;
            let new = expect_str(&p[1], "replace() argument 2")?;
            let count = match p.get(2) {
                None => -1,
                Some(v) => expect_int(v, "replace() argument 3")?,
            };
            let occurrences = if old.is_empty() {
                text.chars().count() + 1
            } else {
                text.matches(old).count()
            };
            let replaced = if count < 0 { occurrences } else { occurrences.min(count as usize) };
            interp.reserve(text.len() + replaced.saturating_mul(new.len()))?;
            Ok(Value::string(if count < 0 {
                text.replace(old, new)
            } else {
                text.replacen(old, new, count as usize)
            }))
        }
        "find" | "rfind" | "index" | "rindex" => {
            args.expect(name, 1, 3)?;
            let needle: Vec<char> = expect_str(&p[0], "must be str")?.chars().collect();
            let (chars, lo, hi) = window(text, &p[1..])?;
            let reverse = name.starts_with('r');
            let found = find_chars(&chars[lo..hi.min(chars.len())], &needle, reverse).map(|i| i + lo);
            match (found, name) {
                (Some(i), _) => Ok(Value::Int(i as i64)),
                (None, "find" | "rfind") => Ok(Value::Int(-1)),
                (None, _) => Err(value_error("substring not found")),
            }
        }
        "count" => {
            args.expect(name, 1, 3)?;
            let needle = expect_str(&p[0], "must be str")?;
            let (chars, lo, hi) = window(text, &p[1..])?;
            let hay: String = chars[lo..hi.min(chars.len())].iter().collect();
            let n = if needle.is_empty() {
                hay.chars().count() + 1
            } else {
                hay.matches(needle).count()
            };
            Ok(Value::Int(n as i64))
        }
        "startswith" | "endswith" => {
            args.expect(name, 1, 3)?;
            let (chars, lo, hi) = window(text, &p[1..])?;
            let hay: String = chars[lo..hi.min(chars.len())].iter().collect();
            let candidates: Vec<Value> = match &p[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let Value::Str(affix) = candidate else {
                    return Err(type_error(format!(
                        "{name} first arg must be str or a tuple of str, not {}",
                        candidate.type_name()
                    )));
                };
                let hit = if name == "startswith" {
                    hay.starts_with(&**affix)
                } else {
                    hay.ends_with(&**affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "isdigit" | "isdecimal" => predicate(|c| c.is_ascii_digit()),
        "isnumeric" => predicate(char::is_numeric),
        "isalpha" => predicate(char::is_alphabetic),
        "isalnum" => predicate(char::is_alphanumeric),
        "isspace" => predicate(char::is_whitespace),
        "isupper" | "islower" => {
            let upper = name == "isupper";
            let mut cased = false;
            for c in text.chars() {
                if c.is_uppercase() || c.is_lowercase() {
                    cased = true;
                    if c.is_uppercase() != upper {
                        return Ok(Value::Bool(false));
                    }
                }
            }
            Ok(Value::Bool(cased))
        }
        "istitle" => Ok(Value::Bool(
            text.chars().any(char::is_alphabetic) && title_case(text) == text,
        )),
        "center" | "ljust" | "rjust" => {
            args.expect(name, 1, 2)?;
            let width = expect_int(&p[0], "width")?.max(0) as usize;
            let fill = fill_char(p.get(1), name)?;
            let len = text.chars().count();
            if width <= len {
                return Ok(Value::Str(s.clone()));
            }
            interp.reserve(width * fill.len_utf8())?;
            let margin = width - len;
            let left = match name {
                "ljust" => 0,
                "rjust" => margin,
                _ => margin / 2 + (margin & width & 1),
            };
            let mut out = String::new();
            out.extend(std::iter::repeat(fill).take(left));
            out.push_str(text);
            out.extend(std::iter::repeat(fill).take(margin - left));
            Ok(Value::string(out))
        }
        "zfill" => {
            args.expect(name, 1, 1)?;
            let width = expect_int(&p[0], "width")?.max(0) as usize;
            let len = text.chars().count();
            if width <= len {
                return Ok(Value::Str(s.clone()));
            }
            interp.reserve(width)?;
            let (sign, digits) = match text.chars().next() {
                Some(c @ ('+' | '-')) => (Some(c), &text[1..]),
                _ => (None, text),
            };
            let mut out = String::new();
            out.extend(sign);
            out.extend(std::iter::repeat('0').take(width - len));
            out.push_str(digits);
            Ok(Value::string(out))
        }
        "partition" | "rpartition" => {
            args.expect(name, 1, 1)?;
            let sep = expect_str(&p[0], "must be str")?;
            if sep.is_empty() {
                return Err(value_error("empty separator"));
            }
            let found = if name == "partition" {
                text.find(sep)
            } else {
                text.rfind(sep)
            };
            let parts = match (found, name) {
                (Some(i), _) => [&text[..i], sep, &text[i + sep.len()..]],
                (None, "partition") => [text, "", ""],
                (None, _) => ["", "", text],
            };
            Ok(Value::tuple(parts.into_iter().map(Value::str).collect()))
        }
        "removeprefix" => {
            args.expect(name, 1, 1)?;
            let prefix = expect_str(&p[0], "removeprefix() argument")?;
            Ok(Value::str(text.strip_prefix(prefix).unwrap_or(text)))
        }
        "removesuffix" => {
            args.expect(name, 1, 1)?;
            let suffix = expect_str(&p[0], "removesuffix() argument")?;
            Ok(Value::str(text.strip_suffix(suffix).unwrap_or(text)))
        }
        _ => Err(no_attribute("str", name)),
    }
}

fn no_attribute(type_name: &str, name: &str) -> Unwind {
    Unwind::exc(
        ExcKind::AttributeError,
        format!("'{type_name}' object has no attribute '{name}'"),
    )
}

// ---- list and tuple ----------------------------------------------------------

fn position_of(items: &[Value], target: &Value, bounds: &[Value]) -> Result<Option<usize>, Unwind> {
    let start = bounds.first().cloned();
    let end = bounds.get(1).cloned();
    let (lo, hi, _) = slice_bounds(items.len(), &start, &end, &None)?;
    let (lo, hi) = (lo.max(0) as usize, hi.max(0) as usize);
    for (i, item) in items.iter().enumerate().take(hi).skip(lo) {
        if ops::py_eq(item, target)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn sequence_method(items: &[Value], type_name: &str, name: &str, args: &Args) -> NativeResult {
    args.no_keywords(name)?;
    match name {
        "count" => {
            args.expect(name, 1, 1)?;
            let mut n = 0;
            for item in items {
                if ops::py_eq(item, &args.positional[0])? {
                    n += 1;
                }
            }
            Ok(Value::Int(n))
        }
        "index" => {
            args.expect(name, 1, 3)?;
            match position_of(items, &args.positional[0], &args.positional[1..])? {
                Some(i) => Ok(Value::Int(i as i64)),
                None if type_name == "tuple" => Err(value_error("tuple.index(x): x not in tuple")),
                None => Err(value_error(format!(
                    "{} is not in list",
                    format::repr(&args.positional[0])
                ))),
            }
        }
        _ => Err(no_attribute(type_name, name)),
    }
}

fn list_method(
    interp: &mut Interpreter,
    receiver: &Value,
    items: &Rc<RefCell<Vec<Value>>>,
    name: &str,
    mut args: Args,
) -> NativeResult {
    match name {
        "sort" => {
            let key = args.take_keyword("key");
            let reverse = args.take_keyword("reverse").is_some_and(|r| r.truthy());
            args.no_keywords("sort")?;
            args.expect("sort", 0, 0)?;
            let snapshot = items.borrow().clone();
            let sorted = builtins::sort_values(interp, snapshot, key.as_ref(), reverse)?;
            *items.borrow_mut() = sorted;
            return Ok(Value::None);
        }
        "count" | "index" => {
            let snapshot = items.borrow().clone();
            return sequence_method(&snapshot, "list", name, &args);
        }
        _ => {}
    }
    args.no_keywords(name)?;
    let p = &args.positional;
    match name {
        "append" => {
            args.expect(name, 1, 1)?;
            interp.reserve(VALUE_SIZE)?;
            items.borrow_mut().push(p[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            args.expect(name, 1, 1)?;
            let extra = interp.collect(&p[0])?;
            interp.reserve(extra.len() * VALUE_SIZE)?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "insert" => {
            args.expect(name, 2, 2)?;
            let index = expect_int(&p[0], "index")?;
            interp.reserve(VALUE_SIZE)?;
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let at = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(at as usize, p[1].clone());
            Ok(Value::None)
        }
        "pop" => {
            args.expect(name, 0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(Unwind::exc(ExcKind::IndexError, "pop from empty list"));
            }
            let len = items.len() as i64;
            let index = match p.first() {
                None => len - 1,
                Some(v) => expect_int(v, "index")?,
            };
            let at = if index < 0 { index + len } else { index };
            if at < 0 || at >= len {
                return Err(Unwind::exc(ExcKind::IndexError, "pop index out of range"));
            }
            Ok(items.remove(at as usize))
        }
        "remove" => {
            args.expect(name, 1, 1)?;
            let position = position_of(&items.borrow(), &p[0], &[])?;
            match position {
                Some(i) => {
                    items.borrow_mut().remove(i);
                    Ok(Value::None)
                }
                None => Err(value_error("list.remove(x): x not in list")),
            }
        }
        "reverse" => {
            args.expect(name, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            let copy = items.borrow().clone();
            interp.reserve(copy.len() * VALUE_SIZE)?;
            Ok(Value::list(copy))
        }
        _ => Err(no_attribute(receiver.type_name(), name)),
    }
}

// ---- dict --------------------------------------------------------------------

fn dict_fromkeys(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("fromkeys")?;
    args.expect("fromkeys", 1, 2)?;
    let value = args.get(1).cloned().unwrap_or(Value::None);
    let mut dict = Dict::new();
    for key in interp.collect(&args.positional[0])? {
        dict.insert(key, value.clone())?;
    }
    interp.reserve(dict.len() * (2 * VALUE_SIZE + 32))?;
    Ok(Value::dict(dict))
}

fn dict_method(
    interp: &mut Interpreter,
    receiver: &Value,
    d: &Rc<RefCell<Dict>>,
    name: &str,
    mut args: Args,
) -> NativeResult {
    if name == "update" {
        args.expect("update", 0, 1)?;
        let incoming = match args.get(0) {
            None => Dict::new(),
            Some(v) => builtins::dict_from(interp, v)?,
        };
        let keywords = std::mem::take(&mut args.keywords);
        interp.reserve((incoming.len() + keywords.len()) * (2 * VALUE_SIZE + 32))?;
        let mut d = d.borrow_mut();
        for (k, v) in incoming.items() {
            d.insert(k, v)?;
        }
        for (k, v) in keywords {
            d.insert(Value::Str(k), v)?;
        }
        return Ok(Value::None);
    }
    if name == "fromkeys" {
        return dict_fromkeys(interp, args);
    }
    args.no_keywords(name)?;
    let p = &args.positional;
    match name {
        "get" => {
            args.expect(name, 1, 2)?;
            let found = d.borrow().get(&p[0])?;
            Ok(found.or_else(|| p.get(1).cloned()).unwrap_or(Value::None))
        }
        "keys" | "values" | "items" => {
            args.expect(name, 0, 0)?;
            let d = d.borrow();
            interp.reserve(d.len() * VALUE_SIZE * if name == "items" { 4 } else { 1 })?;
            Ok(Value::list(match name {
                "keys" => d.keys(),
                "values" => d.values(),
                _ => d
                    .items()
                    .into_iter()
                    .map(|(k, v)| Value::tuple(vec![k, v]))
                    .collect(),
            }))
        }
        "pop" => {
            args.expect(name, 1, 2)?;
            let removed = d.borrow_mut().remove(&p[0])?;
            match (removed, p.get(1)) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Unwind::exc(ExcKind::KeyError, format::repr(&p[0]))),
            }
        }
        "popitem" => {
            args.expect(name, 0, 0)?;
            let last = d.borrow_mut().pop_last();
            last.map(|(k, v)| Value::tuple(vec![k, v])).ok_or_else(|| {
                Unwind::exc(ExcKind::KeyError, "'popitem(): dictionary is empty'")
            })
        }
        "setdefault" => {
            args.expect(name, 1, 2)?;
            let existing = d.borrow().get(&p[0])?;
            match existing {
                Some(v) => Ok(v),
                None => {
                    let value = p.get(1).cloned().unwrap_or(Value::None);
                    interp.reserve(2 * VALUE_SIZE + 32)?;
                    d.borrow_mut().insert(p[0].clone(), value.clone())?;
                    Ok(value)
                }
            }
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            d.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            let copy = d.borrow().clone();
            interp.reserve(copy.len() * (2 * VALUE_SIZE + 32))?;
            Ok(Value::dict(copy))
        }
        _ => Err(no_attribute(receiver.type_name(), name)),
    }
}

// ---- set -----------------------------------------------------------------------

fn as_set(interp: &mut Interpreter, value: &Value) -> Result<Value, Unwind> {
    if let Value::Set(_) = value {
        return Ok(value.clone());
    }
    let mut set = Dict::new();
    for item in interp.collect(value)? {
        set.insert(item, Value::None)?;
    }
    Ok(Value::set(set))
}

fn set_method(
    interp: &mut Interpreter,
    receiver: &Value,
    d: &Rc<RefCell<Dict>>,
    name: &str,
    args: Args,
) -> NativeResult {
    args.no_keywords(name)?;
    let p = &args.positional;
    match name {
        "add" => {
            args.expect(name, 1, 1)?;
            interp.reserve(2 * VALUE_SIZE + 32)?;
            d.borrow_mut().insert(p[0].clone(), Value::None)?;
            Ok(Value::None)
        }
        "remove" | "discard" => {
            args.expect(name, 1, 1)?;
            let removed = d.borrow_mut().remove(&p[0])?;
            if removed.is_none() && name == "remove" {
                return Err(Unwind::exc(ExcKind::KeyError, format::repr(&p[0])));
            }
            Ok(Value::None)
        }
        "pop" => {
            args.expect(name, 0, 0)?;
            let first = d.borrow_mut().pop_first();
            first
                .map(|(k, _)| k)
                .ok_or_else(|| Unwind::exc(ExcKind::KeyError, "'pop from an empty set'"))
        }
        "clear" => {
            args.expect(name, 0, 0)?;
            d.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            args.expect(name, 0, 0)?;
            Ok(Value::set(d.borrow().clone()))
        }
        "union" | "intersection" | "difference" | "symmetric_difference" | "update"
        | "intersection_update" | "difference_update" => {
            let op = match name {
                "union" | "update" => BinOp::BitOr,
                "intersection" | "intersection_update" => BinOp::BitAnd,
                "difference" | "difference_update" => BinOp::Sub,
                _ => BinOp::BitXor,
            };
            if op == BinOp::BitXor {
                args.expect(name, 1, 1)?;
            }
            let mut result = Value::set(d.borrow().clone());
            for other in p {
                let other = as_set(interp, other)?;
                result = ops::binary_op(interp, op, &result, &other)?;
            }
            if name.ends_with("update") {
                if let Value::Set(new) = result {
                    let new = new.borrow().clone();
                    *d.borrow_mut() = new;
                }
                return Ok(Value::None);
            }
            Ok(result)
        }
        "issubset" | "issuperset" | "isdisjoint" => {
            args.expect(name, 1, 1)?;
            let other = as_set(interp, &p[0])?;
            let Value::Set(other) = other else {
                return Ok(Value::Bool(false));
            };
            let mine = d.borrow();
            let theirs = other.borrow();
            let answer = match name {
                "issubset" => all_in(&mine, &theirs)?,
                "issuperset" => all_in(&theirs, &mine)?,
                _ => {
                    let mut disjoint = true;
                    for k in mine.keys() {
                        if theirs.contains(&k)? {
                            disjoint = false;
                            break;
                        }
                    }
                    disjoint
                }
            };
            Ok(Value::Bool(answer))
        }
        _ => Err(no_attribute(receiver.type_name(), name)),
    }
}

fn all_in(sub: &Dict, sup: &Dict) -> Result<bool, Unwind> {
    for k in sub.keys() {
        if !sup.contains(&k)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn test_str_methods() {
        let src = "\
s = '  Hello, World  '
print(s.strip(), s.lower().strip(), s.split(), 'a,b,,c'.split(','), 'a b c'.rsplit(' ', 1))
print('-'.join(['x', 'y']), 'banana'.count('a'), 'banana'.find('n'), 'banana'.rfind('n'), 'abc'.find('z'))
print('hello world'.title(), 'ab'.center(6, '*'), '42'.zfill(5), '-7'.zfill(4))
print('key=value'.partition('='), 'abc'.startswith(('x', 'a')), '123'.isdigit(), ''.isdigit())
print('{} + {name}'.format(1, name='two'), str.upper('x'))
";
        assert_eq!(
            output(src),
            "Hello, World hello, world ['Hello,', 'World'] ['a', 'b', '', 'c'] ['a b', 'c']\n\
             x-y 3 2 4 -1\n\
             Hello World **ab** 00042 -007\n\
             ('key', '=', 'value') True True False\n\
             1 + two X\n"
        );
    }

    #[test]
    fn test_list_methods() {
        let src = "\
xs = [3, 1, 2]
xs.append(4)
xs.extend(range(2))
xs.insert(0, 9)
print(xs, xs.pop(), xs.pop(0), xs.index(2), xs.count(1))
xs.sort(reverse=True)
print(xs)
xs.remove(1)
xs.reverse()
print(xs, xs.copy() is xs)
";
        assert_eq!(
            output(src),
            "[3, 1, 2, 4, 0] 1 9 2 1\n[4, 3, 2, 1, 0]\n[0, 2, 3, 4] False\n"
        );
    }

    #[test]
    fn test_dict_methods() {
        let src = "\
d = {'a': 1}
d.update({'b': 2}, c=3)
print(d.get('z', 0), d.setdefault('a', 5), d.pop('b'), list(d.keys()), d.items())
print(dict.fromkeys('xy', 0), d.popitem(), d)
for k, v in d.items():
    print(k, v)
";
        assert_eq!(
            output(src),
            "0 1 2 ['a', 'c'] [('a', 1), ('c', 3)]\n{'x': 0, 'y': 0} ('c', 3) {'a': 1}\na 1\n"
        );
    }

    #[test]
    fn test_set_methods() {
        let src = "\
s = {1, 2, 3}
s.add(4)
s.discard(10)
print(sorted(s.union([5])), sorted(s.intersection({2, 3, 9})), sorted(s.difference([1])))
print({1, 2}.issubset(s), s.issuperset([1, 9]), s.isdisjoint({7}))
s.difference_update([1, 2])
print(sorted(s))
";
        assert_eq!(
            output(src),
            "[1, 2, 3, 4, 5] [2, 3] [2, 3, 4]\nTrue False True\n[3, 4]\n"
        );
    }

    #[test]
    fn test_missing_method_is_attribute_error() {
        let mut interp = Interpreter::new();
        match interp.run_source("[].push(1)") {
            Err(Unwind::Exception(e)) => {
                assert_eq!(e.kind, ExcKind::AttributeError);
                assert_eq!(e.message, "'list' object has no attribute 'push'");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
