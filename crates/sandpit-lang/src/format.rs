//! Text rendering of values
//!
//! `repr`/`str` conversions, the format-spec mini-language used by
//! f-strings, `format()` and `str.format`, and printf-style `%` formatting.

use crate::exception::{type_error, value_error, ExcKind, Unwind};
use crate::value::{Dict, Value};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};
use std::rc::Rc;

const MAX_REPR_DEPTH: usize = 500;

pub fn repr(value: &Value) -> String {
    let mut out = String::new();
    let mut seen = Vec::new();
    write_repr(&mut out, value, &mut seen);
    out
}

/// `str(value)`
pub fn to_str(value: &Value) -> String {
    match value {
        Value::Str(s) => s.to_string(),
        Value::Exception(e) => e.message.clone(),
        other => repr(other),
    }
}

fn write_repr(out: &mut String, value: &Value, seen: &mut Vec<usize>) {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::BigInt(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&float_repr(*f)),
        Value::Str(s) => out.push_str(&str_repr(s)),
        Value::Ellipsis => out.push_str("Ellipsis"),
        Value::List(items) => {
            let ptr = Rc::as_ptr(items) as *const () as usize;
            if seen.contains(&ptr) || seen.len() > MAX_REPR_DEPTH {
                out.push_str("[...]");
                return;
            }
            seen.push(ptr);
            out.push('[');
            write_items(out, items.borrow().iter(), seen);
            out.push(']');
            seen.pop();
        }
        Value::Tuple(items) => {
            if seen.len() > MAX_REPR_DEPTH {
                out.push_str("(...)");
                return;
            }
            out.push('(');
            write_items(out, items.iter(), seen);
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Value::Dict(dict) => {
            let ptr = Rc::as_ptr(dict) as *const () as usize;
            if seen.contains(&ptr) || seen.len() > MAX_REPR_DEPTH {
                out.push_str("{...}");
                return;
            }
            seen.push(ptr);
            out.push('{');
            for (i, (k, v)) in dict.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(out, k, seen);
                out.push_str(": ");
                write_repr(out, v, seen);
            }
            out.push('}');
            seen.pop();
        }
        Value::Set(set) => {
            let set = set.borrow();
            if set.is_empty() {
                out.push_str("set()");
                return;
            }
            out.push('{');
            write_items(out, set.iter().map(|(k, _)| k), seen);
            out.push('}');
        }
        Value::Range(r) => {
            if r.step == 1 {
                out.push_str(&format!("range({}, {})", r.start, r.stop));
            } else {
                out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
            }
        }
        Value::Iterator(it) => out.push_str(&format!(
            "<{} object at {:#x}>",
            it.borrow().name,
            Rc::as_ptr(it) as *const () as usize
        )),
        Value::Function(f) => out.push_str(&format!(
            "<function {} at {:#x}>",
            f.def.name,
            Rc::as_ptr(f) as *const () as usize
        )),
        Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name)),
        Value::Method(m) => out.push_str(&format!(
            "<built-in method {} of {} object>",
            m.name,
            m.receiver.type_name()
        )),
        Value::Module(m) => out.push_str(&format!("<module '{}' (built-in)>", m.name)),
        Value::Type(tag) => out.push_str(&format!("<class '{}'>", tag.name())),
        Value::ExceptionType(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
        Value::Exception(e) => {
            if e.message.is_empty() {
                out.push_str(&format!("{}()", e.kind.name()));
            } else {
                out.push_str(&format!("{}({})", e.kind.name(), str_repr(&e.message)));
            }
        }
    }
}

fn write_items<'a>(out: &mut String, items: impl Iterator<Item = &'a Value>, seen: &mut Vec<usize>) {
    for (i, item) in items.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_repr(out, item, seen);
    }
}

pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Shortest round-tripping form, switching to exponent notation outside
/// `1e-4 <= |x| < 1e16`
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }
    let sci = format!("{:e}", f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m.to_string(), e.parse::<i32>().unwrap_or(0)),
        None => (sci.clone(), 0),
    };
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    if (-4..16).contains(&exp) {
        if exp < 0 {
            out.push_str("0.");
            for _ in 0..(-exp - 1) {
                out.push('0');
            }
            out.push_str(&digits);
        } else {
            let int_len = exp as usize + 1;
            if digits.len() <= int_len {
                out.push_str(&digits);
                for _ in digits.len()..int_len {
                    out.push('0');
                }
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push_str(&exponent_suffix('e', exp));
    }
    out
}

fn exponent_suffix(marker: char, exp: i32) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{marker}{sign}{:02}", exp.abs())
}

// ---- format-spec mini-language --------------------------------------

#[derive(Debug, Default, Clone)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Result<Spec, Unwind> {
    let chars: Vec<char> = spec.chars().collect();
    let mut parsed = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '=' | '^');

    if chars.len() >= 2 && is_align(chars[1]) {
        parsed.fill = Some(chars[0]);
        parsed.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        parsed.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            parsed.sign = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        parsed.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        parsed.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        let digits: String = chars[start..i].iter().collect();
        parsed.width = digits
            .parse()
            .map_err(|_| value_error("Too many decimal digits in format string"))?;
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            parsed.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(value_error("Format specifier missing precision"));
        }
        let digits: String = chars[start..i].iter().collect();
        parsed.precision = Some(
            digits
                .parse()
                .map_err(|_| value_error("Too many decimal digits in format string"))?,
        );
    }
    if let Some(&c) = chars.get(i) {
        parsed.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(value_error("Invalid format specifier"));
    }
    Ok(parsed)
}

/// `format(value, spec)`
pub fn format_value(value: &Value, spec: &str) -> Result<String, Unwind> {
    if spec.is_empty() {
        return Ok(to_str(value));
    }
    let spec = parse_spec(spec)?;
    match value {
        Value::Str(s) => format_str(s, &spec),
        Value::Int(_) | Value::BigInt(_) | Value::Bool(_) => match spec.kind {
            Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => {
                format_float(value.as_float().unwrap_or(0.0), &spec)
            }
            _ => format_int(&value.as_bigint().unwrap_or_default(), &spec),
        },
        Value::Float(f) => format_float(*f, &spec),
        other => {
            if spec.kind.is_none() && spec.precision.is_none() && spec.sign.is_none() {
                let text = to_str(other);
                Ok(pad(&text, &spec, '<'))
            } else {
                Err(type_error(format!(
                    "unsupported format string passed to {}.__format__",
                    other.type_name()
                )))
            }
        }
    }
}

fn unknown_code(code: char, type_name: &str) -> Unwind {
    value_error(format!(
        "Unknown format code '{code}' for object of type '{type_name}'"
    ))
}

fn format_str(s: &str, spec: &Spec) -> Result<String, Unwind> {
    match spec.kind {
        None | Some('s') => {}
        Some(code) => return Err(unknown_code(code, "str")),
    }
    if spec.sign.is_some() {
        return Err(value_error("Sign not allowed in string format specifier"));
    }
    let text: String = match spec.precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    };
    Ok(pad(&text, spec, '<'))
}

fn format_int(i: &BigInt, spec: &Spec) -> Result<String, Unwind> {
    if spec.precision.is_some() {
        return Err(value_error("Precision not allowed in integer format specifier"));
    }
    let magnitude = i.magnitude();
    let (body, prefix) = match spec.kind {
        None | Some('d') | Some('n') => (magnitude.to_string(), ""),
        Some('b') => (format!("{magnitude:b}"), "0b"),
        Some('o') => (format!("{magnitude:o}"), "0o"),
        Some('x') => (format!("{magnitude:x}"), "0x"),
        Some('X') => (format!("{magnitude:X}"), "0X"),
        Some('c') => {
            let c = i
                .to_u32()
                .and_then(char::from_u32)
                .ok_or_else(|| Unwind::exc(ExcKind::OverflowError, "%c arg not in range(0x110000)"))?;
            return Ok(pad(&c.to_string(), spec, '<'));
        }
        Some(code) => return Err(unknown_code(code, "int")),
    };
    let body = match spec.grouping {
        Some(sep) => {
            let size = if matches!(spec.kind, Some('b' | 'o' | 'x' | 'X')) { 4 } else { 3 };
            group_digits(&body, sep, size)
        }
        None => body,
    };
    let prefix = if spec.alternate { prefix } else { "" };
    Ok(pad_number(sign_for(i.is_negative(), spec), prefix, &body, spec))
}

fn format_float(f: f64, spec: &Spec) -> Result<String, Unwind> {
    let negative = f.is_sign_negative() && !f.is_nan();
    let x = f.abs();
    let upper = matches!(spec.kind, Some('E' | 'F' | 'G'));
    let mut body = if !x.is_finite() {
        if x.is_nan() { "nan" } else { "inf" }.to_string()
    } else {
        match spec.kind {
            Some('f' | 'F') => format!("{:.*}", spec.precision.unwrap_or(6), x),
            Some('e' | 'E') => format_exponent(x, spec.precision.unwrap_or(6), spec.alternate),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), x * 100.0),
            Some('g' | 'G') => format_general(x, spec.precision.unwrap_or(6), spec.alternate, false),
            None => match spec.precision {
                Some(p) => format_general(x, p, spec.alternate, true),
                None => float_repr(x),
            },
            Some(code) => return Err(unknown_code(code, "float")),
        }
    };
    if upper {
        body = body.to_uppercase();
    }
    if let Some(sep) = spec.grouping {
        let split = body
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(body.len());
        let (int_part, rest) = body.split_at(split);
        body = format!("{}{}", group_digits(int_part, sep, 3), rest);
    }
    Ok(pad_number(sign_for(negative, spec), "", &body, spec))
}

fn format_exponent(x: f64, precision: usize, alternate: bool) -> String {
    let raw = format!("{:.*e}", precision, x);
    let (mantissa, exp) = raw.split_once('e').unwrap_or((&raw, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut mantissa = mantissa.to_string();
    if alternate && !mantissa.contains('.') {
        mantissa.push('.');
    }
    format!("{mantissa}{}", exponent_suffix('e', exp))
}

fn format_general(x: f64, precision: usize, alternate: bool, keep_point: bool) -> String {
    let p = precision.max(1);
    if x == 0.0 {
        return if keep_point { "0.0" } else { "0" }.to_string();
    }
    let raw = format!("{:.*e}", p - 1, x);
    let exp: i32 = raw
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    if exp >= -4 && exp < p as i32 {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let mut fixed = format!("{:.*}", decimals, x);
        if !alternate {
            fixed = strip_zeros(&fixed);
        }
        if keep_point && !fixed.contains('.') {
            fixed.push_str(".0");
        }
        fixed
    } else {
        let (mantissa, _) = raw.split_once('e').unwrap_or((&raw, "0"));
        let mantissa = if alternate {
            mantissa.to_string()
        } else {
            strip_zeros(mantissa)
        };
        format!("{mantissa}{}", exponent_suffix('e', exp))
    }
}

fn strip_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn group_digits(digits: &str, sep: char, size: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % size == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}

fn sign_for(negative: bool, spec: &Spec) -> &'static str {
    if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    }
}

fn pad_number(sign: &str, prefix: &str, body: &str, spec: &Spec) -> String {
    let (fill, align) = if spec.zero && spec.align.is_none() {
        ('0', '=')
    } else {
        (spec.fill.unwrap_or(' '), spec.align.unwrap_or('>'))
    };
    let len = sign.chars().count() + prefix.len() + body.chars().count();
    if len >= spec.width {
        return format!("{sign}{prefix}{body}");
    }
    let gap = spec.width - len;
    let filler = |n: usize| fill.to_string().repeat(n);
    match align {
        '=' => format!("{sign}{prefix}{}{body}", filler(gap)),
        '<' => format!("{sign}{prefix}{body}{}", filler(gap)),
        '^' => format!(
            "{}{sign}{prefix}{body}{}",
            filler(gap / 2),
            filler(gap - gap / 2)
        ),
        _ => format!("{}{sign}{prefix}{body}", filler(gap)),
    }
}

fn pad(text: &str, spec: &Spec, default_align: char) -> String {
    let len = text.chars().count();
    if len >= spec.width {
        return text.to_string();
    }
    let gap = spec.width - len;
    let fill = spec.fill.unwrap_or(if spec.zero { '0' } else { ' ' });
    let filler = |n: usize| fill.to_string().repeat(n);
    match spec.align.unwrap_or(default_align) {
        '>' | '=' => format!("{}{text}", filler(gap)),
        '^' => format!("{}{text}{}", filler(gap / 2), filler(gap - gap / 2)),
        _ => format!("{text}{}", filler(gap)),
    }
}

// ---- str.format ------------------------------------------------------

/// `template.format(*positional, **keywords)`
pub fn str_format(
    template: &str,
    positional: &[Value],
    keywords: &[(Rc<str>, Value)],
) -> Result<String, Unwind> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut auto_index = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '{' {
            if chars.get(i + 1) == Some(&'{') {
                out.push('{');
                i += 2;
                continue;
            }
            let mut depth = 1;
            let mut j = i + 1;
            while j < chars.len() {
                match chars[j] {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
                j += 1;
            }
            if j >= chars.len() {
                return Err(value_error("Single '{' encountered in format string"));
            }
            let field: String = chars[i + 1..j].iter().collect();
            out.push_str(&render_field(&field, positional, keywords, &mut auto_index)?);
            i = j + 1;
        } else if c == '}' {
            if chars.get(i + 1) == Some(&'}') {
                out.push('}');
                i += 2;
                continue;
            }
            return Err(value_error("Single '}' encountered in format string"));
        } else {
            out.push(c);
            i += 1;
        }
    }
    Ok(out)
}

fn render_field(
    field: &str,
    positional: &[Value],
    keywords: &[(Rc<str>, Value)],
    auto_index: &mut usize,
) -> Result<String, Unwind> {
    let (head, spec) = match field.find(':') {
        Some(at) => (&field[..at], &field[at + 1..]),
        None => (field, ""),
    };
    let (name, conversion) = match head.find('!') {
        Some(at) => (&head[..at], head[at + 1..].chars().next()),
        None => (head, None),
    };
    let spec = if spec.contains('{') {
        str_format(spec, positional, keywords)?
    } else {
        spec.to_string()
    };

    let base_end = name.find(['[', '.']).unwrap_or(name.len());
    let base = &name[..base_end];
    let mut value = if base.is_empty() {
        let idx = *auto_index;
        *auto_index += 1;
        positional
            .get(idx)
            .cloned()
            .ok_or_else(|| Unwind::exc(ExcKind::IndexError, format!("Replacement index {idx} out of range for positional args tuple")))?
    } else if let Ok(idx) = base.parse::<usize>() {
        positional
            .get(idx)
            .cloned()
            .ok_or_else(|| Unwind::exc(ExcKind::IndexError, format!("Replacement index {idx} out of range for positional args tuple")))?
    } else {
        keywords
            .iter()
            .find(|(k, _)| &**k == base)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| Unwind::exc(ExcKind::KeyError, str_repr(base)))?
    };

    let mut rest = &name[base_end..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped
            .find(']')
            .ok_or_else(|| value_error("Missing ']' in format string"))?;
        let key = &stripped[..close];
        value = index_for_format(&value, key)?;
        rest = &stripped[close + 1..];
    }
    if !rest.is_empty() {
        return Err(Unwind::exc(
            ExcKind::AttributeError,
            format!("attribute access in format fields is not supported: '{rest}'"),
        ));
    }

    let value = match conversion {
        Some('r') | Some('a') => Value::string(repr(&value)),
        Some('s') => Value::string(to_str(&value)),
        None => value,
        Some(other) => {
            return Err(value_error(format!(
                "Unknown conversion specifier {other}"
            )))
        }
    };
    format_value(&value, &spec)
}

fn index_for_format(value: &Value, key: &str) -> Result<Value, Unwind> {
    match value {
        Value::List(_) | Value::Tuple(_) => {
            let idx: usize = key
                .parse()
                .map_err(|_| type_error("list indices must be integers"))?;
            let item = match value {
                Value::List(items) => items.borrow().get(idx).cloned(),
                Value::Tuple(items) => items.get(idx).cloned(),
                _ => None,
            };
            item.ok_or_else(|| Unwind::exc(ExcKind::IndexError, "list index out of range"))
        }
        Value::Dict(d) => {
            let d = d.borrow();
            let hit = match key.parse::<i64>() {
                Ok(i) => d.get(&Value::Int(i))?,
                Err(_) => d.get_str(key).cloned(),
            };
            hit.ok_or_else(|| Unwind::exc(ExcKind::KeyError, str_repr(key)))
        }
        other => Err(type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

// ---- printf-style ------------------------------------------------------

/// `template % values`
pub fn percent_format(template: &str, values: &Value) -> Result<String, Unwind> {
    let mapping: Option<std::cell::Ref<'_, Dict>> = match values {
        Value::Dict(d) => Some(d.borrow()),
        _ => None,
    };
    let items: Vec<Value> = match values {
        Value::Tuple(items) => items.to_vec(),
        Value::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mut next = 0usize;
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let mut key_value: Option<Value> = None;
        if chars.get(i) == Some(&'(') {
            let close = chars[i..]
                .iter()
                .position(|&c| c == ')')
                .map(|p| p + i)
                .ok_or_else(|| value_error("incomplete format key"))?;
            let key: String = chars[i + 1..close].iter().collect();
            let dict = mapping
                .as_ref()
                .ok_or_else(|| type_error("format requires a mapping"))?;
            key_value = Some(
                dict.get_str(&key)
                    .cloned()
                    .ok_or_else(|| Unwind::exc(ExcKind::KeyError, str_repr(&key)))?,
            );
            i = close + 1;
        }

        let mut spec = Spec::default();
        while let Some(&c) = chars.get(i) {
            match c {
                '-' => spec.align = Some('<'),
                '+' => spec.sign = Some('+'),
                ' ' => spec.sign = spec.sign.or(Some(' ')),
                '0' => spec.zero = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        let take_arg = |next: &mut usize| -> Result<Value, Unwind> {
            let v = items
                .get(*next)
                .cloned()
                .ok_or_else(|| type_error("not enough arguments for format string"))?;
            *next += 1;
            Ok(v)
        };
        if chars.get(i) == Some(&'*') {
            let w = take_arg(&mut next)?;
            spec.width = w.as_int().unwrap_or(0).max(0) as usize;
            i += 1;
        } else {
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            if i > start {
                let digits: String = chars[start..i].iter().collect();
                spec.width = digits.parse().unwrap_or(0);
            }
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            let digits: String = chars[start..i].iter().collect();
            spec.precision = Some(digits.parse().unwrap_or(0));
        }
        let Some(&code) = chars.get(i) else {
            return Err(value_error("incomplete format"));
        };
        i += 1;
        if code == '%' {
            out.push('%');
            continue;
        }
        if spec.zero && spec.align == Some('<') {
            spec.zero = false;
        }

        let arg = match key_value.take() {
            Some(v) => v,
            None => take_arg(&mut next)?,
        };
        let piece = match code {
            's' | 'r' | 'a' => {
                let text = if code == 's' { to_str(&arg) } else { repr(&arg) };
                let text: String = match spec.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text,
                };
                spec.zero = false;
                pad(&text, &spec, '>')
            }
            'd' | 'i' | 'u' => {
                let n = match &arg {
                    Value::Float(f) => BigInt::from(f.trunc() as i64),
                    other => other.as_bigint().ok_or_else(|| {
                        type_error(format!(
                            "%{code} format: a real number is required, not {}",
                            other.type_name()
                        ))
                    })?,
                };
                spec.kind = Some('d');
                format_int(&n, &spec)?
            }
            'x' | 'X' | 'o' => {
                let n = arg.as_bigint().ok_or_else(|| {
                    type_error(format!(
                        "%{code} format: an integer is required, not {}",
                        arg.type_name()
                    ))
                })?;
                spec.kind = Some(code);
                format_int(&n, &spec)?
            }
            'c' => match &arg {
                Value::Str(s) if s.chars().count() == 1 => pad(s, &spec, '>'),
                other => {
                    spec.kind = Some('c');
                    format_int(&other.as_bigint().unwrap_or_default(), &spec)?
                }
            },
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let f = arg.as_float().ok_or_else(|| {
                    type_error(format!(
                        "must be real number, not {}",
                        arg.type_name()
                    ))
                })?;
                spec.kind = Some(code);
                format_float(f, &spec)?
            }
            other => {
                return Err(value_error(format!(
                    "unsupported format character '{other}' ({:#x})",
                    other as u32
                )))
            }
        };
        out.push_str(&piece);
    }

    if mapping.is_none() && next < items.len() {
        return Err(type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(3.0), "3.0");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(1.5e-5), "1.5e-05");
        assert_eq!(float_repr(123456.789), "123456.789");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(-2.5), "-2.5");
        assert_eq!(float_repr(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_container_repr() {
        let v = Value::list(vec![Value::Int(1), Value::str("a"), Value::tuple(vec![Value::None])]);
        assert_eq!(repr(&v), "[1, 'a', (None,)]");
        assert_eq!(repr(&Value::str("it's")), "\"it's\"");
    }

    #[test]
    fn test_recursive_list_repr() {
        let v = Value::list(vec![]);
        if let Value::List(items) = &v {
            items.borrow_mut().push(v.clone());
        }
        assert_eq!(repr(&v), "[[...]]");
    }

    #[test]
    fn test_format_spec_numbers() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), "05d").unwrap(), "00042");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Int(255), "#x").unwrap(), "0xff");
        assert_eq!(format_value(&Value::Float(0.256), ".1%").unwrap(), "25.6%");
        assert_eq!(format_value(&Value::Float(12345.678), "e").unwrap(), "1.234568e+04");
        assert_eq!(format_value(&Value::Float(0.0001234), "g").unwrap(), "0.0001234");
        assert_eq!(format_value(&Value::Int(-7), "+>5").unwrap(), "+++-7");
        assert_eq!(format_value(&Value::Int(7), "+5").unwrap(), "   +7");
    }

    #[test]
    fn test_big_integers_render_exactly() {
        let big = Value::from_bigint(BigInt::from(1) << 100usize);
        assert_eq!(to_str(&big), "1267650600228229401496703205376");
        assert_eq!(
            format_value(&big, ",").unwrap(),
            "1,267,650,600,228,229,401,496,703,205,376"
        );
        assert_eq!(format_value(&big, "#x").unwrap(), "0x10000000000000000000000000");
        assert_eq!(
            percent_format("%d", &Value::from_bigint(-(BigInt::from(1) << 64usize))).unwrap(),
            "-18446744073709551616"
        );
    }

    #[test]
    fn test_format_spec_strings() {
        assert_eq!(format_value(&Value::str("ab"), ">5").unwrap(), "   ab");
        assert_eq!(format_value(&Value::str("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::str("ab"), "5").unwrap(), "ab   ");
        assert!(format_value(&Value::str("ab"), "d").is_err());
    }

    #[test]
    fn test_str_format() {
        let out = str_format(
            "{} + {1} = {total:.1f} {{ok}}",
            &[Value::Int(1), Value::Int(2)],
            &[(Rc::from("total"), Value::Float(3.0))],
        )
        .unwrap();
        assert_eq!(out, "1 + 2 = 3.0 {ok}");
    }

    #[test]
    fn test_percent_format() {
        let args = Value::tuple(vec![Value::str("Ada"), Value::Int(36), Value::Float(1.5)]);
        assert_eq!(
            percent_format("%s is %d (%.2f) 100%%", &args).unwrap(),
            "Ada is 36 (1.50) 100%"
        );
        assert_eq!(percent_format("%5s|%-4d|", &Value::tuple(vec![Value::str("x"), Value::Int(3)])).unwrap(), "    x|3   |");
        assert!(percent_format("%d %d", &Value::Int(1)).is_err());
    }
}
