//! Operators: arithmetic, comparison, membership

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::exception::{type_error, value_error, ExcKind, Unwind};
use crate::format;
use crate::heap::VALUE_SIZE;
use crate::interp::Interpreter;
use crate::value::{Dict, Value};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::rc::Rc;

const MAX_COMPARE_DEPTH: usize = 500;

/// Largest integer result the runtime builds, in bits
pub const MAX_INT_BITS: u64 = 1 << 20;

fn overflow() -> Unwind {
    Unwind::exc(ExcKind::OverflowError, "integer result too large")
}

fn zero_division(message: &str) -> Unwind {
    Unwind::exc(ExcKind::ZeroDivisionError, message)
}

fn unsupported(op: &str, a: &Value, b: &Value) -> Unwind {
    type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

pub(crate) fn check_bits(bits: u64) -> Result<(), Unwind> {
    if bits > MAX_INT_BITS {
        return Err(overflow());
    }
    Ok(())
}

/// Float view of an integer; too large for a float is an error, as in Python
pub fn big_to_f64(i: &BigInt) -> Result<f64, Unwind> {
    match i.to_f64() {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(Unwind::exc(
            ExcKind::OverflowError,
            "int too large to convert to float",
        )),
    }
}

enum Num {
    I(i64),
    B(BigInt),
    F(f64),
}

fn num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::I(*i)),
        Value::Bool(b) => Some(Num::I(*b as i64)),
        Value::BigInt(i) => Some(Num::B((**i).clone())),
        Value::Float(f) => Some(Num::F(*f)),
        _ => None,
    }
}

pub fn int_floordiv(a: i64, b: i64) -> Result<i64, Unwind> {
    if b == 0 {
        return Err(zero_division("integer division or modulo by zero"));
    }
    let q = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

pub fn int_mod(a: i64, b: i64) -> Result<i64, Unwind> {
    if b == 0 {
        return Err(zero_division("integer division or modulo by zero"));
    }
    let r = a.checked_rem(b).unwrap_or(0);
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

pub fn float_mod(a: f64, b: f64) -> Result<f64, Unwind> {
    if b == 0.0 {
        return Err(zero_division("float modulo"));
    }
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

pub fn float_floordiv(a: f64, b: f64) -> Result<f64, Unwind> {
    if b == 0.0 {
        return Err(zero_division("float floor division by zero"));
    }
    Ok((a / b).floor())
}

pub fn int_pow(base: i64, exp: i64) -> Result<Value, Unwind> {
    if exp < 0 {
        if base == 0 {
            return Err(zero_division("0.0 cannot be raised to a negative power"));
        }
        return Ok(Value::Float((base as f64).powf(exp as f64)));
    }
    match base {
        0 => return Ok(Value::Int(if exp == 0 { 1 } else { 0 })),
        1 => return Ok(Value::Int(1)),
        -1 => return Ok(Value::Int(if exp % 2 == 0 { 1 } else { -1 })),
        _ => {}
    }
    let small = u32::try_from(exp).ok().and_then(|e| base.checked_pow(e));
    match small {
        Some(v) => Ok(Value::Int(v)),
        None => big_pow(BigInt::from(base), BigInt::from(exp)),
    }
}

pub fn big_pow(base: BigInt, exp: BigInt) -> Result<Value, Unwind> {
    if exp.is_negative() {
        if base.is_zero() {
            return Err(zero_division("0.0 cannot be raised to a negative power"));
        }
        let exp = exp.to_f64().unwrap_or(f64::NEG_INFINITY);
        return float_pow(big_to_f64(&base)?, exp);
    }
    match base.to_i64() {
        Some(0) => return Ok(Value::Int(if exp.is_zero() { 1 } else { 0 })),
        Some(1) => return Ok(Value::Int(1)),
        Some(-1) => return Ok(Value::Int(if exp.is_even() { 1 } else { -1 })),
        _ => {}
    }
    let exp = exp.to_u32().ok_or_else(overflow)?;
    check_bits((base.bits() - 1).saturating_mul(u64::from(exp)))?;
    let result = base.pow(exp);
    check_bits(result.bits())?;
    Ok(Value::from_bigint(result))
}

pub fn float_pow(base: f64, exp: f64) -> Result<Value, Unwind> {
    if base == 0.0 && exp < 0.0 {
        return Err(zero_division("0.0 cannot be raised to a negative power"));
    }
    if base < 0.0 && exp.fract() != 0.0 {
        return Err(value_error(
            "negative number cannot be raised to a fractional power",
        ));
    }
    let result = base.powf(exp);
    if result.is_infinite() && base.is_finite() && exp.is_finite() {
        return Err(Unwind::exc(
            ExcKind::OverflowError,
            "(34, 'Numerical result out of range')",
        ));
    }
    Ok(Value::Float(result))
}

/// True division of two integers, exact enough for operands beyond `f64`
fn big_true_div(x: &BigInt, y: &BigInt) -> Result<f64, Unwind> {
    if y.is_zero() {
        return Err(zero_division("division by zero"));
    }
    let shift = x.bits().max(y.bits()).saturating_sub(1000);
    let (x, y) = (x >> shift as usize, y >> shift as usize);
    if y.is_zero() {
        return Err(Unwind::exc(
            ExcKind::OverflowError,
            "integer division result too large for a float",
        ));
    }
    Ok(big_to_f64(&x)? / big_to_f64(&y)?)
}

/// `i64` arithmetic; `None` when the result needs a big integer
fn small_arith(op: BinOp, x: i64, y: i64) -> Result<Option<Value>, Unwind> {
    let v = match op {
        BinOp::Add => x.checked_add(y),
        BinOp::Sub => x.checked_sub(y),
        BinOp::Mul => x.checked_mul(y),
        BinOp::Div => {
            if y == 0 {
                return Err(zero_division("division by zero"));
            }
            return Ok(Some(Value::Float(x as f64 / y as f64)));
        }
        BinOp::FloorDiv if x == i64::MIN && y == -1 => None,
        BinOp::FloorDiv => Some(int_floordiv(x, y)?),
        BinOp::Mod => Some(int_mod(x, y)?),
        BinOp::Pow => return int_pow(x, y).map(Some),
        BinOp::BitAnd => Some(x & y),
        BinOp::BitOr => Some(x | y),
        BinOp::BitXor => Some(x ^ y),
        BinOp::LShift => {
            if y < 0 {
                return Err(value_error("negative shift count"));
            }
            if x == 0 {
                Some(0)
            } else if y >= 63 {
                None
            } else {
                let shifted = x << y;
                (shifted >> y == x).then_some(shifted)
            }
        }
        BinOp::RShift => {
            if y < 0 {
                return Err(value_error("negative shift count"));
            }
            Some(x >> y.min(63))
        }
        BinOp::MatMul => {
            return Err(type_error(
                "unsupported operand type(s) for @: 'int' and 'int'",
            ))
        }
    };
    Ok(v.map(Value::Int))
}

fn big_arith(op: BinOp, x: BigInt, y: BigInt) -> Result<Value, Unwind> {
    let v = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => {
            check_bits(x.bits() + y.bits())?;
            x * y
        }
        BinOp::Div => return Ok(Value::Float(big_true_div(&x, &y)?)),
        BinOp::FloorDiv | BinOp::Mod if y.is_zero() => {
            return Err(zero_division("integer division or modulo by zero"))
        }
        BinOp::FloorDiv => x.div_floor(&y),
        BinOp::Mod => x.mod_floor(&y),
        BinOp::Pow => return big_pow(x, y),
        BinOp::BitAnd => x & y,
        BinOp::BitOr => x | y,
        BinOp::BitXor => x ^ y,
        BinOp::LShift | BinOp::RShift if y.is_negative() => {
            return Err(value_error("negative shift count"))
        }
        BinOp::LShift => {
            if x.is_zero() {
                return Ok(Value::Int(0));
            }
            let n = y.to_u64().ok_or_else(overflow)?;
            check_bits(x.bits().saturating_add(n))?;
            x << n as usize
        }
        BinOp::RShift => match y.to_usize() {
            Some(n) => x >> n,
            None if x.is_negative() => BigInt::from(-1),
            None => BigInt::zero(),
        },
        BinOp::MatMul => {
            return Err(type_error(
                "unsupported operand type(s) for @: 'int' and 'int'",
            ))
        }
    };
    Ok(Value::from_bigint(v))
}

fn arith(op: BinOp, a: Num, b: Num) -> Result<Value, Unwind> {
    match (a, b) {
        (Num::I(x), Num::I(y)) => match small_arith(op, x, y)? {
            Some(v) => Ok(v),
            None => big_arith(op, BigInt::from(x), BigInt::from(y)),
        },
        (Num::I(x), Num::B(y)) => big_arith(op, BigInt::from(x), y),
        (Num::B(x), Num::I(y)) => big_arith(op, x, BigInt::from(y)),
        (Num::B(x), Num::B(y)) => big_arith(op, x, y),
        (a, b) => {
            let x = match a {
                Num::I(i) => i as f64,
                Num::B(i) => big_to_f64(&i)?,
                Num::F(f) => f,
            };
            let y = match b {
                Num::I(i) => i as f64,
                Num::B(i) => big_to_f64(&i)?,
                Num::F(f) => f,
            };
            let v = match op {
                BinOp::Add => x + y,
                BinOp::Sub => x - y,
                BinOp::Mul => x * y,
                BinOp::Div => {
                    if y == 0.0 {
                        return Err(zero_division("float division by zero"));
                    }
                    x / y
                }
                BinOp::FloorDiv => float_floordiv(x, y)?,
                BinOp::Mod => float_mod(x, y)?,
                BinOp::Pow => return float_pow(x, y),
                _ => {
                    return Err(type_error(format!(
                        "unsupported operand type(s) for {}: 'float' and 'float'",
                        op.symbol()
                    )))
                }
            };
            Ok(Value::Float(v))
        }
    }
}

/// Repeat count for `seq * n`; `None` when `n` is not an integer
fn repeat_count(v: &Value) -> Result<Option<i64>, Unwind> {
    match v {
        Value::Int(i) => Ok(Some(*i)),
        Value::Bool(b) => Ok(Some(*b as i64)),
        Value::BigInt(i) if i.is_negative() => Ok(Some(0)),
        Value::BigInt(_) => Err(Unwind::exc(
            ExcKind::OverflowError,
            "cannot fit 'int' into an index-sized integer",
        )),
        _ => Ok(None),
    }
}

fn repeat<T: Clone>(items: &[T], n: i64) -> Vec<T> {
    if n <= 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(items.len() * n as usize);
    for _ in 0..n {
        out.extend_from_slice(items);
    }
    out
}

fn sequence_mul(interp: &mut Interpreter, seq: &Value, n: i64) -> Result<Value, Unwind> {
    let count = n.max(0) as usize;
    let (len, unit) = match seq {
        Value::Str(s) => (s.len(), 1),
        Value::List(items) => (items.borrow().len(), VALUE_SIZE),
        Value::Tuple(items) => (items.len(), VALUE_SIZE),
        _ => return Err(unsupported("*", seq, &Value::Int(n))),
    };
    let bytes = len
        .checked_mul(count)
        .and_then(|b| b.checked_mul(unit))
        .ok_or_else(|| Unwind::exc(ExcKind::MemoryError, ""))?;
    interp.reserve(bytes)?;
    Ok(match seq {
        Value::Str(s) => Value::string(s.repeat(count)),
        Value::List(items) => Value::list(repeat(&items.borrow()[..], n)),
        Value::Tuple(items) => Value::tuple(repeat(&items[..], n)),
        _ => Value::None,
    })
}

fn set_op(op: BinOp, a: &Dict, b: &Dict) -> Result<Dict, Unwind> {
    let mut out = Dict::new();
    match op {
        BinOp::BitOr => {
            for (k, _) in a.iter().chain(b.iter()) {
                out.insert(k.clone(), Value::None)?;
            }
        }
        BinOp::BitAnd => {
            for (k, _) in a.iter() {
                if b.contains(k)? {
                    out.insert(k.clone(), Value::None)?;
                }
            }
        }
        BinOp::Sub => {
            for (k, _) in a.iter() {
                if !b.contains(k)? {
                    out.insert(k.clone(), Value::None)?;
                }
            }
        }
        BinOp::BitXor => {
            for (k, _) in a.iter() {
                if !b.contains(k)? {
                    out.insert(k.clone(), Value::None)?;
                }
            }
            for (k, _) in b.iter() {
                if !a.contains(k)? {
                    out.insert(k.clone(), Value::None)?;
                }
            }
        }
        _ => {}
    }
    Ok(out)
}

pub fn binary_op(
    interp: &mut Interpreter,
    op: BinOp,
    a: &Value,
    b: &Value,
) -> Result<Value, Unwind> {
    if let (Some(x), Some(y)) = (num(a), num(b)) {
        let result = arith(op, x, y)?;
        // bool & bool stays a bool
        if let (Value::Bool(p), Value::Bool(q)) = (a, b) {
            match op {
                BinOp::BitAnd => return Ok(Value::Bool(*p & *q)),
                BinOp::BitOr => return Ok(Value::Bool(*p | *q)),
                BinOp::BitXor => return Ok(Value::Bool(*p ^ *q)),
                _ => {}
            }
        }
        return Ok(result);
    }

    match (op, a, b) {
        (BinOp::Add, Value::Str(x), Value::Str(y)) => {
            interp.reserve(x.len() + y.len())?;
            let mut s = String::with_capacity(x.len() + y.len());
            s.push_str(x);
            s.push_str(y);
            Ok(Value::string(s))
        }
        (BinOp::Add, Value::Str(_), other) => Err(type_error(format!(
            "can only concatenate str (not \"{}\") to str",
            other.type_name()
        ))),
        (BinOp::Add, Value::List(x), Value::List(y)) => {
            let mut items = x.borrow().clone();
            interp.reserve((items.len() + y.borrow().len()) * VALUE_SIZE)?;
            items.extend(y.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::List(_), other) => Err(type_error(format!(
            "can only concatenate list (not \"{}\") to list",
            other.type_name()
        ))),
        (BinOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
            interp.reserve((x.len() + y.len()) * VALUE_SIZE)?;
            let mut items = x.to_vec();
            items.extend(y.iter().cloned());
            Ok(Value::tuple(items))
        }
        (BinOp::Mul, seq @ (Value::Str(_) | Value::List(_) | Value::Tuple(_)), n) => {
            match repeat_count(n)? {
                Some(n) => sequence_mul(interp, seq, n),
                None => Err(type_error(format!(
                    "can't multiply sequence by non-int of type '{}'",
                    n.type_name()
                ))),
            }
        }
        (BinOp::Mul, n, seq @ (Value::Str(_) | Value::List(_) | Value::Tuple(_))) => {
            match repeat_count(n)? {
                Some(n) => sequence_mul(interp, seq, n),
                None => Err(type_error(format!(
                    "can't multiply sequence by non-int of type '{}'",
                    n.type_name()
                ))),
            }
        }
        (BinOp::Mod, Value::Str(template), values) => {
            let text = format::percent_format(template, values)?;
            interp.reserve(text.len())?;
            Ok(Value::string(text))
        }
        (
            BinOp::BitOr | BinOp::BitAnd | BinOp::Sub | BinOp::BitXor,
            Value::Set(x),
            Value::Set(y),
        ) => {
            let out = set_op(op, &x.borrow(), &y.borrow())?;
            Ok(Value::set(out))
        }
        (BinOp::BitOr, Value::Dict(x), Value::Dict(y)) => {
            let mut out = x.borrow().clone();
            for (k, v) in y.borrow().iter() {
                out.insert(k.clone(), v.clone())?;
            }
            Ok(Value::dict(out))
        }
        _ => Err(unsupported(op.symbol(), a, b)),
    }
}

pub fn unary_op(op: UnaryOp, v: &Value) -> Result<Value, Unwind> {
    match (op, v) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.truthy())),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, Value::Int(i)) => Ok(match i.checked_neg() {
            Some(n) => Value::Int(n),
            None => Value::from_bigint(-BigInt::from(*i)),
        }),
        (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-(*b as i64))),
        (UnaryOp::Neg, Value::BigInt(i)) => Ok(Value::from_bigint(-(**i).clone())),
        (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
        (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        (UnaryOp::Pos, v @ (Value::Int(_) | Value::BigInt(_))) => Ok(v.clone()),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(!i)),
        (UnaryOp::Invert, Value::Bool(b)) => Ok(Value::Int(!(*b as i64))),
        (UnaryOp::Invert, Value::BigInt(i)) => {
            Ok(Value::from_bigint(-((**i).clone() + BigInt::from(1))))
        }
        (op, v) => {
            let symbol = match op {
                UnaryOp::Neg => "-",
                UnaryOp::Pos => "+",
                UnaryOp::Invert => "~",
                UnaryOp::Not => "not",
            };
            Err(type_error(format!(
                "bad operand type for unary {symbol}: '{}'",
                v.type_name()
            )))
        }
    }
}

/// `a == b`
pub fn py_eq(a: &Value, b: &Value) -> Result<bool, Unwind> {
    eq_at(a, b, 0)
}

fn eq_at(a: &Value, b: &Value, depth: usize) -> Result<bool, Unwind> {
    if depth > MAX_COMPARE_DEPTH {
        return Err(Unwind::exc(
            ExcKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    let items_eq = |x: &[Value], y: &[Value]| -> Result<bool, Unwind> {
        if x.len() != y.len() {
            return Ok(false);
        }
        for (p, q) in x.iter().zip(y.iter()) {
            if !p.same_object(q) && !eq_at(p, q, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    };
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        _ if a.is_int() && b.is_int() => Ok(a.as_bigint() == b.as_bigint()),
        _ if a.is_number() && b.is_number() => Ok(a.as_float() == b.as_float()),
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let (x, y) = (x.borrow(), y.borrow());
            items_eq(&x[..], &y[..])
        }
        (Value::Tuple(x), Value::Tuple(y)) => items_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let (x, y) = (x.borrow(), y.borrow());
            if x.len() != y.len() {
                return Ok(false);
            }
            for (k, v) in x.iter() {
                match y.get_hashed(&k.hash_key()?) {
                    Some(other) if v.same_object(other) || eq_at(v, other, depth + 1)? => {}
                    _ => return Ok(false),
                }
            }
            Ok(true)
        }
        (Value::Set(x), Value::Set(y)) => {
            let (x, y) = (x.borrow(), y.borrow());
            if x.len() != y.len() {
                return Ok(false);
            }
            for (k, _) in x.iter() {
                if !y.contains(k)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        (Value::Range(x), Value::Range(y)) => {
            let (lx, ly) = (x.len(), y.len());
            Ok(lx == ly && (lx == 0 || (x.start == y.start && (lx == 1 || x.step == y.step))))
        }
        _ => Ok(a.same_object(b)),
    }
}

fn not_supported(symbol: &str, a: &Value, b: &Value) -> Unwind {
    type_error(format!(
        "'{symbol}' not supported between instances of '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

/// Ordering for `<`-style operators; `None` when unordered (NaN)
fn partial_cmp(symbol: &str, a: &Value, b: &Value, depth: usize) -> Result<Option<Ordering>, Unwind> {
    if depth > MAX_COMPARE_DEPTH {
        return Err(Unwind::exc(
            ExcKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Some(x.cmp(y))),
        _ if a.is_int() && b.is_int() => Ok(a.as_bigint().partial_cmp(&b.as_bigint())),
        _ if a.is_number() && b.is_number() => Ok(a.as_float().partial_cmp(&b.as_float())),
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            seq_cmp(symbol, &x, &y, depth)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_cmp(symbol, x, y, depth),
        _ => Err(not_supported(symbol, a, b)),
    }
}

fn seq_cmp(symbol: &str, x: &[Value], y: &[Value], depth: usize) -> Result<Option<Ordering>, Unwind> {
    for (p, q) in x.iter().zip(y.iter()) {
        if p.same_object(q) || eq_at(p, q, depth + 1)? {
            continue;
        }
        return partial_cmp(symbol, p, q, depth + 1);
    }
    Ok(Some(x.len().cmp(&y.len())))
}

fn subset(a: &Dict, b: &Dict) -> Result<bool, Unwind> {
    for (k, _) in a.iter() {
        if !b.contains(k)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `a < b`, used by sorting, `min` and `max`
pub fn py_lt(a: &Value, b: &Value) -> Result<bool, Unwind> {
    Ok(partial_cmp("<", a, b, 0)? == Some(Ordering::Less))
}

pub fn contains(interp: &mut Interpreter, container: &Value, item: &Value) -> Result<bool, Unwind> {
    match container {
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(&**needle)),
            other => Err(type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => {
            let items = items.borrow().clone();
            scan(interp, &items, item)
        }
        Value::Tuple(items) => scan(interp, items, item),
        Value::Dict(d) | Value::Set(d) => d.borrow().contains(item),
        Value::Range(r) => match item {
            Value::Float(f) if f.fract() == 0.0 => Ok(r.contains(*f as i64)),
            other => Ok(other.as_int().is_some_and(|i| r.contains(i))),
        },
        Value::Iterator(_) => {
            let mut it = interp.iter_value(container)?;
            while let Some(x) = it.next() {
                interp.checkpoint()?;
                if x.same_object(item) || py_eq(&x, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

fn scan(interp: &mut Interpreter, items: &[Value], item: &Value) -> Result<bool, Unwind> {
    for x in items {
        interp.checkpoint()?;
        if x.same_object(item) || py_eq(x, item)? {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn compare(interp: &mut Interpreter, op: CmpOp, a: &Value, b: &Value) -> Result<bool, Unwind> {
    match op {
        CmpOp::Eq => py_eq(a, b),
        CmpOp::NotEq => Ok(!py_eq(a, b)?),
        CmpOp::Is => Ok(a.same_object(b)),
        CmpOp::IsNot => Ok(!a.same_object(b)),
        CmpOp::In => contains(interp, b, a),
        CmpOp::NotIn => Ok(!contains(interp, b, a)?),
        CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => {
            if let (Value::Set(x), Value::Set(y)) = (a, b) {
                let (x, y) = (x.borrow(), y.borrow());
                return match op {
                    CmpOp::Lt => Ok(x.len() < y.len() && subset(&x, &y)?),
                    CmpOp::LtE => subset(&x, &y),
                    CmpOp::Gt => Ok(x.len() > y.len() && subset(&y, &x)?),
                    _ => subset(&y, &x),
                };
            }
            let ordering = partial_cmp(op.symbol(), a, b, 0)?;
            Ok(match (op, ordering) {
                (_, None) => false,
                (CmpOp::Lt, Some(o)) => o == Ordering::Less,
                (CmpOp::LtE, Some(o)) => o != Ordering::Greater,
                (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_division_and_modulo_follow_sign_of_divisor() {
        assert_eq!(int_floordiv(-7, 2).unwrap(), -4);
        assert_eq!(int_mod(-7, 2).unwrap(), 1);
        assert_eq!(int_mod(7, -2).unwrap(), -1);
        assert_eq!(float_mod(-1.0, 3.0).unwrap(), 2.0);
        assert!(int_floordiv(1, 0).is_err());
    }

    #[test]
    fn test_pow() {
        assert!(matches!(int_pow(2, 10).unwrap(), Value::Int(1024)));
        assert!(matches!(int_pow(2, -1).unwrap(), Value::Float(f) if f == 0.5));
        assert_eq!(
            format::repr(&int_pow(10, 30).unwrap()),
            "1000000000000000000000000000000"
        );
        assert!(int_pow(3, 100_000_000).is_err());
    }

    #[test]
    fn test_integers_grow_past_64_bits() {
        let big = arith(BinOp::Mul, Num::I(1_000_000_000_000_000_000), Num::I(10)).unwrap();
        assert_eq!(format::repr(&big), "10000000000000000000");
        let back = arith(BinOp::FloorDiv, num(&big).unwrap(), Num::I(10)).unwrap();
        assert!(matches!(back, Value::Int(1_000_000_000_000_000_000)));
        assert!(matches!(
            arith(BinOp::FloorDiv, Num::I(i64::MIN), Num::I(-1)).unwrap(),
            Value::BigInt(_)
        ));
        let negative = unary_op(UnaryOp::Neg, &big).unwrap();
        assert_eq!(format::repr(&negative), "-10000000000000000000");
        assert!(py_lt(&negative, &Value::Int(i64::MIN)).unwrap());
        assert!(py_eq(&Value::from_bigint(BigInt::from(1) << 70usize), &Value::Float(2f64.powi(70))).unwrap());
        let mod_big = arith(BinOp::Mod, Num::I(-7), num(&big).unwrap()).unwrap();
        assert_eq!(format::repr(&mod_big), "9999999999999999993");
    }

    #[test]
    fn test_equality_across_numeric_types() {
        assert!(py_eq(&Value::Int(1), &Value::Float(1.0)).unwrap());
        assert!(py_eq(&Value::Bool(true), &Value::Int(1)).unwrap());
        assert!(!py_eq(&Value::str("1"), &Value::Int(1)).unwrap());
        let a = Value::list(vec![Value::Int(1), Value::tuple(vec![Value::str("x")])]);
        let b = Value::list(vec![Value::Float(1.0), Value::tuple(vec![Value::str("x")])]);
        assert!(py_eq(&a, &b).unwrap());
    }

    #[test]
    fn test_ordering() {
        assert!(py_lt(&Value::str("abc"), &Value::str("abd")).unwrap());
        let a = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::tuple(vec![Value::Int(1), Value::Int(3)]);
        assert!(py_lt(&a, &b).unwrap());
        assert!(py_lt(&Value::Int(1), &Value::str("a")).is_err());
    }

    #[test]
    fn test_unary() {
        assert!(matches!(unary_op(UnaryOp::Neg, &Value::Int(3)).unwrap(), Value::Int(-3)));
        assert!(matches!(unary_op(UnaryOp::Not, &Value::list(vec![])).unwrap(), Value::Bool(true)));
        assert!(unary_op(UnaryOp::Neg, &Value::str("x")).is_err());
    }
}
