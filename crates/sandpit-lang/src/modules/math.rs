//! `math`

use crate::builtins::float_to_int;
use crate::exception::{type_error, value_error, ExcKind, Unwind};
use crate::interp::Interpreter;
use crate::ops::check_bits;
use crate::value::{expect_float, Args, Module, Value};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

type NativeResult = Result<Value, Unwind>;

pub(super) fn module() -> Module {
    Module::new("math")
        .with_value("pi", Value::Float(std::f64::consts::PI))
        .with_value("e", Value::Float(std::f64::consts::E))
        .with_value("tau", Value::Float(std::f64::consts::TAU))
        .with_value("inf", Value::Float(f64::INFINITY))
        .with_value("nan", Value::Float(f64::NAN))
        .with_function("sqrt", sqrt)
        .with_function("isqrt", isqrt)
        .with_function("floor", floor)
        .with_function("ceil", ceil)
        .with_function("trunc", trunc)
        .with_function("fabs", fabs)
        .with_function("pow", pow)
        .with_function("exp", exp)
        .with_function("log", log)
        .with_function("log10", log10)
        .with_function("log2", log2)
        .with_function("sin", sin)
        .with_function("cos", cos)
        .with_function("tan", tan)
        .with_function("asin", asin)
        .with_function("acos", acos)
        .with_function("atan", atan)
        .with_function("atan2", atan2)
        .with_function("degrees", degrees)
        .with_function("radians", radians)
        .with_function("hypot", hypot)
        .with_function("copysign", copysign)
        .with_function("fmod", fmod)
        .with_function("factorial", factorial)
        .with_function("gcd", gcd)
        .with_function("lcm", lcm)
        .with_function("comb", comb)
        .with_function("perm", perm)
        .with_function("prod", prod)
        .with_function("fsum", fsum)
        .with_function("isclose", isclose)
        .with_function("isfinite", isfinite)
        .with_function("isinf", isinf)
        .with_function("isnan", isnan)
}

fn domain_error() -> Unwind {
    value_error("math domain error")
}

fn overflow() -> Unwind {
    Unwind::exc(ExcKind::OverflowError, "math range error")
}

fn one_float(args: &Args, name: &str) -> Result<f64, Unwind> {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    expect_float(&args.positional[0], "argument")
}

fn two_floats(args: &Args, name: &str) -> Result<(f64, f64), Unwind> {
    args.no_keywords(name)?;
    args.expect(name, 2, 2)?;
    Ok((
        expect_float(&args.positional[0], "argument")?,
        expect_float(&args.positional[1], "argument")?,
    ))
}

fn checked(result: f64, input_finite: bool) -> NativeResult {
    if result.is_nan() && input_finite {
        return Err(domain_error());
    }
    if result.is_infinite() && input_finite {
        return Err(overflow());
    }
    Ok(Value::Float(result))
}

fn sqrt(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "sqrt")?;
    if x < 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.sqrt()))
}

fn isqrt(_: &mut Interpreter, args: Args) -> NativeResult {
    args.expect("isqrt", 1, 1)?;
    let n = big_arg(&args.positional[0])?;
    if n.is_negative() {
        return Err(value_error("isqrt() argument must be nonnegative"));
    }
    Ok(Value::from_bigint(n.sqrt()))
}

fn rounding(args: &Args, name: &str, op: fn(f64) -> f64) -> NativeResult {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    match &args.positional[0] {
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        v @ (Value::Int(_) | Value::BigInt(_)) => Ok(v.clone()),
        Value::Float(f) => float_to_int(op(*f)),
        other => Err(type_error(format!(
            "must be real number, not {}",
            other.type_name()
        ))),
    }
}

fn floor(_: &mut Interpreter, args: Args) -> NativeResult {
    rounding(&args, "floor", f64::floor)
}

fn ceil(_: &mut Interpreter, args: Args) -> NativeResult {
    rounding(&args, "ceil", f64::ceil)
}

fn trunc(_: &mut Interpreter, args: Args) -> NativeResult {
    rounding(&args, "trunc", f64::trunc)
}

fn fabs(_: &mut Interpreter, args: Args) -> NativeResult {
    Ok(Value::Float(one_float(&args, "fabs")?.abs()))
}

fn pow(_: &mut Interpreter, args: Args) -> NativeResult {
    let (x, y) = two_floats(&args, "pow")?;
    if x == 0.0 && y < 0.0 {
        return Err(domain_error());
    }
    checked(x.powf(y), x.is_finite() && y.is_finite())
}

fn exp(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "exp")?;
    checked(x.exp(), x.is_finite())
}

fn log(_: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("log")?;
    args.expect("log", 1, 2)?;
    let x = expect_float(&args.positional[0], "argument")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    match args.get(1) {
        None => Ok(Value::Float(x.ln())),
        Some(base) => {
            let base = expect_float(base, "argument")?;
            if base <= 0.0 {
                return Err(domain_error());
            }
            if base == 1.0 {
                return Err(Unwind::exc(ExcKind::ZeroDivisionError, "float division by zero"));
            }
            Ok(Value::Float(x.ln() / base.ln()))
        }
    }
}

fn log10(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "log10")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.log10()))
}

fn log2(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "log2")?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(Value::Float(x.log2()))
}

fn sin(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "sin")?;
    checked(x.sin(), x.is_finite())
}

fn cos(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "cos")?;
    checked(x.cos(), x.is_finite())
}

fn tan(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "tan")?;
    checked(x.tan(), x.is_finite())
}

fn asin(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "asin")?;
    checked(x.asin(), x.is_finite())
}

fn acos(_: &mut Interpreter, args: Args) -> NativeResult {
    let x = one_float(&args, "acos")?;
    checked(x.acos(), x.is_finite())
}

fn atan(_: &mut Interpreter, args: Args) -> NativeResult {
    Ok(Value::Float(one_float(&args, "atan")?.atan()))
}

fn atan2(_: &mut Interpreter, args: Args) -> NativeResult {
    let (y, x) = two_floats(&args, "atan2")?;
    Ok(Value::Float(y.atan2(x)))
}

fn degrees(_: &mut Interpreter, args: Args) -> NativeResult {
    Ok(Value::Float(one_float(&args, "degrees")?.to_degrees()))
}

fn radians(_: &mut Interpreter, args: Args) -> NativeResult {
    Ok(Value::Float(one_float(&args, "radians")?.to_radians()))
}

fn hypot(_: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("hypot")?;
    let mut total = 0.0f64;
    for v in &args.positional {
        let x = expect_float(v, "argument")?;
        total = total.hypot(x);
    }
    Ok(Value::Float(total))
}

fn copysign(_: &mut Interpreter, args: Args) -> NativeResult {
    let (x, y) = two_floats(&args, "copysign")?;
    Ok(Value::Float(x.copysign(y)))
}

fn fmod(_: &mut Interpreter, args: Args) -> NativeResult {
    let (x, y) = two_floats(&args, "fmod")?;
    if y == 0.0 || x.is_infinite() {
        return Err(domain_error());
    }
    Ok(Value::Float(x % y))
}

fn factorial(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("factorial")?;
    args.expect("factorial", 1, 1)?;
    let n = match &args.positional[0] {
        Value::Float(_) => {
            return Err(type_error(
                "'float' object cannot be interpreted as an integer",
            ))
        }
        v => big_arg(v)?,
    };
    if n.is_negative() {
        return Err(value_error("factorial() not defined for negative values"));
    }
    let mut acc = BigInt::one();
    let mut k = BigInt::from(2);
    while k <= n {
        interp.checkpoint()?;
        acc *= &k;
        check_bits(acc.bits())?;
        k += 1;
    }
    Ok(Value::from_bigint(acc))
}

fn big_arg(v: &Value) -> Result<BigInt, Unwind> {
    v.as_bigint().ok_or_else(|| {
        type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            v.type_name()
        ))
    })
}

fn int_args(args: &Args, name: &str) -> Result<Vec<BigInt>, Unwind> {
    args.no_keywords(name)?;
    args.positional.iter().map(big_arg).collect()
}

fn gcd(_: &mut Interpreter, args: Args) -> NativeResult {
    let values = int_args(&args, "gcd")?;
    let g = values
        .iter()
        .fold(BigInt::zero(), |acc, v| acc.gcd(v));
    Ok(Value::from_bigint(g))
}

fn lcm(_: &mut Interpreter, args: Args) -> NativeResult {
    let values = int_args(&args, "lcm")?;
    let mut acc = BigInt::one();
    for v in values {
        acc = acc.lcm(&v);
        check_bits(acc.bits())?;
    }
    Ok(Value::from_bigint(acc))
}

fn comb_perm(interp: &mut Interpreter, args: &Args, name: &str, ordered: bool) -> NativeResult {
    let values = int_args(args, name)?;
    let (n, k) = match values.as_slice() {
        [n, k] => (n.clone(), k.clone()),
        [n] if ordered => (n.clone(), n.clone()),
        _ => {
            return Err(type_error(format!(
                "{name}() takes exactly 2 arguments ({} given)",
                values.len()
            )))
        }
    };
    if n.is_negative() || k.is_negative() {
        return Err(value_error(format!(
            "{} must be a non-negative integer",
            if n.is_negative() { "n" } else { "k" }
        )));
    }
    if k > n {
        return Ok(Value::Int(0));
    }
    let k = if ordered { k } else { k.clone().min(&n - &k) };
    let mut acc = BigInt::one();
    let mut i = BigInt::zero();
    while i < k {
        interp.checkpoint()?;
        acc *= &n - &i;
        i += 1;
        if !ordered {
            // exact: the running product of i terms is divisible by i!
            acc /= &i;
        }
        check_bits(acc.bits())?;
    }
    Ok(Value::from_bigint(acc))
}

fn comb(interp: &mut Interpreter, args: Args) -> NativeResult {
    comb_perm(interp, &args, "comb", false)
}

fn perm(interp: &mut Interpreter, args: Args) -> NativeResult {
    comb_perm(interp, &args, "perm", true)
}

fn prod(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let start = args.take_keyword("start").unwrap_or(Value::Int(1));
    args.no_keywords("prod")?;
    args.expect("prod", 1, 1)?;
    let mut acc = start;
    for item in interp.collect(&args.positional[0])? {
        acc = crate::ops::binary_op(interp, crate::ast::BinOp::Mul, &acc, &item)?;
    }
    Ok(acc)
}

fn fsum(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("fsum")?;
    args.expect("fsum", 1, 1)?;
    // Shewchuk partials, exact up to the final rounding
    let mut partials: Vec<f64> = Vec::new();
    for item in interp.collect(&args.positional[0])? {
        let mut x = expect_float(&item, "argument")?;
        let mut kept = 0;
        for i in 0..partials.len() {
            let mut y = partials[i];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        partials.truncate(kept);
        partials.push(x);
    }
    Ok(Value::Float(partials.iter().sum()))
}

fn isclose(_: &mut Interpreter, mut args: Args) -> NativeResult {
    let rel_tol = match args.take_keyword("rel_tol") {
        Some(v) => expect_float(&v, "rel_tol")?,
        None => 1e-9,
    };
    let abs_tol = match args.take_keyword("abs_tol") {
        Some(v) => expect_float(&v, "abs_tol")?,
        None => 0.0,
    };
    let (a, b) = two_floats(&args, "isclose")?;
    if rel_tol < 0.0 || abs_tol < 0.0 {
        return Err(value_error("tolerances must be non-negative"));
    }
    if a == b {
        return Ok(Value::Bool(true));
    }
    if a.is_infinite() || b.is_infinite() {
        return Ok(Value::Bool(false));
    }
    let diff = (a - b).abs();
    Ok(Value::Bool(
        diff <= (rel_tol * b).abs() || diff <= (rel_tol * a).abs() || diff <= abs_tol,
    ))
}

fn isfinite(_: &mut Interpreter, args: Args) -> NativeResult {
    Ok(Value::Bool(one_float(&args, "isfinite")?.is_finite()))
}

fn isinf(_: &mut Interpreter, args: Args) -> NativeResult {
    Ok(Value::Bool(one_float(&args, "isinf")?.is_infinite()))
}

fn isnan(_: &mut Interpreter, args: Args) -> NativeResult {
    Ok(Value::Bool(one_float(&args, "isnan")?.is_nan()))
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
    fn test_math_functions() {
        assert_eq!(
            output("import math\nprint(math.sqrt(16), math.floor(-2.5), math.ceil(2.1), math.factorial(5), math.gcd(12, 18))"),
            "4.0 -3 3 120 6\n"
        );
        assert_eq!(
            output("import math\nprint(math.comb(5, 2), math.perm(5, 2), math.isqrt(17), math.fsum([0.1] * 10), round(math.pi, 4))"),
            "10 20 4 1.0 3.1416\n"
        );
    }

    #[test]
    fn test_integer_functions_are_exact_past_64_bits() {
        assert_eq!(
            output("import math\nprint(math.factorial(25))\nprint(math.comb(100, 50))"),
            "15511210043330985984000000\n100891344545564193334812497256\n"
        );
        assert_eq!(
            output("import math\nprint(math.isqrt(10 ** 40), math.gcd(2 ** 80, 6 ** 40), math.lcm(2 ** 70, 3))"),
            "100000000000000000000 1099511627776 3541774862152233910272\n"
        );
        assert_eq!(
            output("import math\nprint(math.floor(1e20), math.perm(30, 20))"),
            "100000000000000000000 73096577329197271449600000\n"
        );
    }

    #[test]
    fn test_domain_error() {
        let mut interp = Interpreter::new();
        match interp.run_source("import math\nmath.sqrt(-1)") {
            Err(Unwind::Exception(e)) => {
                assert_eq!(e.kind, ExcKind::ValueError);
                assert_eq!(e.message, "math domain error");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
