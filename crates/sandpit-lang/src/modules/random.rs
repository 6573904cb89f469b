//! `random`, backed by the interpreter's seeded `StdRng`

use crate::exception::{type_error, value_error, ExcKind, Unwind};
use crate::interp::Interpreter;
use crate::value::{expect_float, expect_int, Args, Module, Value};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

type NativeResult = Result<Value, Unwind>;

pub(super) fn module() -> Module {
    Module::new("random")
        .with_function("seed", seed)
        .with_function("random", random)
        .with_function("uniform", uniform)
        .with_function("randint", randint)
        .with_function("randrange", randrange)
        .with_function("choice", choice)
        .with_function("choices", choices)
        .with_function("shuffle", shuffle)
        .with_function("sample", sample)
        .with_function("gauss", gauss)
}

fn seed(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("seed")?;
    args.expect("seed", 0, 1)?;
    let value = match args.get(0) {
        None | Some(Value::None) => rand::thread_rng().gen(),
        Some(Value::Int(i)) => *i as u64,
        Some(Value::BigInt(i)) => i.iter_u64_digits().next().unwrap_or(0),
        Some(other) => {
            let mut hasher = DefaultHasher::new();
            other.hash_key()?.hash(&mut hasher);
            hasher.finish()
        }
    };
    interp.seed(value);
    Ok(Value::None)
}

fn random(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.expect("random", 0, 0)?;
    Ok(Value::Float(interp.rng.gen::<f64>()))
}

fn uniform(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("uniform")?;
    args.expect("uniform", 2, 2)?;
    let a = expect_float(&args.positional[0], "a")?;
    let b = expect_float(&args.positional[1], "b")?;
    Ok(Value::Float(a + (b - a) * interp.rng.gen::<f64>()))
}

fn randint(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("randint")?;
    args.expect("randint", 2, 2)?;
    let a = expect_int(&args.positional[0], "a")?;
    let b = expect_int(&args.positional[1], "b")?;
    if a > b {
        return Err(value_error(format!("empty range in randrange({a}, {})", b + 1)));
    }
    Ok(Value::Int(interp.rng.gen_range(a..=b)))
}

fn randrange(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("randrange")?;
    args.expect("randrange", 1, 3)?;
    let mut bounds = Vec::with_capacity(3);
    for v in &args.positional {
        bounds.push(expect_int(v, "randrange() argument")?);
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(type_error("randrange expected at most 3 arguments")),
    };
    if step == 0 {
        return Err(value_error("zero step for randrange()"));
    }
    let span = if step > 0 {
        (stop - start + step - 1) / step
    } else {
        (start - stop - step - 1) / -step
    };
    if span <= 0 {
        return Err(value_error(format!(
            "empty range in randrange({start}, {stop}, {step})"
        )));
    }
    let n = interp.rng.gen_range(0..span);
    Ok(Value::Int(start + n * step))
}

fn population(interp: &mut Interpreter, value: &Value) -> Result<Vec<Value>, Unwind> {
    match value {
        Value::Set(_) | Value::Dict(_) => Err(type_error(
            "Population must be a sequence.  For dicts or sets, use sorted(d).",
        )),
        other => interp.collect(other),
    }
}

fn choice(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("choice")?;
    args.expect("choice", 1, 1)?;
    let items = population(interp, &args.positional[0])?;
    items
        .choose(&mut interp.rng)
        .cloned()
        .ok_or_else(|| Unwind::exc(ExcKind::IndexError, "Cannot choose from an empty sequence"))
}

fn choices(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let weights = args.take_keyword("weights").filter(|w| !w.is_none());
    let k = match args.take_keyword("k") {
        Some(v) => expect_int(&v, "k")?.max(0) as usize,
        None => 1,
    };
    args.no_keywords("choices")?;
    args.expect("choices", 1, 2)?;
    let items = population(interp, &args.positional[0])?;
    let weights = match weights.or_else(|| args.get(1).cloned()) {
        None => None,
        Some(w) => {
            let values = interp.collect(&w)?;
            if values.len() != items.len() {
                return Err(value_error(
                    "The number of weights does not match the population",
                ));
            }
            let mut floats = Vec::with_capacity(values.len());
            for v in &values {
                floats.push(expect_float(v, "weight")?);
            }
            Some(floats)
        }
    };
    if items.is_empty() {
        return Err(Unwind::exc(ExcKind::IndexError, "Cannot choose from an empty population"));
    }
    interp.reserve(k * crate::heap::VALUE_SIZE)?;
    let mut out = Vec::with_capacity(k);
    match weights {
        None => {
            for _ in 0..k {
                let idx = interp.rng.gen_range(0..items.len());
                out.push(items[idx].clone());
            }
        }
        Some(weights) => {
            let total: f64 = weights.iter().sum();
            if total <= 0.0 || !total.is_finite() {
                return Err(value_error("Total of weights must be greater than zero"));
            }
            for _ in 0..k {
                let mut target = interp.rng.gen::<f64>() * total;
                let mut picked = items.len() - 1;
                for (i, w) in weights.iter().enumerate() {
                    if target < *w {
                        picked = i;
                        break;
                    }
                    target -= w;
                }
                out.push(items[picked].clone());
            }
        }
    }
    Ok(Value::list(out))
}

fn shuffle(interp: &mut Interpreter, args: Args) -> NativeResult {
    args.no_keywords("shuffle")?;
    args.expect("shuffle", 1, 1)?;
    let Value::List(items) = &args.positional[0] else {
        return Err(type_error(format!(
            "'{}' object does not support item assignment",
            args.positional[0].type_name()
        )));
    };
    items.borrow_mut().shuffle(&mut interp.rng);
    Ok(Value::None)
}

fn sample(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let k_kw = args.take_keyword("k");
    args.no_keywords("sample")?;
    args.expect("sample", 1, 2)?;
    let items = population(interp, &args.positional[0])?;
    let k = match args.get(1).cloned().or(k_kw) {
        Some(v) => expect_int(&v, "k")?,
        None => return Err(type_error("sample() missing 1 required positional argument: 'k'")),
    };
    if k < 0 || k as usize > items.len() {
        return Err(value_error("Sample larger than population or is negative"));
    }
    let picked = items
        .choose_multiple(&mut interp.rng, k as usize)
        .cloned()
        .collect();
    Ok(Value::list(picked))
}

fn gauss(interp: &mut Interpreter, mut args: Args) -> NativeResult {
    let mu_kw = args.take_keyword("mu");
    let sigma_kw = args.take_keyword("sigma");
    args.no_keywords("gauss")?;
    args.expect("gauss", 0, 2)?;
    let mu = match args.get(0).cloned().or(mu_kw) {
        Some(v) => expect_float(&v, "mu")?,
        None => 0.0,
    };
    let sigma = match args.get(1).cloned().or(sigma_kw) {
        Some(v) => expect_float(&v, "sigma")?,
        None => 1.0,
    };
    // Box-Muller
    let u1: f64 = 1.0 - interp.rng.gen::<f64>();
    let u2: f64 = interp.rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
    Ok(Value::Float(mu + sigma * z))
}

#[cfg(test)]
mod tests {
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
    fn test_seed_makes_sequences_repeatable() {
        let src = "\
import random
random.seed(7)
a = [random.randint(1, 100) for _ in range(5)]
random.seed(7)
b = [random.randint(1, 100) for _ in range(5)]
print(a == b, all(1 <= x <= 100 for x in a))
";
        assert_eq!(output(src), "True True\n");
    }

    #[test]
    fn test_sampling_helpers_stay_in_population() {
        let src = "\
import random
items = ['a', 'b', 'c', 'd']
print(random.choice(items) in items, len(random.sample(items, 3)), len(set(random.sample(items, 4))))
xs = list(range(10))
random.shuffle(xs)
print(sorted(xs) == list(range(10)), 0 <= random.random() < 1, random.randrange(0, 10, 5) in (0, 5))
";
        assert_eq!(output(src), "True 3 4\nTrue True True\n");
    }
}
