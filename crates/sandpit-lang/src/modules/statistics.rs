//! `statistics`
//!
//! All-integer data keeps exact arithmetic where the result is integral,
//! so `mean([1, 2, 3])` is `2` rather than `2.0`.

use crate::exception::{type_error, ExcKind, Unwind};
use crate::interp::Interpreter;
use crate::ops;
use crate::value::{Args, Dict, Value};
use crate::value::Module;

type NativeResult = Result<Value, Unwind>;

pub(super) fn module() -> Module {
    Module::new("statistics")
        .with_function("mean", mean)
        .with_function("fmean", fmean)
        .with_function("median", median)
        .with_function("median_low", median_low)
        .with_function("median_high", median_high)
        .with_function("mode", mode)
        .with_function("multimode", multimode)
        .with_function("variance", variance)
        .with_function("pvariance", pvariance)
        .with_function("stdev", stdev)
        .with_function("pstdev", pstdev)
        .with_value("StatisticsError", Value::ExceptionType(ExcKind::StatisticsError))
}

fn statistics_error(message: &str) -> Unwind {
    Unwind::exc(ExcKind::StatisticsError, message)
}

enum Data {
    Ints(Vec<i64>),
    Floats(Vec<f64>),
}

impl Data {
    fn len(&self) -> usize {
        match self {
            Data::Ints(v) => v.len(),
            Data::Floats(v) => v.len(),
        }
    }

    fn floats(&self) -> Vec<f64> {
        match self {
            Data::Ints(v) => v.iter().map(|i| *i as f64).collect(),
            Data::Floats(v) => v.clone(),
        }
    }
}

fn numeric_data(interp: &mut Interpreter, args: &Args, name: &str) -> Result<Data, Unwind> {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    let items = interp.collect(&args.positional[0])?;
    let mut ints = Vec::with_capacity(items.len());
    let mut all_int = true;
    for item in &items {
        match item {
            Value::Int(_) | Value::Bool(_) => ints.push(item.as_int().unwrap_or(0)),
            Value::Float(_) | Value::BigInt(_) => all_int = false,
            other => {
                return Err(type_error(format!(
                    "can't convert type '{}' to numerator/denominator",
                    other.type_name()
                )))
            }
        }
    }
    if all_int {
        Ok(Data::Ints(ints))
    } else {
        Ok(Data::Floats(items.iter().filter_map(Value::as_float).collect()))
    }
}

/// `num / den` as an int when exact, else as a float
fn exact_ratio(num: i128, den: i128) -> Value {
    if den != 0 && num % den == 0 {
        if let Ok(i) = i64::try_from(num / den) {
            return Value::Int(i);
        }
    }
    Value::Float(num as f64 / den as f64)
}

fn mean(interp: &mut Interpreter, args: Args) -> NativeResult {
    let data = numeric_data(interp, &args, "mean")?;
    if data.len() == 0 {
        return Err(statistics_error("mean requires at least one data point"));
    }
    Ok(match data {
        Data::Ints(v) => {
            let total: i128 = v.iter().map(|i| *i as i128).sum();
            exact_ratio(total, v.len() as i128)
        }
        Data::Floats(v) => Value::Float(v.iter().sum::<f64>() / v.len() as f64),
    })
}

fn fmean(interp: &mut Interpreter, args: Args) -> NativeResult {
    let data = numeric_data(interp, &args, "fmean")?;
    if data.len() == 0 {
        return Err(statistics_error("fmean requires at least one data point"));
    }
    let values = data.floats();
    Ok(Value::Float(values.iter().sum::<f64>() / values.len() as f64))
}

fn sorted_items(interp: &mut Interpreter, args: &Args, name: &str) -> Result<Vec<Value>, Unwind> {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    let items = interp.collect(&args.positional[0])?;
    if items.is_empty() {
        return Err(statistics_error("no median for empty data"));
    }
    crate::builtins::sort_values(interp, items, None, false)
}

fn median(interp: &mut Interpreter, args: Args) -> NativeResult {
    let items = sorted_items(interp, &args, "median")?;
    let n = items.len();
    if n % 2 == 1 {
        return Ok(items[n / 2].clone());
    }
    let (a, b) = (&items[n / 2 - 1], &items[n / 2]);
    let total = ops::binary_op(interp, crate::ast::BinOp::Add, a, b)?;
    ops::binary_op(interp, crate::ast::BinOp::Div, &total, &Value::Int(2))
}

fn median_low(interp: &mut Interpreter, args: Args) -> NativeResult {
    let items = sorted_items(interp, &args, "median_low")?;
    let n = items.len();
    Ok(items[if n % 2 == 1 { n / 2 } else { n / 2 - 1 }].clone())
}

fn median_high(interp: &mut Interpreter, args: Args) -> NativeResult {
    let items = sorted_items(interp, &args, "median_high")?;
    Ok(items[items.len() / 2].clone())
}

/// Counts per distinct value, in first-seen order
fn tally(interp: &mut Interpreter, args: &Args, name: &str) -> Result<Vec<(Value, i64)>, Unwind> {
    args.no_keywords(name)?;
    args.expect(name, 1, 1)?;
    let items = interp.collect(&args.positional[0])?;
    let mut counts = Dict::new();
    for item in items {
        let current = counts.get(&item)?.and_then(|v| v.as_int()).unwrap_or(0);
        counts.insert(item, Value::Int(current + 1))?;
    }
    Ok(counts
        .items()
        .into_iter()
        .map(|(k, v)| (k, v.as_int().unwrap_or(0)))
        .collect())
}

fn mode(interp: &mut Interpreter, args: Args) -> NativeResult {
    let counts = tally(interp, &args, "mode")?;
    let mut best: Option<(Value, i64)> = None;
    for (value, count) in counts {
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((value, count));
        }
    }
    best.map(|(v, _)| v)
        .ok_or_else(|| statistics_error("no mode for empty data"))
}

fn multimode(interp: &mut Interpreter, args: Args) -> NativeResult {
    let counts = tally(interp, &args, "multimode")?;
    let top = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    Ok(Value::list(
        counts
            .into_iter()
            .filter(|(_, c)| *c == top)
            .map(|(v, _)| v)
            .collect(),
    ))
}

/// Variance with `ddof` 1 (sample) or 0 (population)
fn spread(data: &Data, ddof: usize) -> Value {
    let n = data.len();
    match data {
        Data::Ints(v) => {
            let n = n as i128;
            let sum: i128 = v.iter().map(|i| *i as i128).sum();
            let squares: i128 = v.iter().map(|i| (*i as i128) * (*i as i128)).sum();
            // sum of squared deviations is (n * squares - sum^2) / n
            exact_ratio(n * squares - sum * sum, n * (n - ddof as i128))
        }
        Data::Floats(v) => {
            let mean = v.iter().sum::<f64>() / n as f64;
            let ss: f64 = v.iter().map(|x| (x - mean) * (x - mean)).sum();
            Value::Float(ss / (n - ddof) as f64)
        }
    }
}

fn variance_of(interp: &mut Interpreter, args: &Args, name: &str, ddof: usize) -> NativeResult {
    let data = numeric_data(interp, args, name)?;
    if data.len() <= ddof {
        return Err(statistics_error(if ddof == 1 {
            "variance requires at least two data points"
        } else {
            "pvariance requires at least one data point"
        }));
    }
    Ok(spread(&data, ddof))
}

fn variance(interp: &mut Interpreter, args: Args) -> NativeResult {
    variance_of(interp, &args, "variance", 1)
}

fn pvariance(interp: &mut Interpreter, args: Args) -> NativeResult {
    variance_of(interp, &args, "pvariance", 0)
}

fn stdev(interp: &mut Interpreter, args: Args) -> NativeResult {
    let v = variance_of(interp, &args, "stdev", 1)?;
    Ok(Value::Float(v.as_float().unwrap_or(0.0).sqrt()))
}

fn pstdev(interp: &mut Interpreter, args: Args) -> NativeResult {
    let v = variance_of(interp, &args, "pstdev", 0)?;
    Ok(Value::Float(v.as_float().unwrap_or(0.0).sqrt()))
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
    fn test_central_tendency() {
        assert_eq!(
            output("import statistics as st\nprint(st.mean([1, 2, 3]), st.mean([1, 2]), st.median([3, 1, 2, 4]), st.median([5, 1, 3]), st.mode('abbc'))"),
            "2 1.5 2.5 3 b\n"
        );
    }

    #[test]
    fn test_spread() {
        assert_eq!(
            output("import statistics as st\nprint(st.variance([1, 2, 3]), st.pvariance([1, 2, 3, 4]), st.stdev([2, 4, 4, 4, 5, 5, 7, 9]))"),
            "1 1.25 2.138089935299395\n"
        );
    }

    #[test]
    fn test_empty_data_raises_statistics_error() {
        let mut interp = Interpreter::new();
        match interp.run_source("import statistics\nstatistics.mean([])") {
            Err(Unwind::Exception(e)) => {
                assert_eq!(e.kind, ExcKind::StatisticsError);
                assert!(e.kind.is_subclass_of(ExcKind::ValueError));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
