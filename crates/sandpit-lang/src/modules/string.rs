//! `string`

use crate::exception::Unwind;
use crate::interp::Interpreter;
use crate::value::{expect_str, Args, Module, Value};

const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &str = "0123456789";
const PUNCTUATION: &str = r##"!"#$%&'()*+,-./:;<=>?@[\]^_`{|}~"##;
const WHITESPACE: &str = " \t\n\r\x0b\x0c";

pub(super) fn module() -> Module {
    let letters = format!("{LOWERCASE}{UPPERCASE}");
    let printable = format!("{DIGITS}{letters}{PUNCTUATION}{WHITESPACE}");
    Module::new("string")
        .with_value("ascii_lowercase", Value::str(LOWERCASE))
        .with_value("ascii_uppercase", Value::str(UPPERCASE))
        .with_value("ascii_letters", Value::string(letters))
        .with_value("digits", Value::str(DIGITS))
        .with_value("hexdigits", Value::str("0123456789abcdefABCDEF"))
        .with_value("octdigits", Value::str("01234567"))
        .with_value("punctuation", Value::str(PUNCTUATION))
        .with_value("whitespace", Value::str(WHITESPACE))
        .with_value("printable", Value::string(printable))
        .with_function("capwords", capwords)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
    }
}

fn capwords(interp: &mut Interpreter, args: Args) -> Result<Value, Unwind> {
    args.no_keywords("capwords")?;
    args.expect("capwords", 1, 2)?;
    let text = expect_str(&args.positional[0], "capwords() argument 1")?;
    let out = match args.get(1).filter(|v| !v.is_none()) {
        None => text
            .split_whitespace()
            .map(capitalize)
            .collect::<Vec<_>>()
            .join(" "),
        Some(sep) => {
            let sep = expect_str(sep, "sep")?;
            text.split(sep).map(capitalize).collect::<Vec<_>>().join(sep)
        }
    };
    interp.reserve(out.len())?;
    Ok(Value::string(out))
}

#[cfg(test)]
mod tests {
    use crate::interp::Interpreter;
    use crate::io::CollectingSink;

    #[test]
    fn test_constants_and_capwords() {
        let mut interp = Interpreter::new();
        let sink = CollectingSink::new();
        interp.set_output(Box::new(sink.clone()));
        interp
            .run_source("import string\nprint(len(string.ascii_letters), string.digits, string.capwords('hello   wide world'))")
            .unwrap();
        assert_eq!(sink.contents(), "52 0123456789 Hello Wide World\n");
    }
}
