//! Runtime values
//!
//! Everything a snippet can touch is a `Value`. Containers share their
//! storage through `Rc<RefCell<_>>`, so aliasing behaves the way students
//! expect (`b = a; b.append(1)` changes `a`). Values never leave the
//! thread that created them.

use crate::ast::FunctionDef;
use crate::exception::{type_error, ExcKind, Exception, Unwind};
use crate::interp::Interpreter;
use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// One mutable name table: the module namespace or a call frame's locals
pub type Scope = Rc<RefCell<HashMap<Rc<str>, Value>>>;

/// Signature shared by every function implemented in Rust
pub type NativeFn = fn(&mut Interpreter, Args) -> Result<Value, Unwind>;

pub fn new_scope() -> Scope {
    Rc::new(RefCell::new(HashMap::new()))
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    /// Integers outside the `i64` range; smaller results fold back into `Int`
    BigInt(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    /// Sets reuse the dict table with `None` values
    Set(Rc<RefCell<Dict>>),
    Range(Range),
    Iterator(Rc<RefCell<Iter>>),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    Method(Rc<Method>),
    Module(Rc<Module>),
    Type(TypeTag),
    ExceptionType(ExcKind),
    Exception(Rc<Exception>),
    Ellipsis,
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn string(s: String) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    pub fn set(dict: Dict) -> Value {
        Value::Set(Rc::new(RefCell::new(dict)))
    }

    pub fn from_bigint(i: BigInt) -> Value {
        match i.to_i64() {
            Some(small) => Value::Int(small),
            None => Value::BigInt(Rc::new(i)),
        }
    }

    pub fn builtin(name: &'static str, func: NativeFn) -> Value {
        Value::Builtin(Rc::new(Builtin { name, func }))
    }

    pub fn iterator(name: &'static str, items: Vec<Value>) -> Value {
        Value::Iterator(Rc::new(RefCell::new(Iter {
            name,
            source: IterSource::Items(items.into_iter()),
        })))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::None => TypeTag::NoneType,
            Value::Bool(_) => TypeTag::Bool,
            Value::Int(_) | Value::BigInt(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Str(_) => TypeTag::Str,
            Value::List(_) => TypeTag::List,
            Value::Tuple(_) => TypeTag::Tuple,
            Value::Dict(_) => TypeTag::Dict,
            Value::Set(_) => TypeTag::Set,
            Value::Range(_) => TypeTag::Range,
            Value::Iterator(_) => TypeTag::Iterator,
            Value::Function(_) => TypeTag::Function,
            Value::Builtin(_) => TypeTag::BuiltinFunction,
            Value::Method(_) => TypeTag::Method,
            Value::Module(_) => TypeTag::Module,
            Value::Type(_) | Value::ExceptionType(_) => TypeTag::Type,
            Value::Exception(_) => TypeTag::Exception,
            Value::Ellipsis => TypeTag::Ellipsis,
        }
    }

    /// Name used in error messages, e.g. `'int' object is not iterable`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Exception(e) => e.kind.name(),
            Value::Iterator(it) => it.borrow().name,
            other => other.type_tag().name(),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::BigInt(_) => true,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) | Value::Set(d) => !d.borrow().is_empty(),
            Value::Range(r) => r.len() > 0,
            _ => true,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Integer view of ints and bools
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Exact view of any integer, bools included
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Value::Int(i) => Some(BigInt::from(*i)),
            Value::Bool(b) => Some(BigInt::from(*b as i64)),
            Value::BigInt(i) => Some((**i).clone()),
            _ => None,
        }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_) | Value::BigInt(_) | Value::Bool(_))
    }

    /// Float view of any real number
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::BigInt(i) => Some(i.to_f64().unwrap_or(f64::INFINITY)),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self,
            Value::Int(_) | Value::BigInt(_) | Value::Float(_) | Value::Bool(_)
        )
    }

    pub fn hash_key(&self) -> Result<HashKey, Unwind> {
        let key = match self {
            Value::None => HashKey::None,
            Value::Ellipsis => HashKey::Ellipsis,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::BigInt(i) => HashKey::BigInt((**i).clone()),
            Value::Float(f) => float_key(*f),
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Tuple(items) => HashKey::Tuple(
                items
                    .iter()
                    .map(Value::hash_key)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Range(r) => HashKey::Range(r.start, r.stop, r.step),
            Value::Type(tag) => HashKey::Named(tag.name()),
            Value::ExceptionType(kind) => HashKey::Named(kind.name()),
            Value::Function(f) => HashKey::Ident(Rc::as_ptr(f) as *const () as usize),
            Value::Builtin(b) => HashKey::Ident(Rc::as_ptr(b) as *const () as usize),
            Value::Method(m) => HashKey::Ident(Rc::as_ptr(m) as *const () as usize),
            Value::Module(m) => HashKey::Ident(Rc::as_ptr(m) as *const () as usize),
            Value::Exception(e) => HashKey::Ident(Rc::as_ptr(e) as *const () as usize),
            Value::Iterator(i) => HashKey::Ident(Rc::as_ptr(i) as *const () as usize),
            Value::List(_) | Value::Dict(_) | Value::Set(_) => {
                return Err(type_error(format!(
                    "unhashable type: '{}'",
                    self.type_name()
                )))
            }
        };
        Ok(key)
    }

    /// `is` comparison
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) | (Value::Ellipsis, Value::Ellipsis) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::BigInt(a), Value::BigInt(b)) => Rc::ptr_eq(a, b),
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty()),
            (Value::Dict(a), Value::Dict(b)) | (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Iterator(a), Value::Iterator(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::ExceptionType(a), Value::ExceptionType(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::format::repr(self))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<BigInt> for Value {
    fn from(i: BigInt) -> Self {
        Value::from_bigint(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

fn float_key(f: f64) -> HashKey {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        HashKey::Int(f as i64)
    } else if f.is_finite() && f.fract() == 0.0 {
        BigInt::from_f64(f).map_or(HashKey::Float(f.to_bits()), HashKey::BigInt)
    } else {
        HashKey::Float(f.to_bits())
    }
}

/// Hashable projection of a value; equal numbers share a key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Ellipsis,
    Int(i64),
    BigInt(BigInt),
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Range(i64, i64, i64),
    Named(&'static str),
    Ident(usize),
}

/// Types that can be named in snippets (`int`, `list`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Set,
    Range,
    Iterator,
    Function,
    BuiltinFunction,
    Method,
    Module,
    Type,
    Exception,
    Ellipsis,
}

impl TypeTag {
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::NoneType => "NoneType",
            TypeTag::Bool => "bool",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Str => "str",
            TypeTag::List => "list",
            TypeTag::Tuple => "tuple",
            TypeTag::Dict => "dict",
            TypeTag::Set => "set",
            TypeTag::Range => "range",
            TypeTag::Iterator => "iterator",
            TypeTag::Function => "function",
            TypeTag::BuiltinFunction => "builtin_function_or_method",
            TypeTag::Method => "method",
            TypeTag::Module => "module",
            TypeTag::Type => "type",
            TypeTag::Exception => "Exception",
            TypeTag::Ellipsis => "ellipsis",
        }
    }

    /// `isinstance(True, int)` holds
    pub fn is_subtype_of(self, other: TypeTag) -> bool {
        self == other || (self == TypeTag::Bool && other == TypeTag::Int)
    }
}

/// A `range` object; iteration never materializes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let n = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        n.min(usize::MAX as i128) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        let v = self.start as i128 + index as i128 * self.step as i128;
        Some(v as i64)
    }

    pub fn contains(&self, v: i64) -> bool {
        let (v, start, stop, step) = (v as i128, self.start as i128, self.stop as i128, self.step as i128);
        let in_bounds = if step > 0 {
            start <= v && v < stop
        } else {
            stop < v && v <= start
        };
        in_bounds && (v - start) % step == 0
    }
}

/// Insertion-ordered hash table backing `dict` and `set`
#[derive(Clone, Default)]
pub struct Dict {
    entries: Vec<Option<(Value, Value)>>,
    index: HashMap<HashKey, usize>,
    len: usize,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, Unwind> {
        let hk = key.hash_key()?;
        Ok(self.get_hashed(&hk).cloned())
    }

    pub fn get_hashed(&self, key: &HashKey) -> Option<&Value> {
        let idx = *self.index.get(key)?;
        self.entries[idx].as_ref().map(|(_, v)| v)
    }

    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.get_hashed(&HashKey::Str(Rc::from(key)))
    }

    pub fn contains(&self, key: &Value) -> Result<bool, Unwind> {
        Ok(self.index.contains_key(&key.hash_key()?))
    }

    /// Insert or replace; an existing entry keeps its original key object
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), Unwind> {
        let hk = key.hash_key()?;
        if let Some(&idx) = self.index.get(&hk) {
            if let Some(entry) = self.entries[idx].as_mut() {
                entry.1 = value;
            }
            return Ok(());
        }
        self.index.insert(hk, self.entries.len());
        self.entries.push(Some((key, value)));
        self.len += 1;
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, Unwind> {
        let hk = key.hash_key()?;
        let Some(idx) = self.index.remove(&hk) else {
            return Ok(None);
        };
        let removed = self.entries[idx].take().map(|(_, v)| v);
        self.len -= 1;
        self.compact();
        Ok(removed)
    }

    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        while let Some(slot) = self.entries.pop() {
            if let Some((k, v)) = slot {
                if let Ok(hk) = k.hash_key() {
                    self.index.remove(&hk);
                }
                self.len -= 1;
                return Some((k, v));
            }
        }
        None
    }

    pub fn pop_first(&mut self) -> Option<(Value, Value)> {
        let idx = self.entries.iter().position(Option::is_some)?;
        let (k, v) = self.entries[idx].take()?;
        if let Ok(hk) = k.hash_key() {
            self.index.remove(&hk);
        }
        self.len -= 1;
        self.compact();
        Some((k, v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.len = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().flatten().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> Vec<Value> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn items(&self) -> Vec<(Value, Value)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    fn compact(&mut self) {
        if self.entries.len() <= 2 * self.len + 8 {
            return;
        }
        let live: Vec<(Value, Value)> = self.entries.drain(..).flatten().collect();
        self.index.clear();
        for (i, (k, _)) in live.iter().enumerate() {
            if let Ok(hk) = k.hash_key() {
                self.index.insert(hk, i);
            }
        }
        self.entries = live.into_iter().map(Some).collect();
    }
}

/// A user-defined function or lambda together with its captured scopes
pub struct Function {
    pub def: Rc<FunctionDef>,
    /// One slot per positional parameter, filled where a default exists
    pub defaults: Vec<Option<Value>>,
    pub kw_defaults: Vec<Option<Value>>,
    pub enclosing: Rc<[Scope]>,
}

pub struct Builtin {
    pub name: &'static str,
    pub func: NativeFn,
}

/// A method looked up on a builtin value, e.g. `names.append`
pub struct Method {
    pub receiver: Value,
    pub name: Rc<str>,
}

pub struct Module {
    pub name: Rc<str>,
    pub attrs: RefCell<HashMap<Rc<str>, Value>>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Self {
            name: Rc::from(name),
            attrs: RefCell::new(HashMap::new()),
        }
    }

    pub fn set(&self, name: &str, value: Value) {
        self.attrs.borrow_mut().insert(Rc::from(name), value);
    }

    pub fn with_function(self, name: &'static str, func: NativeFn) -> Self {
        self.set(name, Value::builtin(name, func));
        self
    }

    pub fn with_value(self, name: &str, value: Value) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }
}

/// Iterator objects returned by `iter()`, `enumerate()`, `zip()` and friends
pub struct Iter {
    pub name: &'static str,
    pub source: IterSource,
}

pub enum IterSource {
    Items(std::vec::IntoIter<Value>),
    Range { next: i64, stop: i64, step: i64 },
    List { list: Rc<RefCell<Vec<Value>>>, idx: usize },
    Shared(Rc<RefCell<Iter>>),
}

impl Iterator for IterSource {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            IterSource::Items(items) => items.next(),
            IterSource::Range { next, stop, step } => {
                let live = if *step > 0 { *next < *stop } else { *next > *stop };
                if !live {
                    return None;
                }
                let current = *next;
                *next = next.checked_add(*step).unwrap_or(*stop);
                Some(Value::Int(current))
            }
            IterSource::List { list, idx } => {
                let item = list.borrow().get(*idx).cloned();
                *idx += 1;
                item
            }
            IterSource::Shared(inner) => inner.borrow_mut().source.next(),
        }
    }
}

/// Call arguments after `*` and `**` expansion
#[derive(Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(Rc<str>, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keywords.is_empty()
    }

    /// Check the positional count for a builtin taking `min..=max` arguments
    pub fn expect(&self, name: &str, min: usize, max: usize) -> Result<(), Unwind> {
        let n = self.positional.len();
        if n >= min && n <= max {
            return Ok(());
        }
        let message = if min == max {
            match min {
                0 => format!("{name}() takes no arguments ({n} given)"),
                1 => format!("{name}() takes exactly one argument ({n} given)"),
                _ => format!("{name}() takes exactly {min} arguments ({n} given)"),
            }
        } else if n < min {
            format!("{name}() takes at least {min} arguments ({n} given)")
        } else {
            format!("{name}() takes at most {max} arguments ({n} given)")
        };
        Err(type_error(message))
    }

    pub fn take_keyword(&mut self, key: &str) -> Option<Value> {
        let idx = self.keywords.iter().position(|(k, _)| &**k == key)?;
        Some(self.keywords.remove(idx).1)
    }

    /// Reject any keyword that was not consumed
    pub fn no_keywords(&self, name: &str) -> Result<(), Unwind> {
        match self.keywords.first() {
            None => Ok(()),
            Some((k, _)) => Err(type_error(format!(
                "{name}() got an unexpected keyword argument '{k}'"
            ))),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.positional.get(idx)
    }
}

/// Extract an integer argument, accepting bools like Python does
pub fn expect_int(value: &Value, what: &str) -> Result<i64, Unwind> {
    if let Value::BigInt(_) = value {
        return Err(int_too_large());
    }
    value.as_int().ok_or_else(|| {
        type_error(format!(
            "{what} must be an integer, not '{}'",
            value.type_name()
        ))
    })
}

pub(crate) fn int_too_large() -> Unwind {
    Unwind::exc(
        ExcKind::OverflowError,
        "Python int too large to convert to C ssize_t",
    )
}

pub fn expect_float(value: &Value, what: &str) -> Result<f64, Unwind> {
    value.as_float().ok_or_else(|| {
        type_error(format!(
            "{what} must be a real number, not '{}'",
            value.type_name()
        ))
    })
}

pub fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, Unwind> {
    value.as_str().ok_or_else(|| {
        type_error(format!("{what} must be str, not {}", value.type_name()))
    })
}

/// Build an exception instance from constructor arguments
pub fn exception_from_args(kind: ExcKind, args: &[Value]) -> Exception {
    let message = match args {
        [] => String::new(),
        [single] => crate::format::to_str(single),
        many => crate::format::repr(&Value::tuple(many.to_vec())),
    };
    Exception::new(kind, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dict_preserves_insertion_order() {
        let mut d = Dict::new();
        d.insert(Value::str("b"), Value::Int(1)).unwrap();
        d.insert(Value::str("a"), Value::Int(2)).unwrap();
        d.insert(Value::str("b"), Value::Int(3)).unwrap();
        let keys: Vec<String> = d.keys().iter().map(crate::format::to_str).collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(d.get(&Value::str("b")).unwrap().unwrap().as_int(), Some(3));
    }

    #[test]
    fn test_numeric_keys_collapse() {
        let mut d = Dict::new();
        d.insert(Value::Int(1), Value::str("int")).unwrap();
        d.insert(Value::Float(1.0), Value::str("float")).unwrap();
        d.insert(Value::Bool(true), Value::str("bool")).unwrap();
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_unhashable_key() {
        let mut d = Dict::new();
        assert!(d.insert(Value::list(vec![]), Value::None).is_err());
    }

    #[test]
    fn test_remove_and_compact() {
        let mut d = Dict::new();
        for i in 0..100 {
            d.insert(Value::Int(i), Value::Int(i * i)).unwrap();
        }
        for i in 0..95 {
            d.remove(&Value::Int(i)).unwrap();
        }
        assert_eq!(d.len(), 5);
        assert_eq!(d.get(&Value::Int(97)).unwrap().unwrap().as_int(), Some(97 * 97));
        assert_eq!(d.keys().len(), 5);
    }

    #[test]
    fn test_range_len_and_contains() {
        let r = Range { start: 10, stop: 0, step: -3 };
        assert_eq!(r.len(), 4);
        assert!(r.contains(4));
        assert!(!r.contains(0));
        assert_eq!(r.get(3), Some(1));
    }

    #[test]
    fn test_big_integers_fold_back_and_hash_like_small_ones() {
        let big: BigInt = BigInt::from(i64::MAX) + 1;
        assert!(matches!(Value::from_bigint(big.clone()), Value::BigInt(_)));
        assert!(matches!(Value::from_bigint(big - 1), Value::Int(i64::MAX)));

        let mut d = Dict::new();
        let two_pow_70 = BigInt::from(1) << 70usize;
        d.insert(Value::from_bigint(two_pow_70), Value::str("int")).unwrap();
        d.insert(Value::Float(2f64.powi(70)), Value::str("float")).unwrap();
        assert_eq!(d.len(), 1);
    }
}
