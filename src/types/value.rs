use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "binary-cache")]
use serde::{Deserialize, Serialize};

use super::term::CompareOp;

/// Class tags matched against primitive values without consulting the host.
pub const BUILTIN_CLASSES: &[&str] = &[
    "Boolean",
    "Integer",
    "Float",
    "String",
    "List",
    "Dictionary",
];

/// A name: rule names, variable names, dictionary keys and class tags.
///
/// Cloning is a reference-count bump, which matters because bindings and
/// renamed rules copy names constantly during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub struct Symbol(Arc<str>);

impl Symbol {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered sequence, optionally open-ended with a rest variable (`[x, *rest]`).
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub struct List {
    pub elements: Vec<Value>,
    pub rest: Option<Symbol>,
}

impl List {
    #[must_use]
    pub fn new(elements: Vec<Value>) -> Self {
        Self {
            elements,
            rest: None,
        }
    }

    /// A partial list whose tail is bound to `rest`.
    #[must_use]
    pub fn with_rest(elements: Vec<Value>, rest: impl Into<Symbol>) -> Self {
        Self {
            elements,
            rest: Some(rest.into()),
        }
    }
}

/// String-keyed mapping. Key order is irrelevant to matching.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub struct Dictionary {
    pub fields: BTreeMap<Symbol, Value>,
}

impl Dictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field, replacing any previous value under the same key.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(Symbol::new(key), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<Symbol>, V: Into<Value>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// A pattern matched open-world against a value.
///
/// Unlike a [`Dictionary`] literal, a dictionary pattern only requires its own
/// keys to be present in the value being matched.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub enum Pattern {
    Dictionary(Dictionary),
    Instance { tag: Symbol, fields: Dictionary },
}

impl Pattern {
    /// A class pattern with no field constraints, e.g. `User`.
    #[must_use]
    pub fn class(tag: &str) -> Self {
        Pattern::Instance {
            tag: Symbol::new(tag),
            fields: Dictionary::new(),
        }
    }

    /// Add a field constraint to this pattern.
    #[must_use]
    pub fn with(self, key: &str, value: impl Into<Value>) -> Self {
        match self {
            Pattern::Dictionary(fields) => Pattern::Dictionary(fields.with(key, value)),
            Pattern::Instance { tag, fields } => Pattern::Instance {
                tag,
                fields: fields.with(key, value),
            },
        }
    }

    #[must_use]
    pub fn fields(&self) -> &Dictionary {
        match self {
            Pattern::Dictionary(fields) | Pattern::Instance { fields, .. } => fields,
        }
    }
}

/// Opaque handle to a host-application object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub struct Instance {
    pub id: u64,
    pub class: Symbol,
}

impl Instance {
    #[must_use]
    pub fn new(id: u64, class: &str) -> Self {
        Self {
            id,
            class: Symbol::new(class),
        }
    }
}

/// Every runtime value the evaluator manipulates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(List),
    Dictionary(Dictionary),
    Pattern(Pattern),
    /// A logic variable. Bound variables are resolved through the query's
    /// bindings before any comparison.
    Variable(Symbol),
    Instance(Instance),
    RuleRef(Symbol),
}

impl Value {
    /// Compare two primitive values using the given operator.
    ///
    /// Returns `None` for incompatible or non-primitive operands. Integers and
    /// floats compare across types (`1 == 1.0`).
    #[must_use]
    pub fn compare(&self, op: CompareOp, other: &Value) -> Option<bool> {
        let ord = self.partial_cmp_value(other)?;
        Some(match op {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Neq => ord != Ordering::Equal,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Gte => ord != Ordering::Less,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Lte => ord != Ordering::Greater,
        })
    }

    fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => cmp_integer_float(*a, *b),
            (Value::Float(a), Value::Integer(b)) => {
                cmp_integer_float(*b, *a).map(Ordering::reverse)
            }
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    /// The built-in class tag of a primitive value, if it has one.
    #[must_use]
    pub fn builtin_class(&self) -> Option<&'static str> {
        match self {
            Value::Boolean(_) => Some("Boolean"),
            Value::Integer(_) => Some("Integer"),
            Value::Float(_) => Some("Float"),
            Value::String(_) => Some("String"),
            Value::List(_) => Some("List"),
            Value::Dictionary(_) => Some("Dictionary"),
            _ => None,
        }
    }
}

/// Exact ordering of an integer against a float. Casting the integer to
/// `f64` would round above 2^53 and make distinct numbers equal.
#[allow(clippy::cast_possible_truncation)]
fn cmp_integer_float(int: i64, float: f64) -> Option<Ordering> {
    // 2^63, exactly representable; every i64 is below it.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if float.is_nan() {
        return None;
    }
    if float >= BOUND {
        return Some(Ordering::Less);
    }
    if float < -BOUND {
        return Some(Ordering::Greater);
    }
    // In range, so the truncated float converts to i64 without loss.
    let whole = float.trunc();
    Some(match int.cmp(&(whole as i64)) {
        Ordering::Equal if float > whole => Ordering::Less,
        Ordering::Equal if float < whole => Ordering::Greater,
        ord => ord,
    })
}

/// Shorthand for a variable value.
#[must_use]
pub fn var(name: &str) -> Value {
    Value::Variable(Symbol::new(name))
}

/// Shorthand for a class pattern, e.g. `class("User").with("role", "admin")`.
#[must_use]
pub fn class(tag: &str) -> Pattern {
    Pattern::class(tag)
}

/// Shorthand for an empty dictionary pattern.
#[must_use]
pub fn pattern() -> Pattern {
    Pattern::Dictionary(Dictionary::new())
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(List::new(v.into_iter().map(Into::into).collect()))
    }
}

impl From<List> for Value {
    fn from(v: List) -> Self {
        Value::List(v)
    }
}

impl From<Dictionary> for Value {
    fn from(v: Dictionary) -> Self {
        Value::Dictionary(v)
    }
}

impl From<Pattern> for Value {
    fn from(v: Pattern) -> Self {
        Value::Pattern(v)
    }
}

impl From<Instance> for Value {
    fn from(v: Instance) -> Self {
        Value::Instance(v)
    }
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &Dictionary) -> fmt::Result {
    f.write_str("{")?;
    for (i, (key, value)) in fields.fields.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key}: {value}")?;
    }
    f.write_str("}")
}

impl fmt::Display for List {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{element}")?;
        }
        if let Some(rest) = &self.rest {
            if !self.elements.is_empty() {
                f.write_str(", ")?;
            }
            write!(f, "*{rest}")?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(f, self)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Dictionary(fields) => write_fields(f, fields),
            Pattern::Instance { tag, fields } if fields.is_empty() => write!(f, "{tag}"),
            Pattern::Instance { tag, fields } => {
                write!(f, "{tag}")?;
                write_fields(f, fields)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v:?}"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::List(list) => write!(f, "{list}"),
            Value::Dictionary(fields) => write!(f, "{fields}"),
            Value::Pattern(pattern) => write!(f, "{pattern}"),
            Value::Variable(name) => write!(f, "{name}"),
            Value::Instance(instance) => write!(f, "<{}#{}>", instance.class, instance.id),
            Value::RuleRef(name) => write!(f, "<rule {name}>"),
        }
    }
}
