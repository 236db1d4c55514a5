use std::fmt;

#[cfg(feature = "binary-cache")]
use serde::{Deserialize, Serialize};

use super::goal::Goal;
use super::value::{Pattern, Symbol, Value};

/// One rule parameter: a value to unify with the argument, optionally
/// specialized by a pattern the argument must also match.
///
/// `u: User{role: "admin"}` is `Parameter { value: u, specializer: Some(User{role: "admin"}) }`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub struct Parameter {
    pub value: Value,
    pub specializer: Option<Pattern>,
}

impl Parameter {
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            specializer: None,
        }
    }

    #[must_use]
    pub fn typed(value: impl Into<Value>, specializer: Pattern) -> Self {
        Self {
            value: value.into(),
            specializer: Some(specializer),
        }
    }
}

/// A named, parameterized rule whose body is a conjunction of goals.
///
/// Rules are created via [`RuleSetBuilder`](super::RuleSetBuilder) or by
/// loading policy text with [`RuleSet::from_policy()`](super::RuleSet::from_policy).
/// A rule with an empty body is a fact.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub struct Rule {
    pub name: Symbol,
    pub params: Vec<Parameter>,
    pub body: Vec<Goal>,
}

impl Rule {
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.specializer {
            Some(pattern) => write!(f, "{}: {pattern}", self.value),
            None => write!(f, "{}", self.value),
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")?;
        for (i, goal) in self.body.iter().enumerate() {
            f.write_str(if i == 0 { " if " } else { " and " })?;
            write!(f, "{goal}")?;
        }
        f.write_str(";")
    }
}
