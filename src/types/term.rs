use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};

#[cfg(feature = "binary-cache")]
use serde::{Deserialize, Serialize};

use super::goal::Goal;
use super::value::{Pattern, Symbol, Value};

/// Comparison operators supported in rule bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Arithmetic operators supported in goal operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// A goal operand. Reduced to a [`Value`] before the goal runs.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub enum Term {
    Value(Value),
    /// `receiver.field`, resolved against a dictionary or through the host.
    Lookup {
        receiver: Box<Term>,
        field: Symbol,
    },
    Arithmetic {
        op: ArithOp,
        left: Box<Term>,
        right: Box<Term>,
    },
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Eq => write!(f, "=="),
            CompareOp::Neq => write!(f, "!="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Gte => write!(f, ">="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Lte => write!(f, "<="),
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithOp::Add => write!(f, "+"),
            ArithOp::Sub => write!(f, "-"),
            ArithOp::Mul => write!(f, "*"),
            ArithOp::Div => write!(f, "/"),
            ArithOp::Rem => write!(f, "%"),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Value(value) => write!(f, "{value}"),
            Term::Lookup { receiver, field } => write!(f, "{receiver}.{field}"),
            Term::Arithmetic { op, left, right } => write!(f, "({left} {op} {right})"),
        }
    }
}

impl Term {
    /// Field lookup on this term: `self.field`.
    #[must_use]
    pub fn dot(self, field: &str) -> Term {
        Term::Lookup {
            receiver: Box::new(self),
            field: Symbol::new(field),
        }
    }

    fn compare(self, op: CompareOp, other: impl Into<Term>) -> Goal {
        Goal::Compare {
            op,
            left: self,
            right: other.into(),
        }
    }

    #[must_use]
    pub fn eq(self, other: impl Into<Term>) -> Goal {
        self.compare(CompareOp::Eq, other)
    }

    #[must_use]
    pub fn neq(self, other: impl Into<Term>) -> Goal {
        self.compare(CompareOp::Neq, other)
    }

    #[must_use]
    pub fn gt(self, other: impl Into<Term>) -> Goal {
        self.compare(CompareOp::Gt, other)
    }

    #[must_use]
    pub fn gte(self, other: impl Into<Term>) -> Goal {
        self.compare(CompareOp::Gte, other)
    }

    #[must_use]
    pub fn lt(self, other: impl Into<Term>) -> Goal {
        self.compare(CompareOp::Lt, other)
    }

    #[must_use]
    pub fn lte(self, other: impl Into<Term>) -> Goal {
        self.compare(CompareOp::Lte, other)
    }

    /// `self = other`
    #[must_use]
    pub fn unify(self, other: impl Into<Term>) -> Goal {
        Goal::Unify(self, other.into())
    }

    /// `self matches pattern`
    #[must_use]
    pub fn matches(self, pattern: impl Into<Value>) -> Goal {
        Goal::Isa {
            value: self,
            pattern: pattern.into(),
        }
    }

    /// `self in collection`
    #[must_use]
    pub fn is_in(self, collection: impl Into<Term>) -> Goal {
        Goal::In {
            item: self,
            collection: collection.into(),
        }
    }

    fn arithmetic(self, op: ArithOp, other: Term) -> Term {
        Term::Arithmetic {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }
}

macro_rules! impl_arith {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<Term>> $trait<T> for Term {
            type Output = Term;

            fn $method(self, other: T) -> Term {
                self.arithmetic($op, other.into())
            }
        }
    };
}

impl_arith!(Add, add, ArithOp::Add);
impl_arith!(Sub, sub, ArithOp::Sub);
impl_arith!(Mul, mul, ArithOp::Mul);
impl_arith!(Div, div, ArithOp::Div);
impl_arith!(Rem, rem, ArithOp::Rem);

macro_rules! impl_term_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Term {
                fn from(v: $ty) -> Self {
                    Term::Value(Value::from(v))
                }
            }
        )*
    };
}

impl_term_from!(i64, i32, f64, bool, &str, String, Pattern);

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Value(v)
    }
}

/// Shorthand for a variable operand, e.g. `v("user").dot("role").eq("admin")`.
#[must_use]
pub fn v(name: &str) -> Term {
    Term::Value(Value::Variable(Symbol::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::value::var;

    #[test]
    fn dot_builds_lookup() {
        let term = v("user").dot("role");
        assert_eq!(
            term,
            Term::Lookup {
                receiver: Box::new(Term::Value(var("user"))),
                field: Symbol::new("role"),
            }
        );
        assert_eq!(term.to_string(), "user.role");
    }

    #[test]
    fn all_compare_ops() {
        let ops = vec![
            (v("x").eq(1_i64), CompareOp::Eq),
            (v("x").neq(1_i64), CompareOp::Neq),
            (v("x").gt(1_i64), CompareOp::Gt),
            (v("x").gte(1_i64), CompareOp::Gte),
            (v("x").lt(1_i64), CompareOp::Lt),
            (v("x").lte(1_i64), CompareOp::Lte),
        ];
        for (goal, expected_op) in ops {
            match goal {
                Goal::Compare { op, .. } => assert_eq!(op, expected_op),
                other => panic!("expected Compare, got {other:?}"),
            }
        }
    }

    #[test]
    fn arithmetic_operators_nest_left() {
        let term = v("a") + 1_i64 - 2_i64;
        assert_eq!(term.to_string(), "((a + 1) - 2)");
        let term = v("a") * v("b") % 3_i64;
        assert_eq!(term.to_string(), "((a * b) % 3)");
    }

    #[test]
    fn unify_matches_and_in() {
        assert!(matches!(v("x").unify(1_i64), Goal::Unify(_, _)));
        assert!(matches!(
            v("u").matches(crate::class("User")),
            Goal::Isa { .. }
        ));
        assert!(matches!(
            v("x").is_in(Value::from(vec![1_i64, 2])),
            Goal::In { .. }
        ));
    }
}
