use std::fmt;
use std::ops::Not;

#[cfg(feature = "binary-cache")]
use serde::{Deserialize, Serialize};

use super::term::{CompareOp, Term};
use super::value::{Symbol, Value};

/// A sub-goal in a rule body, or the top-level goal of a query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "binary-cache", derive(Serialize, Deserialize))]
pub enum Goal {
    /// Call a rule by name; resolved against the rule index.
    Call { name: Symbol, args: Vec<Term> },
    /// `left = right`
    Unify(Term, Term),
    Compare {
        op: CompareOp,
        left: Term,
        right: Term,
    },
    /// `value matches pattern`
    Isa { value: Term, pattern: Value },
    /// `item in collection`; one choice per element.
    In { item: Term, collection: Term },
    /// Conjunction. Empty is true.
    And(Vec<Goal>),
    /// Disjunction, tried left to right. Empty is false.
    Or(Vec<Goal>),
    /// Negation as failure.
    Not(Box<Goal>),
    /// Commit to the current rule: drop its remaining alternatives.
    Cut,
}

impl Goal {
    /// The always-true goal.
    #[must_use]
    pub fn truth() -> Goal {
        Goal::And(Vec::new())
    }

    /// The always-false goal.
    #[must_use]
    pub fn falsehood() -> Goal {
        Goal::Or(Vec::new())
    }

    #[must_use]
    pub fn and(self, other: Goal) -> Goal {
        match self {
            Goal::And(mut goals) if !goals.is_empty() => {
                goals.push(other);
                Goal::And(goals)
            }
            first => Goal::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Goal) -> Goal {
        match self {
            Goal::Or(mut goals) if !goals.is_empty() => {
                goals.push(other);
                Goal::Or(goals)
            }
            first => Goal::Or(vec![first, other]),
        }
    }
}

impl Not for Goal {
    type Output = Goal;

    fn not(self) -> Goal {
        Goal::Not(Box::new(self))
    }
}

/// Build a call goal, e.g. `call("owner", [v("doc"), v("actor")])`.
#[must_use]
pub fn call<I, T>(name: &str, args: I) -> Goal
where
    I: IntoIterator<Item = T>,
    T: Into<Term>,
{
    Goal::Call {
        name: Symbol::new(name),
        args: args.into_iter().map(Into::into).collect(),
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, goals: &[Goal], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, goal) in goals.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{goal}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Call { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Goal::Unify(left, right) => write!(f, "{left} = {right}"),
            Goal::Compare { op, left, right } => write!(f, "{left} {op} {right}"),
            Goal::Isa { value, pattern } => write!(f, "{value} matches {pattern}"),
            Goal::In { item, collection } => write!(f, "{item} in {collection}"),
            Goal::And(goals) if goals.is_empty() => f.write_str("true"),
            Goal::Or(goals) if goals.is_empty() => f.write_str("false"),
            Goal::And(goals) => write_joined(f, goals, " and "),
            Goal::Or(goals) => write_joined(f, goals, " or "),
            Goal::Not(inner) => write!(f, "not {inner}"),
            Goal::Cut => f.write_str("cut"),
        }
    }
}
