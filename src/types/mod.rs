mod error;
mod goal;
mod rule;
mod ruleset;
mod solution;
mod term;
mod value;

pub use error::{EvalError, HostError, LoadError};
pub use goal::{call, Goal};
pub use rule::{Parameter, Rule};
pub use ruleset::{RuleBuilder, RuleSet, RuleSetBuilder};
pub use solution::Solution;
pub use term::{v, ArithOp, CompareOp, Term};
pub use value::{
    class, pattern, var, Dictionary, Instance, List, Pattern, Symbol, Value, BUILTIN_CLASSES,
};
