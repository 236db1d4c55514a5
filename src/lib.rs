mod authorize;
mod bindings;
mod compile;
mod config;
mod error;
mod evaluate;
mod host;
pub mod parse;
#[cfg(feature = "binary-cache")]
pub mod serial;
mod types;
mod unify;
mod walker;

pub use authorize::{Authorizer, ALLOW_RULE};
pub use config::QueryConfig;
pub use error::RulingError;
pub use evaluate::Query;
pub use host::{ClassRegistry, Host};
pub use parse::{parse_query, ParseError, ParsedPolicy};
pub use types::{
    call, class, pattern, v, var, ArithOp, CompareOp, Dictionary, EvalError, Goal, HostError,
    Instance, List, LoadError, Parameter, Pattern, Rule, RuleBuilder, RuleSet, RuleSetBuilder,
    Solution, Symbol, Term, Value, BUILTIN_CLASSES,
};

#[cfg(feature = "binary-cache")]
pub use serial::{DeserializeError, SerializeError};
