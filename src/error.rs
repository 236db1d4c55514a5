use thiserror::Error;

use crate::parse::ParseError;
use crate::types::LoadError;

/// Unified error type covering parsing, loading, and I/O.
///
/// Returned by convenience methods like
/// [`RuleSet::from_policy()`](crate::RuleSet::from_policy) and
/// [`RuleSet::from_file()`](crate::RuleSet::from_file). Evaluation failures
/// are reported separately as [`EvalError`](crate::EvalError).
#[derive(Debug, Error)]
pub enum RulingError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}
