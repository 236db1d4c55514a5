use thiserror::Error;

/// Errors detected while compiling rules into a [`RuleSet`](super::RuleSet).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("rule '{rule}' calls undefined rule '{call}'")]
    UndefinedRule { rule: String, call: String },

    #[error("invalid rule name '{name}'")]
    InvalidName { name: String },
}

/// Errors raised by a host capability call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("attribute '{attribute}' not found on {class}")]
    AttributeLookup { class: String, attribute: String },

    #[error("unknown instance #{id}")]
    UnknownInstance { id: u64 },

    #[error("unknown class '{name}'")]
    UnknownClass { name: String },

    #[error("host call failed: {0}")]
    Failed(String),
}

/// Errors raised while pulling solutions from a query.
///
/// These are distinct from a goal simply having no solution, which is
/// represented by the query being exhausted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("unknown rule '{name}' with {arity} argument(s)")]
    UnknownRule { name: String, arity: usize },

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("type error: cannot apply '{operation}' to {operands}")]
    TypeMismatch { operation: String, operands: String },

    #[error("variable '{name}' is unbound in '{operation}'")]
    UnboundVariable { name: String, operation: String },

    #[error("division by zero in '{expression}'")]
    DivisionByZero { expression: String },

    #[error("integer overflow in '{expression}'")]
    Overflow { expression: String },

    #[error("maximum rule depth of {limit} exceeded")]
    DepthExceeded { limit: usize },

    #[error("variable '{name}' uses the reserved character '@'")]
    ReservedVariable { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_rule_message() {
        let err = LoadError::UndefinedRule {
            rule: "allow".into(),
            call: "owner/2".into(),
        };
        assert_eq!(err.to_string(), "rule 'allow' calls undefined rule 'owner/2'");
    }

    #[test]
    fn invalid_name_message() {
        let err = LoadError::InvalidName {
            name: "has space".into(),
        };
        assert_eq!(err.to_string(), "invalid rule name 'has space'");
    }

    #[test]
    fn attribute_lookup_message() {
        let err = HostError::AttributeLookup {
            class: "User".into(),
            attribute: "role".into(),
        };
        assert_eq!(err.to_string(), "attribute 'role' not found on User");
    }

    #[test]
    fn host_error_is_transparent_in_eval_error() {
        let err = EvalError::from(HostError::UnknownInstance { id: 7 });
        assert_eq!(err.to_string(), "unknown instance #7");
        assert!(matches!(err, EvalError::Host(HostError::UnknownInstance { id: 7 })));
    }

    #[test]
    fn unknown_rule_message() {
        let err = EvalError::UnknownRule {
            name: "allow".into(),
            arity: 3,
        };
        assert_eq!(err.to_string(), "unknown rule 'allow' with 3 argument(s)");
    }

    #[test]
    fn type_mismatch_message() {
        let err = EvalError::TypeMismatch {
            operation: "+".into(),
            operands: "1 and \"a\"".into(),
        };
        assert_eq!(err.to_string(), "type error: cannot apply '+' to 1 and \"a\"");
    }

    #[test]
    fn depth_exceeded_message() {
        let err = EvalError::DepthExceeded { limit: 64 };
        assert_eq!(err.to_string(), "maximum rule depth of 64 exceeded");
    }
}
