mod error;
mod grammar;
mod parser;

pub use error::ParseError;
pub use parser::ParsedPolicy;

use winnow::Parser;

use crate::types::Goal;

/// Parse policy text into a [`ParsedPolicy`].
///
/// The rules are not validated beyond syntax; compile them with
/// [`RuleSetBuilder`](crate::RuleSetBuilder) or use
/// [`RuleSet::from_policy()`](crate::RuleSet::from_policy).
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not valid policy syntax.
pub fn parse(input: &str) -> Result<ParsedPolicy, ParseError> {
    grammar::parse_policy
        .parse(input)
        .map_err(|e| ParseError::at(input, e.offset(), e.inner().to_string()))
}

/// Parse a single goal, such as `allow(user, "read", doc) and not banned(user)`.
///
/// # Errors
///
/// Returns [`ParseError`] if the input is not a valid goal.
pub fn parse_query(input: &str) -> Result<Goal, ParseError> {
    grammar::parse_goal
        .parse(input)
        .map_err(|e| ParseError::at(input, e.offset(), e.inner().to_string()))
}
