use crate::types::Rule;

/// The result of parsing policy text: rules in source order.
#[derive(Debug, Default)]
pub struct ParsedPolicy {
    pub rules: Vec<Rule>,
}
