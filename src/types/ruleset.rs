use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::error::LoadError;
use super::goal::Goal;
use super::rule::{Parameter, Rule};
use super::value::{Pattern, Symbol, Value};

/// Builder for constructing a [`RuleSet`].
///
/// Rules are defined via closures, facts directly from their arguments, and
/// whole policies from text. Everything is compiled into an immutable,
/// thread-safe index.
///
/// # Example
///
/// ```
/// use ruling::{call, v, var, RuleSetBuilder, Value};
///
/// let rules = RuleSetBuilder::new()
///     .fact("owner", [Value::from(1_i64), Value::from("alice")])
///     .rule("allow", |r| {
///         r.param(var("actor"))
///             .param("read")
///             .param(var("doc"))
///             .when(call("owner", [v("doc"), v("actor")]))
///     })
///     .compile()
///     .unwrap();
/// assert_eq!(rules.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    rules: Vec<Rule>,
}

/// Intermediate builder passed to the rule definition closure.
///
/// Parameters are added in order; every `.when()` appends to the body.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    params: Vec<Parameter>,
    body: Vec<Goal>,
}

impl RuleSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a rule. A rule whose closure never calls `.when()` is a fact.
    #[must_use]
    pub fn rule(mut self, name: &str, f: impl FnOnce(RuleBuilder) -> RuleBuilder) -> Self {
        let builder = f(RuleBuilder::default());
        self.rules.push(Rule {
            name: Symbol::new(name),
            params: builder.params,
            body: builder.body,
        });
        self
    }

    /// Define a fact: a rule with an empty body, one parameter per argument.
    #[must_use]
    pub fn fact<I, T>(mut self, name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        self.rules.push(Rule {
            name: Symbol::new(name),
            params: args.into_iter().map(Parameter::new).collect(),
            body: Vec::new(),
        });
        self
    }

    /// Append an already-constructed rule.
    #[must_use]
    pub fn add_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Parse policy text and append its rules after those already defined.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError`](crate::parse::ParseError) if the text is malformed.
    pub fn policy(mut self, text: &str) -> Result<Self, crate::parse::ParseError> {
        let parsed = crate::parse::parse(text)?;
        self.rules.extend(parsed.rules);
        Ok(self)
    }

    /// Compile the rules into an immutable `RuleSet`.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] if a rule name is invalid or a body calls a rule
    /// that is never defined.
    pub fn compile(self) -> Result<RuleSet, LoadError> {
        crate::compile::compile(self.rules)
    }
}

impl RuleBuilder {
    /// Add a parameter that unifies with the argument in this position.
    #[must_use]
    pub fn param(mut self, value: impl Into<Value>) -> Self {
        self.params.push(Parameter::new(value));
        self
    }

    /// Add a parameter that must also match `specializer`.
    #[must_use]
    pub fn typed(mut self, value: impl Into<Value>, specializer: Pattern) -> Self {
        self.params.push(Parameter::typed(value, specializer));
        self
    }

    /// Append a goal to the body. A conjunction is spliced in goal by goal.
    #[must_use]
    pub fn when(mut self, goal: Goal) -> Self {
        match goal {
            Goal::And(goals) if !goals.is_empty() => self.body.extend(goals),
            goal => self.body.push(goal),
        }
        self
    }
}

/// A compiled, immutable rule set. Thread-safe and designed to live behind `Arc`.
///
/// Rules are indexed by name and arity; within a signature they keep the
/// order in which they were registered, which is the order they are tried.
#[derive(Debug)]
pub struct RuleSet {
    pub(crate) rules: Vec<Rule>,
    pub(crate) index: HashMap<Symbol, BTreeMap<usize, Arc<[Rule]>>>,
}

impl RuleSet {
    /// Rules with the given name and arity, in registration order.
    ///
    /// Returns `None` if no rule has that signature.
    #[must_use]
    pub fn candidates(&self, name: &str, arity: usize) -> Option<&[Rule]> {
        self.index
            .get(name)
            .and_then(|by_arity| by_arity.get(&arity))
            .map(|rules| &**rules)
    }

    pub(crate) fn candidate_group(&self, name: &str, arity: usize) -> Option<Arc<[Rule]>> {
        self.index
            .get(name)
            .and_then(|by_arity| by_arity.get(&arity))
            .map(Arc::clone)
    }

    /// Every rule, in registration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every `(name, arity)` signature, sorted by name then arity.
    #[must_use]
    pub fn signatures(&self) -> Vec<(&str, usize)> {
        let mut signatures: Vec<(&str, usize)> = self
            .index
            .iter()
            .flat_map(|(name, by_arity)| by_arity.keys().map(move |arity| (name.as_str(), *arity)))
            .collect();
        signatures.sort_unstable();
        signatures
    }

    /// Names of the rules called from the bodies of rules named `rule_name`,
    /// in first-call order.
    ///
    /// Returns `None` if no rule has that name.
    #[must_use]
    pub fn dependencies_of(&self, rule_name: &str) -> Option<Vec<&str>> {
        if !self.index.contains_key(rule_name) {
            return None;
        }
        let mut calls = Vec::new();
        for rule in self.rules.iter().filter(|r| r.name.as_str() == rule_name) {
            for goal in &rule.body {
                crate::compile::collect_calls(goal, &mut calls);
            }
        }
        let mut names: Vec<&str> = Vec::new();
        for (name, _) in calls {
            if !names.contains(&name.as_str()) {
                names.push(name.as_str());
            }
        }
        Some(names)
    }

    /// Parse policy text and compile it into a `RuleSet`.
    ///
    /// # Errors
    ///
    /// Returns [`RulingError`](crate::RulingError) on parse or load failure.
    pub fn from_policy(input: &str) -> Result<Self, crate::RulingError> {
        let parsed = crate::parse::parse(input)?;
        let rules = crate::compile::compile(parsed.rules)?;
        Ok(rules)
    }

    /// Read a policy file and compile it into a `RuleSet`.
    ///
    /// # Errors
    ///
    /// Returns [`RulingError`](crate::RulingError) on I/O, parse, or load failure.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::RulingError> {
        let input = std::fs::read_to_string(path)?;
        Self::from_policy(&input)
    }
}

#[cfg(feature = "binary-cache")]
impl RuleSet {
    /// Serialize this rule set to a byte vector.
    ///
    /// The optional `source_text` is hashed (BLAKE3) and embedded in the
    /// payload metadata, so callers can tell when the cache is stale.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) if encoding fails.
    pub fn to_bytes(
        &self,
        source_text: Option<&str>,
    ) -> Result<Vec<u8>, crate::serial::SerializeError> {
        crate::serial::encode(self, source_text)
    }

    /// Deserialize a rule set previously produced by [`to_bytes`](Self::to_bytes).
    ///
    /// The decoded rules are compiled again, so a blob cannot smuggle in a
    /// call to an undefined rule.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// format, integrity, or validation failure.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::serial::DeserializeError> {
        crate::serial::decode(bytes)
    }

    /// Serialize this rule set and write it to a file.
    ///
    /// # Errors
    ///
    /// Returns [`SerializeError`](crate::serial::SerializeError) on
    /// encoding or I/O failure.
    pub fn to_binary_file(
        &self,
        path: impl AsRef<std::path::Path>,
        source_text: Option<&str>,
    ) -> Result<(), crate::serial::SerializeError> {
        let bytes = self.to_bytes(source_text)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Read a file and deserialize the rule set it contains.
    ///
    /// # Errors
    ///
    /// Returns [`DeserializeError`](crate::serial::DeserializeError) on
    /// I/O, format, integrity, or validation failure.
    pub fn from_binary_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, crate::serial::DeserializeError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signatures: usize = self.index.values().map(BTreeMap::len).sum();
        write!(
            f,
            "RuleSet({} rules, {} signatures)",
            self.rules.len(),
            signatures,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{call, class, v, var};

    #[test]
    fn builder_collects_rules_in_order() {
        let builder = RuleSetBuilder::new()
            .fact("owner", [Value::from(1_i64), Value::from("alice")])
            .rule("allow", |r| {
                r.typed(var("u"), class("User"))
                    .param("read")
                    .param(var("doc"))
                    .when(call("owner", [v("doc"), v("u")]))
            });
        assert_eq!(builder.rules.len(), 2);
        assert_eq!(builder.rules[0].name.as_str(), "owner");
        assert!(builder.rules[0].is_fact());
        assert_eq!(builder.rules[1].arity(), 3);
        assert_eq!(builder.rules[1].params[0].specializer, Some(class("User")));
    }

    #[test]
    fn added_rules_keep_registration_order() {
        let member = Rule {
            name: Symbol::new("member"),
            params: vec![Parameter::new(var("x")), Parameter::new(var("team"))],
            body: vec![v("x").is_in(v("team"))],
        };
        let rules = RuleSetBuilder::new()
            .fact("member", ["alice", "admins"])
            .add_rule(member.clone())
            .rule("member", |r| r.param("root").param(var("_team")))
            .compile()
            .unwrap();
        let candidates = rules.candidates("member", 2).unwrap();
        assert_eq!(candidates.len(), 3);
        assert!(candidates[0].is_fact());
        assert_eq!(candidates[1], member);
        assert_eq!(candidates[2].params[0].value, Value::from("root"));
    }

    #[test]
    fn when_splices_conjunctions() {
        let builder = RuleSetBuilder::new().rule("r", |r| {
            r.param(var("x"))
                .when(v("x").gt(1_i64).and(v("x").lt(5_i64)))
                .when(v("x").neq(3_i64))
        });
        assert_eq!(builder.rules[0].body.len(), 3);
    }

    #[test]
    fn candidates_keep_registration_order() {
        let rules = RuleSetBuilder::new()
            .fact("color", ["red"])
            .fact("size", [1_i64])
            .fact("color", ["green"])
            .fact("color", ["blue", "dark"])
            .compile()
            .unwrap();
        let colors = rules.candidates("color", 1).unwrap();
        assert_eq!(colors.len(), 2);
        assert_eq!(colors[0].params[0].value, Value::from("red"));
        assert_eq!(colors[1].params[0].value, Value::from("green"));
        assert_eq!(rules.candidates("color", 2).unwrap().len(), 1);
        assert!(rules.candidates("color", 3).is_none());
        assert!(rules.candidates("shape", 1).is_none());
    }

    #[test]
    fn signatures_sorted() {
        let rules = RuleSetBuilder::new()
            .fact("b", [1_i64])
            .fact("a", [1_i64, 2])
            .fact("a", [1_i64])
            .compile()
            .unwrap();
        assert_eq!(rules.signatures(), vec![("a", 1), ("a", 2), ("b", 1)]);
        assert_eq!(rules.to_string(), "RuleSet(3 rules, 3 signatures)");
    }

    #[test]
    fn dependencies_in_first_call_order() {
        let rules = RuleSetBuilder::new()
            .fact("owner", [1_i64, 2])
            .fact("admin", [1_i64])
            .rule("allow", |r| {
                r.param(var("u"))
                    .param(var("d"))
                    .when(call("owner", [v("d"), v("u")]))
            })
            .rule("allow", |r| {
                r.param(var("u"))
                    .param(var("_"))
                    .when(call("admin", [v("u")]).or(call("owner", [v("u"), v("u")])))
            })
            .compile()
            .unwrap();
        assert_eq!(rules.dependencies_of("allow"), Some(vec!["owner", "admin"]));
        assert_eq!(rules.dependencies_of("owner"), Some(vec![]));
        assert_eq!(rules.dependencies_of("missing"), None);
    }

    #[test]
    fn empty_builder_compiles_to_empty_set() {
        let rules = RuleSetBuilder::new().compile().unwrap();
        assert!(rules.is_empty());
        assert!(rules.signatures().is_empty());
    }
}
