use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::types::{Goal, LoadError, Rule, RuleSet, Symbol};
use crate::walker::{AnonymousRenamer, VariableCounter, Visitor};

type Index = HashMap<Symbol, BTreeMap<usize, Arc<[Rule]>>>;

pub(crate) fn compile(rules: Vec<Rule>) -> Result<RuleSet, LoadError> {
    check_names(&rules)?;

    let rules: Vec<Rule> = rules.into_iter().map(normalize_anonymous).collect();
    let index = build_index(&rules);

    check_references(&rules, &index)?;
    for rule in &rules {
        warn_singletons(rule);
    }

    debug!(
        rules = rules.len(),
        names = index.len(),
        "compiled rule set"
    );
    Ok(RuleSet { rules, index })
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

fn check_names(rules: &[Rule]) -> Result<(), LoadError> {
    match rules.iter().find(|r| !is_valid_name(r.name.as_str())) {
        Some(rule) => Err(LoadError::InvalidName {
            name: rule.name.to_string(),
        }),
        None => Ok(()),
    }
}

fn normalize_anonymous(rule: Rule) -> Rule {
    AnonymousRenamer::default()
        .visit_rule(&rule)
        .unwrap_or(rule)
}

fn build_index(rules: &[Rule]) -> Index {
    let mut grouped: HashMap<Symbol, BTreeMap<usize, Vec<Rule>>> = HashMap::new();
    for rule in rules {
        grouped
            .entry(rule.name.clone())
            .or_default()
            .entry(rule.arity())
            .or_default()
            .push(rule.clone());
    }
    grouped
        .into_iter()
        .map(|(name, by_arity)| {
            let by_arity = by_arity
                .into_iter()
                .map(|(arity, group)| (arity, Arc::from(group)))
                .collect();
            (name, by_arity)
        })
        .collect()
}

fn check_references(rules: &[Rule], index: &Index) -> Result<(), LoadError> {
    for rule in rules {
        let mut calls = Vec::new();
        for goal in &rule.body {
            collect_calls(goal, &mut calls);
        }
        let undefined = calls.into_iter().find(|(name, arity)| {
            !index
                .get(name.as_str())
                .is_some_and(|by_arity| by_arity.contains_key(arity))
        });
        if let Some((name, arity)) = undefined {
            return Err(LoadError::UndefinedRule {
                rule: rule.name.to_string(),
                call: format!("{name}/{arity}"),
            });
        }
    }
    Ok(())
}

/// Every rule call reachable in `goal`, including through `not`, `and` and `or`.
pub(crate) fn collect_calls<'a>(goal: &'a Goal, out: &mut Vec<(&'a Symbol, usize)>) {
    match goal {
        Goal::Call { name, args } => out.push((name, args.len())),
        Goal::And(goals) | Goal::Or(goals) => {
            for goal in goals {
                collect_calls(goal, out);
            }
        }
        Goal::Not(inner) => collect_calls(inner, out),
        Goal::Unify(..)
        | Goal::Compare { .. }
        | Goal::Isa { .. }
        | Goal::In { .. }
        | Goal::Cut => {}
    }
}

/// A variable named once in a rule is almost always a typo.
fn warn_singletons(rule: &Rule) {
    let mut counter = VariableCounter::default();
    counter.visit_rule(rule);
    for (name, count) in counter.into_counts() {
        if count == 1 && !name.as_str().starts_with('_') {
            warn!(
                rule = %rule.name,
                variable = %name,
                "singleton variable; prefix it with '_' if this is intended"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{call, v, var, LoadError, RuleSetBuilder, Value};

    #[test]
    fn compile_facts_and_rules() {
        let rules = RuleSetBuilder::new()
            .fact("owner", [Value::from(1_i64), Value::from("alice")])
            .rule("allow", |r| {
                r.param(var("a"))
                    .param(var("d"))
                    .when(call("owner", [v("d"), v("a")]))
            })
            .compile()
            .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.signatures(), vec![("allow", 2), ("owner", 2)]);
    }

    #[test]
    fn undefined_call_is_rejected() {
        let result = RuleSetBuilder::new()
            .rule("allow", |r| r.param(var("a")).when(call("owner", [v("a")])))
            .compile();
        match result {
            Err(LoadError::UndefinedRule { rule, call }) => {
                assert_eq!(rule, "allow");
                assert_eq!(call, "owner/1");
            }
            other => panic!("expected UndefinedRule, got {other:?}"),
        }
    }

    #[test]
    fn call_with_wrong_arity_is_undefined() {
        let result = RuleSetBuilder::new()
            .fact("owner", [1_i64, 2])
            .rule("allow", |r| r.param(var("a")).when(call("owner", [v("a")])))
            .compile();
        assert!(matches!(result, Err(LoadError::UndefinedRule { .. })));
    }

    #[test]
    fn undefined_call_inside_negation_is_rejected() {
        let result = RuleSetBuilder::new()
            .rule("allow", |r| r.param(var("a")).when(!call("banned", [v("a")])))
            .compile();
        assert!(matches!(result, Err(LoadError::UndefinedRule { .. })));
    }

    #[test]
    fn invalid_names_are_rejected() {
        for name in ["", "has space", "1st", "a-b"] {
            let result = RuleSetBuilder::new().fact(name, [1_i64]).compile();
            assert!(
                matches!(result, Err(LoadError::InvalidName { .. })),
                "expected InvalidName for {name:?}"
            );
        }
    }

    #[test]
    fn recursion_is_allowed() {
        let result = RuleSetBuilder::new()
            .fact("edge", [1_i64, 2])
            .rule("path", |r| {
                r.param(var("a"))
                    .param(var("b"))
                    .when(call("edge", [v("a"), v("b")]))
            })
            .rule("path", |r| {
                r.param(var("a"))
                    .param(var("c"))
                    .when(call("edge", [v("a"), v("b")]))
                    .when(call("path", [v("b"), v("c")]))
            })
            .compile();
        assert!(result.is_ok());
    }

    #[test]
    fn anonymous_variables_are_made_distinct() {
        let rules = RuleSetBuilder::new()
            .rule("any", |r| r.param(var("_")).param(var("_")))
            .compile()
            .unwrap();
        let params = &rules.rules()[0].params;
        assert_ne!(params[0].value, params[1].value);
    }
}
