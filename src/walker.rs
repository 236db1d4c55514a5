//! Structural traversal of values, terms, goals and rules.
//!
//! Every `visit_*` method returns `Some(new)` when the visitor rewrote the
//! node and `None` when it is unchanged, so untouched subtrees are never
//! cloned.

use std::collections::{BTreeMap, HashMap};

use crate::types::{Dictionary, Goal, List, Parameter, Pattern, Rule, Symbol, Term, Value};

pub(crate) trait Visitor: Sized {
    // Atoms. Override as needed.
    fn visit_variable(&mut self, _name: &Symbol) -> Option<Symbol> {
        None
    }
    fn visit_rest_variable(&mut self, name: &Symbol) -> Option<Symbol> {
        self.visit_variable(name)
    }

    // Compounds. Overrides must walk the children themselves.
    fn visit_value(&mut self, value: &Value) -> Option<Value> {
        walk_value(self, value)
    }
    fn visit_list(&mut self, list: &List) -> Option<List> {
        walk_list(self, list)
    }
    fn visit_dictionary(&mut self, dict: &Dictionary) -> Option<Dictionary> {
        walk_dictionary(self, dict)
    }
    fn visit_pattern(&mut self, pattern: &Pattern) -> Option<Pattern> {
        walk_pattern(self, pattern)
    }
    fn visit_term(&mut self, term: &Term) -> Option<Term> {
        walk_term(self, term)
    }
    fn visit_goal(&mut self, goal: &Goal) -> Option<Goal> {
        walk_goal(self, goal)
    }
    fn visit_param(&mut self, param: &Parameter) -> Option<Parameter> {
        walk_param(self, param)
    }
    fn visit_rule(&mut self, rule: &Rule) -> Option<Rule> {
        walk_rule(self, rule)
    }
}

/// Rewrite a slice, cloning only once the first element changes.
fn walk_slice<T: Clone>(items: &[T], mut visit: impl FnMut(&T) -> Option<T>) -> Option<Vec<T>> {
    let (idx, changed) = items
        .iter()
        .enumerate()
        .find_map(|(idx, item)| visit(item).map(|new| (idx, new)))?;
    let mut out = Vec::with_capacity(items.len());
    out.extend_from_slice(&items[..idx]);
    out.push(changed);
    out.extend(
        items[idx + 1..]
            .iter()
            .map(|item| visit(item).unwrap_or_else(|| item.clone())),
    );
    Some(out)
}

fn or_clone<T: Clone>(changed: Option<T>, original: &T) -> T {
    changed.unwrap_or_else(|| original.clone())
}

pub(crate) fn walk_value<V: Visitor>(visitor: &mut V, value: &Value) -> Option<Value> {
    match value {
        Value::Variable(name) => visitor.visit_variable(name).map(Value::Variable),
        Value::List(list) => visitor.visit_list(list).map(Value::List),
        Value::Dictionary(dict) => visitor.visit_dictionary(dict).map(Value::Dictionary),
        Value::Pattern(pattern) => visitor.visit_pattern(pattern).map(Value::Pattern),
        Value::Boolean(_)
        | Value::Integer(_)
        | Value::Float(_)
        | Value::String(_)
        | Value::Instance(_)
        | Value::RuleRef(_) => None,
    }
}

pub(crate) fn walk_list<V: Visitor>(visitor: &mut V, list: &List) -> Option<List> {
    let elements = walk_slice(&list.elements, |element| visitor.visit_value(element));
    let rest = list
        .rest
        .as_ref()
        .and_then(|rest| visitor.visit_rest_variable(rest));
    if elements.is_none() && rest.is_none() {
        return None;
    }
    Some(List {
        elements: elements.unwrap_or_else(|| list.elements.clone()),
        rest: rest.or_else(|| list.rest.clone()),
    })
}

pub(crate) fn walk_dictionary<V: Visitor>(
    visitor: &mut V,
    dict: &Dictionary,
) -> Option<Dictionary> {
    let mut changed = false;
    let fields: BTreeMap<Symbol, Value> = dict
        .fields
        .iter()
        .map(|(key, value)| {
            let value = match visitor.visit_value(value) {
                Some(new) => {
                    changed = true;
                    new
                }
                None => value.clone(),
            };
            (key.clone(), value)
        })
        .collect();
    changed.then_some(Dictionary { fields })
}

pub(crate) fn walk_pattern<V: Visitor>(visitor: &mut V, pattern: &Pattern) -> Option<Pattern> {
    match pattern {
        Pattern::Dictionary(fields) => visitor.visit_dictionary(fields).map(Pattern::Dictionary),
        Pattern::Instance { tag, fields } => {
            visitor
                .visit_dictionary(fields)
                .map(|fields| Pattern::Instance {
                    tag: tag.clone(),
                    fields,
                })
        }
    }
}

pub(crate) fn walk_term<V: Visitor>(visitor: &mut V, term: &Term) -> Option<Term> {
    match term {
        Term::Value(value) => visitor.visit_value(value).map(Term::Value),
        Term::Lookup { receiver, field } => {
            visitor.visit_term(receiver).map(|receiver| Term::Lookup {
                receiver: Box::new(receiver),
                field: field.clone(),
            })
        }
        Term::Arithmetic { op, left, right } => {
            let new_left = visitor.visit_term(left);
            let new_right = visitor.visit_term(right);
            if new_left.is_none() && new_right.is_none() {
                return None;
            }
            Some(Term::Arithmetic {
                op: *op,
                left: Box::new(new_left.unwrap_or_else(|| (**left).clone())),
                right: Box::new(new_right.unwrap_or_else(|| (**right).clone())),
            })
        }
    }
}

fn walk_pair<V: Visitor>(visitor: &mut V, left: &Term, right: &Term) -> Option<(Term, Term)> {
    let new_left = visitor.visit_term(left);
    let new_right = visitor.visit_term(right);
    if new_left.is_none() && new_right.is_none() {
        return None;
    }
    Some((or_clone(new_left, left), or_clone(new_right, right)))
}

pub(crate) fn walk_goal<V: Visitor>(visitor: &mut V, goal: &Goal) -> Option<Goal> {
    match goal {
        Goal::Call { name, args } => {
            walk_slice(args, |arg| visitor.visit_term(arg)).map(|args| Goal::Call {
                name: name.clone(),
                args,
            })
        }
        Goal::Unify(left, right) => {
            walk_pair(visitor, left, right).map(|(left, right)| Goal::Unify(left, right))
        }
        Goal::Compare { op, left, right } => {
            walk_pair(visitor, left, right).map(|(left, right)| Goal::Compare {
                op: *op,
                left,
                right,
            })
        }
        Goal::Isa { value, pattern } => {
            let new_value = visitor.visit_term(value);
            let new_pattern = visitor.visit_value(pattern);
            if new_value.is_none() && new_pattern.is_none() {
                return None;
            }
            Some(Goal::Isa {
                value: or_clone(new_value, value),
                pattern: or_clone(new_pattern, pattern),
            })
        }
        Goal::In { item, collection } => {
            walk_pair(visitor, item, collection)
                .map(|(item, collection)| Goal::In { item, collection })
        }
        Goal::And(goals) => walk_slice(goals, |goal| visitor.visit_goal(goal)).map(Goal::And),
        Goal::Or(goals) => walk_slice(goals, |goal| visitor.visit_goal(goal)).map(Goal::Or),
        Goal::Not(inner) => visitor.visit_goal(inner).map(|inner| Goal::Not(Box::new(inner))),
        Goal::Cut => None,
    }
}

pub(crate) fn walk_param<V: Visitor>(visitor: &mut V, param: &Parameter) -> Option<Parameter> {
    let value = visitor.visit_value(&param.value);
    let specializer = param
        .specializer
        .as_ref()
        .and_then(|pattern| visitor.visit_pattern(pattern));
    if value.is_none() && specializer.is_none() {
        return None;
    }
    Some(Parameter {
        value: or_clone(value, &param.value),
        specializer: specializer.or_else(|| param.specializer.clone()),
    })
}

pub(crate) fn walk_rule<V: Visitor>(visitor: &mut V, rule: &Rule) -> Option<Rule> {
    let params = walk_slice(&rule.params, |param| visitor.visit_param(param));
    let body = walk_slice(&rule.body, |goal| visitor.visit_goal(goal));
    if params.is_none() && body.is_none() {
        return None;
    }
    Some(Rule {
        name: rule.name.clone(),
        params: params.unwrap_or_else(|| rule.params.clone()),
        body: body.unwrap_or_else(|| rule.body.clone()),
    })
}

/// Gives every variable of a rule a fresh name for one application.
///
/// Fresh names contain `@`, which policy text cannot produce, so they never
/// collide with variables written by users.
pub(crate) struct Renamer {
    generation: u64,
    names: HashMap<Symbol, Symbol>,
}

impl Renamer {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            generation,
            names: HashMap::new(),
        }
    }
}

impl Visitor for Renamer {
    fn visit_variable(&mut self, name: &Symbol) -> Option<Symbol> {
        let generation = self.generation;
        Some(
            self.names
                .entry(name.clone())
                .or_insert_with(|| Symbol::from(format!("{name}{RENAME_SEPARATOR}{generation}")))
                .clone(),
        )
    }
}

/// Prefix shared by the names given to anonymous `_` variables.
/// Separates a variable's name from its generation in renamed variables.
/// Query variables may not contain it.
pub(crate) const RENAME_SEPARATOR: char = '@';

pub(crate) const ANONYMOUS_PREFIX: &str = "_@";

/// Replaces each `_` with its own distinct variable.
#[derive(Default)]
pub(crate) struct AnonymousRenamer {
    next: usize,
}

impl Visitor for AnonymousRenamer {
    fn visit_variable(&mut self, name: &Symbol) -> Option<Symbol> {
        if name.as_str() != "_" {
            return None;
        }
        let fresh = Symbol::from(format!("{ANONYMOUS_PREFIX}{}", self.next));
        self.next += 1;
        Some(fresh)
    }
}

/// Counts variable occurrences, in first-seen order.
#[derive(Default)]
pub(crate) struct VariableCounter {
    counts: Vec<(Symbol, usize)>,
}

impl VariableCounter {
    pub(crate) fn into_counts(self) -> Vec<(Symbol, usize)> {
        self.counts
    }

    pub(crate) fn into_names(self) -> impl Iterator<Item = Symbol> {
        self.counts.into_iter().map(|(name, _)| name)
    }
}

impl Visitor for VariableCounter {
    fn visit_variable(&mut self, name: &Symbol) -> Option<Symbol> {
        match self.counts.iter_mut().find(|(seen, _)| seen == name) {
            Some((_, count)) => *count += 1,
            None => self.counts.push((name.clone(), 1)),
        }
        None
    }
}
