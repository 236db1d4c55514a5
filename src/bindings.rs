//! Variable bindings with an undo trail.

use std::collections::HashMap;

use crate::types::{List, Symbol, Value};
use crate::walker::{walk_list, walk_value, VariableCounter, Visitor};

/// The binding environment of one query.
///
/// Every binding is recorded on a trail so that backtracking can restore an
/// earlier state with [`undo`](Bindings::undo) in time proportional to the
/// number of bindings being discarded.
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    values: HashMap<Symbol, Value>,
    trail: Vec<Symbol>,
}

impl Bindings {
    /// Bind an unbound variable. Callers must dereference first.
    pub(crate) fn bind(&mut self, var: &Symbol, value: Value) {
        debug_assert!(!self.values.contains_key(var), "rebinding {var}");
        self.values.insert(var.clone(), value);
        self.trail.push(var.clone());
    }

    pub(crate) fn mark(&self) -> usize {
        self.trail.len()
    }

    /// Discard every binding made after `mark`.
    pub(crate) fn undo(&mut self, mark: usize) {
        while self.trail.len() > mark {
            if let Some(var) = self.trail.pop() {
                self.values.remove(&var);
            }
        }
    }

    /// Follow variable-to-variable links until reaching a non-variable or an
    /// unbound variable.
    pub(crate) fn deref(&self, value: &Value) -> Value {
        let mut current = value;
        while let Value::Variable(name) = current {
            match self.values.get(name) {
                Some(next) => current = next,
                None => break,
            }
        }
        current.clone()
    }

    /// Whether `var` appears inside `value`, following bound variables.
    ///
    /// Binding a variable to a value that contains it would make the binding
    /// cyclic, so the unifier refuses such bindings.
    pub(crate) fn occurs(&self, var: &Symbol, value: &Value) -> bool {
        let mut pending = vec![value.clone()];
        while let Some(value) = pending.pop() {
            let mut counter = VariableCounter::default();
            counter.visit_value(&value);
            for name in counter.into_names() {
                if &name == var {
                    return true;
                }
                if let Some(bound) = self.values.get(&name) {
                    pending.push(bound.clone());
                }
            }
        }
        false
    }

    /// Replace every bound variable inside `value`, at any depth.
    pub(crate) fn deep_deref(&self, value: &Value) -> Value {
        Substitution { bindings: self }
            .visit_value(value)
            .unwrap_or_else(|| value.clone())
    }

    /// The elements of `list` with its bound tail spliced in.
    ///
    /// Returns `None` if the tail is bound to something other than a list.
    pub(crate) fn expand_list(&self, list: &List) -> Option<List> {
        let mut expanded = List::new(list.elements.clone());
        let mut rest = list.rest.clone();
        while let Some(tail) = rest.take() {
            match self.deref(&Value::Variable(tail)) {
                Value::List(more) => {
                    expanded.elements.extend(more.elements);
                    rest = more.rest;
                }
                Value::Variable(unbound) => {
                    expanded.rest = Some(unbound);
                }
                _ => return None,
            }
        }
        Some(expanded)
    }
}

struct Substitution<'a> {
    bindings: &'a Bindings,
}

impl Visitor for Substitution<'_> {
    fn visit_value(&mut self, value: &Value) -> Option<Value> {
        let bindings = self.bindings;
        match value {
            Value::Variable(name) => match bindings.values.get(name) {
                Some(bound) => Some(self.visit_value(bound).unwrap_or_else(|| bound.clone())),
                None => None,
            },
            other => walk_value(self, other),
        }
    }

    fn visit_list(&mut self, list: &List) -> Option<List> {
        let Some(rest) = &list.rest else {
            return walk_list(self, list);
        };
        if !self.bindings.values.contains_key(rest) {
            return walk_list(self, list);
        }
        match self.bindings.expand_list(list) {
            Some(expanded) => Some(walk_list(self, &expanded).unwrap_or(expanded)),
            None => walk_list(self, list),
        }
    }
}
