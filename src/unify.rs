//! Unification and pattern matching over the current bindings.
//!
//! The public entry points are all-or-nothing: when they report `false` or an
//! error, every binding they made has already been undone.

use tracing::trace;

use crate::bindings::Bindings;
use crate::host::Host;
use crate::types::{
    CompareOp, Dictionary, EvalError, Instance, List, Pattern, Symbol, Value,
};
use crate::walker::{VariableCounter, Visitor};

/// Make `left` and `right` equal by binding variables.
pub(crate) fn unify(
    bindings: &mut Bindings,
    host: &dyn Host,
    left: &Value,
    right: &Value,
) -> Result<bool, EvalError> {
    atomically(bindings, |bindings| unify_values(bindings, host, left, right))
}

/// Check that `value` matches `pattern`, binding variables inside the pattern.
pub(crate) fn isa(
    bindings: &mut Bindings,
    host: &dyn Host,
    value: &Value,
    pattern: &Pattern,
) -> Result<bool, EvalError> {
    atomically(bindings, |bindings| matches_pattern(bindings, host, value, pattern))
}

/// Evaluate a comparison between two reduced operands.
///
/// Both operands must be fully bound. `==` and `!=` are structural and never
/// fail on mismatched types; the ordering operators only apply to two numbers
/// or two strings.
pub(crate) fn compare(
    bindings: &mut Bindings,
    host: &dyn Host,
    op: CompareOp,
    left: &Value,
    right: &Value,
) -> Result<bool, EvalError> {
    let left = bindings.deep_deref(left);
    let right = bindings.deep_deref(right);
    if let Some(name) = first_variable(&left).or_else(|| first_variable(&right)) {
        return Err(EvalError::UnboundVariable {
            name: name.to_string(),
            operation: format!("{left} {op} {right}"),
        });
    }
    match op {
        CompareOp::Eq | CompareOp::Neq => {
            // Ground operands bind nothing, so unifying them is a pure test.
            let mark = bindings.mark();
            let equal = unify_values(bindings, host, &left, &right);
            bindings.undo(mark);
            let equal = equal?;
            Ok(if op == CompareOp::Eq { equal } else { !equal })
        }
        _ => left
            .compare(op, &right)
            .ok_or_else(|| EvalError::TypeMismatch {
                operation: op.to_string(),
                operands: format!("{left} and {right}"),
            }),
    }
}

/// The first variable still present in a dereferenced value.
pub(crate) fn first_variable(value: &Value) -> Option<Symbol> {
    let mut counter = VariableCounter::default();
    counter.visit_value(value);
    counter.into_names().next()
}

fn atomically(
    bindings: &mut Bindings,
    f: impl FnOnce(&mut Bindings) -> Result<bool, EvalError>,
) -> Result<bool, EvalError> {
    let mark = bindings.mark();
    let result = f(bindings);
    if !matches!(result, Ok(true)) {
        bindings.undo(mark);
    }
    result
}

fn unify_values(
    bindings: &mut Bindings,
    host: &dyn Host,
    left: &Value,
    right: &Value,
) -> Result<bool, EvalError> {
    let left = bindings.deref(left);
    let right = bindings.deref(right);
    match (&left, &right) {
        (Value::Variable(l), Value::Variable(r)) => {
            if l != r {
                bindings.bind(l, right.clone());
            }
            Ok(true)
        }
        (Value::Variable(var), other) | (other, Value::Variable(var)) => {
            // Occurs check: `x = [x]` has no finite solution.
            if bindings.occurs(var, other) {
                trace!(%var, "occurs check failed");
                return Ok(false);
            }
            bindings.bind(var, other.clone());
            Ok(true)
        }
        (Value::Pattern(a), Value::Pattern(b)) => unify_patterns(bindings, host, a, b),
        (Value::Pattern(pattern), other) | (other, Value::Pattern(pattern)) => {
            matches_pattern(bindings, host, other, pattern)
        }
        (Value::List(a), Value::List(b)) => unify_lists(bindings, host, a, b),
        (Value::Dictionary(a), Value::Dictionary(b)) => unify_dictionaries(bindings, host, a, b),
        (Value::Instance(a), Value::Instance(b)) => Ok(host.instances_equal(a, b)?),
        (Value::Boolean(a), Value::Boolean(b)) => Ok(a == b),
        (Value::String(a), Value::String(b)) => Ok(a == b),
        (Value::RuleRef(a), Value::RuleRef(b)) => Ok(a == b),
        (a, b) if a.is_number() && b.is_number() => Ok(a.compare(CompareOp::Eq, b) == Some(true)),
        _ => Ok(false),
    }
}

fn unify_lists(
    bindings: &mut Bindings,
    host: &dyn Host,
    left: &List,
    right: &List,
) -> Result<bool, EvalError> {
    let (Some(left), Some(right)) = (bindings.expand_list(left), bindings.expand_list(right)) else {
        return Ok(false);
    };
    let (shorter, longer) = if left.elements.len() <= right.elements.len() {
        (&left, &right)
    } else {
        (&right, &left)
    };
    let shared = shorter.elements.len();
    if shorter.rest.is_none() && longer.elements.len() != shared {
        return Ok(false);
    }
    for (a, b) in left.elements.iter().zip(&right.elements) {
        if !unify_values(bindings, host, a, b)? {
            return Ok(false);
        }
    }
    match (&shorter.rest, &longer.rest) {
        (None, None) => Ok(true),
        (None, Some(tail)) => unify_values(
            bindings,
            host,
            &Value::Variable(tail.clone()),
            &Value::List(List::default()),
        ),
        (Some(tail), longer_tail) => {
            let remainder = &longer.elements[shared..];
            // `[a, *t] = [b, *u]` binds `t` to `u` itself, never to `[*u]`.
            let rest = match longer_tail {
                Some(other) if remainder.is_empty() => Value::Variable(other.clone()),
                _ => Value::List(List {
                    elements: remainder.to_vec(),
                    rest: longer_tail.clone(),
                }),
            };
            unify_values(bindings, host, &Value::Variable(tail.clone()), &rest)
        }
    }
}

fn unify_dictionaries(
    bindings: &mut Bindings,
    host: &dyn Host,
    left: &Dictionary,
    right: &Dictionary,
) -> Result<bool, EvalError> {
    if left.len() != right.len() || !left.fields.keys().eq(right.fields.keys()) {
        return Ok(false);
    }
    for (a, b) in left.fields.values().zip(right.fields.values()) {
        if !unify_values(bindings, host, a, b)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn unify_patterns(
    bindings: &mut Bindings,
    host: &dyn Host,
    left: &Pattern,
    right: &Pattern,
) -> Result<bool, EvalError> {
    match (left, right) {
        (Pattern::Dictionary(a), Pattern::Dictionary(b)) => {
            unify_dictionaries(bindings, host, a, b)
        }
        (
            Pattern::Instance { tag: a, fields: fa },
            Pattern::Instance { tag: b, fields: fb },
        ) if a == b => unify_dictionaries(bindings, host, fa, fb),
        _ => Ok(false),
    }
}

fn matches_pattern(
    bindings: &mut Bindings,
    host: &dyn Host,
    value: &Value,
    pattern: &Pattern,
) -> Result<bool, EvalError> {
    let value = bindings.deref(value);
    match (pattern, &value) {
        // An unbound value is not known to belong to any class.
        (_, Value::Variable(_)) => Ok(false),
        (Pattern::Dictionary(fields), Value::Dictionary(dict)) => {
            match_dictionary_fields(bindings, host, dict, fields)
        }
        (Pattern::Dictionary(fields), Value::Instance(instance)) => {
            match_instance_fields(bindings, host, instance, fields)
        }
        (Pattern::Dictionary(_), _) => Ok(false),
        (Pattern::Instance { tag, fields }, Value::Instance(instance)) => {
            let class = host.type_of(instance)?;
            let subtype = host.is_subtype(class.as_str(), tag.as_str())?;
            trace!(%class, %tag, subtype, "class check");
            if !subtype {
                return Ok(false);
            }
            match_instance_fields(bindings, host, instance, fields)
        }
        (Pattern::Instance { tag, fields }, other) => {
            if other.builtin_class() != Some(tag.as_str()) {
                return Ok(false);
            }
            match other {
                Value::Dictionary(dict) => match_dictionary_fields(bindings, host, dict, fields),
                _ => Ok(fields.is_empty()),
            }
        }
    }
}

fn match_dictionary_fields(
    bindings: &mut Bindings,
    host: &dyn Host,
    dict: &Dictionary,
    fields: &Dictionary,
) -> Result<bool, EvalError> {
    for (key, expected) in &fields.fields {
        let Some(actual) = dict.fields.get(key) else {
            return Ok(false);
        };
        if !unify_values(bindings, host, actual, expected)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn match_instance_fields(
    bindings: &mut Bindings,
    host: &dyn Host,
    instance: &Instance,
    fields: &Dictionary,
) -> Result<bool, EvalError> {
    for (key, expected) in &fields.fields {
        let actual = host.get_attribute(instance, key.as_str())?;
        if !unify_values(bindings, host, &actual, expected)? {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ClassRegistry;
    use crate::types::{class, pattern, var, HostError};

    fn host() -> ClassRegistry {
        ClassRegistry::new()
            .with_class("User", &[])
            .with_class("Admin", &["User"])
    }

    fn unify_ok(bindings: &mut Bindings, host: &dyn Host, a: Value, b: Value) -> bool {
        unify(bindings, host, &a, &b).unwrap()
    }

    #[test]
    fn variable_binds_to_value() {
        let host = host();
        let mut bindings = Bindings::default();
        assert!(unify_ok(&mut bindings, &host, var("x"), Value::Integer(3)));
        assert_eq!(bindings.deref(&var("x")), Value::Integer(3));
    }

    #[test]
    fn variable_chains_resolve() {
        let host = host();
        let mut bindings = Bindings::default();
        assert!(unify_ok(&mut bindings, &host, var("x"), var("y")));
        assert!(unify_ok(&mut bindings, &host, var("y"), "a".into()));
        assert_eq!(bindings.deref(&var("x")), Value::from("a"));
    }

    #[test]
    fn self_unification_binds_nothing() {
        let host = host();
        let mut bindings = Bindings::default();
        assert!(unify_ok(&mut bindings, &host, var("x"), var("x")));
        assert_eq!(bindings.mark(), 0);
    }

    #[test]
    fn numbers_unify_across_types() {
        let host = host();
        let mut bindings = Bindings::default();
        assert!(unify_ok(&mut bindings, &host, 1_i64.into(), 1.0_f64.into()));
        assert!(!unify_ok(&mut bindings, &host, 1_i64.into(), "1".into()));
        assert!(!unify_ok(&mut bindings, &host, true.into(), 1_i64.into()));
    }

    #[test]
    fn lists_of_different_length_fail_without_residue() {
        let host = host();
        let mut bindings = Bindings::default();
        let a = Value::from(vec![var("x"), var("y")]);
        let b = Value::from(vec![1_i64]);
        assert!(!unify_ok(&mut bindings, &host, a, b));
        assert_eq!(bindings.mark(), 0);
    }

    #[test]
    fn failed_unification_undoes_partial_bindings() {
        let host = host();
        let mut bindings = Bindings::default();
        let a = Value::from(vec![var("x"), Value::Integer(2)]);
        let b = Value::from(vec![Value::Integer(1), Value::Integer(3)]);
        assert!(!unify_ok(&mut bindings, &host, a, b));
        assert_eq!(bindings.deref(&var("x")), var("x"));
    }

    #[test]
    fn rest_variable_captures_tail() {
        let host = host();
        let mut bindings = Bindings::default();
        let open = Value::List(List::with_rest(vec![var("head")], "tail"));
        assert!(unify_ok(
            &mut bindings,
            &host,
            open,
            Value::from(vec![1_i64, 2, 3])
        ));
        assert_eq!(bindings.deref(&var("head")), Value::Integer(1));
        assert_eq!(bindings.deep_deref(&var("tail")), Value::from(vec![2_i64, 3]));
    }

    #[test]
    fn rest_variable_matches_empty_tail() {
        let host = host();
        let mut bindings = Bindings::default();
        let open = Value::List(List::with_rest(vec![Value::Integer(1)], "tail"));
        assert!(unify_ok(&mut bindings, &host, open, Value::from(vec![1_i64])));
        assert_eq!(bindings.deep_deref(&var("tail")), Value::from(Vec::<Value>::new()));
    }

    #[test]
    fn two_open_lists_share_a_tail() {
        let host = host();
        let mut bindings = Bindings::default();
        let a = Value::List(List::with_rest(vec![Value::Integer(1)], "a"));
        let b = Value::List(List::with_rest(vec![Value::Integer(1), Value::Integer(2)], "b"));
        assert!(unify_ok(&mut bindings, &host, a, b));
        assert!(unify_ok(&mut bindings, &host, var("b"), Value::from(vec![3_i64])));
        assert_eq!(bindings.deep_deref(&var("a")), Value::from(vec![2_i64, 3]));
    }

    #[test]
    fn open_list_unifies_with_itself() {
        let host = host();
        let mut bindings = Bindings::default();
        let open = Value::List(List::with_rest(vec![var("x")], "t"));
        assert!(unify_ok(&mut bindings, &host, open.clone(), open));
        assert_eq!(bindings.mark(), 0);
        assert_eq!(bindings.deep_deref(&var("t")), var("t"));
    }

    #[test]
    fn occurs_check_rejects_cyclic_bindings() {
        let host = host();
        let mut bindings = Bindings::default();
        let nested = Value::from(vec![var("x")]);
        assert!(!unify_ok(&mut bindings, &host, var("x"), nested.clone()));
        assert!(!unify_ok(&mut bindings, &host, nested, var("x")));
        let dict = Value::from(Dictionary::new().with("self", var("x")));
        assert!(!unify_ok(&mut bindings, &host, var("x"), dict));
        assert_eq!(bindings.mark(), 0);

        // A cycle through another binding is caught as well.
        assert!(unify_ok(&mut bindings, &host, var("y"), Value::from(vec![var("x")])));
        assert!(!unify_ok(&mut bindings, &host, var("x"), Value::from(vec![var("y")])));
        let grows = Value::List(List::with_rest(vec![1_i64.into()], "t"));
        assert!(!unify_ok(&mut bindings, &host, var("t"), grows));
    }

    #[test]
    fn dictionary_literals_are_closed() {
        let host = host();
        let mut bindings = Bindings::default();
        let small = Value::from(Dictionary::new().with("a", 1_i64));
        let big = Value::from(Dictionary::new().with("a", 1_i64).with("b", 2_i64));
        assert!(!unify_ok(&mut bindings, &host, small.clone(), big));
        let open = Value::from(Dictionary::new().with("a", var("x")));
        assert!(unify_ok(&mut bindings, &host, open, small));
        assert_eq!(bindings.deref(&var("x")), Value::Integer(1));
    }

    #[test]
    fn dictionary_patterns_are_open() {
        let host = host();
        let mut bindings = Bindings::default();
        let dict = Value::from(Dictionary::new().with("a", 1_i64).with("b", 2_i64));
        assert!(isa(&mut bindings, &host, &dict, &pattern().with("a", 1_i64)).unwrap());
        assert!(isa(&mut bindings, &host, &dict, &pattern()).unwrap());
        assert!(!isa(&mut bindings, &host, &dict, &pattern().with("c", 1_i64)).unwrap());
    }

    #[test]
    fn builtin_classes_match_primitives() {
        let host = host();
        let mut bindings = Bindings::default();
        assert!(isa(&mut bindings, &host, &1_i64.into(), &class("Integer")).unwrap());
        assert!(!isa(&mut bindings, &host, &1_i64.into(), &class("String")).unwrap());
        let dict = Value::from(Dictionary::new().with("k", "v"));
        assert!(isa(&mut bindings, &host, &dict, &class("Dictionary").with("k", "v")).unwrap());
    }

    #[test]
    fn unbound_value_matches_no_class() {
        let host = host();
        let mut bindings = Bindings::default();
        assert!(!isa(&mut bindings, &host, &var("x"), &class("User")).unwrap());
        assert!(!isa(&mut bindings, &host, &var("x"), &pattern()).unwrap());
    }

    #[test]
    fn instance_patterns_use_the_host() {
        let mut host = host();
        let admin = host
            .register_instance("Admin", Dictionary::new().with("name", "root"))
            .unwrap();
        let value = Value::Instance(admin);
        let mut bindings = Bindings::default();
        assert!(isa(&mut bindings, &host, &value, &class("User")).unwrap());
        assert!(isa(&mut bindings, &host, &value, &class("Admin").with("name", var("n"))).unwrap());
        assert_eq!(bindings.deref(&var("n")), Value::from("root"));
        assert!(!isa(&mut bindings, &host, &value, &class("Document")).unwrap());
    }

    #[test]
    fn missing_instance_attribute_in_pattern_is_an_error() {
        let mut host = host();
        let user = host.register_instance("User", Dictionary::new()).unwrap();
        let mut bindings = Bindings::default();
        let result = isa(
            &mut bindings,
            &host,
            &Value::Instance(user),
            &class("User").with("age", 3_i64),
        );
        assert!(matches!(
            result,
            Err(EvalError::Host(HostError::AttributeLookup { .. }))
        ));
    }

    #[test]
    fn equality_is_structural() {
        let host = host();
        let mut bindings = Bindings::default();
        let a = Value::from(vec![1_i64, 2]);
        let b = Value::from(vec![1.0_f64, 2.0]);
        assert!(compare(&mut bindings, &host, CompareOp::Eq, &a, &b).unwrap());
        assert!(compare(&mut bindings, &host, CompareOp::Neq, &a, &"x".into()).unwrap());
    }

    #[test]
    fn ordering_needs_comparable_operands() {
        let host = host();
        let mut bindings = Bindings::default();
        let lt = compare(&mut bindings, &host, CompareOp::Lt, &1_i64.into(), &2.5_f64.into());
        assert!(lt.unwrap());
        assert!(matches!(
            compare(&mut bindings, &host, CompareOp::Lt, &1_i64.into(), &"a".into()),
            Err(EvalError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn comparing_unbound_operands_is_an_error() {
        let host = host();
        let mut bindings = Bindings::default();
        let result = compare(&mut bindings, &host, CompareOp::Eq, &var("x"), &1_i64.into());
        assert!(matches!(
            result,
            Err(EvalError::UnboundVariable { name, .. }) if name == "x"
        ));
    }
}
