use std::collections::BTreeMap;
use std::fmt;

use super::value::{Symbol, Value};

/// One way of satisfying a query: the final value of each query variable.
///
/// Variables still unbound at the end of the derivation map to themselves.
#[derive(Debug, Clone, PartialEq, Default)]
#[must_use]
pub struct Solution {
    bindings: BTreeMap<Symbol, Value>,
}

impl fmt::Display for Solution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.bindings.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        f.write_str("}")
    }
}

impl Solution {
    pub(crate) fn new(bindings: BTreeMap<Symbol, Value>) -> Self {
        Self { bindings }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, &Value)> {
        self.bindings.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_display() {
        let mut bindings = BTreeMap::new();
        bindings.insert(Symbol::new("y"), Value::from("alice"));
        bindings.insert(Symbol::new("x"), Value::Integer(1));
        let solution = Solution::new(bindings);
        assert_eq!(solution.get("x"), Some(&Value::Integer(1)));
        assert_eq!(solution.get("z"), None);
        assert_eq!(solution.len(), 2);
        assert_eq!(solution.to_string(), "{x = 1, y = \"alice\"}");
    }

    #[test]
    fn empty_solution() {
        let solution = Solution::default();
        assert!(solution.is_empty());
        assert_eq!(solution.to_string(), "{}");
    }
}
