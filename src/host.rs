//! The capabilities the evaluator needs from the embedding application.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{Dictionary, HostError, Instance, Symbol, Value};

/// Answers questions about host-application objects.
///
/// The evaluator never inspects an [`Instance`] itself: class membership,
/// attribute values and identity all come through this trait. Implementations
/// must be shareable across threads because one host typically serves many
/// concurrent queries.
pub trait Host: Send + Sync {
    /// The class of an instance. Defaults to the class recorded in the handle.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the instance is unknown to the host.
    fn type_of(&self, instance: &Instance) -> Result<Symbol, HostError> {
        Ok(instance.class.clone())
    }

    /// Whether `sub` is `sup` or one of its descendants.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if either class is unknown to the host.
    fn is_subtype(&self, sub: &str, sup: &str) -> Result<bool, HostError>;

    /// Read one attribute of an instance.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::AttributeLookup`] if the attribute does not exist.
    fn get_attribute(&self, instance: &Instance, name: &str) -> Result<Value, HostError>;

    /// Host-defined equality. Defaults to identity of the handles.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] if the comparison cannot be made.
    fn instances_equal(&self, left: &Instance, right: &Instance) -> Result<bool, HostError> {
        Ok(left.id == right.id)
    }
}

#[derive(Debug)]
struct Record {
    class: Symbol,
    attributes: Dictionary,
}

/// An in-memory [`Host`]: a class hierarchy plus instances with fixed attributes.
///
/// # Example
///
/// ```
/// use ruling::{ClassRegistry, Dictionary, Host, Value};
///
/// let mut host = ClassRegistry::new();
/// host.register_class("Resource", &[]);
/// host.register_class("Document", &["Resource"]);
/// let doc = host
///     .register_instance("Document", Dictionary::new().with("title", "plan"))
///     .unwrap();
/// assert!(host.is_subtype("Document", "Resource").unwrap());
/// assert_eq!(host.get_attribute(&doc, "title").unwrap(), Value::from("plan"));
/// ```
#[derive(Debug, Default)]
pub struct ClassRegistry {
    supers: HashMap<Symbol, Vec<Symbol>>,
    records: HashMap<u64, Record>,
    next_id: u64,
}

impl ClassRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class and its direct superclasses. Re-registering a class
    /// replaces its superclasses.
    pub fn register_class(&mut self, name: &str, supers: &[&str]) {
        self.supers.insert(
            Symbol::new(name),
            supers.iter().map(|s| Symbol::new(s)).collect(),
        );
    }

    /// Builder-style variant of [`register_class`](Self::register_class).
    #[must_use]
    pub fn with_class(mut self, name: &str, supers: &[&str]) -> Self {
        self.register_class(name, supers);
        self
    }

    /// Create an instance of a registered class.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownClass`] if the class was never registered.
    pub fn register_instance(
        &mut self,
        class: &str,
        attributes: Dictionary,
    ) -> Result<Instance, HostError> {
        let Some((class, _)) = self.supers.get_key_value(class) else {
            return Err(HostError::UnknownClass {
                name: class.to_owned(),
            });
        };
        let class = class.clone();
        let id = self.next_id;
        self.next_id += 1;
        self.records.insert(
            id,
            Record {
                class: class.clone(),
                attributes,
            },
        );
        Ok(Instance { id, class })
    }

    /// Set or replace one attribute of an existing instance.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownInstance`] if the instance does not exist.
    pub fn set_attribute(
        &mut self,
        instance: &Instance,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), HostError> {
        let record = self
            .records
            .get_mut(&instance.id)
            .ok_or(HostError::UnknownInstance { id: instance.id })?;
        record.attributes.fields.insert(Symbol::new(name), value.into());
        Ok(())
    }

    fn record(&self, instance: &Instance) -> Result<&Record, HostError> {
        self.records
            .get(&instance.id)
            .ok_or(HostError::UnknownInstance { id: instance.id })
    }
}

impl Host for ClassRegistry {
    fn type_of(&self, instance: &Instance) -> Result<Symbol, HostError> {
        Ok(self.record(instance)?.class.clone())
    }

    fn is_subtype(&self, sub: &str, sup: &str) -> Result<bool, HostError> {
        if sub == sup {
            return Ok(true);
        }
        if !self.supers.contains_key(sub) {
            return Err(HostError::UnknownClass {
                name: sub.to_owned(),
            });
        }
        // Breadth-first over superclasses; the visited set tolerates cycles.
        let mut queue: VecDeque<&str> = VecDeque::from([sub]);
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(class) = queue.pop_front() {
            if !visited.insert(class) {
                continue;
            }
            for parent in self.supers.get(class).into_iter().flatten() {
                if parent.as_str() == sup {
                    return Ok(true);
                }
                queue.push_back(parent.as_str());
            }
        }
        Ok(false)
    }

    fn get_attribute(&self, instance: &Instance, name: &str) -> Result<Value, HostError> {
        let record = self.record(instance)?;
        record
            .attributes
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::AttributeLookup {
                class: record.class.to_string(),
                attribute: name.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClassRegistry {
        ClassRegistry::new()
            .with_class("Actor", &[])
            .with_class("User", &["Actor"])
            .with_class("Admin", &["User"])
            .with_class("Service", &["Actor"])
    }

    #[test]
    fn subtype_is_reflexive_and_transitive() {
        let host = registry();
        assert!(host.is_subtype("User", "User").unwrap());
        assert!(host.is_subtype("Admin", "Actor").unwrap());
        assert!(!host.is_subtype("Service", "User").unwrap());
        assert!(!host.is_subtype("Actor", "User").unwrap());
    }

    #[test]
    fn subtype_of_unknown_class_is_an_error() {
        let host = registry();
        assert_eq!(
            host.is_subtype("Robot", "Actor"),
            Err(HostError::UnknownClass {
                name: "Robot".into()
            })
        );
    }

    #[test]
    fn subtype_tolerates_cycles() {
        let host = ClassRegistry::new()
            .with_class("A", &["B"])
            .with_class("B", &["A"]);
        assert!(host.is_subtype("A", "B").unwrap());
        assert!(!host.is_subtype("A", "C").unwrap());
    }

    #[test]
    fn instances_carry_their_class_and_attributes() {
        let mut host = registry();
        let alice = host
            .register_instance("Admin", Dictionary::new().with("name", "alice"))
            .unwrap();
        assert_eq!(host.type_of(&alice).unwrap().as_str(), "Admin");
        assert_eq!(host.get_attribute(&alice, "name").unwrap(), Value::from("alice"));
        assert_eq!(
            host.get_attribute(&alice, "age"),
            Err(HostError::AttributeLookup {
                class: "Admin".into(),
                attribute: "age".into()
            })
        );
    }

    #[test]
    fn ids_are_distinct() {
        let mut host = registry();
        let a = host.register_instance("User", Dictionary::new()).unwrap();
        let b = host.register_instance("User", Dictionary::new()).unwrap();
        assert_ne!(a.id, b.id);
        assert!(!host.instances_equal(&a, &b).unwrap());
        assert!(host.instances_equal(&a, &a.clone()).unwrap());
    }

    #[test]
    fn unregistered_class_cannot_be_instantiated() {
        let mut host = registry();
        assert!(matches!(
            host.register_instance("Robot", Dictionary::new()),
            Err(HostError::UnknownClass { .. })
        ));
    }

    #[test]
    fn set_attribute_updates_record() {
        let mut host = registry();
        let user = host.register_instance("User", Dictionary::new()).unwrap();
        host.set_attribute(&user, "active", true).unwrap();
        assert_eq!(host.get_attribute(&user, "active").unwrap(), Value::Boolean(true));
        let ghost = Instance::new(99, "User");
        assert_eq!(
            host.set_attribute(&ghost, "active", false),
            Err(HostError::UnknownInstance { id: 99 })
        );
    }
}
