use std::sync::Arc;

use tracing::{debug, field, instrument, Span};

use crate::config::QueryConfig;
use crate::evaluate::Query;
use crate::host::Host;
use crate::types::{EvalError, Goal, RuleSet, Symbol, Term, Value};

/// Name of the rule consulted by [`Authorizer::is_allowed`].
pub const ALLOW_RULE: &str = "allow";

/// Answers authorization questions against a compiled [`RuleSet`].
///
/// Cheap to clone and safe to share across threads: the rule set and host are
/// shared, and every query gets its own bindings.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ruling::{Authorizer, ClassRegistry, RuleSet};
///
/// let rules = RuleSet::from_policy(r#"
///     allow(actor, "read", doc) if owner(doc, actor);
///     owner(1, "alice");
/// "#).unwrap();
/// let authorizer = Authorizer::new(Arc::new(rules), Arc::new(ClassRegistry::new()));
/// assert!(authorizer.is_allowed("alice", "read", 1_i64).unwrap());
/// assert!(!authorizer.is_allowed("bob", "read", 1_i64).unwrap());
/// ```
#[derive(Clone)]
pub struct Authorizer {
    rules: Arc<RuleSet>,
    host: Arc<dyn Host>,
    config: QueryConfig,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("rules", &format_args!("{}", self.rules))
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    #[must_use]
    pub fn new(rules: Arc<RuleSet>, host: Arc<dyn Host>) -> Self {
        Self {
            rules,
            host,
            config: QueryConfig::default(),
        }
    }

    /// Replace the limits applied to queries started from now on.
    #[must_use]
    pub fn with_config(mut self, config: QueryConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    #[must_use]
    pub fn config(&self) -> QueryConfig {
        self.config
    }

    /// Whether `allow(actor, action, resource)` has at least one solution.
    ///
    /// Only the first solution is computed; alternatives after it are never
    /// explored.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError`] if evaluation fails before a solution is found,
    /// including [`EvalError::UnknownRule`] when no `allow/3` rule exists.
    #[instrument(
        level = "debug",
        skip_all,
        fields(actor = field::Empty, action = field::Empty, resource = field::Empty)
    )]
    pub fn is_allowed(
        &self,
        actor: impl Into<Value>,
        action: impl Into<Value>,
        resource: impl Into<Value>,
    ) -> Result<bool, EvalError> {
        let args = [actor.into(), action.into(), resource.into()];
        let span = Span::current();
        for (name, arg) in ["actor", "action", "resource"].into_iter().zip(&args) {
            span.record(name, field::display(arg));
        }
        let mut query = self.query_rule(ALLOW_RULE, args);
        let allowed = query.next().transpose()?.is_some();
        debug!(allowed, "authorization decided");
        Ok(allowed)
    }

    /// Start a query for the rule `name` applied to `args`.
    #[must_use]
    pub fn query_rule<I>(&self, name: &str, args: I) -> Query
    where
        I: IntoIterator<Item = Value>,
    {
        let goal = Goal::Call {
            name: Symbol::new(name),
            args: args.into_iter().map(Term::Value).collect(),
        };
        self.query(goal)
    }

    /// Start a query for an arbitrary goal.
    #[must_use]
    pub fn query(&self, goal: Goal) -> Query {
        debug!(%goal, "starting query");
        Query::new(
            Arc::clone(&self.rules),
            Arc::clone(&self.host),
            goal,
            self.config,
        )
    }
}
