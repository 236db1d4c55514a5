//! The query machine: depth-first resolution with explicit backtracking.
//!
//! Pending work lives on a persistent goal list, so a choice point captures
//! the continuation it must resume with by cloning one `Arc`. Choice points
//! form a stack; backtracking pops the newest one, undoes the bindings made
//! since it was pushed, and tries its next alternative.

use std::collections::BTreeMap;
use std::iter::FusedIterator;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::bindings::Bindings;
use crate::config::QueryConfig;
use crate::host::Host;
use crate::types::{
    ArithOp, EvalError, Goal, HostError, Rule, RuleSet, Solution, Symbol, Term, Value,
};
use crate::unify::{compare, first_variable, isa, unify};
use crate::walker::{
    AnonymousRenamer, Renamer, VariableCounter, Visitor, ANONYMOUS_PREFIX, RENAME_SEPARATOR,
};

#[derive(Debug, Clone)]
enum Task {
    Goal {
        goal: Goal,
        depth: usize,
        /// Choice-stack height a `cut` in this goal truncates to.
        barrier: usize,
    },
    /// Drop every choice point above the given height.
    CutTo(usize),
    Fail,
}

type Goals = Option<Arc<Cell>>;

#[derive(Debug)]
struct Cell {
    task: Task,
    next: Goals,
}

impl Drop for Cell {
    // Unlink iteratively so long continuations cannot overflow the stack.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(cell) = next {
            match Arc::try_unwrap(cell) {
                Ok(mut cell) => next = cell.next.take(),
                Err(_) => break,
            }
        }
    }
}

#[derive(Debug)]
enum Alternatives {
    Rules {
        candidates: Arc<[Rule]>,
        next: usize,
        args: Vec<Value>,
        depth: usize,
    },
    /// Remaining branches, last one first.
    Branches {
        branches: Vec<Goal>,
        depth: usize,
        barrier: usize,
    },
    /// Continue with the saved goals unchanged. Used by negation.
    Resume,
}

#[derive(Debug)]
struct Choice {
    alternatives: Alternatives,
    goals: Goals,
    trail: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Yielded,
    Done,
}

/// A running query: a lazy sequence of [`Solution`]s.
///
/// Each call to `next()` resumes the search where the previous one stopped,
/// so dropping the query after the first item never explores the remaining
/// alternatives. After the sequence is exhausted, or after an error, every
/// further call returns `None`.
pub struct Query {
    rules: Arc<RuleSet>,
    host: Arc<dyn Host>,
    config: QueryConfig,
    bindings: Bindings,
    goals: Goals,
    choices: Vec<Choice>,
    variables: Vec<Symbol>,
    generation: u64,
    state: State,
    /// Reported by the first `next()` instead of any solution.
    rejected: Option<EvalError>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("variables", &self.variables)
            .field("choices", &self.choices.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Query {
    pub(crate) fn new(
        rules: Arc<RuleSet>,
        host: Arc<dyn Host>,
        goal: Goal,
        config: QueryConfig,
    ) -> Self {
        // Renamed rule variables are `name@N`; a query variable spelled that
        // way could alias one of them.
        let mut written = VariableCounter::default();
        written.visit_goal(&goal);
        let rejected = written
            .into_names()
            .find(|name| name.as_str().contains(RENAME_SEPARATOR))
            .map(|name| EvalError::ReservedVariable {
                name: name.to_string(),
            });

        let goal = AnonymousRenamer::default()
            .visit_goal(&goal)
            .unwrap_or(goal);
        let mut counter = VariableCounter::default();
        counter.visit_goal(&goal);
        let variables = counter
            .into_names()
            .filter(|name| !name.as_str().starts_with(ANONYMOUS_PREFIX))
            .collect();

        let mut query = Self {
            rules,
            host,
            config,
            bindings: Bindings::default(),
            goals: None,
            choices: Vec::new(),
            variables,
            generation: 0,
            state: State::Fresh,
            rejected,
        };
        query.push(Task::Goal {
            goal,
            depth: 0,
            barrier: 0,
        });
        query
    }

    /// Variables of the query goal, in first-appearance order. These are the
    /// keys of every [`Solution`].
    #[must_use]
    pub fn variables(&self) -> &[Symbol] {
        &self.variables
    }

    fn push(&mut self, task: Task) {
        let next = self.goals.take();
        self.goals = Some(Arc::new(Cell { task, next }));
    }

    fn pop(&mut self) -> Option<Task> {
        let cell = self.goals.take()?;
        match Arc::try_unwrap(cell) {
            Ok(mut cell) => {
                self.goals = cell.next.take();
                // `Cell` implements Drop, so the task is moved out by replacement.
                Some(std::mem::replace(&mut cell.task, Task::Fail))
            }
            Err(shared) => {
                self.goals = shared.next.clone();
                Some(shared.task.clone())
            }
        }
    }

    fn next_solution(&mut self) -> Result<Option<Solution>, EvalError> {
        match self.state {
            State::Done => return Ok(None),
            State::Yielded => {
                if !self.backtrack()? {
                    self.finish();
                    return Ok(None);
                }
            }
            State::Fresh => {
                if let Some(err) = self.rejected.take() {
                    return Err(err);
                }
            }
        }
        loop {
            let Some(task) = self.pop() else {
                self.state = State::Yielded;
                return Ok(Some(self.solution()));
            };
            if !self.step(task)? && !self.backtrack()? {
                self.finish();
                return Ok(None);
            }
        }
    }

    fn finish(&mut self) {
        debug!(generations = self.generation, "query exhausted");
        self.state = State::Done;
        self.goals = None;
        self.choices.clear();
    }

    fn solution(&self) -> Solution {
        let bindings: BTreeMap<Symbol, Value> = self
            .variables
            .iter()
            .map(|name| {
                let value = self.bindings.deep_deref(&Value::Variable(name.clone()));
                (name.clone(), value)
            })
            .collect();
        Solution::new(bindings)
    }

    /// Resume the newest choice point that still has an alternative.
    fn backtrack(&mut self) -> Result<bool, EvalError> {
        while let Some(choice) = self.choices.pop() {
            trace!(remaining = self.choices.len(), "backtracking");
            self.bindings.undo(choice.trail);
            if self.resume(choice)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Restore a choice point's continuation and take its next alternative,
    /// re-pushing the choice if more alternatives remain.
    fn resume(&mut self, choice: Choice) -> Result<bool, EvalError> {
        let Choice {
            alternatives,
            goals,
            trail,
        } = choice;
        self.goals = goals.clone();
        match alternatives {
            Alternatives::Resume => Ok(true),
            Alternatives::Branches {
                mut branches,
                depth,
                barrier,
            } => {
                let Some(branch) = branches.pop() else {
                    return Ok(false);
                };
                if !branches.is_empty() {
                    self.choices.push(Choice {
                        alternatives: Alternatives::Branches {
                            branches,
                            depth,
                            barrier,
                        },
                        goals,
                        trail,
                    });
                }
                self.push(Task::Goal {
                    goal: branch,
                    depth,
                    barrier,
                });
                Ok(true)
            }
            Alternatives::Rules {
                candidates,
                next,
                args,
                depth,
            } => {
                let Some(rule) = candidates.get(next) else {
                    return Ok(false);
                };
                // A cut in the body removes this choice point and everything above it.
                let barrier = self.choices.len();
                if next + 1 < candidates.len() {
                    self.choices.push(Choice {
                        alternatives: Alternatives::Rules {
                            candidates: Arc::clone(&candidates),
                            next: next + 1,
                            args: args.clone(),
                            depth,
                        },
                        goals,
                        trail,
                    });
                }
                trace!(rule = %rule.name, candidate = next, depth, "trying rule");
                self.apply(rule, &args, depth, barrier)
            }
        }
    }

    /// Unify the arguments with a fresh copy of the rule head and, on
    /// success, schedule the body.
    fn apply(
        &mut self,
        rule: &Rule,
        args: &[Value],
        depth: usize,
        barrier: usize,
    ) -> Result<bool, EvalError> {
        self.generation += 1;
        let mut renamer = Renamer::new(self.generation);
        let host = &*self.host;
        for (arg, param) in args.iter().zip(&rule.params) {
            let param = renamer
                .visit_param(param)
                .unwrap_or_else(|| param.clone());
            if !unify(&mut self.bindings, host, arg, &param.value)? {
                return Ok(false);
            }
            if let Some(specializer) = &param.specializer {
                if !isa(&mut self.bindings, host, arg, specializer)? {
                    return Ok(false);
                }
            }
        }
        for goal in rule.body.iter().rev() {
            let goal = renamer.visit_goal(goal).unwrap_or_else(|| goal.clone());
            self.push(Task::Goal {
                goal,
                depth: depth + 1,
                barrier,
            });
        }
        Ok(true)
    }

    /// Try a list of alternatives left to right.
    fn branch(
        &mut self,
        mut branches: Vec<Goal>,
        depth: usize,
        barrier: usize,
    ) -> Result<bool, EvalError> {
        branches.reverse();
        let choice = Choice {
            alternatives: Alternatives::Branches {
                branches,
                depth,
                barrier,
            },
            goals: self.goals.clone(),
            trail: self.bindings.mark(),
        };
        self.resume(choice)
    }

    fn step(&mut self, task: Task) -> Result<bool, EvalError> {
        match task {
            Task::Fail => Ok(false),
            Task::CutTo(height) => {
                self.choices.truncate(height);
                Ok(true)
            }
            Task::Goal {
                goal,
                depth,
                barrier,
            } => self.solve(goal, depth, barrier),
        }
    }

    fn solve(&mut self, goal: Goal, depth: usize, barrier: usize) -> Result<bool, EvalError> {
        let host = Arc::clone(&self.host);
        match goal {
            Goal::Call { name, args } => {
                if let Some(limit) = self.config.max_depth {
                    if depth >= limit {
                        return Err(EvalError::DepthExceeded { limit });
                    }
                }
                let args = args
                    .iter()
                    .map(|arg| self.evaluate_term(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let candidates = self
                    .rules
                    .candidate_group(name.as_str(), args.len())
                    .ok_or_else(|| EvalError::UnknownRule {
                        name: name.to_string(),
                        arity: args.len(),
                    })?;
                let choice = Choice {
                    alternatives: Alternatives::Rules {
                        candidates,
                        next: 0,
                        args,
                        depth,
                    },
                    goals: self.goals.clone(),
                    trail: self.bindings.mark(),
                };
                self.resume(choice)
            }
            Goal::Unify(left, right) => {
                let left = self.evaluate_term(&left)?;
                let right = self.evaluate_term(&right)?;
                unify(&mut self.bindings, &*host, &left, &right)
            }
            Goal::Compare { op, left, right } => {
                let left = self.evaluate_term(&left)?;
                let right = self.evaluate_term(&right)?;
                compare(&mut self.bindings, &*host, op, &left, &right)
            }
            Goal::Isa { value, pattern } => {
                let value = self.evaluate_term(&value)?;
                match self.bindings.deref(&pattern) {
                    Value::Pattern(pattern) => isa(&mut self.bindings, &*host, &value, &pattern),
                    other => unify(&mut self.bindings, &*host, &value, &other),
                }
            }
            Goal::In { item, collection } => {
                let item = self.evaluate_term(&item)?;
                let collection = self.evaluate_term(&collection)?;
                let branches = self.members(&item, collection)?;
                self.branch(branches, depth, barrier)
            }
            Goal::And(goals) => {
                for goal in goals.into_iter().rev() {
                    self.push(Task::Goal {
                        goal,
                        depth,
                        barrier,
                    });
                }
                Ok(true)
            }
            Goal::Or(goals) => self.branch(goals, depth, barrier),
            Goal::Not(inner) => {
                // Succeeds, without bindings, only if `inner` has no solution:
                // a solution cuts away the resume point and then fails.
                let height = self.choices.len();
                self.choices.push(Choice {
                    alternatives: Alternatives::Resume,
                    goals: self.goals.clone(),
                    trail: self.bindings.mark(),
                });
                self.push(Task::Fail);
                self.push(Task::CutTo(height));
                self.push(Task::Goal {
                    goal: *inner,
                    depth,
                    barrier: height + 1,
                });
                Ok(true)
            }
            Goal::Cut => {
                self.choices.truncate(barrier);
                Ok(true)
            }
        }
    }

    /// One unification goal per member of `collection`.
    fn members(&self, item: &Value, collection: Value) -> Result<Vec<Goal>, EvalError> {
        let item = Term::Value(item.clone());
        match self.bindings.deref(&collection) {
            Value::List(list) => {
                let list = self.bindings.expand_list(&list).ok_or_else(|| {
                    EvalError::TypeMismatch {
                        operation: "in".to_owned(),
                        operands: list.to_string(),
                    }
                })?;
                Ok(list
                    .elements
                    .into_iter()
                    .map(|element| Goal::Unify(item.clone(), Term::Value(element)))
                    .collect())
            }
            Value::Dictionary(dict) => Ok(dict
                .fields
                .into_iter()
                .map(|(key, value)| {
                    let pair = Value::from(vec![Value::String(key.to_string()), value]);
                    Goal::Unify(item.clone(), Term::Value(pair))
                })
                .collect()),
            Value::Variable(name) => Err(EvalError::UnboundVariable {
                name: name.to_string(),
                operation: "in".to_owned(),
            }),
            other => Err(EvalError::TypeMismatch {
                operation: "in".to_owned(),
                operands: other.to_string(),
            }),
        }
    }

    /// Evaluate lookups and arithmetic in a goal operand.
    fn evaluate_term(&self, term: &Term) -> Result<Value, EvalError> {
        match term {
            Term::Value(value) => Ok(value.clone()),
            Term::Lookup { receiver, field } => {
                let receiver = self.bindings.deref(&self.evaluate_term(receiver)?);
                match receiver {
                    Value::Dictionary(dict) => dict.get(field.as_str()).cloned().ok_or_else(|| {
                        HostError::AttributeLookup {
                            class: "Dictionary".to_owned(),
                            attribute: field.to_string(),
                        }
                        .into()
                    }),
                    Value::Instance(instance) => {
                        trace!(class = %instance.class, %field, "attribute lookup");
                        Ok(self.host.get_attribute(&instance, field.as_str())?)
                    }
                    Value::Variable(name) => Err(EvalError::UnboundVariable {
                        name: name.to_string(),
                        operation: term.to_string(),
                    }),
                    other => Err(EvalError::TypeMismatch {
                        operation: format!(".{field}"),
                        operands: other.to_string(),
                    }),
                }
            }
            Term::Arithmetic { op, left, right } => {
                let left = self.bindings.deep_deref(&self.evaluate_term(left)?);
                let right = self.bindings.deep_deref(&self.evaluate_term(right)?);
                if let Some(name) = first_variable(&left).or_else(|| first_variable(&right)) {
                    return Err(EvalError::UnboundVariable {
                        name: name.to_string(),
                        operation: term.to_string(),
                    });
                }
                arithmetic(*op, &left, &right)
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let expression = || format!("{left} {op} {right}");
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => {
            if matches!(op, ArithOp::Div | ArithOp::Rem) && *b == 0 {
                return Err(EvalError::DivisionByZero {
                    expression: expression(),
                });
            }
            let result = match op {
                ArithOp::Add => a.checked_add(*b),
                ArithOp::Sub => a.checked_sub(*b),
                ArithOp::Mul => a.checked_mul(*b),
                ArithOp::Div => a.checked_div(*b),
                ArithOp::Rem => a.checked_rem(*b),
            };
            result.map(Value::Integer).ok_or_else(|| EvalError::Overflow {
                expression: expression(),
            })
        }
        (a, b) if a.is_number() && b.is_number() => {
            let as_float = |v: &Value| match v {
                Value::Integer(i) => *i as f64,
                Value::Float(f) => *f,
                _ => f64::NAN,
            };
            let (a, b) = (as_float(a), as_float(b));
            if matches!(op, ArithOp::Div | ArithOp::Rem) && b == 0.0 {
                return Err(EvalError::DivisionByZero {
                    expression: expression(),
                });
            }
            Ok(Value::Float(match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
                ArithOp::Rem => a % b,
            }))
        }
        _ => Err(EvalError::TypeMismatch {
            operation: op.to_string(),
            operands: format!("{left} and {right}"),
        }),
    }
}

impl Iterator for Query {
    type Item = Result<Solution, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_solution() {
            Ok(Some(solution)) => Some(Ok(solution)),
            Ok(None) => None,
            Err(err) => {
                debug!(error = %err, "query aborted");
                self.finish();
                Some(Err(err))
            }
        }
    }
}

impl FusedIterator for Query {}
