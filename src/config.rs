/// Limits applied to every query an [`Authorizer`](crate::Authorizer) starts.
///
/// The defaults impose no limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[must_use]
pub struct QueryConfig {
    /// Maximum nesting of rule calls below the query goal. `None` is unbounded.
    pub max_depth: Option<usize>,
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail queries whose rule calls nest deeper than `limit`.
    pub fn with_max_depth(mut self, limit: usize) -> Self {
        self.max_depth = Some(limit);
        self
    }
}
