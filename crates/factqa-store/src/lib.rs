//! Fact store for factqa.
//!
//! The question pipeline only talks to a store through [`FactStore`]:
//!
//! - `entities()` / `predicate_values(p)` enumerate sampling pools,
//! - `query(goals)` answers a conjunctive query with variable bindings.
//!
//! [`FactDb`] is the in-memory implementation: interned strings, roaring
//! bitmaps for entity membership, and per-predicate forward/backward indexes.

pub mod db;
pub mod error;
pub mod fact_file;
pub mod goal;
mod interner;
pub mod syntax;

pub use db::{FactDb, PredicateKind};
pub use error::StoreError;
pub use fact_file::{DerivedRelation, FactFile};
pub use goal::{
    is_bookkeeping_var, parse_goal, parse_query, render_query, Atom, Binding, Goal, Term, Value,
};
pub use interner::{StrId, StringInterner};

/// Read-only query interface over a fact store.
///
/// Implementations are shared across worker threads; nothing in the question
/// pipeline mutates a store.
pub trait FactStore: Send + Sync {
    /// Every entity name, sorted.
    fn entities(&self) -> Vec<String>;

    /// Every declared predicate name, sorted.
    fn predicates(&self) -> Vec<String>;

    /// Distinct object values of `predicate`, sorted.
    fn predicate_values(&self, predicate: &str) -> Result<Vec<String>, StoreError>;

    /// Evaluate a conjunctive query left to right and return every solution.
    fn query(&self, goals: &[Goal]) -> Result<Vec<Binding>, StoreError>;

    fn has_solution(&self, goals: &[Goal]) -> Result<bool, StoreError> {
        Ok(!self.query(goals)?.is_empty())
    }

    /// Evaluate independent queries; results are returned in input order.
    fn query_batch(&self, queries: &[Vec<Goal>]) -> Result<Vec<Vec<Binding>>, StoreError> {
        queries.iter().map(|goals| self.query(goals)).collect()
    }
}
