//! Federated Query Planner
//!
//! Turns a parsed query into a [`Plan`]: a DAG of steps that fetch raw rows
//! from federated sources and run the rest of the query locally. Planning is
//! pure and synchronous; it never touches a source's data.
//!
//! 1. **Elaboration**: WITH definitions and subqueries become sub-plans
//! 2. **Splitting**: each FROM item is classified as local or federated
//! 3. **Pushdown**: projections and simple filters move into fetch steps

pub mod builder;
pub mod cte;
pub mod filters;
pub mod join;
pub mod plan;
pub mod traversal;

#[cfg(test)]
mod tests;

pub use builder::{plan_query, QueryPlanner};
pub use filters::*;
pub use plan::*;
pub use traversal::*;
